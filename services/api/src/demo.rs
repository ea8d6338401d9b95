use crate::infra::{load_catalog, parse_date, InMemoryCaisseRepository, RecordingEventPublisher};
use caisse_imprevue::config::AppConfig;
use caisse_imprevue::error::AppError;
use caisse_imprevue::workflows::caisse::schedule::{
    classify, contract_end_date, current_period, next_due_date_after, period_for_date, periods,
};
use caisse_imprevue::workflows::caisse::{
    ActorId, CaisseEvent, CaissePolicy, ContractId, ContractService, DemandService,
    DemandSubmission, EmergencyContact, GracePolicy, IdentityDocumentType, MemberId,
    MemberSnapshot, SubscriptionTier, TierSource,
};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct CatalogArgs {
    /// CSV export of tiers (code,label,amount_per_month,duration_in_months,support_min,support_max,nominal)
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ScheduleArgs {
    /// Date of the first contribution (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) first_payment_date: NaiveDate,
    /// Tier whose duration sets the number of periods
    #[arg(long, default_value = "C")]
    pub(crate) tier: String,
    /// Reference date for the current period (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Period being paid, used with --paid-at to classify a contribution
    #[arg(long, value_parser = parse_date, requires = "paid_at")]
    pub(crate) period_date: Option<NaiveDate>,
    /// Date the contribution was received
    #[arg(long, value_parser = parse_date)]
    pub(crate) paid_at: Option<NaiveDate>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Tier used for the demo member
    #[arg(long, default_value = "C")]
    pub(crate) tier: String,
    /// First contribution date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) first_payment_date: Option<NaiveDate>,
    /// Print the committed events as JSON
    #[arg(long)]
    pub(crate) show_events: bool,
}

pub(crate) fn run_catalog(args: CatalogArgs) -> Result<(), AppError> {
    let catalog = load_catalog(args.csv.as_deref())?;
    println!("Subscription tiers ({})", catalog.len());
    for tier in catalog.tiers() {
        println!("- {}", describe_tier(tier));
    }
    Ok(())
}

pub(crate) fn run_schedule(args: ScheduleArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let catalog = load_catalog(config.caisse.catalog_csv.as_deref())?;
    let tier = catalog.get_tier(&args.tier)?;
    let as_of = args.as_of.unwrap_or_else(|| Local::now().date_naive());

    for line in schedule_lines(
        &tier,
        args.first_payment_date,
        as_of,
        args.period_date.zip(args.paid_at),
        &config.caisse.policy.grace,
    ) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn describe_tier(tier: &SubscriptionTier) -> String {
    format!(
        "{} ({}): {} FCFA x {} months = {} nominal, support {}..{} [{:?}]",
        tier.code,
        tier.label,
        tier.amount_per_month,
        tier.duration_in_months,
        tier.nominal,
        tier.support_min,
        tier.support_max,
        tier.kind
    )
}

pub(crate) fn schedule_lines(
    tier: &SubscriptionTier,
    first: NaiveDate,
    as_of: NaiveDate,
    payment: Option<(NaiveDate, NaiveDate)>,
    grace: &GracePolicy,
) -> Vec<String> {
    let duration = tier.duration_in_months;
    let mut lines = vec![format!(
        "Schedule for tier {} starting {first} ({duration} periods, ends {})",
        tier.code,
        contract_end_date(first, duration)
    )];
    for period in periods(first, duration) {
        lines.push(format!(
            "  #{:>2} due {} (window until {})",
            period.index, period.due_date, period.next_due_date
        ));
    }

    match current_period(first, duration, as_of) {
        Some(period) => lines.push(format!(
            "As of {as_of}: period {} (due {}), next due {}",
            period.index,
            period.due_date,
            next_due_date_after(first, duration, as_of)
        )),
        None => lines.push(format!("As of {as_of}: outside the contract term")),
    }

    if let Some((period_date, paid_at)) = payment {
        match period_for_date(first, duration, period_date) {
            Some(period) => lines.push(format!(
                "Payment for period {} received {paid_at}: {}",
                period.index,
                classify(period.due_date, paid_at, grace).label()
            )),
            None => lines.push(format!("{period_date} is outside the contract term")),
        }
    }
    lines
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let catalog = Arc::new(load_catalog(config.caisse.catalog_csv.as_deref())?);
    let first = args
        .first_payment_date
        .unwrap_or_else(|| Local::now().date_naive());
    let policy = config.caisse.policy.clone();

    let repository = Arc::new(InMemoryCaisseRepository::default());
    let events = Arc::new(RecordingEventPublisher::default());
    let demands = DemandService::new(
        catalog,
        repository.clone(),
        events.clone(),
        policy.clone(),
    );
    let contracts = ContractService::new(repository, events.clone(), policy.clone());
    let agent = ActorId::from("agent-demo");

    println!("Caisse Imprévue demo");
    let demand = demands
        .submit(demo_submission(&args.tier, first), &agent)?
        .record;
    println!(
        "- Demand {} submitted for {} {} (tier {}, nominal {})",
        demand.id,
        demand.member.first_name,
        demand.member.last_name,
        demand.subscription_tier.code,
        demand.subscription_tier.nominal
    );
    demands.approve(&demand.id, "Dossier complet, revenus justifiés", &agent)?;
    let contract = demands.convert(&demand.id)?;
    println!("- Demand approved and converted into contract {}", contract.id);

    contracts.activate(&contract.id, first, Some("contrat-signe.pdf".to_string()))?;
    let duration = contract.subscription_tier.duration_in_months;
    let waiting = policy.support.waiting_periods.min(duration.saturating_sub(1));

    for period in periods(first, duration).into_iter().take(waiting as usize + 1) {
        contracts.record_payment(&contract.id, period.due_date, period.due_date)?;
    }
    println!("- {} contributions recorded on time", waiting + 1);

    demo_support(&contracts, &contract.id, first, waiting, &agent, &policy)?;

    let mut outcome = None;
    for period in periods(first, duration).into_iter().skip(waiting as usize + 1) {
        let paid_at = period.due_date + Duration::days(1);
        outcome = Some(contracts.record_payment(&contract.id, period.due_date, paid_at)?);
    }
    let finished = outcome
        .and_then(|outcome| outcome.final_refund)
        .or(contracts.get(&contract.id)?.record.final_refund);
    let refund = match finished {
        Some(refund) => refund,
        None => contracts.try_complete(&contract.id)?,
    };
    println!(
        "- Contract finished: final refund {} (nominal {}, unpaid penalties {})",
        refund.amount, refund.nominal, refund.unpaid_penalties
    );

    let recorded = events.events();
    println!("- {} events published", recorded.len());
    if args.show_events {
        for event in &recorded {
            println!("  {}", render_event(event));
        }
    }
    Ok(())
}

fn demo_support(
    contracts: &ContractService<InMemoryCaisseRepository, RecordingEventPublisher>,
    contract_id: &ContractId,
    first: NaiveDate,
    waiting: u32,
    agent: &ActorId,
    policy: &CaissePolicy,
) -> Result<(), AppError> {
    let requested_on = periods(first, waiting + 1)
        .pop()
        .map_or(first, |period| period.due_date);
    let eligibility = match contracts.support_eligibility(contract_id, requested_on) {
        Ok(eligibility) => eligibility,
        Err(err) => {
            println!("- Support not available on {requested_on}: {err}");
            return Ok(());
        }
    };
    println!(
        "- Eligible for support on {requested_on}: {}..{} (year {}, {}/{} used)",
        eligibility.min_amount,
        eligibility.max_amount,
        eligibility.membership_year + 1,
        eligibility.granted_this_year,
        policy.support.annual_limit
    );

    let support = contracts.grant_support(contract_id, eligibility.min_amount, requested_on)?;
    println!(
        "- Support {} granted ({}), repay by {}",
        support.id, support.amount, support.repay_by
    );
    let repayment =
        contracts.repay_support(contract_id, &support.id, support.repay_by, Some(agent))?;
    println!(
        "- Support repaid on {}{}",
        repayment.repaid_at,
        if repayment.late { " (late)" } else { "" }
    );
    Ok(())
}

fn render_event(event: &CaisseEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| event.name().to_string())
}

fn demo_submission(tier: &str, desired_date: NaiveDate) -> DemandSubmission {
    DemandSubmission {
        member_id: MemberId::from("member-demo"),
        member: MemberSnapshot {
            matricule: "MK-DEMO-0001".to_string(),
            first_name: "Awa".to_string(),
            last_name: "Nzé".to_string(),
            phones: vec!["+241 07 00 00 00".to_string()],
            email: Some("awa.nze@example.org".to_string()),
            photo_url: None,
        },
        tier_code: tier.to_string(),
        payment_frequency: "MONTHLY".to_string(),
        desired_date,
        cause: "Faire face aux dépenses imprévues de santé".to_string(),
        emergency_contact: Some(EmergencyContact {
            last_name: "Nzé".to_string(),
            first_name: Some("Marc".to_string()),
            phone1: "+241 06 00 00 00".to_string(),
            phone2: None,
            relationship: "Époux".to_string(),
            id_type: Some(IdentityDocumentType::Passport),
            id_number: "PA-778812".to_string(),
            document_photo_url: Some("contacts/pa-778812.jpg".to_string()),
        }),
    }
}
