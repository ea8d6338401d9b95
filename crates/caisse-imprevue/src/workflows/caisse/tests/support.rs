use super::common::*;

use chrono::NaiveDate;

use crate::workflows::caisse::contracts::ContractLifecycle;
use crate::workflows::caisse::domain::{
    ActorId, Contract, ContractStatus, PaymentFrequency, SupportId, SupportRecord,
    SupportSettlement,
};
use crate::workflows::caisse::error::{CaisseError, ContributionGap, ValidationError};
use crate::workflows::caisse::events::CaisseEvent;
use crate::workflows::caisse::schedule::shift_months;
use crate::workflows::caisse::support::{OffsetAuthorization, SupportEligibilityEngine};

fn first() -> NaiveDate {
    date(2024, 1, 10)
}

/// Three-year contract paid through `paid` periods, for membership-year scenarios.
fn long_contract(paid: u32) -> Contract {
    let lifecycle = ContractLifecycle::default();
    let mut contract = contract();
    contract.subscription_tier.duration_in_months = 36;
    contract.subscription_tier.nominal = 360_000;
    lifecycle
        .activate(&mut contract, first(), None, timestamp())
        .expect("activates");
    for offset in 0..paid {
        let due = shift_months(first(), offset);
        lifecycle
            .record_payment(&mut contract, due, due, timestamp())
            .expect("payment recorded");
    }
    contract
}

fn repaid_support(period_index: u32) -> SupportRecord {
    let granted_at = shift_months(first(), period_index - 1);
    SupportRecord {
        id: SupportId(format!("SUP-HIST-{period_index}")),
        granted_at,
        amount: 30_000,
        repaid_at: Some(granted_at),
        month_index_at_grant: 1,
        period_index,
        repay_by: shift_months(first(), period_index),
        settlement: Some(SupportSettlement::Repaid),
        settled_by: None,
    }
}

#[test]
fn waiting_period_ends_exactly_three_months_after_first_payment() {
    let engine = SupportEligibilityEngine::default();
    let contract = contract_paid_through(first(), 4);

    match engine.can_request_support(&contract, date(2024, 4, 9)) {
        Err(CaisseError::NotYetEligible { eligible_on }) => {
            assert_eq!(eligible_on, Some(date(2024, 4, 10)))
        }
        other => panic!("expected not yet eligible, got {other:?}"),
    }

    let eligibility = engine
        .can_request_support(&contract, date(2024, 4, 10))
        .expect("eligible at the boundary");
    assert_eq!(eligibility.period_index, 4);
    assert_eq!(eligibility.min_amount, 30_000);
    assert_eq!(eligibility.max_amount, 100_000);
    assert_eq!(eligibility.repay_by, date(2024, 5, 10));
    assert_eq!(eligibility.granted_this_year, 0);
}

#[test]
fn unactivated_contracts_are_not_yet_eligible() {
    let engine = SupportEligibilityEngine::default();
    assert!(matches!(
        engine.can_request_support(&contract(), date(2024, 6, 1)),
        Err(CaisseError::NotYetEligible { eligible_on: None })
    ));
}

#[test]
fn month_end_anchor_clamps_the_waiting_period() {
    let engine = SupportEligibilityEngine::default();
    let contract = contract_paid_through(date(2024, 1, 31), 4);

    assert!(matches!(
        engine.can_request_support(&contract, date(2024, 4, 29)),
        Err(CaisseError::NotYetEligible { .. })
    ));
    let eligibility = engine
        .can_request_support(&contract, date(2024, 4, 30))
        .expect("eligible on the clamped date");
    assert_eq!(eligibility.period_index, 4);
}

#[test]
fn daily_contracts_use_the_same_anchored_periods() {
    let engine = SupportEligibilityEngine::default();
    let mut contract = contract_paid_through(first(), 4);
    contract.payment_frequency = PaymentFrequency::Daily;

    assert!(engine.can_request_support(&contract, date(2024, 4, 9)).is_err());
    assert!(engine.can_request_support(&contract, date(2024, 4, 10)).is_ok());
}

#[test]
fn contributions_must_be_current() {
    let engine = SupportEligibilityEngine::default();
    let lifecycle = ContractLifecycle::default();

    let behind = contract_paid_through(first(), 3);
    assert!(matches!(
        engine.can_request_support(&behind, date(2024, 4, 12)),
        Err(CaisseError::ContributionsNotCurrent(
            ContributionGap::CurrentPeriodUnpaid { period_index: 4, .. }
        ))
    ));

    let mut gap = contract_paid_through(first(), 1);
    for period_date in [date(2024, 3, 10), date(2024, 4, 10)] {
        lifecycle
            .record_payment(&mut gap, period_date, period_date, timestamp())
            .expect("payment recorded");
    }
    match engine.can_request_support(&gap, date(2024, 4, 10)) {
        Err(CaisseError::ContributionsNotCurrent(ContributionGap::ForfeitedPeriod {
            period_index,
            due_date,
        })) => {
            assert_eq!(period_index, 2);
            assert_eq!(due_date, date(2024, 2, 10));
        }
        other => panic!("expected forfeited period, got {other:?}"),
    }
}

#[test]
fn only_one_support_may_be_outstanding() {
    let engine = SupportEligibilityEngine::default();
    let mut contract = contract_paid_through(first(), 6);
    let support = engine
        .grant_support(&mut contract, SupportId::from("SUP-A"), 40_000, date(2024, 4, 10))
        .expect("granted");

    match engine.can_request_support(&contract, date(2024, 6, 10)) {
        Err(CaisseError::SupportOutstanding { support_id }) => assert_eq!(support_id, support.id),
        other => panic!("expected outstanding support, got {other:?}"),
    }
}

#[test]
fn supports_in_consecutive_periods_are_refused() {
    let engine = SupportEligibilityEngine::default();
    let mut contract = contract_paid_through(first(), 6);
    let support = engine
        .grant_support(&mut contract, SupportId::from("SUP-B"), 30_000, date(2024, 4, 10))
        .expect("granted");
    assert_eq!(support.period_index, 4);
    assert_eq!(support.month_index_at_grant, 1);
    engine
        .repay_support(&mut contract, &support.id, date(2024, 4, 25), None)
        .expect("repaid");

    assert!(matches!(
        engine.can_request_support(&contract, date(2024, 4, 28)),
        Err(CaisseError::ConsecutiveMonthViolation { previous_period: 4 })
    ));
    assert!(matches!(
        engine.can_request_support(&contract, date(2024, 5, 10)),
        Err(CaisseError::ConsecutiveMonthViolation { previous_period: 4 })
    ));

    let second = engine
        .grant_support(&mut contract, SupportId::from("SUP-C"), 30_000, date(2024, 6, 10))
        .expect("skipping a period restores eligibility");
    assert_eq!(second.period_index, 6);
    assert_eq!(second.month_index_at_grant, 2);
}

#[test]
fn seventh_support_in_a_membership_year_is_refused() {
    let engine = SupportEligibilityEngine::default();
    let mut contract = long_contract(25);
    contract.support_history = [13, 15, 17, 19, 21, 23]
        .into_iter()
        .map(repaid_support)
        .collect();

    match engine.can_request_support(&contract, date(2025, 12, 10)) {
        Err(error @ CaisseError::AnnualLimitReached { .. }) => {
            assert_eq!(error.to_string(), "support limit reached: 6/6 this year")
        }
        other => panic!("expected annual limit, got {other:?}"),
    }

    let next_year = engine
        .can_request_support(&contract, date(2026, 1, 10))
        .expect("limit resets with the membership year");
    assert_eq!(next_year.membership_year, 2);
    assert_eq!(next_year.granted_this_year, 0);
}

#[test]
fn grant_amount_must_fit_the_tier_bounds() {
    let engine = SupportEligibilityEngine::default();
    let mut contract = contract_paid_through(first(), 4);

    assert!(matches!(
        engine.grant_support(&mut contract, SupportId::from("SUP-D"), 29_999, date(2024, 4, 10)),
        Err(CaisseError::Validation(ValidationError::SupportAmountOutOfRange {
            amount: 29_999,
            min: 30_000,
            max: 100_000
        }))
    ));
    assert!(contract.support_history.is_empty());
    assert!(contract.current_support_id.is_none());
}

#[test]
fn late_repayment_is_accepted_and_flagged() {
    let engine = SupportEligibilityEngine::default();
    let mut contract = contract_paid_through(first(), 5);
    let support = engine
        .grant_support(&mut contract, SupportId::from("SUP-E"), 30_000, date(2024, 4, 10))
        .expect("granted");

    assert!(engine
        .check_support_overdue(&contract, date(2024, 5, 10))
        .is_ok());
    assert!(matches!(
        engine.check_support_overdue(&contract, date(2024, 5, 11)),
        Err(CaisseError::OverdueSupport { repay_by, .. }) if repay_by == date(2024, 5, 10)
    ));

    assert!(matches!(
        engine.repay_support(&mut contract, &SupportId::from("SUP-OTHER"), date(2024, 5, 12), None),
        Err(CaisseError::NotFound { .. })
    ));
    let repayment = engine
        .repay_support(&mut contract, &support.id, date(2024, 5, 12), Some(&actor()))
        .expect("late repayment accepted");
    assert!(repayment.late);
    assert_eq!(contract.current_support_id, None);
    let record = &contract.support_history[0];
    assert_eq!(record.settlement, Some(SupportSettlement::Repaid));
    assert_eq!(record.settled_by, Some(actor()));
    assert!(engine
        .check_support_overdue(&contract, date(2024, 6, 1))
        .is_ok());
}

#[test]
fn forced_settlement_needs_an_explicit_authorization() {
    let engine = SupportEligibilityEngine::default();
    let mut contract = contract_paid_through(first(), 5);
    let support = engine
        .grant_support(&mut contract, SupportId::from("SUP-F"), 30_000, date(2024, 4, 10))
        .expect("granted");

    let unsigned = OffsetAuthorization {
        authorized_by: actor(),
        reference: "  ".to_string(),
    };
    assert!(matches!(
        engine.record_forced_settlement(&mut contract, &support.id, &unsigned, date(2024, 6, 1)),
        Err(CaisseError::Validation(ValidationError::IncompleteAuthorization))
    ));
    assert!(contract.current_support_id.is_some());

    let authorization = OffsetAuthorization {
        authorized_by: ActorId::from("tresorier-01"),
        reference: "PV-2024-06-CA".to_string(),
    };
    engine
        .record_forced_settlement(&mut contract, &support.id, &authorization, date(2024, 6, 1))
        .expect("settled by offset");
    let record = &contract.support_history[0];
    assert_eq!(record.settlement, Some(SupportSettlement::ForcedOffset));
    assert_eq!(record.settled_by, Some(ActorId::from("tresorier-01")));
    assert_eq!(contract.current_support_id, None);
}

#[test]
fn service_grants_and_repays_supports() {
    let harness = harness();
    let contract = harness.converted_contract("C");
    harness
        .contracts
        .activate(&contract.id, first(), None)
        .expect("activated");
    for offset in 0..4 {
        let due = shift_months(first(), offset);
        harness
            .contracts
            .record_payment(&contract.id, due, due)
            .expect("paid");
    }

    let eligibility = harness
        .contracts
        .support_eligibility(&contract.id, date(2024, 4, 10))
        .expect("eligible");
    assert_eq!(eligibility.period_index, 4);

    let support = harness
        .contracts
        .grant_support(&contract.id, 45_000, date(2024, 4, 10))
        .expect("granted");
    assert!(support.id.0.starts_with("SUP-"));
    assert!(matches!(
        harness.contracts.check_support_overdue(&contract.id, date(2024, 5, 20)),
        Err(CaisseError::OverdueSupport { .. })
    ));

    harness
        .contracts
        .repay_support(&contract.id, &support.id, date(2024, 5, 20), Some(&actor()))
        .expect("repaid");
    let events = harness.events.events();
    assert!(events.contains(&CaisseEvent::SupportGranted {
        contract_id: contract.id.clone(),
        support_id: support.id.clone(),
        amount: 45_000,
        repay_by: date(2024, 5, 10),
    }));
    assert!(events.contains(&CaisseEvent::SupportRepaid {
        contract_id: contract.id.clone(),
        support_id: support.id.clone(),
        late: true,
    }));

    let stored = harness.contracts.get(&contract.id).expect("stored").record;
    assert_eq!(stored.current_support_id, None);
    assert_eq!(stored.support_history.len(), 1);
}

/// Contract paid through period 11, holding a support granted in period 11, then paid in full.
fn fully_paid_with_outstanding_support(harness: &Harness) -> (Contract, SupportRecord) {
    let contract = harness.converted_contract("C");
    harness
        .contracts
        .activate(&contract.id, first(), None)
        .expect("activated");
    for offset in 0..11 {
        let due = shift_months(first(), offset);
        harness
            .contracts
            .record_payment(&contract.id, due, due)
            .expect("paid");
    }
    let support = harness
        .contracts
        .grant_support(&contract.id, 50_000, date(2024, 11, 12))
        .expect("granted");
    let outcome = harness
        .contracts
        .record_payment(&contract.id, date(2024, 12, 10), date(2024, 12, 10))
        .expect("last payment");
    assert_eq!(outcome.final_refund, None);
    (contract, support)
}

fn finished_with_refund(harness: &Harness, contract: &Contract, amount: u64) -> bool {
    harness.events.events().iter().any(|event| {
        matches!(
            event,
            CaisseEvent::ContractFinished { contract_id, final_refund }
                if *contract_id == contract.id && final_refund.amount == amount
        )
    })
}

#[test]
fn repaying_the_last_support_finishes_a_fully_paid_contract() {
    let harness = harness();
    let (contract, support) = fully_paid_with_outstanding_support(&harness);
    let stored = harness.contracts.get(&contract.id).expect("stored").record;
    assert_eq!(stored.status, ContractStatus::Active);
    assert!(!finished_with_refund(&harness, &contract, 120_000));

    harness
        .contracts
        .repay_support(&contract.id, &support.id, date(2024, 12, 9), Some(&actor()))
        .expect("repaid");

    let stored = harness.contracts.get(&contract.id).expect("stored").record;
    assert_eq!(stored.status, ContractStatus::Finished);
    assert!(finished_with_refund(&harness, &contract, 120_000));
    assert_eq!(harness.events.names().last(), Some(&"ContractFinished"));
}

#[test]
fn forced_settlement_of_the_last_support_finishes_a_fully_paid_contract() {
    let harness = harness();
    let (contract, support) = fully_paid_with_outstanding_support(&harness);
    let authorization = OffsetAuthorization {
        authorized_by: ActorId::from("tresorier-01"),
        reference: "PV-2024-12-CA".to_string(),
    };

    let stored = harness
        .contracts
        .force_settle_support(&contract.id, &support.id, &authorization, date(2024, 12, 20))
        .expect("settled by offset");

    assert_eq!(stored.record.status, ContractStatus::Finished);
    assert!(finished_with_refund(&harness, &contract, 120_000));
}

#[test]
fn repaying_support_mid_term_keeps_the_contract_active() {
    let harness = harness();
    let contract = harness.converted_contract("C");
    harness
        .contracts
        .activate(&contract.id, first(), None)
        .expect("activated");
    for offset in 0..4 {
        let due = shift_months(first(), offset);
        harness
            .contracts
            .record_payment(&contract.id, due, due)
            .expect("paid");
    }
    let support = harness
        .contracts
        .grant_support(&contract.id, 30_000, date(2024, 4, 10))
        .expect("granted");
    harness
        .contracts
        .repay_support(&contract.id, &support.id, date(2024, 5, 1), None)
        .expect("repaid");

    let stored = harness.contracts.get(&contract.id).expect("stored").record;
    assert_eq!(stored.status, ContractStatus::Active);
    assert!(!harness.events.names().contains(&"ContractFinished"));
}
