use super::super::domain::{DeletionConfirmation, Demand, EmergencyContact};
use super::super::error::ValidationError;
use super::super::policy::CaissePolicy;

/// Trims the cause and checks its length in characters.
pub(crate) fn validate_cause(cause: &str, policy: &CaissePolicy) -> Result<String, ValidationError> {
    let trimmed = cause.trim();
    let found = trimmed.chars().count();
    if found < policy.min_cause_length || found > policy.max_cause_length {
        return Err(ValidationError::CauseLength {
            min: policy.min_cause_length,
            max: policy.max_cause_length,
            found,
        });
    }
    Ok(trimmed.to_string())
}

/// Decision, reopen and cancellation reasons share the same minimum length.
pub(crate) fn validate_reason(reason: &str, min: usize) -> Result<String, ValidationError> {
    let trimmed = reason.trim();
    let found = trimmed.chars().count();
    if found < min {
        return Err(ValidationError::ReasonTooShort { min, found });
    }
    Ok(trimmed.to_string())
}

pub(crate) fn require_complete_contact(
    contact: Option<&EmergencyContact>,
) -> Result<(), ValidationError> {
    let missing = match contact {
        Some(contact) => contact.missing_fields(),
        None => EmergencyContact::default().missing_fields(),
    };
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::IncompleteEmergencyContact { missing })
    }
}

/// The retyped id and matricule must match exactly, ignoring surrounding whitespace.
pub(crate) fn verify_confirmation(
    demand: &Demand,
    confirmation: &DeletionConfirmation,
) -> Result<(), ValidationError> {
    let id_matches = confirmation.demand_id.trim() == demand.id.0;
    let matricule_matches = confirmation.matricule.trim() == demand.member.matricule;
    if id_matches && matricule_matches {
        Ok(())
    } else {
        Err(ValidationError::ConfirmationMismatch)
    }
}
