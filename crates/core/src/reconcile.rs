//! Merge planning for partial customer updates.
//!
//! Only fields present in the request with a non-null value participate. A field
//! absent from the request is never cleared, and a field whose value already
//! matches the stored one produces no change.

use crate::domain::customer::{CustomerProfile, Gender};
use crate::domain::fields::{CustomerField, SuppliedFields};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldChange {
    pub field: CustomerField,
    pub previous: Option<String>,
    pub next: String,
}

/// Profile for a record that does not exist yet.
pub fn initial_profile(supplied: &SuppliedFields) -> Result<CustomerProfile, DomainError> {
    let mut profile = CustomerProfile::default();
    apply_changes(&mut profile, &plan_changes(&CustomerProfile::default(), supplied)?)?;
    Ok(profile)
}

pub fn plan_changes(
    current: &CustomerProfile,
    supplied: &SuppliedFields,
) -> Result<Vec<FieldChange>, DomainError> {
    let mut changes = Vec::new();

    for (field, value) in supplied.iter() {
        let Some(raw) = value else {
            continue;
        };

        let next = canonical_value(field, raw)?;
        let previous = current.value(field);
        if previous == Some(next.as_str()) {
            continue;
        }

        changes.push(FieldChange { field, previous: previous.map(str::to_string), next });
    }

    Ok(changes)
}

pub fn apply_changes(
    profile: &mut CustomerProfile,
    changes: &[FieldChange],
) -> Result<(), DomainError> {
    for change in changes {
        profile.set(change.field, &change.next)?;
    }
    Ok(())
}

fn canonical_value(field: CustomerField, raw: &str) -> Result<String, DomainError> {
    match field {
        CustomerField::Gender => raw.parse::<Gender>().map(|gender| gender.as_str().to_string()),
        _ => Ok(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_changes, initial_profile, plan_changes, FieldChange};
    use crate::domain::customer::{CustomerProfile, Gender};
    use crate::domain::fields::{CustomerField, SuppliedFields};
    use crate::errors::DomainError;

    fn stored() -> CustomerProfile {
        CustomerProfile {
            customer_name: Some("Bob Norman".to_string()),
            gender: Some(Gender::Male),
            height: Some("180".to_string()),
            weight: Some("75".to_string()),
            ..CustomerProfile::default()
        }
    }

    #[test]
    fn initial_profile_takes_supplied_values_and_leaves_rest_empty() {
        let mut supplied = SuppliedFields::new()
            .with(CustomerField::Height, "180")
            .with(CustomerField::Weight, "75");
        supplied.insert(CustomerField::Neck, None);

        let profile = initial_profile(&supplied).expect("valid");

        assert_eq!(profile.height.as_deref(), Some("180"));
        assert_eq!(profile.weight.as_deref(), Some("75"));
        assert_eq!(profile.neck, None);
        assert_eq!(profile.customer_name, None);
        assert_eq!(profile.gender, None);
    }

    #[test]
    fn only_differing_present_fields_are_planned() {
        let supplied = SuppliedFields::new()
            .with(CustomerField::Height, "180")
            .with(CustomerField::Weight, "80");

        let changes = plan_changes(&stored(), &supplied).expect("valid");

        assert_eq!(
            changes,
            vec![FieldChange {
                field: CustomerField::Weight,
                previous: Some("75".to_string()),
                next: "80".to_string(),
            }]
        );
    }

    #[test]
    fn null_and_absent_fields_never_clear_stored_values() {
        let mut supplied = SuppliedFields::new();
        supplied.insert(CustomerField::Height, None);
        supplied.insert(CustomerField::CustomerName, Some(String::new()));

        let changes = plan_changes(&stored(), &supplied).expect("valid");

        assert!(changes.is_empty());
    }

    #[test]
    fn applying_the_same_fields_twice_is_idempotent() {
        let supplied = SuppliedFields::new()
            .with(CustomerField::Neck, "15.5")
            .with(CustomerField::Gender, "FEMALE");
        let mut profile = stored();

        let first = plan_changes(&profile, &supplied).expect("valid");
        apply_changes(&mut profile, &first).expect("apply");
        let second = plan_changes(&profile, &supplied).expect("valid");

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(profile.gender, Some(Gender::Female));
    }

    #[test]
    fn equivalent_gender_spelling_is_not_a_change() {
        let supplied = SuppliedFields::new().with(CustomerField::Gender, "0");

        assert!(plan_changes(&stored(), &supplied).expect("valid").is_empty());
    }

    #[test]
    fn invalid_gender_fails_the_whole_plan() {
        let supplied = SuppliedFields::new()
            .with(CustomerField::Height, "190")
            .with(CustomerField::Gender, "unknown");

        assert_eq!(
            plan_changes(&stored(), &supplied),
            Err(DomainError::InvalidGender("unknown".to_string()))
        );
    }
}
