use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::fields::CustomerField;
use crate::errors::DomainError;

/// Customer identifier assigned by the storefront platform.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalCustomerId(pub String);

impl ExternalCustomerId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::MissingIdentifier);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalCustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl FromStr for Gender {
    type Err = DomainError;

    // Ordinals are accepted for clients that still post the legacy enum positions.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "0" => Ok(Self::Male),
            "female" | "1" => Ok(Self::Female),
            _ => Err(DomainError::InvalidGender(value.to_string())),
        }
    }
}

/// Every mutable attribute of a customer record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_name: Option<String>,
    pub gender: Option<Gender>,
    pub height: Option<String>,
    pub weight: Option<String>,
    pub neck: Option<String>,
    pub shoulder_width: Option<String>,
    pub sleeve_length: Option<String>,
    pub bicep_circumference: Option<String>,
    pub wrist_circumference: Option<String>,
    pub chest_bust_circumference: Option<String>,
    pub waist_circumference: Option<String>,
    pub lower_waist: Option<String>,
    pub hips_seat: Option<String>,
}

impl CustomerProfile {
    pub fn value(&self, field: CustomerField) -> Option<&str> {
        match field {
            CustomerField::Gender => self.gender.as_ref().map(Gender::as_str),
            other => self.text_slot(other).and_then(|slot| slot.as_deref()),
        }
    }

    /// Assigns a raw value, parsing it where the field is typed.
    pub fn set(&mut self, field: CustomerField, value: &str) -> Result<(), DomainError> {
        if field == CustomerField::Gender {
            self.gender = Some(value.parse()?);
            return Ok(());
        }

        if let Some(slot) = self.text_slot_mut(field) {
            *slot = Some(value.to_string());
        }
        Ok(())
    }

    fn text_slot(&self, field: CustomerField) -> Option<&Option<String>> {
        let slot = match field {
            CustomerField::CustomerName => &self.customer_name,
            CustomerField::Gender => return None,
            CustomerField::Height => &self.height,
            CustomerField::Weight => &self.weight,
            CustomerField::Neck => &self.neck,
            CustomerField::ShoulderWidth => &self.shoulder_width,
            CustomerField::SleeveLength => &self.sleeve_length,
            CustomerField::BicepCircumference => &self.bicep_circumference,
            CustomerField::WristCircumference => &self.wrist_circumference,
            CustomerField::ChestBustCircumference => &self.chest_bust_circumference,
            CustomerField::WaistCircumference => &self.waist_circumference,
            CustomerField::LowerWaist => &self.lower_waist,
            CustomerField::HipsSeat => &self.hips_seat,
        };
        Some(slot)
    }

    fn text_slot_mut(&mut self, field: CustomerField) -> Option<&mut Option<String>> {
        let slot = match field {
            CustomerField::CustomerName => &mut self.customer_name,
            CustomerField::Gender => return None,
            CustomerField::Height => &mut self.height,
            CustomerField::Weight => &mut self.weight,
            CustomerField::Neck => &mut self.neck,
            CustomerField::ShoulderWidth => &mut self.shoulder_width,
            CustomerField::SleeveLength => &mut self.sleeve_length,
            CustomerField::BicepCircumference => &mut self.bicep_circumference,
            CustomerField::WristCircumference => &mut self.wrist_circumference,
            CustomerField::ChestBustCircumference => &mut self.chest_bust_circumference,
            CustomerField::WaistCircumference => &mut self.waist_circumference,
            CustomerField::LowerWaist => &mut self.lower_waist,
            CustomerField::HipsSeat => &mut self.hips_seat,
        };
        Some(slot)
    }
}

/// A stored customer. Serializes as one flat object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: i64,
    pub customer_id: ExternalCustomerId,
    #[serde(flatten)]
    pub profile: CustomerProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
