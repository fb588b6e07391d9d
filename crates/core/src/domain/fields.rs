use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DomainError;

/// The recognized customer field set, in the order fields are stored and pushed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerField {
    CustomerName,
    Gender,
    Height,
    Weight,
    Neck,
    ShoulderWidth,
    SleeveLength,
    BicepCircumference,
    WristCircumference,
    ChestBustCircumference,
    WaistCircumference,
    LowerWaist,
    HipsSeat,
}

impl CustomerField {
    pub const ALL: [CustomerField; 13] = [
        Self::CustomerName,
        Self::Gender,
        Self::Height,
        Self::Weight,
        Self::Neck,
        Self::ShoulderWidth,
        Self::SleeveLength,
        Self::BicepCircumference,
        Self::WristCircumference,
        Self::ChestBustCircumference,
        Self::WaistCircumference,
        Self::LowerWaist,
        Self::HipsSeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerName => "customer_name",
            Self::Gender => "gender",
            Self::Height => "height",
            Self::Weight => "weight",
            Self::Neck => "neck",
            Self::ShoulderWidth => "shoulder_width",
            Self::SleeveLength => "sleeve_length",
            Self::BicepCircumference => "bicep_circumference",
            Self::WristCircumference => "wrist_circumference",
            Self::ChestBustCircumference => "chest_bust_circumference",
            Self::WaistCircumference => "waist_circumference",
            Self::LowerWaist => "lower_waist",
            Self::HipsSeat => "hips_seat",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == raw)
    }
}

impl fmt::Display for CustomerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields supplied by a single request.
///
/// A key that is absent was not supplied and must never be touched. A key mapped
/// to `None` was supplied without a usable value (JSON `null` or a blank string)
/// and is ignored when merging into an existing record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuppliedFields {
    values: BTreeMap<CustomerField, Option<String>>,
}

impl SuppliedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: CustomerField, value: impl Into<String>) -> Self {
        self.insert(field, Some(value.into()));
        self
    }

    pub fn insert(&mut self, field: CustomerField, value: Option<String>) {
        let normalized = value.and_then(|raw| {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });
        self.values.insert(field, normalized);
    }

    /// `None` when the field was not supplied, `Some(None)` when supplied as null.
    pub fn get(&self, field: CustomerField) -> Option<Option<&str>> {
        self.values.get(&field).map(|value| value.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (CustomerField, Option<&str>)> {
        self.values.iter().map(|(field, value)| (*field, value.as_deref()))
    }

    /// Supplied non-null values in field order.
    pub fn present_values(&self) -> Vec<(CustomerField, String)> {
        self.values
            .iter()
            .filter_map(|(field, value)| value.as_ref().map(|value| (*field, value.clone())))
            .collect()
    }

    /// Later values win; unrecognized keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut supplied = Self::new();
        for (key, value) in pairs {
            if let Some(field) = CustomerField::parse(key.as_ref()) {
                supplied.insert(field, Some(value.into()));
            }
        }
        supplied
    }

    pub fn from_json_object(object: &Map<String, Value>) -> Result<Self, DomainError> {
        let mut supplied = Self::new();
        for (key, value) in object {
            let Some(field) = CustomerField::parse(key) else {
                continue;
            };
            let text = match value {
                Value::Null => None,
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                Value::Bool(flag) => Some(flag.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(DomainError::InvalidFieldValue {
                        field,
                        reason: "expected a string, number, boolean or null".to_string(),
                    });
                }
            };
            supplied.insert(field, text);
        }
        Ok(supplied)
    }

    /// Overlays `other` on top of `self`; keys in `other` win.
    pub fn merge(&mut self, other: SuppliedFields) {
        self.values.extend(other.values);
    }
}
