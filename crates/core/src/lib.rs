pub mod config;
pub mod domain;
pub mod errors;
pub mod reconcile;
pub mod webhook;

pub use domain::customer::{CustomerProfile, CustomerRecord, ExternalCustomerId, Gender};
pub use domain::fields::{CustomerField, SuppliedFields};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use reconcile::{apply_changes, initial_profile, plan_changes, FieldChange};
pub use webhook::{WebhookError, WebhookVerifier};
