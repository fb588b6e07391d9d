use async_trait::async_trait;
use thiserror::Error;

use fitsync_core::domain::customer::{CustomerProfile, CustomerRecord, ExternalCustomerId};

pub mod customer;
pub mod memory;

pub use customer::SqlCustomerRepository;
pub use memory::InMemoryCustomerRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("customer `{0}` already exists")]
    Conflict(String),
    #[error("customer `{0}` not found")]
    NotFound(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Persistence for customer records keyed by their external identifier.
///
/// `insert` must report a duplicate external identifier as
/// [`RepositoryError::Conflict`] so callers can fall back to an update.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_external_id(
        &self,
        id: &ExternalCustomerId,
    ) -> Result<Option<CustomerRecord>, RepositoryError>;

    async fn list(&self) -> Result<Vec<CustomerRecord>, RepositoryError>;

    async fn insert(
        &self,
        id: &ExternalCustomerId,
        profile: &CustomerProfile,
    ) -> Result<CustomerRecord, RepositoryError>;

    async fn update(
        &self,
        id: &ExternalCustomerId,
        profile: &CustomerProfile,
    ) -> Result<CustomerRecord, RepositoryError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &ExternalCustomerId) -> Result<bool, RepositoryError>;
}
