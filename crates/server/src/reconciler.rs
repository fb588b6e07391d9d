use std::sync::Arc;

use fitsync_core::{
    apply_changes, initial_profile, plan_changes, ApplicationError, CustomerField, CustomerRecord,
    ExternalCustomerId, SuppliedFields,
};
use fitsync_db::repositories::{CustomerRepository, RepositoryError};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub record: CustomerRecord,
    pub created: bool,
    pub changed: Vec<CustomerField>,
}

/// Upserts customer records keyed by external id.
///
/// Creation races are resolved by the unique index: a losing insert re-reads the
/// winner's row and continues as an update, at most once.
pub struct CustomerReconciler {
    customers: Arc<dyn CustomerRepository>,
}

impl CustomerReconciler {
    pub fn new(customers: Arc<dyn CustomerRepository>) -> Self {
        Self { customers }
    }

    pub async fn reconcile(
        &self,
        raw_id: &str,
        supplied: &SuppliedFields,
        correlation_id: &str,
    ) -> Result<ReconcileOutcome, ApplicationError> {
        let customer_id = ExternalCustomerId::parse(raw_id)?;

        let existing =
            self.customers.find_by_external_id(&customer_id).await.map_err(persistence)?;
        let existing = match existing {
            Some(record) => record,
            None => match self.create(&customer_id, supplied, correlation_id).await? {
                Created::Inserted(outcome) => return Ok(outcome),
                Created::LostRace(record) => record,
            },
        };

        self.update(existing, supplied, correlation_id).await
    }

    /// Removes the record; an unknown id is not an error.
    pub async fn remove(
        &self,
        raw_id: &str,
        correlation_id: &str,
    ) -> Result<bool, ApplicationError> {
        let customer_id = ExternalCustomerId::parse(raw_id)?;
        let deleted = self.customers.delete(&customer_id).await.map_err(persistence)?;

        info!(
            event_name = "customer.reconcile.deleted",
            correlation_id,
            customer_id = %customer_id,
            deleted,
            "customer record removed"
        );
        Ok(deleted)
    }

    async fn create(
        &self,
        customer_id: &ExternalCustomerId,
        supplied: &SuppliedFields,
        correlation_id: &str,
    ) -> Result<Created, ApplicationError> {
        let profile = initial_profile(supplied)?;
        let changed: Vec<CustomerField> = CustomerField::ALL
            .into_iter()
            .filter(|field| profile.value(*field).is_some())
            .collect();

        match self.customers.insert(customer_id, &profile).await {
            Ok(record) => {
                info!(
                    event_name = "customer.reconcile.created",
                    correlation_id,
                    customer_id = %customer_id,
                    fields = changed.len(),
                    "customer record created"
                );
                Ok(Created::Inserted(ReconcileOutcome { record, created: true, changed }))
            }
            Err(RepositoryError::Conflict(_)) => {
                warn!(
                    event_name = "customer.reconcile.conflict",
                    correlation_id,
                    customer_id = %customer_id,
                    "customer already exists; retrying as update"
                );
                let record = self
                    .customers
                    .find_by_external_id(customer_id)
                    .await
                    .map_err(persistence)?
                    .ok_or_else(|| {
                        ApplicationError::Persistence(format!(
                            "customer `{customer_id}` conflicted on insert but could not be re-read"
                        ))
                    })?;
                Ok(Created::LostRace(record))
            }
            Err(error) => Err(persistence(error)),
        }
    }

    async fn update(
        &self,
        existing: CustomerRecord,
        supplied: &SuppliedFields,
        correlation_id: &str,
    ) -> Result<ReconcileOutcome, ApplicationError> {
        let changes = plan_changes(&existing.profile, supplied)?;
        if changes.is_empty() {
            info!(
                event_name = "customer.reconcile.unchanged",
                correlation_id,
                customer_id = %existing.customer_id,
                "customer record already up to date"
            );
            return Ok(ReconcileOutcome { record: existing, created: false, changed: Vec::new() });
        }

        let mut profile = existing.profile.clone();
        apply_changes(&mut profile, &changes)?;
        let record =
            self.customers.update(&existing.customer_id, &profile).await.map_err(persistence)?;
        let changed: Vec<CustomerField> = changes.iter().map(|change| change.field).collect();

        info!(
            event_name = "customer.reconcile.updated",
            correlation_id,
            customer_id = %record.customer_id,
            fields = changed.len(),
            "customer record updated"
        );
        Ok(ReconcileOutcome { record, created: false, changed })
    }
}

enum Created {
    Inserted(ReconcileOutcome),
    LostRace(CustomerRecord),
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
