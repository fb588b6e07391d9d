use async_trait::async_trait;
use fitsync_core::domain::customer::ExternalCustomerId;
use fitsync_core::domain::fields::CustomerField;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::{ShopifyClient, SyncError};

pub const MEASUREMENTS_NAMESPACE: &str = "measurements";
pub const METAFIELD_TYPE: &str = "single_line_text_field";

/// Outcome of pushing one batch of fields for a customer.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: Vec<CustomerField>,
    pub skipped: Vec<CustomerField>,
    pub failed: Vec<(CustomerField, SyncError)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Pushes locally accepted field values to the remote customer.
///
/// Implementations never fail the caller: every per-field problem is recorded in
/// the returned [`SyncReport`].
#[async_trait]
pub trait MetafieldSync: Send + Sync {
    async fn push(
        &self,
        customer_id: &ExternalCustomerId,
        fields: &[(CustomerField, String)],
    ) -> SyncReport;
}

pub fn metafield_payload(field: CustomerField, value: &str) -> Value {
    json!({
        "metafield": {
            "namespace": MEASUREMENTS_NAMESPACE,
            "key": field.as_str(),
            "value": value,
            "type": METAFIELD_TYPE,
        }
    })
}

pub struct ShopifyMetafieldSync {
    client: ShopifyClient,
}

impl ShopifyMetafieldSync {
    pub fn new(client: ShopifyClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetafieldSync for ShopifyMetafieldSync {
    async fn push(
        &self,
        customer_id: &ExternalCustomerId,
        fields: &[(CustomerField, String)],
    ) -> SyncReport {
        let mut report = SyncReport::default();

        // Admin API customer ids are numeric; anything else cannot address a remote customer.
        if !customer_id.as_str().chars().all(|ch| ch.is_ascii_digit()) {
            warn!(
                event_name = "shopify.metafield.invalid_customer",
                customer_id = %customer_id,
                "customer id is not numeric; skipping metafield sync"
            );
            for (field, _) in fields {
                report.failed.push((*field, SyncError::InvalidCustomerId(customer_id.to_string())));
            }
            return report;
        }

        let path = format!("customers/{customer_id}/metafields.json");
        for (field, value) in fields {
            match self.client.post_json(&path, &metafield_payload(*field, value)).await {
                Ok(_) => report.pushed.push(*field),
                Err(error) => {
                    warn!(
                        event_name = "shopify.metafield.failed",
                        customer_id = %customer_id,
                        field = field.as_str(),
                        error = %error,
                        "metafield push failed"
                    );
                    report.failed.push((*field, error));
                }
            }
        }

        info!(
            event_name = "shopify.metafield.pushed",
            customer_id = %customer_id,
            pushed = report.pushed.len(),
            failed = report.failed.len(),
            "metafield sync finished"
        );
        report
    }
}

/// Used when no store credentials are configured.
#[derive(Default)]
pub struct NoopMetafieldSync;

#[async_trait]
impl MetafieldSync for NoopMetafieldSync {
    async fn push(
        &self,
        customer_id: &ExternalCustomerId,
        fields: &[(CustomerField, String)],
    ) -> SyncReport {
        debug!(
            event_name = "shopify.metafield.skipped",
            customer_id = %customer_id,
            fields = fields.len(),
            "shopify sync disabled; metafields not pushed"
        );
        SyncReport {
            skipped: fields.iter().map(|(field, _)| *field).collect(),
            ..SyncReport::default()
        }
    }
}
