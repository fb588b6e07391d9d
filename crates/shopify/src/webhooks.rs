use serde_json::json;
use tracing::{info, warn};

use crate::client::{ShopifyClient, SyncError};

/// Topics this service consumes and the routes that receive them.
pub const CUSTOMER_WEBHOOKS: [(&str, &str); 2] = [
    ("customers/create", "/webhook/customer/create"),
    ("customers/delete", "/webhook/customer/destroy"),
];

#[derive(Debug, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub topic: &'static str,
    pub address: String,
    pub outcome: Result<(), SyncError>,
}

/// Subscribes the customer topics to `{public_base_url}{route}`.
///
/// A 422 from the Admin API means the subscription already exists and counts as
/// success. Other failures are logged and returned; startup continues either way.
pub async fn register_customer_webhooks(
    client: &ShopifyClient,
    public_base_url: &str,
) -> Vec<WebhookRegistration> {
    let base = public_base_url.trim_end_matches('/');
    let mut registrations = Vec::with_capacity(CUSTOMER_WEBHOOKS.len());

    for (topic, route) in CUSTOMER_WEBHOOKS {
        let address = format!("{base}{route}");
        let body = json!({ "webhook": { "topic": topic, "address": address, "format": "json" } });

        let outcome = match client.post_json("webhooks.json", &body).await {
            Ok(_) => Ok(()),
            Err(SyncError::Status { status: 422, .. }) => Ok(()),
            Err(error) => Err(error),
        };

        match &outcome {
            Ok(()) => info!(
                event_name = "shopify.webhook.registered",
                correlation_id = "bootstrap",
                topic,
                address = %address,
                "shopify webhook subscription in place"
            ),
            Err(error) => warn!(
                event_name = "shopify.webhook.registration_failed",
                correlation_id = "bootstrap",
                topic,
                address = %address,
                error = %error,
                "shopify webhook subscription failed"
            ),
        }

        registrations.push(WebhookRegistration { topic, address, outcome });
    }

    registrations
}
