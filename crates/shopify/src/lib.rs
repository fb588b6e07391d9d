//! Shopify Admin API integration
//!
//! This crate keeps the storefront's view of a customer in step with the local
//! measurement record:
//! - **Client** (`client`) - authenticated Admin REST calls with bounded retry
//! - **Metafields** (`metafields`) - pushes supplied fields as `measurements.*`
//!   customer metafields
//! - **Webhooks** (`webhooks`) - registers the `customers/create` and
//!   `customers/delete` topics against this service
//!
//! # Configuration
//!
//! Set `FITSYNC_SHOPIFY_STORE` plus either `FITSYNC_SHOPIFY_API_KEY` /
//! `FITSYNC_SHOPIFY_PASSWORD` (private app) or `FITSYNC_SHOPIFY_ACCESS_TOKEN`.
//! Without credentials the server runs with `NoopMetafieldSync`.
//!
//! # Key Types
//!
//! - `ShopifyClient` - HTTP client bound to one store
//! - `MetafieldSync` - trait the HTTP layer pushes through
//! - `SyncReport` - per-field outcome of a push

pub mod client;
pub mod metafields;
pub mod webhooks;

pub use client::{RetryPolicy, ShopifyClient, SyncError};
pub use metafields::{MetafieldSync, NoopMetafieldSync, ShopifyMetafieldSync, SyncReport};
pub use webhooks::{register_customer_webhooks, WebhookRegistration};
