//! Customer API and storefront webhook routes.
//!
//! - `GET  /`                          all records ordered by id
//! - `GET  /{customer_id}`             one record, or `null`
//! - `POST /{customer_id}`             partial upsert from query + JSON/form body
//! - `POST /webhook/customer/create`   signed storefront create notification
//! - `POST /webhook/customer/destroy`  signed storefront delete notification

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use fitsync_core::{
    config::CorsConfig, webhook::SIGNATURE_HEADER, ApplicationError, CustomerField,
    CustomerRecord, ExternalCustomerId, InterfaceError, SuppliedFields, WebhookVerifier,
};
use fitsync_db::repositories::CustomerRepository;
use fitsync_shopify::MetafieldSync;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::reconciler::CustomerReconciler;

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<CustomerReconciler>,
    pub customers: Arc<dyn CustomerRepository>,
    pub sync: Arc<dyn MetafieldSync>,
    pub verifier: Arc<WebhookVerifier>,
}

impl AppState {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        sync: Arc<dyn MetafieldSync>,
        verifier: WebhookVerifier,
    ) -> Self {
        Self {
            reconciler: Arc::new(CustomerReconciler::new(customers.clone())),
            customers,
            sync,
            verifier: Arc::new(verifier),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: &'static str,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(state: AppState, cors: &CorsConfig) -> Router {
    let router = Router::new()
        .route("/", get(list_customers).post(missing_identifier))
        .route("/favicon.ico", get(not_found))
        .route("/{customer_id}", get(show_customer).post(upsert_customer))
        .route("/webhook/customer/create", post(customer_created))
        .route("/webhook/customer/destroy", post(customer_destroyed))
        .with_state(state);

    match cors_layer(cors) {
        Some(layer) => router.layer(layer),
        None => router,
    }
}

fn cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    let origin = cors.allowed_origin()?;
    let origin = match HeaderValue::from_str(&origin) {
        Ok(value) => value,
        Err(error) => {
            warn!(
                event_name = "system.cors.invalid_origin",
                correlation_id = "bootstrap",
                origin = %origin,
                error = %error,
                "ignoring unusable CORS origin"
            );
            return None;
        }
    };

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::IF_MODIFIED_SINCE])
            .expose_headers([header::LOCATION, header::LINK]),
    )
}

fn reject(error: ApplicationError, correlation_id: &str) -> ApiError {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(
            event_name = "http.request.failed",
            correlation_id,
            error = %interface,
            "request failed"
        );
    } else {
        warn!(
            event_name = "http.request.rejected",
            correlation_id,
            status = status.as_u16(),
            error = %interface,
            "request rejected"
        );
    }

    (
        status,
        Json(ErrorBody {
            error: interface.message().to_string(),
            message: interface.user_message(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

async fn list_customers(
    State(state): State<AppState>,
) -> Result<Json<Vec<CustomerRecord>>, ApiError> {
    let correlation_id = new_correlation_id();
    state
        .customers
        .list()
        .await
        .map(Json)
        .map_err(|error| reject(ApplicationError::Persistence(error.to_string()), &correlation_id))
}

async fn show_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<Option<CustomerRecord>>, ApiError> {
    let correlation_id = new_correlation_id();
    let customer_id = ExternalCustomerId::parse(&customer_id)
        .map_err(|error| reject(error.into(), &correlation_id))?;

    state
        .customers
        .find_by_external_id(&customer_id)
        .await
        .map(Json)
        .map_err(|error| reject(ApplicationError::Persistence(error.to_string()), &correlation_id))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn missing_identifier() -> ApiError {
    let correlation_id = new_correlation_id();
    reject(fitsync_core::DomainError::MissingIdentifier.into(), &correlation_id)
}

async fn upsert_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    request: Request,
) -> Result<Json<CustomerRecord>, ApiError> {
    let correlation_id = new_correlation_id();
    let supplied =
        supplied_fields(request).await.map_err(|error| reject(error, &correlation_id))?;

    let outcome = state
        .reconciler
        .reconcile(&customer_id, &supplied, &correlation_id)
        .await
        .map_err(|error| reject(error, &correlation_id))?;
    info!(
        event_name = "customer.measurements.accepted",
        correlation_id = %correlation_id,
        customer_id = %outcome.record.customer_id,
        created = outcome.created,
        changed = outcome.changed.len(),
        "customer measurements accepted"
    );

    // Push the stored form of every supplied field, changed or not.
    let pushed: Vec<(CustomerField, String)> = supplied
        .present_values()
        .into_iter()
        .filter_map(|(field, _)| {
            outcome.record.profile.value(field).map(|value| (field, value.to_string()))
        })
        .collect();
    if !pushed.is_empty() {
        let report = state.sync.push(&outcome.record.customer_id, &pushed).await;
        if !report.is_clean() {
            warn!(
                event_name = "customer.sync.partial",
                correlation_id = %correlation_id,
                customer_id = %outcome.record.customer_id,
                failed = report.failed.len(),
                "some fields were not pushed to the storefront"
            );
        }
    }

    Ok(Json(outcome.record))
}

/// Query parameters merged with the request body; body values win.
async fn supplied_fields(request: Request) -> Result<SuppliedFields, ApplicationError> {
    let mut supplied = match Query::<Vec<(String, String)>>::try_from_uri(request.uri()) {
        Ok(Query(pairs)) => SuppliedFields::from_pairs(pairs),
        Err(rejection) => return Err(ApplicationError::MalformedRequest(rejection.body_text())),
    };

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let body = if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, &())
            .await
            .map_err(|rejection| ApplicationError::MalformedRequest(rejection.body_text()))?;
        SuppliedFields::from_pairs(pairs)
    } else {
        let bytes = Bytes::from_request(request, &())
            .await
            .map_err(|rejection| ApplicationError::MalformedRequest(rejection.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            SuppliedFields::new()
        } else {
            json_fields(&bytes)?
        }
    };

    supplied.merge(body);
    Ok(supplied)
}

fn json_fields(bytes: &[u8]) -> Result<SuppliedFields, ApplicationError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|error| {
        ApplicationError::MalformedRequest(format!("invalid JSON body: {error}"))
    })?;
    let object = value.as_object().ok_or_else(|| {
        ApplicationError::MalformedRequest("JSON body must be an object".to_string())
    })?;
    Ok(SuppliedFields::from_json_object(object)?)
}

fn verify_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    topic: &str,
    correlation_id: &str,
) -> Result<Value, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    if let Err(error) = state.verifier.verify(body, signature) {
        warn!(
            event_name = "webhook.customer.rejected",
            correlation_id,
            topic,
            reason = %error,
            "webhook signature verification failed"
        );
        return Err(reject(ApplicationError::Authentication(error.to_string()), correlation_id));
    }

    serde_json::from_slice(body).map_err(|error| {
        reject(
            ApplicationError::MalformedRequest(format!("invalid webhook payload: {error}")),
            correlation_id,
        )
    })
}

fn payload_customer_id(payload: &Value) -> Result<String, ApplicationError> {
    let id = match payload.get("id") {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(text)) => text.trim().to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        return Err(ApplicationError::MalformedRequest("webhook payload has no `id`".to_string()));
    }
    Ok(id)
}

fn payload_customer_name(payload: &Value) -> Option<String> {
    let name = ["first_name", "last_name"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!name.is_empty()).then_some(name)
}

async fn customer_created(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let correlation_id = new_correlation_id();
    let payload =
        verify_webhook(&state, &headers, &body, "customers/create", &correlation_id)?;
    let customer_id =
        payload_customer_id(&payload).map_err(|error| reject(error, &correlation_id))?;

    let mut supplied = SuppliedFields::new();
    if let Some(name) = payload_customer_name(&payload) {
        supplied = supplied.with(CustomerField::CustomerName, name);
    }

    let outcome = state
        .reconciler
        .reconcile(&customer_id, &supplied, &correlation_id)
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    info!(
        event_name = "webhook.customer.created",
        correlation_id = %correlation_id,
        customer_id = %outcome.record.customer_id,
        created = outcome.created,
        "customer create webhook processed"
    );
    Ok(Json(json!({
        "status": "ok",
        "customer_id": outcome.record.customer_id,
        "created": outcome.created,
    })))
}

async fn customer_destroyed(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let correlation_id = new_correlation_id();
    let payload =
        verify_webhook(&state, &headers, &body, "customers/delete", &correlation_id)?;
    let customer_id =
        payload_customer_id(&payload).map_err(|error| reject(error, &correlation_id))?;

    let deleted = state
        .reconciler
        .remove(&customer_id, &correlation_id)
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    Ok(Json(json!({ "status": "ok", "customer_id": customer_id, "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use fitsync_core::{
        config::CorsConfig, webhook::sign, CustomerField, ExternalCustomerId, WebhookVerifier,
    };
    use fitsync_db::repositories::{CustomerRepository, InMemoryCustomerRepository};
    use fitsync_shopify::{MetafieldSync, SyncError, SyncReport};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::{payload_customer_name, router, AppState};

    const SECRET: &str = "hush";

    #[derive(Default)]
    struct RecordingSync {
        pushes: Mutex<Vec<(String, Vec<(CustomerField, String)>)>>,
    }

    #[async_trait]
    impl MetafieldSync for RecordingSync {
        async fn push(
            &self,
            customer_id: &ExternalCustomerId,
            fields: &[(CustomerField, String)],
        ) -> SyncReport {
            self.pushes.lock().await.push((customer_id.to_string(), fields.to_vec()));
            SyncReport {
                pushed: fields.iter().map(|(field, _)| *field).collect(),
                ..SyncReport::default()
            }
        }
    }

    /// Storefront that rejects every field it is sent.
    struct FailingSync;

    #[async_trait]
    impl MetafieldSync for FailingSync {
        async fn push(
            &self,
            _customer_id: &ExternalCustomerId,
            fields: &[(CustomerField, String)],
        ) -> SyncReport {
            let failed = fields
                .iter()
                .map(|(field, _)| {
                    (*field, SyncError::Status { status: 500, body: "upstream down".to_string() })
                })
                .collect();
            SyncReport { failed, ..SyncReport::default() }
        }
    }

    struct Harness {
        app: Router,
        customers: Arc<InMemoryCustomerRepository>,
        sync: Arc<RecordingSync>,
    }

    fn harness() -> Harness {
        let customers = Arc::new(InMemoryCustomerRepository::default());
        let sync = Arc::new(RecordingSync::default());
        let state = AppState::new(
            customers.clone(),
            sync.clone(),
            WebhookVerifier::new(Some(SecretString::from(SECRET.to_string()))),
        );
        Harness { app: router(state, &CorsConfig::default()), customers, sync }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json")
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn signed_webhook(uri: &str, payload: &Value, secret: &str) -> Request<Body> {
        let body = payload.to_string();
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Shopify-Hmac-Sha256", sign(body.as_bytes(), secret.as_bytes()))
            .body(Body::from(body))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn measurement_updates_merge_into_existing_record() {
        let harness = harness();

        let (status, created) =
            send(&harness.app, post_json("/A1", json!({ "height": "180", "weight": "75" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["customer_id"], json!("A1"));

        let (status, updated) =
            send(&harness.app, post_json("/A1", json!({ "weight": "80" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["height"], json!("180"));
        assert_eq!(updated["weight"], json!("80"));
        assert_eq!(updated["id"], created["id"]);

        let pushes = harness.sync.pushes.lock().await;
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[1], ("A1".to_string(), vec![(CustomerField::Weight, "80".to_string())]));
    }

    #[tokio::test]
    async fn form_body_and_query_are_merged_with_body_winning() {
        let harness = harness();
        let request = Request::post("/B2?height=170&neck=15")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("height=172&gender=Female&unknown=ignored"))
            .expect("request");

        let (status, record) = send(&harness.app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["height"], json!("172"));
        assert_eq!(record["neck"], json!("15"));
        assert_eq!(record["gender"], json!("female"));
        assert!(record.get("unknown").is_none());
    }

    #[tokio::test]
    async fn invalid_gender_is_a_bad_request_and_nothing_is_stored() {
        let harness = harness();

        let (status, body) =
            send(&harness.app, post_json("/C3", json!({ "gender": "robot" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(harness.customers.list().await.expect("list").is_empty());
        assert!(harness.sync.pushes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn post_without_identifier_is_rejected() {
        let harness = harness();

        let (status, _) = send(&harness.app, post_json("/", json!({ "height": "1" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_returns_record_null_or_list() {
        let harness = harness();
        send(&harness.app, post_json("/Z9", json!({}))).await;
        send(&harness.app, post_json("/A1", json!({ "neck": "14" }))).await;

        let (status, record) = send(&harness.app, get("/A1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["neck"], json!("14"));

        let (status, missing) = send(&harness.app, get("/nobody")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(missing, Value::Null);

        let (status, all) = send(&harness.app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = all
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|record| record["customer_id"].as_str())
            .collect();
        assert_eq!(ids, vec!["Z9", "A1"]);

        let (status, _) = send(&harness.app, get("/favicon.ico")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signed_create_webhook_creates_named_record_without_sync() {
        let harness = harness();
        let payload = json!({ "id": 207119551, "first_name": "Bob", "last_name": " Norman " });

        let (status, body) =
            send(&harness.app, signed_webhook("/webhook/customer/create", &payload, SECRET)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        let stored = harness
            .customers
            .find_by_external_id(&ExternalCustomerId("207119551".to_string()))
            .await
            .expect("find")
            .expect("record");
        assert_eq!(stored.profile.customer_name.as_deref(), Some("Bob Norman"));
        assert!(harness.sync.pushes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn create_webhook_with_bad_signature_creates_nothing() {
        let harness = harness();
        let payload = json!({ "id": 1, "first_name": "Eve" });

        let (status, _) =
            send(&harness.app, signed_webhook("/webhook/customer/create", &payload, "wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let unsigned = post_json("/webhook/customer/create", payload);
        let (status, _) = send(&harness.app, unsigned).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert!(harness.customers.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn destroy_webhook_deletes_and_tolerates_unknown_ids() {
        let harness = harness();
        send(&harness.app, post_json("/42", json!({ "height": "150" }))).await;

        let (status, body) = send(
            &harness.app,
            signed_webhook("/webhook/customer/destroy", &json!({ "id": 42 }), SECRET),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], json!(true));
        assert!(harness.customers.list().await.expect("list").is_empty());

        let (status, body) = send(
            &harness.app,
            signed_webhook("/webhook/customer/destroy", &json!({ "id": "404" }), SECRET),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], json!(false));
    }

    #[tokio::test]
    async fn destroy_webhook_with_bad_or_missing_signature_keeps_the_record() {
        let harness = harness();
        send(&harness.app, post_json("/42", json!({ "height": "150" }))).await;
        let payload = json!({ "id": 42 });

        let (status, _) = send(
            &harness.app,
            signed_webhook("/webhook/customer/destroy", &payload, "wrong"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            send(&harness.app, post_json("/webhook/customer/destroy", payload)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let remaining = harness.customers.list().await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].customer_id.as_str(), "42");
        assert_eq!(remaining[0].profile.value(CustomerField::Height), Some("150"));
    }

    #[tokio::test]
    async fn failed_storefront_push_still_commits_the_record() {
        let customers = Arc::new(InMemoryCustomerRepository::default());
        let state = AppState::new(
            customers.clone(),
            Arc::new(FailingSync),
            WebhookVerifier::new(Some(SecretString::from(SECRET.to_string()))),
        );
        let app = router(state, &CorsConfig::default());

        let (status, body) =
            send(&app, post_json("/77", json!({ "height": "170", "neck": "38" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["height"], json!("170"));
        let stored = customers
            .find_by_external_id(&ExternalCustomerId::parse("77").expect("id"))
            .await
            .expect("find")
            .expect("record committed");
        assert_eq!(stored.profile.value(CustomerField::Neck), Some("38"));
    }

    #[tokio::test]
    async fn signed_webhook_without_id_is_a_bad_request() {
        let harness = harness();

        let (status, _) = send(
            &harness.app,
            signed_webhook("/webhook/customer/create", &json!({ "first_name": "Ann" }), SECRET),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cors_preflight_allows_configured_domain() {
        let state = AppState::new(
            Arc::new(InMemoryCustomerRepository::default()),
            Arc::new(RecordingSync::default()),
            WebhookVerifier::new(Some(SecretString::from(SECRET.to_string()))),
        );
        let cors = CorsConfig { allowed_domain: Some("shop.example.com".to_string()) };
        let app = router(state, &cors);

        let request = Request::options("/A1")
            .header(header::ORIGIN, "https://shop.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");

        let allowed = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok());
        assert_eq!(allowed, Some("https://shop.example.com"));
    }

    #[test]
    fn webhook_name_skips_blank_parts() {
        let name = payload_customer_name(&json!({ "first_name": "", "last_name": "Lee" }));
        assert_eq!(name.as_deref(), Some("Lee"));
        assert_eq!(payload_customer_name(&json!({ "first_name": null })), None);
    }
}
