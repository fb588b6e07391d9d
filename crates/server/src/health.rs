use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use fitsync_db::migrations::MIGRATOR;
use fitsync_db::DbPool;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ready,
    Degraded,
}

/// Reachability of the customer store plus how far its schema has been migrated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreCheck {
    pub status: CheckStatus,
    pub migrations_applied: i64,
    pub migrations_expected: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_records: Option<i64>,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: CheckStatus,
    pub service: &'static str,
    pub customer_store: StoreCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Serves `/health` on its own port so probes never contend with customer traffic.
pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let customer_store = store_check(&state.db_pool).await;
    let status = customer_store.status;

    if status == CheckStatus::Degraded {
        warn!(
            event_name = "system.health.degraded",
            correlation_id = "health",
            detail = %customer_store.detail,
            "customer store is not ready"
        );
    }

    let report = HealthReport {
        status,
        service: "fitsync-server",
        customer_store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = match status {
        CheckStatus::Ready => StatusCode::OK,
        CheckStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(report))
}

/// Ready only when every embedded migration has been applied and the `customer`
/// table answers a count.
async fn store_check(pool: &DbPool) -> StoreCheck {
    let expected = MIGRATOR
        .iter()
        .filter(|migration| migration.migration_type.is_up_migration())
        .count() as i64;

    let mut check = StoreCheck {
        status: CheckStatus::Degraded,
        migrations_applied: 0,
        migrations_expected: expected,
        customer_records: None,
        detail: String::new(),
    };

    check.migrations_applied = match applied_migrations(pool).await {
        Ok(applied) => applied,
        Err(error) => {
            check.detail = format!("database query failed: {error}");
            return check;
        }
    };
    if check.migrations_applied < expected {
        check.detail =
            format!("schema behind: {} of {expected} migrations applied", check.migrations_applied);
        return check;
    }

    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM customer").fetch_one(pool).await {
        Ok(count) => {
            check.status = CheckStatus::Ready;
            check.customer_records = Some(count);
            check.detail = format!("schema current; {count} customer records");
        }
        Err(error) => check.detail = format!("customer table unreadable: {error}"),
    }
    check
}

async fn applied_migrations(pool: &DbPool) -> Result<i64, sqlx::Error> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if tracked == 0 {
        return Ok(0);
    }

    sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use fitsync_db::{connect_with_settings, migrations, DbPool};
    use tower::ServiceExt;

    use crate::health::{health, router, CheckStatus, HealthState};

    async fn pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect")
    }

    #[tokio::test]
    async fn health_is_ready_once_schema_is_migrated() {
        let pool = pool().await;
        migrations::run_pending(&pool).await.expect("migrate");
        sqlx::query(
            "INSERT INTO customer (customer_id, created_at, updated_at) VALUES ('A1', '', '')",
        )
        .execute(&pool)
        .await
        .expect("seed customer");

        let (status, Json(report)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, CheckStatus::Ready);
        let store = &report.customer_store;
        assert_eq!(store.migrations_applied, store.migrations_expected);
        assert_eq!(report.customer_store.customer_records, Some(1));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_is_degraded_when_migrations_have_not_run() {
        let pool = pool().await;

        let (status, Json(report)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, CheckStatus::Degraded);
        assert_eq!(report.customer_store.migrations_applied, 0);
        assert!(report.customer_store.migrations_expected >= 1);
        assert_eq!(report.customer_store.customer_records, None);
        assert!(report.customer_store.detail.starts_with("schema behind"));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_is_degraded_after_pool_is_closed() {
        let pool = pool().await;
        pool.close().await;

        let (status, Json(report)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, CheckStatus::Degraded);
        assert!(report.customer_store.detail.starts_with("database query failed"));
    }

    #[tokio::test]
    async fn health_route_serializes_lowercase_status() {
        let pool = pool().await;
        migrations::run_pending(&pool).await.expect("migrate");

        let response = router(pool.clone())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["status"], "ready");
        assert_eq!(body["customer_store"]["customer_records"], 0);

        pool.close().await;
    }
}
