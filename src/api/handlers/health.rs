//! Liveness probe: database reachability plus build identity.

use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{Instrument, debug, error, info_span};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

impl Health {
    fn new(database_ok: bool) -> Self {
        Self {
            commit: GIT_COMMIT_HASH.to_string(),
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: if database_ok { "ok" } else { "error" }.to_string(),
        }
    }

    /// `name:version:short_commit`, empty commit when unknown.
    fn x_app(&self) -> String {
        let short_hash = if self.commit.len() > 7 {
            self.commit.get(..7).unwrap_or("")
        } else {
            ""
        };
        format!("{}:{}:{}", self.name, self.version, short_hash)
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database is reachable", body = Health),
        (status = 503, description = "Database is unreachable", body = Health)
    ),
    tag = "health"
)]
pub async fn health(method: Method, pool: Extension<PgPool>) -> Response {
    let database_ok = ping_database(&pool).await;
    let health = Health::new(database_ok);

    let mut headers = HeaderMap::new();
    match health.x_app().parse::<HeaderValue>() {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => error!("Failed to parse X-App header: {err}"),
    }

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    // OPTIONS probes only need the status and headers.
    if method == Method::GET {
        (status, headers, Json(health)).into_response()
    } else {
        (status, headers, Body::empty()).into_response()
    }
}

async fn ping_database(pool: &PgPool) -> bool {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let mut conn = match pool.acquire().instrument(acquire_span).await {
        Ok(conn) => conn,
        Err(err) => {
            error!("Failed to acquire database connection: {err}");
            return false;
        }
    };

    let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
    match conn.ping().instrument(ping_span).await {
        Ok(()) => {
            debug!("Database connection is healthy");
            true
        }
        Err(err) => {
            error!("Failed to ping database: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_app_includes_short_commit() {
        let mut health = Health::new(true);
        health.commit = "0123456789abcdef".to_string();
        assert_eq!(
            health.x_app(),
            format!("{}:{}:0123456", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        );

        health.commit = "unknown".to_string();
        assert!(health.x_app().ends_with(':'));
    }

    #[test]
    fn database_status_is_reported() {
        assert_eq!(Health::new(true).database, "ok");
        assert_eq!(Health::new(false).database, "error");
    }
}
