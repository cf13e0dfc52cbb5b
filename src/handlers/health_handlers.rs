//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and disk I/O

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe: a lightweight `SELECT 1` against SQLite plus a
/// write/read/delete round-trip under the video directory. HTTP 200 when
/// both checks pass, HTTP 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite = check_sqlite(&state).await;
    let disk = check_disk(&state).await;
    let overall_ok = sqlite.ok && disk.ok;

    let mut checks = HashMap::new();
    checks.insert("sqlite", sqlite);
    checks.insert("disk", disk);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_sqlite(state: &AppState) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.videos.db)
        .await
    {
        Ok(1) => CheckStatus {
            ok: true,
            error: None,
        },
        Ok(v) => CheckStatus {
            ok: false,
            error: Some(format!("unexpected result: {}", v)),
        },
        Err(e) => CheckStatus {
            ok: false,
            error: Some(format!("error: {}", e)),
        },
    }
}

/// Best-effort write/read/delete under the served videos directory. Probe
/// files are dot-prefixed so they can never collide with a served name.
async fn check_disk(state: &AppState) -> CheckStatus {
    let tmp_path = state
        .videos
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));

    let outcome = async {
        fs::write(&tmp_path, b"readyz").await?;
        let bytes = fs::read(&tmp_path).await?;
        if bytes != b"readyz" {
            return Err(std::io::Error::other("file content mismatch"));
        }
        fs::remove_file(&tmp_path).await
    }
    .await;

    match outcome {
        Ok(()) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(e) => {
            let _ = fs::remove_file(&tmp_path).await; // best-effort cleanup
            CheckStatus {
                ok: false,
                error: Some(e.to_string()),
            }
        }
    }
}
