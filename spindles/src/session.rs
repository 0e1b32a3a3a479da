// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

// Current-session store and its HTTP endpoints.
//
// Holds at most one session: the worker that owns the traffic currently
// flowing through the proxy. The run orchestrator sets and clears it via
// POST/DELETE /sirk/session; taps read immutable snapshots.

use std::sync::{Arc, PoisonError, RwLock};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};

use crate::activity::Session;
use crate::stream::SessionSource;

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Single-slot holder for the current session.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current session, if any. Later `set`/`clear` calls do
    /// not affect a snapshot already taken.
    pub fn snapshot(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, session: Session) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SessionSource for SessionStore {
    fn current_session(&self) -> Option<Session> {
        self.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /sirk/session
///
/// A body that is empty or not JSON is treated as `{}` and fails validation.
pub async fn set_session(State(store): State<Arc<SessionStore>>, body: Bytes) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));

    let (Some(run_name), Some(project)) = (
        body.get("runName").and_then(Value::as_str),
        body.get("project").and_then(Value::as_str),
    ) else {
        return bad_request("runName and project are required strings");
    };

    let (Some(instance_number), Some(total_instances)) = (
        count_field(&body, "instanceNumber"),
        count_field(&body, "totalInstances"),
    ) else {
        return bad_request("instanceNumber and totalInstances are required numbers");
    };

    let session = Session {
        run_name: run_name.to_string(),
        instance_number,
        total_instances,
        project: project.to_string(),
    };

    tracing::info!(
        project = %session.project,
        run_name = %session.run_name,
        instance = session.instance_number,
        total = session.total_instances,
        "session set"
    );
    store.set(session.clone());
    (StatusCode::CREATED, Json(session)).into_response()
}

/// GET /sirk/session
pub async fn get_session(State(store): State<Arc<SessionStore>>) -> Response {
    match store.snapshot() {
        Some(session) => Json(session).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "No active session"})),
        )
            .into_response(),
    }
}

/// DELETE /sirk/session
pub async fn clear_session(State(store): State<Arc<SessionStore>>) -> StatusCode {
    store.clear();
    tracing::info!("session cleared");
    StatusCode::NO_CONTENT
}

/// Routes for the session endpoints, bound to `store`.
pub fn session_router(store: Arc<SessionStore>) -> Router {
    Router::new()
        .route(
            "/sirk/session",
            get(get_session).post(set_session).delete(clear_session),
        )
        .with_state(store)
}

fn count_field(body: &Value, name: &str) -> Option<u32> {
    body.get(name)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt; // for oneshot

    fn session() -> Session {
        Session {
            run_name: "run-a".to_string(),
            instance_number: 1,
            total_instances: 2,
            project: "proj".to_string(),
        }
    }

    fn request(method: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/sirk/session")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let store = SessionStore::new();
        assert_eq!(store.snapshot(), None);

        store.set(session());
        let snap = store.snapshot();
        store.clear();

        assert_eq!(snap, Some(session()));
        assert_eq!(store.snapshot(), None);
    }

    #[tokio::test]
    async fn post_then_get_round_trips() {
        let store = Arc::new(SessionStore::new());
        let app = session_router(store.clone());

        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                r#"{"runName":"run-a","instanceNumber":1,"totalInstances":2,"project":"proj"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(
            json_body(resp).await,
            json!({"runName":"run-a","instanceNumber":1,"totalInstances":2,"project":"proj"})
        );
        assert_eq!(store.snapshot(), Some(session()));

        let resp = app.oneshot(request("GET", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["runName"], "run-a");
    }

    #[tokio::test]
    async fn get_without_session_is_404() {
        let app = session_router(Arc::new(SessionStore::new()));
        let resp = app.oneshot(request("GET", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["error"], "No active session");
    }

    #[tokio::test]
    async fn missing_strings_rejected() {
        let app = session_router(Arc::new(SessionStore::new()));
        let resp = app
            .oneshot(request(
                "POST",
                r#"{"runName":7,"instanceNumber":1,"totalInstances":2,"project":"proj"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await["error"],
            "runName and project are required strings"
        );
    }

    #[tokio::test]
    async fn missing_numbers_rejected() {
        let app = session_router(Arc::new(SessionStore::new()));
        let resp = app
            .oneshot(request(
                "POST",
                r#"{"runName":"r","instanceNumber":"1","totalInstances":2,"project":"p"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await["error"],
            "instanceNumber and totalInstances are required numbers"
        );
    }

    #[tokio::test]
    async fn non_json_body_treated_as_empty_object() {
        let store = Arc::new(SessionStore::new());
        let app = session_router(store.clone());
        let resp = app.oneshot(request("POST", "not json {{")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.snapshot(), None);
    }

    #[tokio::test]
    async fn delete_clears_session() {
        let store = Arc::new(SessionStore::new());
        store.set(session());
        let app = session_router(store.clone());

        let resp = app.oneshot(request("DELETE", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(store.snapshot(), None);
    }
}
