//! Client-facing HTTP API.
//!
//! Three endpoints: `GET /health`, `GET /messages`, `POST /chat`. The axum
//! server runs on its own thread with a private tokio runtime and forwards
//! work into the consensus event loop over a channel; the loop answers
//! through a oneshot. Writes on a non-leader are answered with a 302 whose
//! `Location` points at the leader, or with no `Location` at all while an
//! election is in progress, which clients treat as "retry shortly".

use std::net::TcpListener;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::config::RedirectPolicy;
use crate::node::SubmitOutcome;

/// How long a handler waits for the event loop before giving up.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// A request forwarded into the consensus event loop.
pub enum ApiRequest {
    /// A `POST /chat` body, to be submitted to the leader logic.
    Submit {
        command: Value,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    /// A `GET /messages` read of the committed snapshot.
    Messages { reply: oneshot::Sender<Vec<Value>> },
}

struct Api {
    tx: mpsc::Sender<ApiRequest>,
    redirect: RedirectPolicy,
}

/// Serve the client API on an already-bound listener. Binding happens in
/// the caller so a taken port is a startup failure, not a background log
/// line.
pub fn start(listener: TcpListener, redirect: RedirectPolicy, tx: mpsc::Sender<ApiRequest>) {
    thread::spawn(move || match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(serve(listener, redirect, tx)),
        Err(e) => error!(error = %e, "client api: failed to start tokio runtime"),
    });
}

async fn serve(listener: TcpListener, redirect: RedirectPolicy, tx: mpsc::Sender<ApiRequest>) {
    let api = Arc::new(Api { tx, redirect });
    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/messages", get(handle_messages))
        .route("/chat", post(handle_chat))
        .with_state(api);

    let listener = match into_tokio_listener(listener) {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "client api: listener setup failed");
            return;
        }
    };

    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "client api listening");
    }

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "client api: server error");
    }
}

fn into_tokio_listener(listener: TcpListener) -> std::io::Result<tokio::net::TcpListener> {
    listener.set_nonblocking(true)?;
    tokio::net::TcpListener::from_std(listener)
}

async fn handle_health() -> &'static str {
    "OK"
}

async fn handle_messages(State(api): State<Arc<Api>>) -> Response {
    let (reply_tx, reply_rx) = oneshot::channel();
    if api.tx.send(ApiRequest::Messages { reply: reply_tx }).is_err() {
        return unavailable("server shutting down");
    }
    match tokio::time::timeout(REPLY_TIMEOUT, reply_rx).await {
        Ok(Ok(messages)) => Json(messages).into_response(),
        Ok(Err(_)) | Err(_) => unavailable("timeout"),
    }
}

async fn handle_chat(State(api): State<Arc<Api>>, body: Bytes) -> Response {
    // The payload is forwarded opaquely; all we require is that it is JSON.
    let command: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "error": "body is not valid JSON"})),
            )
                .into_response()
        }
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    let request = ApiRequest::Submit {
        command,
        reply: reply_tx,
    };
    if api.tx.send(request).is_err() {
        return unavailable("server shutting down");
    }
    match tokio::time::timeout(REPLY_TIMEOUT, reply_rx).await {
        Ok(Ok(outcome)) => submit_response(outcome, &api.redirect),
        Ok(Err(_)) | Err(_) => unavailable("timeout"),
    }
}

/// Map a submit outcome to the wire contract: 200 on the leader, 302 with
/// `Location` toward a known leader, bare 302 during an election window.
fn submit_response(outcome: SubmitOutcome, redirect: &RedirectPolicy) -> Response {
    match outcome {
        SubmitOutcome::Accepted { index } => {
            (StatusCode::OK, Json(json!({"status": "ok", "index": index}))).into_response()
        }
        SubmitOutcome::NotLeader { leader } => {
            let location = leader.and_then(|leader| redirect.chat_location(&leader));
            found(location)
        }
    }
}

fn found(location: Option<String>) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Some(url) = location {
        if let Ok(value) = HeaderValue::from_str(&url) {
            response.headers_mut().insert(header::LOCATION, value);
        }
    }
    response
}

fn unavailable(reason: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"status": "error", "error": reason})),
    )
        .into_response()
}
