//! HTTP-01 challenge responder (§4.6).
//!
//! Serves `GET /.well-known/acme-challenge/<token>` from a map the ACME
//! client populates immediately before answering a challenge and clears
//! once it completes. The listening socket is this crate's job; picking
//! when to populate/clear the map belongs to the ACME client.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use macme_core::CoreError;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

const CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// The `token → key_authorization` map, shared between the ACME client
/// (which writes it) and the HTTP server (which reads it).
#[derive(Clone, Default)]
pub struct ChallengeStore {
    tokens: Arc<RwLock<HashMap<String, String>>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_challenge(&self, token: impl Into<String>, key_authorization: impl Into<String>) {
        self.tokens
            .write()
            .await
            .insert(token.into(), key_authorization.into());
    }

    pub async fn clear_challenge(&self, token: &str) {
        self.tokens.write().await.remove(token);
    }

    pub async fn get(&self, token: &str) -> Option<String> {
        self.tokens.read().await.get(token).cloned()
    }
}

/// Binds `addr` and serves challenge responses until the process exits or
/// the listener errors. Intended to be driven from its own `tokio::spawn`.
pub async fn serve(addr: SocketAddr, store: ChallengeStore) -> Result<(), CoreError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| CoreError::Transient(format!("failed to bind challenge responder: {e}")))?;

    tracing::info!(%addr, "challenge responder listening");

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("challenge responder accept error: {e}");
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let store = store.clone();

        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(move |req| handle(req, store.clone())))
                .await
            {
                tracing::warn!("challenge responder connection error: {err:?}");
            }
        });
    }
}

async fn handle(
    req: Request<hyper::body::Incoming>,
    store: ChallengeStore,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::GET {
        return Ok(not_found());
    }

    let Some(token) = req.uri().path().strip_prefix(CHALLENGE_PREFIX) else {
        return Ok(not_found());
    };

    match store.get(token).await {
        Some(key_authorization) => Ok(Response::builder()
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body(Full::new(Bytes::from(key_authorization)))
            .expect("static response is well-formed")),
        None => Ok(not_found()),
    }
}

fn not_found() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::new(Bytes::new()))
        .expect("static response is well-formed")
}
