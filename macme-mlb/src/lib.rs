//! Fan-out of marathon-lb reload signals to every configured replica (§4.4).

use futures_util::future::join_all;
use macme_core::CoreResult;
use macme_http::{raise_for_status, HttpClient, RequestOptions};
use reqwest::{Method, StatusCode};

/// Holds one HTTP client per marathon-lb replica and broadcasts reload
/// signals to all of them, isolating per-replica failures.
pub struct MlbClient {
    replicas: Vec<HttpClient>,
}

impl MlbClient {
    pub fn new(replica_urls: &[String]) -> CoreResult<Self> {
        let replicas = replica_urls
            .iter()
            .map(|url| HttpClient::new(Some(url)))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self { replicas })
    }

    /// `POST /_mlb_signal/hup` to every replica, in parallel. Returns one
    /// result per replica, in the same order as the configured replica
    /// list; a failing replica does not stop the others.
    pub async fn mlb_signal_hup(&self) -> Vec<CoreResult<StatusCode>> {
        self.signal("hup").await
    }

    /// `POST /_mlb_signal/usr1` to every replica, in parallel.
    pub async fn mlb_signal_usr1(&self) -> Vec<CoreResult<StatusCode>> {
        self.signal("usr1").await
    }

    async fn signal(&self, name: &str) -> Vec<CoreResult<StatusCode>> {
        let path = format!("/_mlb_signal/{name}");
        let futures = self.replicas.iter().map(|client| {
            let path = path.clone();
            async move {
                let response = client
                    .request(
                        Method::POST,
                        None,
                        RequestOptions::default()
                            .path(path)
                            .timeout(macme_http::DEFAULT_TIMEOUT),
                    )
                    .await?;
                let response = raise_for_status(response)?;
                Ok(response.status())
            }
        });
        join_all(futures).await
    }
}

/// True if at least one fan-out result succeeded: the reconciler's
/// "reload attempted" condition.
pub fn any_succeeded(results: &[CoreResult<StatusCode>]) -> bool {
    results.iter().any(Result::is_ok)
}

/// True if every fan-out result failed: the reconciler's sync-level
/// failure condition.
pub fn all_failed(results: &[CoreResult<StatusCode>]) -> bool {
    !results.is_empty() && results.iter().all(Result::is_err)
}
