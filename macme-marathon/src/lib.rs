//! Typed wrapper over the slice of the Marathon REST API this project
//! needs: listing apps and subscribing to the event bus (§4.3).

mod app;
mod events;

pub use app::{parse_domains, AppView, PortDefinition};
pub use events::MarathonEvent;

use futures_util::stream::{Stream, StreamExt};
use macme_core::{CoreError, CoreResult};
use macme_http::{raise_for_status, HttpClient, RequestOptions};
use reqwest::Method;
use std::collections::HashMap;
use url::Url;

use app::AppsResponse;
use events::decode_events;

/// A Marathon client bound to one base URL (e.g. `http://marathon:8080`).
pub struct MarathonClient {
    http: HttpClient,
    base: Url,
}

impl MarathonClient {
    pub fn new(url: &str) -> CoreResult<Self> {
        let base = Url::parse(url).map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(Self {
            http: HttpClient::new(Some(url))?,
            base,
        })
    }

    /// `GET /v2/apps?embed=app.tasks`.
    pub async fn get_apps(&self) -> CoreResult<Vec<AppView>> {
        let mut params = HashMap::new();
        params.insert("embed".to_string(), "app.tasks".to_string());

        let response = self
            .http
            .request(
                Method::GET,
                None,
                RequestOptions::default()
                    .path("/v2/apps")
                    .params(params)
                    .timeout(macme_http::DEFAULT_TIMEOUT),
            )
            .await?;
        let response = raise_for_status(response)?;
        let body: AppsResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(body.apps)
    }

    /// `GET /v2/events?event_type=<t>` for each `t` in `types`, piped
    /// through the SSE decoder. The returned stream ends on any transport
    /// error or line-length violation; it is the caller's job to
    /// reconnect.
    pub async fn get_events(
        &self,
        types: &[&str],
    ) -> CoreResult<impl Stream<Item = CoreResult<MarathonEvent>>> {
        // Marathon accepts event_type repeated once per type; HttpClient's
        // params override merges by key, so a repeated-key query is built
        // directly here and passed through as an absolute target instead.
        let mut url = self.base.clone();
        url.set_path("/v2/events");
        {
            let mut query = url.query_pairs_mut();
            for t in types {
                query.append_pair("event_type", t);
            }
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("text/event-stream"),
        );
        let mut opts = RequestOptions::default();
        opts.headers = Some(headers);

        let response = self
            .http
            .request(Method::GET, Some(url.as_str()), opts)
            .await?;
        let response = raise_for_status(response)?;
        let bytes = response.bytes_stream().boxed();
        Ok(decode_events(bytes, types))
    }
}
