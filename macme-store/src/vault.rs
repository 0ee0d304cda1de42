//! HashiCorp Vault KV v2 certificate store backend (§4.5).

use std::collections::HashMap;

use async_trait::async_trait;
use macme_core::{CoreError, CoreResult, EnvSource};
use macme_http::{get_single_header, HttpClient, RequestOptions};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult, VaultError};
use crate::CertificateStore;

const DEFAULT_MOUNT_PATH: &str = "secret";

/// A Vault client that can read and write KV v2 paths, with the
/// check-and-set bookkeeping the certificate store needs.
pub struct VaultStore {
    http: HttpClient,
    token: String,
    mount_path: String,
    /// The Vault version last observed for each domain, used as the CAS
    /// value on the next write. Absent until the domain has been read.
    cas_versions: RwLock<HashMap<String, u64>>,
}

impl VaultStore {
    pub fn new(url: &str, token: impl Into<String>) -> CoreResult<Self> {
        Self::with_mount_path(url, token, DEFAULT_MOUNT_PATH)
    }

    pub fn with_mount_path(
        url: &str,
        token: impl Into<String>,
        mount_path: impl Into<String>,
    ) -> CoreResult<Self> {
        Ok(Self {
            http: HttpClient::new(Some(url))?,
            token: token.into(),
            mount_path: mount_path.into(),
            cas_versions: RwLock::new(HashMap::new()),
        })
    }

    /// Builds a client from the standard Vault environment variables.
    /// Supports `VAULT_ADDR` and `VAULT_TOKEN`; the TLS-related variables
    /// (`VAULT_CACERT`, `VAULT_CLIENT_CERT`, `VAULT_CLIENT_KEY`,
    /// `VAULT_TLS_SERVER_NAME`) are recognised names but not currently
    /// wired up to the underlying HTTP client.
    pub fn from_env(env: &dyn EnvSource) -> CoreResult<Self> {
        let address = env
            .get("VAULT_ADDR")
            .unwrap_or_else(|| "https://127.0.0.1:8200".to_string());
        // Matches the Vault CLI's own default.
        let token = env.get("VAULT_TOKEN").unwrap_or_else(|| "TEST".to_string());
        Self::new(&address, token)
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Vault-Token",
            HeaderValue::from_str(&self.token).expect("vault token is a valid header value"),
        );
        headers
    }

    /// `GET /v1/<path>`. A 404 with an empty `errors` array is `Ok(None)`.
    pub async fn read(&self, path: &str, version: Option<u64>) -> StoreResult<Option<Value>> {
        let mut params = HashMap::new();
        if let Some(v) = version {
            params.insert("version".to_string(), v.to_string());
        }
        let mut opts = RequestOptions::default()
            .path(format!("/v1/{path}"))
            .params(params)
            .timeout(macme_http::DEFAULT_TIMEOUT);
        opts.headers = Some(self.auth_headers());

        let response = self.http.request(Method::GET, None, opts).await?;
        self.handle_response(response, false).await
    }

    /// `PUT /v1/<path>` with a JSON body.
    pub async fn write(&self, path: &str, data: Value) -> StoreResult<Option<Value>> {
        let mut opts = RequestOptions::default()
            .path(format!("/v1/{path}"))
            .json(data)
            .timeout(macme_http::DEFAULT_TIMEOUT);
        opts.headers = Some(self.auth_headers());

        let response = self.http.request(Method::PUT, None, opts).await?;
        self.handle_response(response, true).await
    }

    /// Reads some data from a key/value version 2 secret engine.
    pub async fn read_kv2(&self, path: &str, version: Option<u64>) -> StoreResult<Option<Value>> {
        self.read(&format!("{}/data/{path}", self.mount_path), version)
            .await
    }

    /// Creates or updates some data in a key/value version 2 secret engine.
    pub async fn create_or_update_kv2(
        &self,
        path: &str,
        data: Value,
        cas: Option<u64>,
    ) -> StoreResult<Option<Value>> {
        let mut options = serde_json::Map::new();
        if let Some(cas) = cas {
            options.insert("cas".to_string(), json!(cas));
        }
        let body = json!({ "options": Value::Object(options), "data": data });
        self.write(&format!("{}/data/{path}", self.mount_path), body)
            .await
    }

    /// `LIST /v1/<mount>/metadata` (sent as `GET ?list=true`, the form
    /// every HTTP client and proxy understands without a custom verb).
    /// Returns the domain names stored directly under the mount. This
    /// system never nests KV v2 paths, so one non-recursive list covers
    /// every certificate.
    async fn list_kv2(&self) -> StoreResult<Vec<String>> {
        let mut params = HashMap::new();
        params.insert("list".to_string(), "true".to_string());
        let mut opts = RequestOptions::default()
            .path(format!("/v1/{}/metadata", self.mount_path))
            .params(params)
            .timeout(macme_http::DEFAULT_TIMEOUT);
        opts.headers = Some(self.auth_headers());

        let response = self.http.request(Method::GET, None, opts).await?;
        match self.handle_response(response, false).await? {
            Some(value) => Ok(value
                .pointer("/data/keys")
                .and_then(Value::as_array)
                .map(|keys| {
                    keys.iter()
                        .filter_map(|k| k.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    async fn handle_response(
        &self,
        response: reqwest::Response,
        check_cas: bool,
    ) -> StoreResult<Option<Value>> {
        let status = response.status().as_u16();
        let content_type = get_single_header(response.headers(), "Content-Type");
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Http(CoreError::Transient(e.to_string())))?;

        handle_response(status, &body, content_type.as_deref(), check_cas)
            .map_err(StoreError::Vault)
    }
}

/// The pure decision logic behind [`VaultStore::handle_response`], split
/// out so it can be unit tested without a server.
fn handle_response(
    status: u16,
    body: &str,
    content_type: Option<&str>,
    check_cas: bool,
) -> Result<Option<Value>, VaultError> {
    if !(400..600).contains(&status) {
        if body.is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(body).map_err(|e| VaultError::Generic {
            message: e.to_string(),
            errors: None,
        })?;
        return Ok(Some(value));
    }

    let errors = if content_type == Some("application/json") {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("errors").cloned())
            .and_then(|errors| {
                errors.as_array().map(|arr| {
                    arr.iter()
                        .filter_map(|e| e.as_str().map(str::to_string))
                        .collect::<Vec<_>>()
                })
            })
    } else {
        None
    };

    // Special case: a 404 with an explicitly empty errors array means
    // "not found", not a failure.
    if status == 404 && errors.as_deref() == Some(&[] as &[String]) {
        return Ok(None);
    }

    if check_cas && status == 400 {
        if let Some(first) = errors.as_ref().and_then(|e| e.first()) {
            if first.contains("check-and-set") {
                return Err(VaultError::Cas {
                    message: errors.as_ref().unwrap().join(", "),
                    errors,
                });
            }
        }
    }

    let message = errors
        .clone()
        .map(|e| e.join(", "))
        .unwrap_or_else(|| body.to_string());
    Err(VaultError::Generic { message, errors })
}

#[async_trait]
impl CertificateStore for VaultStore {
    async fn get(&self, name: &str) -> StoreResult<Option<String>> {
        match self.read_kv2(name, None).await? {
            Some(value) => {
                let version = value
                    .pointer("/data/metadata/version")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                self.cas_versions
                    .write()
                    .await
                    .insert(name.to_string(), version);

                let bundle = value
                    .pointer("/data/data/bundle")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(bundle)
            }
            None => {
                self.cas_versions.write().await.insert(name.to_string(), 0);
                Ok(None)
            }
        }
    }

    async fn store(&self, name: &str, bundle: String) -> StoreResult<()> {
        let cas = self.cas_versions.read().await.get(name).copied();
        let response = self
            .create_or_update_kv2(name, json!({ "bundle": bundle }), cas)
            .await?;

        if let Some(value) = response {
            if let Some(version) = value.pointer("/data/version").and_then(Value::as_u64) {
                self.cas_versions
                    .write()
                    .await
                    .insert(name.to_string(), version);
            }
        }
        Ok(())
    }

    async fn as_map(&self) -> StoreResult<HashMap<String, String>> {
        let mut out = HashMap::new();
        for name in self.list_kv2().await? {
            if let Some(bundle) = self.get(&name).await? {
                out.insert(name, bundle);
            }
        }
        Ok(out)
    }
}
