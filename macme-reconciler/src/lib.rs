//! The control loop: fetch app state from Marathon, diff it against the
//! certificate store, drive issuance for anything missing, and broadcast a
//! marathon-lb reload when a new certificate lands.

mod domains;

pub use domains::desired_domain_sets;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use macme_acme::AcmeIssuer;
use macme_core::CoreError;
use macme_marathon::MarathonClient;
use macme_mlb::MlbClient;
use macme_store::{StoreError, StoreResult};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Mutex;

/// Fatal failures: the ones that abort a sync outright. Per-domain
/// issuance failures and per-replica broadcast failures are not fatal;
/// they are collected into the [`SyncReport`] instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to fetch apps from Marathon: {0}")]
    Marathon(#[from] CoreError),

    #[error("failed to read the certificate store: {0}")]
    Store(#[from] StoreError),
}

/// One successful or failed issuance attempt for a single domain set.
#[derive(Debug)]
pub struct CertificateIssuance {
    pub domains: Vec<String>,
    pub reload_responses: Vec<Result<StatusCode, String>>,
}

/// The outcome of one `sync()` pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub issuances: Vec<CertificateIssuance>,
    pub issuance_errors: Vec<(Vec<String>, String)>,
}

/// Ties the Marathon client, marathon-lb fan-out, certificate store and
/// ACME issuer together behind a single coalesced `sync()` entry point.
///
/// At most one sync runs at a time. A trigger that arrives while a sync is
/// already running doesn't start a second one; it raises a pending flag,
/// and the running sync starts over once it finishes if that flag is set.
/// This is coarser than per-domain locking but matches the whole-sync
/// granularity this control loop reasons about.
pub struct Reconciler {
    marathon: MarathonClient,
    mlb: MlbClient,
    store: Arc<dyn macme_store::CertificateStore>,
    acme: Arc<dyn AcmeIssuer>,
    group: String,
    sync_lock: Mutex<()>,
    pending: AtomicBool,
}

impl Reconciler {
    pub fn new(
        marathon: MarathonClient,
        mlb: MlbClient,
        store: Arc<dyn macme_store::CertificateStore>,
        acme: Arc<dyn AcmeIssuer>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            marathon,
            mlb,
            store,
            acme,
            group: group.into(),
            sync_lock: Mutex::new(()),
            pending: AtomicBool::new(false),
        }
    }

    /// Runs a sync if none is in flight. If one is already running, this
    /// raises the pending flag and returns immediately with an empty
    /// report; the running sync will pick it up and start over once it
    /// finishes, so the effect of this trigger is not lost, just folded
    /// into the next pass. Orchestrating callers are expected to fire this
    /// and move on rather than treat its return value as authoritative.
    pub async fn trigger(&self) -> Result<SyncReport, ReconcileError> {
        let Ok(_permit) = self.sync_lock.try_lock() else {
            self.pending.store(true, Ordering::SeqCst);
            return Ok(SyncReport::default());
        };

        let mut report = self.sync_once().await?;
        while self.pending.swap(false, Ordering::SeqCst) {
            let next = self.sync_once().await?;
            report.issuances.extend(next.issuances);
            report.issuance_errors.extend(next.issuance_errors);
        }
        Ok(report)
    }

    /// One pass of the six-step sync contract: fetch apps, compute desired
    /// domain sets, read the store, issue for anything missing, store what
    /// succeeded, and broadcast a reload if anything did.
    async fn sync_once(&self) -> Result<SyncReport, ReconcileError> {
        let apps = self.marathon.get_apps().await?;
        let desired = desired_domain_sets(&apps, &self.group);
        let stored = self.store.as_map().await?;

        // Distinct apps can declare the same canonical domain under the
        // same group; de-dup so it is issued at most once per sync (§4.7
        // point 4), tracking which canonical names this pass has already
        // queued rather than relying on `stored`, which only reflects what
        // existed before the sync started.
        let mut queued = std::collections::HashSet::new();
        let missing: Vec<Vec<String>> = desired
            .into_iter()
            .filter(|domains| {
                domains
                    .first()
                    .map(|canonical| !stored.contains_key(canonical) && queued.insert(canonical.clone()))
                    .unwrap_or(false)
            })
            .collect();

        tracing::info!(missing = missing.len(), "sync computed missing domain sets");

        let issuance_results = join_all(missing.into_iter().map(|domains| {
            let acme = Arc::clone(&self.acme);
            async move {
                let result = acme.obtain_certificate(&domains).await;
                (domains, result)
            }
        }))
        .await;

        let mut report = SyncReport::default();
        let mut any_issued = false;

        for (domains, result) in issuance_results {
            match result {
                Ok(cert) => match self.store_issued(&domains, &cert).await {
                    Ok(()) => {
                        any_issued = true;
                        report.issuances.push(CertificateIssuance {
                            domains,
                            reload_responses: Vec::new(),
                        });
                    }
                    Err(e) => report.issuance_errors.push((domains, e.to_string())),
                },
                Err(e) => report.issuance_errors.push((domains, e.to_string())),
            }
        }

        if any_issued {
            let reload_responses: Vec<Result<StatusCode, String>> = self
                .mlb
                .mlb_signal_usr1()
                .await
                .into_iter()
                .map(|r| r.map_err(|e| e.to_string()))
                .collect();
            for issuance in &mut report.issuances {
                issuance.reload_responses = reload_responses.clone();
            }
        }

        Ok(report)
    }

    async fn store_issued(
        &self,
        domains: &[String],
        cert: &macme_acme::IssuedCertificate,
    ) -> StoreResult<()> {
        let canonical = domains.first().cloned().unwrap_or_default();
        self.store.store(&canonical, cert.pem_bundle()).await
    }
}
