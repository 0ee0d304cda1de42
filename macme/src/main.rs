//! macme: automates TLS certificate provisioning for Marathon apps
//! fronted by marathon-lb (§1). This binary is the Service Orchestrator
//! (C8): it owns flag parsing, environment wiring, and process
//! supervision, none of which are part of the reconciler's own contract.

mod config;
mod supervisor;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use macme_acme::{AcmeClient, AcmeIssuer};
use macme_challenge::ChallengeStore;
use macme_core::{EnvSource, ProcessEnv};
use macme_marathon::MarathonClient;
use macme_mlb::MlbClient;
use macme_reconciler::Reconciler;
use macme_store::{CertificateStore, InMemoryStore, VaultStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Cli, StoreBackend};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        tracing::error!("macme exited with error: {e:#}");
        return Err(e);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let env = ProcessEnv;

    let marathon = Arc::new(MarathonClient::new(&cli.marathon_url)?);
    let mlb = MlbClient::new(&cli.marathon_lb_urls)?;
    let store = build_store(&cli, &env)?;
    let challenges = ChallengeStore::new();
    let acme = build_acme_issuer(&cli, challenges.clone());

    let reconciler = Arc::new(Reconciler::new(
        marathon_client_for_reconciler(&cli)?,
        mlb,
        store,
        acme,
        cli.group.clone(),
    ));

    let challenge_addr: std::net::SocketAddr = cli
        .challenge_listen
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid --challenge-listen address: {e}"))?;

    let challenge_task = tokio::spawn(macme_challenge::serve(challenge_addr, challenges));

    tracing::info!(group = %cli.group, "running initial sync");
    match reconciler.trigger().await {
        Ok(report) => log_report(&report),
        Err(e) => tracing::error!("initial sync failed: {e}"),
    }

    let event_task = tokio::spawn(supervisor::run_event_subscription(
        marathon,
        Arc::clone(&reconciler),
    ));
    let timer_task = tokio::spawn(supervisor::run_periodic_sync(
        Arc::clone(&reconciler),
        cli.sync_period(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        result = challenge_task => {
            if let Ok(Err(e)) = result {
                tracing::error!("challenge responder exited: {e}");
            }
        }
    }

    event_task.abort();
    timer_task.abort();
    Ok(())
}

/// `MarathonClient` has no `Clone`, and the reconciler needs its own
/// owned instance alongside the one driving the event subscription: two
/// independent base-URL-bound clients, not shared state, so a second one
/// is simply constructed rather than wrapped in an `Arc` the reconciler
/// would need to reach through.
fn marathon_client_for_reconciler(cli: &Cli) -> anyhow::Result<MarathonClient> {
    Ok(MarathonClient::new(&cli.marathon_url)?)
}

fn build_store(cli: &Cli, env: &dyn EnvSource) -> anyhow::Result<Arc<dyn CertificateStore>> {
    match cli.store {
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StoreBackend::Vault => {
            let addr = cli
                .vault_addr
                .clone()
                .or_else(|| env.get("VAULT_ADDR"))
                .unwrap_or_else(|| "https://127.0.0.1:8200".to_string());
            let token = cli
                .vault_token
                .clone()
                .or_else(|| env.get("VAULT_TOKEN"))
                .unwrap_or_else(|| "TEST".to_string());
            let store = VaultStore::with_mount_path(&addr, token, cli.vault_mount.clone())?;
            Ok(Arc::new(store))
        }
    }
}

fn build_acme_issuer(cli: &Cli, challenges: ChallengeStore) -> Arc<dyn AcmeIssuer> {
    let mut client = if cli.acme_staging {
        AcmeClient::staging(challenges)
    } else {
        AcmeClient::new(challenges)
    };

    if let Some(directory) = &cli.acme_directory {
        client = client.with_directory(directory.clone());
    }
    if let Some(email) = &cli.acme_email {
        client = client.with_email(email.clone());
    }

    Arc::new(client)
}

fn log_report(report: &macme_reconciler::SyncReport) {
    if report.issuances.is_empty() && report.issuance_errors.is_empty() {
        tracing::info!("sync complete: nothing to do");
        return;
    }
    for issuance in &report.issuances {
        tracing::info!(domains = ?issuance.domains, "certificate issued and reload broadcast");
    }
    for (domains, error) in &report.issuance_errors {
        tracing::error!(?domains, %error, "certificate issuance failed");
    }
}
