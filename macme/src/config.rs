//! CLI flags and environment wiring (§6, §9 "global environment reads").
//!
//! `spec.md` treats CLI parsing and config loading as external
//! collaborators "described only at their interface with the core"; this
//! module is that collaborator. It owns nothing the reconciler itself
//! needs to know about; it just builds the concrete clients C7 is handed.

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Automates TLS certificate provisioning for Marathon apps fronted by
/// marathon-lb.
#[derive(Parser, Debug)]
#[command(name = "macme")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The HAPROXY_GROUP this instance provisions certificates for.
    #[arg(short, long)]
    pub group: String,

    /// Base URL of the Marathon instance to watch, e.g. http://marathon:8080.
    #[arg(long, env = "MACME_MARATHON_URL")]
    pub marathon_url: String,

    /// Base URL of a marathon-lb replica to signal on reload. Repeat for
    /// multiple replicas.
    #[arg(long = "marathon-lb-url", required = true)]
    pub marathon_lb_urls: Vec<String>,

    /// Certificate store backend.
    #[arg(long, value_enum, default_value_t = StoreBackend::Memory)]
    pub store: StoreBackend,

    /// Vault address; falls back to VAULT_ADDR, then Vault's own default.
    #[arg(long, env = "VAULT_ADDR")]
    pub vault_addr: Option<String>,

    /// Vault token; falls back to VAULT_TOKEN.
    #[arg(long, env = "VAULT_TOKEN")]
    pub vault_token: Option<String>,

    /// Vault KV v2 mount path.
    #[arg(long, default_value = "secret")]
    pub vault_mount: String,

    /// ACME directory URL to issue against. Overrides --acme-staging when set.
    #[arg(long)]
    pub acme_directory: Option<String>,

    /// Use the Let's Encrypt staging directory instead of production.
    #[arg(long, default_value_t = false)]
    pub acme_staging: bool,

    /// Contact email passed on ACME account registration.
    #[arg(long)]
    pub acme_email: Option<String>,

    /// Address the HTTP-01 challenge responder listens on.
    #[arg(long, default_value = "0.0.0.0:8000")]
    pub challenge_listen: String,

    /// Safety-net sync period, in seconds (default 24h, per §4.8).
    #[arg(long, default_value_t = 24 * 60 * 60)]
    pub sync_period_secs: u64,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    Memory,
    Vault,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_minimal_required_flags() {
        let cli = Cli::parse_from([
            "macme",
            "--group",
            "external",
            "--marathon-url",
            "http://marathon:8080",
            "--marathon-lb-url",
            "http://lb-0:9090",
        ]);
        assert_eq!(cli.group, "external");
        assert_eq!(cli.store, StoreBackend::Memory);
        assert_eq!(cli.sync_period(), Duration::from_secs(86_400));
    }
}
