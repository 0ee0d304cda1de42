//! Derives the desired domain sets from Marathon app views (§3, §4.7).

use macme_marathon::{parse_domains, AppView, PortDefinition};

/// One SAN group: `domains[0]` is the canonical name the certificate is
/// stored under; the rest share that certificate.
pub fn desired_domain_sets(apps: &[AppView], group: &str) -> Vec<Vec<String>> {
    let mut sets = Vec::new();
    for app in apps {
        for (index, _port) in app.port_definitions.iter().enumerate() {
            if app.effective_group(index) != Some(group) {
                continue;
            }
            let Some(label) = app.domain_label(index) else {
                continue;
            };
            let domains = parse_domains(label);
            if !domains.is_empty() {
                sets.push(domains);
            }
        }
    }
    sets
}
