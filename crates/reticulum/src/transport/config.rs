//! Numeric/timing knobs (§9 "Configuration") plus a minimal parser for the
//! reference stack's `.reticulum/config` INI format's `[interfaces]` section.

use std::time::Duration;

/// Timing and capacity constants for one `Transport` instance. Defaults
/// carry spec.md's literal constants (§4.F/§4.G/§4.K).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub name: String,
    /// Forward packets not addressed locally (acts as a transport node).
    pub enable_transport: bool,
    pub path_expiry: Duration,
    pub packet_hashlist_max: usize,
    pub packet_hashlist_sweep: Duration,
    pub announce_queue_cap: usize,
    pub announce_rebroadcast_delay_min: Duration,
    pub announce_rebroadcast_delay_max: Duration,
    pub first_hop_timeout: Duration,
    pub per_hop_timeout: Duration,
    pub path_request_rate_limit: Duration,
    pub identity_cache_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            name: "rns".into(),
            enable_transport: false,
            path_expiry: Duration::from_secs(7 * 24 * 60 * 60),
            packet_hashlist_max: 250_000,
            packet_hashlist_sweep: Duration::from_secs(60),
            announce_queue_cap: 256,
            announce_rebroadcast_delay_min: Duration::from_millis(50),
            announce_rebroadcast_delay_max: Duration::from_millis(2_000),
            first_hop_timeout: Duration::from_secs(1),
            per_hop_timeout: Duration::from_millis(600),
            path_request_rate_limit: Duration::from_secs(1),
            identity_cache_capacity: crate::identity::IdentityCache::DEFAULT_CAPACITY,
        }
    }
}

impl TransportConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
}

/// Parsed `[interfaces]` section of a `.reticulum/config`-style file: one
/// `interface = name` entry per line. Interface-specific settings (host,
/// port, adapter id, ...) are the host application's concern (§6); this
/// only recovers the list of interface names to instantiate.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub interface_names: Vec<String>,
}

impl Config {
    pub fn parse(source: &str) -> Self {
        let mut names = Vec::new();
        let mut in_interfaces_section = false;

        for raw_line in source.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                in_interfaces_section = line.eq_ignore_ascii_case("[interfaces]");
                continue;
            }
            if !in_interfaces_section {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                if key.trim().eq_ignore_ascii_case("interface") {
                    names.push(value.trim().to_string());
                }
            }
        }

        Self { interface_names: names }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_collects_interface_names_within_section() {
        let source = "\
[reticulum]
enable_transport = false

[interfaces]
interface = Default Interface
interface = TCP Client
";
        let config = Config::parse(source);
        assert_eq!(config.interface_names, vec!["Default Interface", "TCP Client"]);
    }

    #[test]
    fn parse_ignores_keys_outside_interfaces_section() {
        let source = "\
[reticulum]
interface = should-not-count

[interfaces]
interface = counted
";
        let config = Config::parse(source);
        assert_eq!(config.interface_names, vec!["counted"]);
    }
}
