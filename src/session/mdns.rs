use webrtc::ice::mdns::MulticastDnsMode;

use crate::config::MdnsMode;

/// Environment override for the mDNS mode
pub const MDNS_MODE_ENV: &str = "RTC_CALL_MDNS_MODE";

pub fn parse_mdns_mode(raw: &str) -> Option<MdnsMode> {
    let value = raw.trim().to_ascii_lowercase();
    match value.as_str() {
        "disabled" | "off" | "false" | "0" => Some(MdnsMode::Disabled),
        "query" | "query_only" | "query-only" => Some(MdnsMode::QueryOnly),
        "gather" | "query_and_gather" | "query-and-gather" | "on" | "true" | "1" => {
            Some(MdnsMode::QueryAndGather)
        }
        _ => None,
    }
}

pub fn mdns_mode_from_env() -> Option<MdnsMode> {
    let raw = std::env::var(MDNS_MODE_ENV).ok()?;
    parse_mdns_mode(&raw)
}

/// Configured mode unless the environment overrides it
pub fn effective_mdns_mode(configured: MdnsMode) -> MulticastDnsMode {
    to_multicast_mode(mdns_mode_from_env().unwrap_or(configured))
}

pub fn to_multicast_mode(mode: MdnsMode) -> MulticastDnsMode {
    match mode {
        MdnsMode::Disabled => MulticastDnsMode::Disabled,
        MdnsMode::QueryOnly => MulticastDnsMode::QueryOnly,
        MdnsMode::QueryAndGather => MulticastDnsMode::QueryAndGather,
    }
}

pub fn default_mdns_host_name(session_id: &str) -> String {
    format!("{session_id}.local")
}
