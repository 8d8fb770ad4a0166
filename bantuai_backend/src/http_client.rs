use std::time::Duration;

use anyhow::{anyhow, Result};

const SYSTEM_PROXY_ENV: &str = "BANTUAI_ENABLE_SYSTEM_PROXY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyMode {
    System,
    Direct,
}

/// Shared outbound client for webhooks, the talkdb proxy and the console.
///
/// System proxy discovery is opt-in through `BANTUAI_ENABLE_SYSTEM_PROXY`; it can
/// panic on hosts with broken proxy settings, so a direct client is the fallback.
pub fn build_http_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let system_proxy = std::env::var(SYSTEM_PROXY_ENV)
        .map(|value| env_flag(&value))
        .unwrap_or(false);
    build_with_modes(timeout, proxy_modes(system_proxy))
}

fn env_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn proxy_modes(system_proxy: bool) -> &'static [ProxyMode] {
    if system_proxy {
        &[ProxyMode::System, ProxyMode::Direct]
    } else {
        &[ProxyMode::Direct]
    }
}

fn build_with_modes(timeout: Option<Duration>, modes: &[ProxyMode]) -> Result<reqwest::Client> {
    let mut last_failure = anyhow!("no HTTP client configuration attempted");
    for &mode in modes {
        match std::panic::catch_unwind(|| build_one(timeout, mode)) {
            Ok(Ok(client)) => return Ok(client),
            Ok(Err(error)) => {
                last_failure = anyhow!("HTTP client ({:?} proxy mode) failed: {}", mode, error);
            }
            Err(_) => {
                last_failure = anyhow!("HTTP client ({:?} proxy mode) panicked", mode);
            }
        }
        tracing::warn!("{}", last_failure);
    }
    Err(last_failure.context("Failed to initialize HTTP client"))
}

fn build_one(timeout: Option<Duration>, mode: ProxyMode) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if mode == ProxyMode::Direct {
        builder = builder.no_proxy();
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_proxy_is_tried_before_direct() {
        assert_eq!(proxy_modes(true), &[ProxyMode::System, ProxyMode::Direct]);
        assert_eq!(proxy_modes(false), &[ProxyMode::Direct]);
        assert!(env_flag(" TRUE "));
        assert!(!env_flag("yes"));
    }

    #[test]
    fn direct_client_builds_with_timeout() {
        build_with_modes(Some(Duration::from_secs(5)), &[ProxyMode::Direct]).expect("client");
        assert!(build_with_modes(None, &[]).is_err());
    }
}
