//! Runtime configuration.
//!
//! Values come from the environment (a `.env` file is loaded first by `main`).
//! Only the remote function location is required; everything else has a default.

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_UPLOAD_MB: usize = 20;
const EDGE_FUNCTION_NAME: &str = "digitize-handwriting";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the session server listens on.
    pub bind_addr: SocketAddr,
    /// Full URL of the remote digitization function.
    pub function_url: String,
    /// Supabase anon key, sent as `apikey` and bearer token when set.
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    /// Command line used to write the clipboard; `None` means platform detection.
    pub clipboard_command: Option<String>,
    pub max_upload_bytes: usize,
    /// Browser origin allowed to call the server cross-origin, if any.
    pub allowed_origin: Option<HeaderValue>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("DIGITIZER_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .context("DIGITIZER_BIND is not a valid socket address")?;

        let function_url = match (get("DIGITIZE_FUNCTION_URL"), get("SUPABASE_URL")) {
            (Some(url), _) => url,
            (None, Some(base)) => format!(
                "{}/functions/v1/{}",
                base.trim_end_matches('/'),
                EDGE_FUNCTION_NAME
            ),
            (None, None) => {
                anyhow::bail!("Neither DIGITIZE_FUNCTION_URL nor SUPABASE_URL is set")
            }
        };

        let request_timeout = match get("DIGITIZE_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("DIGITIZE_TIMEOUT_SECS is not a number: {}", raw))?,
            ),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let max_upload_mb = match get("DIGITIZER_MAX_UPLOAD_MB") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("DIGITIZER_MAX_UPLOAD_MB is not a number: {}", raw))?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .with_context(|| format!("DIGITIZER_MAX_UPLOAD_MB is too large: {}", max_upload_mb))?;

        let allowed_origin = get("DIGITIZER_ALLOWED_ORIGIN")
            .map(|raw| {
                raw.parse::<HeaderValue>()
                    .with_context(|| format!("DIGITIZER_ALLOWED_ORIGIN is not a valid origin: {}", raw))
            })
            .transpose()?;

        let config = Self {
            bind_addr,
            function_url,
            api_key: get("SUPABASE_ANON_KEY"),
            request_timeout,
            clipboard_command: get("DIGITIZER_CLIPBOARD_CMD"),
            max_upload_bytes,
            allowed_origin,
        };

        info!(
            "Config: function={} timeout={:?} api_key={}",
            config.function_url,
            config.request_timeout,
            if config.api_key.is_some() { "set" } else { "unset" }
        );

        Ok(config)
    }
}
