use serde::Deserialize;
use std::path::PathBuf;

/// Manual PRADO search page, used whenever no prepared URL is available.
pub const DEFAULT_PRADO_FALLBACK_URL: &str =
    "https://www.consilium.europa.eu/prado/en/search-by-document-country.html";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub storage_dir: PathBuf,
    pub http_timeout_secs: u64,
    pub match_threshold: u8,
    pub top_n: u32,
    pub prado_fallback_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            storage_dir: PathBuf::from(".compliance-desk"),
            http_timeout_secs: 30,
            match_threshold: 80,
            top_n: 10,
            prado_fallback_url: DEFAULT_PRADO_FALLBACK_URL.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            api_base_url: std::env::var("COMPLIANCE_API_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("COMPLIANCE_API_URL must start with http:// or https://");
                    }
                    Ok(url.trim_end_matches('/').to_string())
                })
                .transpose()?
                .unwrap_or(defaults.api_base_url),
            storage_dir: std::env::var("COMPLIANCE_STORAGE_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            http_timeout_secs: std::env::var("COMPLIANCE_HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.http_timeout_secs.to_string())
                .parse()
                .map_err(|_| {
                    anyhow::anyhow!("COMPLIANCE_HTTP_TIMEOUT_SECS must be a number of seconds")
                })?,
            match_threshold: std::env::var("COMPLIANCE_MATCH_THRESHOLD")
                .unwrap_or_else(|_| defaults.match_threshold.to_string())
                .parse::<u8>()
                .map_err(|_| anyhow::anyhow!("COMPLIANCE_MATCH_THRESHOLD must be a number"))
                .and_then(|threshold| {
                    if threshold > 100 {
                        anyhow::bail!("COMPLIANCE_MATCH_THRESHOLD must be between 0 and 100");
                    }
                    Ok(threshold)
                })?,
            top_n: std::env::var("COMPLIANCE_TOP_N")
                .unwrap_or_else(|_| defaults.top_n.to_string())
                .parse::<u32>()
                .map_err(|_| anyhow::anyhow!("COMPLIANCE_TOP_N must be a positive number"))
                .and_then(|top_n| {
                    if top_n == 0 {
                        anyhow::bail!("COMPLIANCE_TOP_N cannot be zero");
                    }
                    Ok(top_n)
                })?,
            prado_fallback_url: std::env::var("PRADO_FALLBACK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.prado_fallback_url),
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Compliance API URL: {}", config.api_base_url);
        tracing::debug!("Storage directory: {}", config.storage_dir.display());
        tracing::debug!(
            "Match threshold: {}, top_n: {}",
            config.match_threshold,
            config.top_n
        );

        Ok(config)
    }
}
