use serde_json::{Map, Value};
use std::fmt;

use crate::config::DEFAULT_PRADO_FALLBACK_URL;
use crate::errors::AppError;
use crate::models::PradoContext;
use crate::services::PradoService;

/// Document type sent when only the issue place is known.
const ISSUE_PLACE_DOCUMENT_TYPE: &str = "identity card";

/// Which input produced the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PradoSource {
    ChatContext,
    ExtractedData,
    IssuePlace,
    Fallback,
}

impl fmt::Display for PradoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PradoSource::ChatContext => "assistant suggestion",
            PradoSource::ExtractedData => "extracted document data",
            PradoSource::IssuePlace => "document issue place",
            PradoSource::Fallback => "manual search page",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PradoResolution {
    pub url: String,
    pub source: PradoSource,
}

/// Everything the lookup can draw on, most specific first.
#[derive(Debug, Clone, Copy, Default)]
pub struct PradoInputs<'a> {
    pub chat_context: Option<&'a PradoContext>,
    pub extracted: Option<&'a Map<String, Value>>,
    pub issue_place: &'a str,
}

/// First comma-separated segment of an issue place, e.g. `Belgium` from
/// `"Belgium, Brussels"`.
fn issue_country(issue_place: &str) -> Option<&str> {
    issue_place
        .split(',')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
}

/// Finds the PRADO page for the document being registered.
#[derive(Clone)]
pub struct PradoLookup {
    service: PradoService,
    fallback_url: String,
}

impl PradoLookup {
    pub fn new(service: PradoService) -> Self {
        Self::with_fallback(service, DEFAULT_PRADO_FALLBACK_URL)
    }

    pub fn with_fallback(service: PradoService, fallback_url: impl Into<String>) -> Self {
        Self {
            service,
            fallback_url: fallback_url.into(),
        }
    }

    pub fn fallback_url(&self) -> &str {
        &self.fallback_url
    }

    /// Never fails: anything that goes wrong lands on the manual search page.
    pub async fn resolve(&self, inputs: PradoInputs<'_>) -> PradoResolution {
        match self.try_resolve(inputs).await {
            Ok(Some(resolution)) => {
                tracing::info!("PRADO URL from {}: {}", resolution.source, resolution.url);
                resolution
            }
            Ok(None) => {
                tracing::warn!("No PRADO URL available, using manual search");
                self.fallback()
            }
            Err(e) => {
                tracing::error!("Error preparing PRADO URL: {}", e);
                self.fallback()
            }
        }
    }

    async fn try_resolve(
        &self,
        inputs: PradoInputs<'_>,
    ) -> Result<Option<PradoResolution>, AppError> {
        if let Some(url) = inputs
            .chat_context
            .and_then(|ctx| ctx.url.as_deref())
            .filter(|url| !url.trim().is_empty())
        {
            return Ok(Some(PradoResolution {
                url: url.to_string(),
                source: PradoSource::ChatContext,
            }));
        }

        if let Some(extracted) = inputs.extracted.filter(|data| !data.is_empty()) {
            let url = self.service.prepare_from_extracted(extracted).await?;
            return Ok(url.map(|url| PradoResolution {
                url,
                source: PradoSource::ExtractedData,
            }));
        }

        if let Some(country) = issue_country(inputs.issue_place) {
            let url = self
                .service
                .prepare_for_country(country, ISSUE_PLACE_DOCUMENT_TYPE)
                .await?;
            return Ok(url.map(|url| PradoResolution {
                url,
                source: PradoSource::IssuePlace,
            }));
        }

        Ok(None)
    }

    fn fallback(&self) -> PradoResolution {
        PradoResolution {
            url: self.fallback_url.clone(),
            source: PradoSource::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ApiClient;
    use std::time::Duration;

    fn offline() -> PradoLookup {
        let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        PradoLookup::new(PradoService::new(api))
    }

    #[test]
    fn issue_country_takes_first_segment() {
        assert_eq!(issue_country("Belgium, Brussels"), Some("Belgium"));
        assert_eq!(issue_country("  France "), Some("France"));
        assert_eq!(issue_country(""), None);
        assert_eq!(issue_country(" , Paris"), None);
    }

    #[tokio::test]
    async fn chat_context_url_wins_without_a_request() {
        let context = PradoContext {
            url: Some("https://prado.example/BEL/A/docs-per-category.html".to_string()),
            ..PradoContext::default()
        };

        let resolution = offline()
            .resolve(PradoInputs {
                chat_context: Some(&context),
                issue_place: "France",
                ..PradoInputs::default()
            })
            .await;

        assert_eq!(resolution.source, PradoSource::ChatContext);
        assert_eq!(resolution.url, "https://prado.example/BEL/A/docs-per-category.html");
    }

    #[tokio::test]
    async fn failures_fall_back_to_manual_search() {
        let lookup = offline();
        let resolution = lookup
            .resolve(PradoInputs {
                issue_place: "Belgium",
                ..PradoInputs::default()
            })
            .await;

        assert_eq!(resolution.source, PradoSource::Fallback);
        assert_eq!(resolution.url, DEFAULT_PRADO_FALLBACK_URL);
    }

    #[tokio::test]
    async fn nothing_to_go_on_means_fallback() {
        let resolution = offline().resolve(PradoInputs::default()).await;
        assert_eq!(resolution.source, PradoSource::Fallback);
    }
}
