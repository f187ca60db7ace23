use chrono::Utc;
use serde_json::Value;

use super::{ActionState, Liveness};
use crate::match_normalizer::format_matches;
use crate::models::{MatchRecord, SearchQuery, SessionUpdate, VerifyIdentityResponse};
use crate::services::SanctionsService;

pub const DEFAULT_THRESHOLD: u8 = 80;
pub const DEFAULT_TOP_N: u32 = 10;

/// What a successful search hands to the results phase.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub matches: Vec<MatchRecord>,
    pub timestamp: String,
    pub search_log_id: String,
    pub name: String,
    pub surname: String,
}

impl From<SearchOutcome> for SessionUpdate {
    fn from(outcome: SearchOutcome) -> Self {
        SessionUpdate {
            matches: Some(outcome.matches),
            timestamp: Some(outcome.timestamp),
            search_log_id: Some(outcome.search_log_id),
            name: Some(outcome.name),
            surname: Some(outcome.surname),
            ..SessionUpdate::default()
        }
    }
}

fn id_text(id: &Value) -> Option<String> {
    match id {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Log id for a search: the backend's, else its record id, else now.
fn resolve_search_log_id(response: &VerifyIdentityResponse) -> String {
    response
        .search_log_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| response.id.as_ref().and_then(id_text))
        .unwrap_or_else(|| Utc::now().timestamp_millis().to_string())
}

/// The sanctions search form and its latest results.
pub struct SearchController {
    service: SanctionsService,
    pub name: String,
    pub surname: String,
    pub threshold: u8,
    top_n: u32,
    matches: Vec<MatchRecord>,
    timestamp: String,
    search_log_id: Option<String>,
    state: ActionState,
    liveness: Liveness,
}

impl SearchController {
    pub fn new(service: SanctionsService) -> Self {
        Self::with_defaults(service, DEFAULT_THRESHOLD, DEFAULT_TOP_N)
    }

    pub fn with_defaults(service: SanctionsService, threshold: u8, top_n: u32) -> Self {
        Self {
            service,
            name: String::new(),
            surname: String::new(),
            threshold,
            top_n,
            matches: Vec::new(),
            timestamp: String::new(),
            search_log_id: None,
            state: ActionState::Idle,
            liveness: Liveness::new(),
        }
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn state(&self) -> &ActionState {
        &self.state
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn search_log_id(&self) -> Option<&str> {
        self.search_log_id.as_deref()
    }

    pub fn reset_form(&mut self) {
        self.name.clear();
        self.surname.clear();
        self.threshold = DEFAULT_THRESHOLD;
    }

    pub fn reset_results(&mut self) {
        self.matches.clear();
        self.timestamp.clear();
        self.search_log_id = None;
    }

    /// Screens the entered name. Returns the outcome on success; on failure the
    /// message is in `state()`.
    pub async fn search(&mut self) -> Option<SearchOutcome> {
        let name = self.name.trim().to_string();
        let surname = self.surname.trim().to_string();

        if name.is_empty() || surname.is_empty() {
            self.state = ActionState::Error("Please enter both first and last name.".to_string());
            return None;
        }

        self.state = ActionState::Loading;
        let query = SearchQuery {
            name: name.clone(),
            surname: surname.clone(),
            threshold: self.threshold,
            top_n: self.top_n,
        };

        let result = self.service.verify_identity(&query).await;

        if !self.liveness.is_live() {
            tracing::debug!("Search controller unmounted, discarding response");
            return None;
        }

        match result {
            Ok(response) => {
                let matches = format_matches(&response.matches);
                let timestamp = response
                    .timestamp
                    .clone()
                    .filter(|ts| !ts.is_empty())
                    .unwrap_or_else(|| Utc::now().to_rfc3339());
                let search_log_id = resolve_search_log_id(&response);

                tracing::info!(
                    "Search {} returned {} matches",
                    search_log_id,
                    matches.len()
                );

                self.matches = matches.clone();
                self.timestamp = timestamp.clone();
                self.search_log_id = Some(search_log_id.clone());
                self.state = ActionState::Success;

                Some(SearchOutcome {
                    matches,
                    timestamp,
                    search_log_id,
                    name,
                    surname,
                })
            }
            Err(e) => {
                tracing::error!("Sanctions search failed: {}", e);
                self.state =
                    ActionState::Error(format!("Error searching sanctions database: {}", e));
                self.matches.clear();
                None
            }
        }
    }
}
