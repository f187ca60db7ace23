//! Navigation between the search, results and registration steps.

use std::fmt;

use crate::models::{SearchResultsSession, SessionUpdate};

/// The step the operator is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Search,
    Results,
    Register,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Search => "search",
            Phase::Results => "results",
            Phase::Register => "register",
        };
        f.write_str(name)
    }
}

/// Owns the current phase and the session shared between phases.
///
/// The session is created empty, replaced wholesale when results arrive and
/// merged into when registration starts. It is never cleared by navigation.
#[derive(Debug, Default)]
pub struct PhaseController {
    phase: Phase,
    session: SearchResultsSession,
}

impl PhaseController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> &SearchResultsSession {
        &self.session
    }

    /// Shows a fresh result set. Fields not in `update` take their defaults.
    pub fn enter_results(&mut self, update: SessionUpdate) {
        let mut session = SearchResultsSession::default();
        update.apply_to(&mut session);
        self.session = session;
        self.transition(Phase::Results);
    }

    /// Opens the registration form, merging `update` over the current session.
    pub fn enter_registration(&mut self, update: Option<SessionUpdate>) {
        if let Some(update) = update {
            update.apply_to(&mut self.session);
        }
        self.transition(Phase::Register);
    }

    /// Goes back to the search form, keeping the session.
    pub fn return_to_search(&mut self) {
        self.transition(Phase::Search);
    }

    fn transition(&mut self, next: Phase) {
        tracing::info!("Phase {} -> {}", self.phase, next);
        self.phase = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_normalizer::map_to_standard;
    use serde_json::json;

    fn hit(name: &str) -> crate::models::MatchRecord {
        map_to_standard(&json!({ "name": name, "score": 88 })).unwrap()
    }

    #[test]
    fn starts_on_search_with_empty_session() {
        let controller = PhaseController::new();
        assert_eq!(controller.phase(), Phase::Search);
        assert!(controller.session().matches.is_empty());
        assert_eq!(controller.session().search_log_id, None);
    }

    #[test]
    fn proceed_anyway_keeps_matches() {
        let mut controller = PhaseController::new();
        controller.enter_results(SessionUpdate {
            matches: Some(vec![hit("m1")]),
            ..SessionUpdate::default()
        });
        assert_eq!(controller.phase(), Phase::Results);

        controller.enter_registration(Some(SessionUpdate::decision("proceed_anyway")));

        assert_eq!(controller.phase(), Phase::Register);
        assert_eq!(controller.session().matches, vec![hit("m1")]);
        assert_eq!(controller.session().user_decision, "proceed_anyway");
    }

    #[test]
    fn enter_results_replaces_previous_session() {
        let mut controller = PhaseController::new();
        controller.enter_results(SessionUpdate {
            matches: Some(vec![hit("old")]),
            search_log_id: Some("41".to_string()),
            user_decision: Some("proceed_anyway".to_string()),
            ..SessionUpdate::default()
        });

        controller.enter_results(SessionUpdate {
            name: Some("Jane".to_string()),
            ..SessionUpdate::default()
        });

        let session = controller.session();
        assert!(session.matches.is_empty());
        assert_eq!(session.search_log_id, None);
        assert_eq!(session.user_decision, "");
        assert_eq!(session.name, "Jane");
    }

    #[test]
    fn returning_to_search_keeps_session() {
        let mut controller = PhaseController::new();
        controller.enter_results(SessionUpdate {
            matches: Some(vec![hit("m1")]),
            ..SessionUpdate::default()
        });
        controller.enter_registration(None);
        controller.return_to_search();

        assert_eq!(controller.phase(), Phase::Search);
        assert_eq!(controller.session().matches.len(), 1);
    }

    #[test]
    fn registration_without_search_is_allowed() {
        let mut controller = PhaseController::new();
        controller.enter_registration(None);
        assert_eq!(controller.phase(), Phase::Register);
        assert_eq!(controller.session(), &SearchResultsSession::default());
    }
}
