//! Controllers behind each screen: they hold user input, run one backend
//! request per action and turn every outcome into displayable state.

pub mod chat;
pub mod ocr;
pub mod prado;
pub mod registration;
pub mod search;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a controller is in its request cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionState {
    #[default]
    Idle,
    Loading,
    Success,
    PartialSuccess,
    Error(String),
}

impl ActionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, ActionState::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ActionState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Shared flag telling a controller whether its owner is still around.
///
/// Clones share the flag. Once `unmount` is called, responses that arrive
/// afterwards are dropped instead of being applied.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Default for Liveness {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn unmount(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}
