use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag shared between the HTTP handler and every
/// orchestration-side fetch it spawns.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Bitset of inputs that a stage could not obtain in time — surfaced to the
/// client as part of the `meta` SSE event.
#[derive(Debug, Clone, Default)]
pub struct MissingInputs {
    pub recall: bool,
    pub summaries: bool,
    pub profile: bool,
    pub research: bool,
}

impl MissingInputs {
    pub fn any(&self) -> bool {
        self.recall || self.summaries || self.profile || self.research
    }
}

/// Per-turn context threaded by reference through every pipeline stage
/// function rather than read from ambient state.
pub struct TurnContext {
    pub user_id: String,
    pub thread_id: String,
    pub deadline: Instant,
    pub cancel: CancelToken,
    pub missing: MissingInputs,
}

impl TurnContext {
    pub fn new(user_id: String, thread_id: String, turn_budget: std::time::Duration) -> Self {
        Self {
            user_id,
            thread_id,
            deadline: Instant::now() + turn_budget,
            cancel: CancelToken::new(),
            missing: MissingInputs::default(),
        }
    }

    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_observed_across_clones() {
        let token = CancelToken::new();
        let cloned = token.clone();
        assert!(!cloned.is_cancelled());
        token.cancel();
        assert!(cloned.is_cancelled());
    }

    #[test]
    fn missing_inputs_any_reflects_flags() {
        let mut missing = MissingInputs::default();
        assert!(!missing.any());
        missing.profile = true;
        assert!(missing.any());
    }
}
