//! Gateway.ContextAssembler — per-turn orchestration.

pub mod assembler;
pub mod context;
pub mod research_poll;

pub use assembler::{assemble, AssembledTurn, CONTEXT_KEEP_LAST_TURNS, CONTEXT_MAX_INPUT_TOKENS};
pub use context::{CancelToken, MissingInputs, TurnContext};
pub use research_poll::{poll_for_capsule, poll_for_latest_capsule, CapsulePreview, CapsuleSource};
