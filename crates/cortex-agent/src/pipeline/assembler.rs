use std::time::Duration;

use tracing::warn;

use crate::intent::{self, Complexity, Intent};
use crate::memory_client::MemoryClient;
use crate::pipeline::context::TurnContext;
use crate::prompt::{self, ComposedPrompt};
use crate::provider::{LlmProvider, Message, Role};

/// Recall deadline default.
pub const RECALL_DEADLINE_DEFAULT_MS: u64 = 200;
/// Profile lookup deadline.
pub const PROFILE_DEADLINE_MS: u64 = 30;
/// History window default.
pub const CONTEXT_KEEP_LAST_TURNS: usize = 10;
/// Global input token cap default.
pub const CONTEXT_MAX_INPUT_TOKENS: usize = 16_000;
/// Cross-thread summaries fetched per turn.
const MAX_CROSS_THREAD_SUMMARIES: usize = 2;
/// Memory recall result cap fed into the composed prompt.
const MAX_RECALLED_MEMORIES: usize = 10;

/// Output of the context-assembly procedure.
pub struct AssembledTurn {
    pub composed: ComposedPrompt,
    pub intent: Intent,
    pub complexity: Complexity,
    pub max_tokens_hint: Option<u32>,
    pub messages: Vec<Message>,
}

fn estimate_tokens(s: &str) -> usize {
    s.chars().count() / 4
}

/// Step 1: truncate history to the last K turns plus a global token cap.
fn truncate_history(history: &[Message], keep_last_turns: usize, max_input_tokens: usize) -> Vec<Message> {
    let keep_messages = keep_last_turns * 2;
    let windowed: Vec<Message> = history
        .iter()
        .rev()
        .take(keep_messages)
        .cloned()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let mut total = 0usize;
    let mut result = Vec::with_capacity(windowed.len());
    for m in windowed.into_iter().rev() {
        let tokens = estimate_tokens(&m.content);
        if total + tokens > max_input_tokens {
            break;
        }
        total += tokens;
        result.push(m);
    }
    result.reverse();
    result
}

/// Run the full per-turn orchestration procedure.
/// Every I/O stage is logged and skipped on failure/timeout rather than
/// failing the turn.
#[allow(clippy::too_many_arguments)]
pub async fn assemble(
    ctx: &mut TurnContext,
    memory_client: &MemoryClient,
    fallback_provider: Option<&dyn LlmProvider>,
    fallback_model: &str,
    base_prompt: &str,
    history: &[Message],
    current_message: &str,
    keep_last_turns: usize,
    max_input_tokens: usize,
) -> AssembledTurn {
    // Step 1.
    let truncated = truncate_history(history, keep_last_turns, max_input_tokens);

    // Step 2.
    let (intent, complexity) = match fallback_provider {
        Some(provider) => {
            intent::classify_with_fallback(provider, fallback_model, current_message, truncated.len()).await
        }
        None => intent::classify(current_message, truncated.len()),
    };

    // Step 3: memory recall, always run, even when research injection is enabled.
    let memory_lines = match tokio::time::timeout(
        Duration::from_millis(RECALL_DEADLINE_DEFAULT_MS),
        memory_client.recall(
            &ctx.user_id,
            Some(&ctx.thread_id),
            Some(current_message),
            MAX_RECALLED_MEMORIES,
            RECALL_DEADLINE_DEFAULT_MS,
        ),
    )
    .await
    {
        Ok(Ok(memories)) => memories.into_iter().map(|m| prompt::format_memory_line(&m.content)).collect(),
        Ok(Err(e)) => {
            warn!(error = %e, "memory recall failed, proceeding without it");
            ctx.missing.recall = true;
            Vec::new()
        }
        Err(_) => {
            warn!("memory recall exceeded its deadline, proceeding without it");
            ctx.missing.recall = true;
            Vec::new()
        }
    };

    // Step 4: cross-thread summaries.
    let summary_lines = match memory_client
        .conversations(&ctx.user_id, Some(&ctx.thread_id), MAX_CROSS_THREAD_SUMMARIES)
        .await
    {
        Ok(summaries) => summaries
            .into_iter()
            .map(|s| prompt::format_summary_line(&s.thread_id, &s.summary))
            .collect(),
        Err(e) => {
            warn!(error = %e, "cross-thread summary fetch failed, proceeding without it");
            ctx.missing.summaries = true;
            Vec::new()
        }
    };

    // Step 5: profile lookup, 30ms deadline.
    let profile_directive = match tokio::time::timeout(
        Duration::from_millis(PROFILE_DEADLINE_MS),
        memory_client.profile(&ctx.user_id),
    )
    .await
    {
        Ok(Ok(profile)) => prompt::format_profile_directive(&profile.stack_keywords, &profile.communication_style),
        Ok(Err(e)) => {
            warn!(error = %e, "profile lookup failed, proceeding without it");
            ctx.missing.profile = true;
            None
        }
        Err(_) => {
            warn!("profile lookup exceeded its deadline, proceeding without it");
            ctx.missing.profile = true;
            None
        }
    };

    // Step 6: correction detection.
    let correction_directive = if intent::is_correction(current_message) {
        Some(current_message.to_string())
    } else {
        None
    };

    // Step 7: response-length hint.
    let max_tokens_hint = intent::response_length_hint(intent, complexity);

    // Step 8: composition.
    let composed = prompt::compose(
        base_prompt,
        profile_directive.as_deref(),
        correction_directive.as_deref(),
        &memory_lines,
        &summary_lines,
    );

    let mut messages = truncated;
    messages.push(Message {
        role: Role::User,
        content: current_message.to_string(),
    });

    AssembledTurn {
        composed,
        intent,
        complexity,
        max_tokens_hint,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_history_respects_turn_count() {
        let history: Vec<Message> = (0..40)
            .map(|i| Message { role: Role::User, content: format!("msg{i}") })
            .collect();
        let truncated = truncate_history(&history, 10, 100_000);
        assert_eq!(truncated.len(), 20);
        assert_eq!(truncated.last().unwrap().content, "msg39");
    }

    #[test]
    fn truncate_history_respects_token_cap() {
        let history: Vec<Message> = (0..5)
            .map(|_| Message { role: Role::User, content: "a".repeat(400) })
            .collect();
        let truncated = truncate_history(&history, 10, 150);
        assert!(truncated.len() < 5);
    }
}
