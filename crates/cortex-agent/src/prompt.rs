use tracing::info;

/// One labeled system block. Blocks stay separate (not merged into one
/// string) so the model can attend to each distinctly.
#[derive(Debug, Clone)]
pub struct SystemBlock {
    pub label: &'static str,
    pub content: String,
}

/// Composed system prompt plus a source-flag log for observability.
pub struct ComposedPrompt {
    pub blocks: Vec<SystemBlock>,
}

impl ComposedPrompt {
    /// Blocks joined with blank-line separators for providers that accept
    /// only a single system string (most OpenAI-shaped chat APIs).
    pub fn joined(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// `chars / 4 ≈ tokens`, the estimator used throughout this system.
fn estimate_tokens(s: &str) -> usize {
    s.chars().count() / 4
}

/// Emit system blocks in the fixed order: base-prompt → profile →
/// correction (if any) → memories → summaries.
/// Logs block counts and an aggregate token estimate on every call.
pub fn compose(
    base_prompt: &str,
    profile_directive: Option<&str>,
    correction_directive: Option<&str>,
    memory_lines: &[String],
    summary_lines: &[String],
) -> ComposedPrompt {
    let mut blocks = vec![SystemBlock {
        label: "base",
        content: base_prompt.to_string(),
    }];

    if let Some(profile) = profile_directive {
        blocks.push(SystemBlock {
            label: "profile",
            content: profile.to_string(),
        });
    }
    if let Some(correction) = correction_directive {
        blocks.push(SystemBlock {
            label: "correction",
            content: format!(
                "CRITICAL: the user's most recent message is a correction. Prioritize it over any prior context. {}",
                correction
            ),
        });
    }
    if !memory_lines.is_empty() {
        blocks.push(SystemBlock {
            label: "memories",
            content: memory_lines.join("\n"),
        });
    }
    if !summary_lines.is_empty() {
        blocks.push(SystemBlock {
            label: "summaries",
            content: summary_lines.join("\n"),
        });
    }

    let token_estimate: usize = blocks.iter().map(|b| estimate_tokens(&b.content)).sum();
    info!(
        block_count = blocks.len(),
        token_estimate,
        has_profile = profile_directive.is_some(),
        has_correction = correction_directive.is_some(),
        memory_count = memory_lines.len(),
        summary_count = summary_lines.len(),
        "composed system prompt"
    );

    ComposedPrompt { blocks }
}

/// Formats one recalled memory as a narrative line, prefixed neutrally
/// rather than "you mentioned…".
pub fn format_memory_line(content: &str) -> String {
    format!("- {}", content)
}

/// Formats one cross-thread summary as a narrative line.
pub fn format_summary_line(thread_label: &str, summary: &str) -> String {
    format!("- ({}) {}", thread_label, summary)
}

/// Short profile directive enumerating stack/style preferences.
pub fn format_profile_directive(stack_keywords: &[String], communication_style: &str) -> Option<String> {
    if stack_keywords.is_empty() && communication_style == "concise" {
        return None;
    }
    let mut parts = Vec::new();
    if !stack_keywords.is_empty() {
        parts.push(format!("stack: {}", stack_keywords.join(", ")));
    }
    if communication_style != "concise" {
        parts.push(format!("preferred style: {}", communication_style));
    }
    Some(format!("User preferences — {}.", parts.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition_preserves_block_order() {
        let composed = compose(
            "base prompt",
            Some("prefers rust"),
            Some("user corrected the date"),
            &["- likes coffee".to_string()],
            &["- (t1) discussed deployments".to_string()],
        );
        let labels: Vec<&str> = composed.blocks.iter().map(|b| b.label).collect();
        assert_eq!(labels, vec!["base", "profile", "correction", "memories", "summaries"]);
    }

    #[test]
    fn empty_optional_sections_are_omitted() {
        let composed = compose("base prompt", None, None, &[], &[]);
        assert_eq!(composed.blocks.len(), 1);
    }

    #[test]
    fn profile_directive_omitted_when_nothing_to_say() {
        assert!(format_profile_directive(&[], "concise").is_none());
        assert!(format_profile_directive(&["rust".to_string()], "concise").is_some());
    }
}
