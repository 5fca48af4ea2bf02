//! Terminal output for answers, tool traces and conversation history.

use colored::Colorize;

use stratus::{AgentError, AgentEvent, Conversation, MessageRole, SessionStats, Usage};

const PREVIEW_CHARS: usize = 200;

/// Shortens `text` to at most [`PREVIEW_CHARS`] characters.
fn preview(text: &str) -> String {
    let total = text.chars().count();
    if total <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}... ({total} chars)")
}

/// Prints one agent event; used as the `--verbose` event callback.
pub fn display_event(event: &AgentEvent) {
    match event {
        AgentEvent::ModelTurn { round } => {
            println!("{} model turn (after {round} tool round(s))", "○".bright_blue());
        }
        AgentEvent::ToolDispatched {
            name,
            call_id,
            success,
            result,
        } => {
            let label = if *success {
                "Result:".bright_green()
            } else {
                "Failed:".bright_red()
            };
            println!(
                "○ {label} {} {}",
                name.bright_cyan(),
                format!("[{call_id}]").dimmed()
            );
            println!("  {}", preview(result));
        }
        AgentEvent::Usage(usage) => {
            println!("  {}", format_usage(usage).dimmed());
        }
        _ => {}
    }
}

pub fn format_usage(usage: &Usage) -> String {
    format!(
        "{} tokens (in: {}, out: {})",
        usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
    )
}

pub fn display_answer(answer: &str) {
    println!("\n╭─● {}\n╰───────────○", "Assistant".bright_magenta().bold());
    println!("{answer}");
}

pub fn display_error(error: &impl std::fmt::Display) {
    eprintln!("{} {error}", "Error:".bright_red());
}

/// Suggests what to do about a failed query, when something applies.
fn error_hint(error: &AgentError) -> Option<String> {
    let client_error = error.client_error()?;
    if client_error.is_authentication_error() {
        return Some("Check the API key (--api-key, GROQ_API_KEY or GROQ_API).".to_string());
    }
    if !client_error.is_retryable() {
        return None;
    }
    Some(match client_error.retry_after() {
        Some(wait) => format!("The provider is rate limiting; retry in {}s.", wait.as_secs()),
        None => "This looks temporary; try again shortly.".to_string(),
    })
}

/// Prints a failed query, with a hint when one applies.
pub fn display_agent_error(error: &AgentError) {
    display_error(error);
    if let Some(hint) = error_hint(error) {
        eprintln!("  {}", hint.dimmed());
    }
}

pub fn display_stats(stats: &SessionStats, usage: &Usage) {
    println!("{} {stats}", "Conversation:".bright_cyan());
    println!("{} {}", "Session usage:".bright_cyan(), format_usage(usage));
}

/// Lists every message, with tool calls and tool results inline.
pub fn display_history(conversation: &Conversation) {
    println!("\n{}\n", "=== Conversation ===".bold());
    for (idx, msg) in conversation.get_messages().iter().enumerate() {
        let role = match msg.role {
            MessageRole::System => "System".bright_black(),
            MessageRole::User => "User".bright_cyan(),
            MessageRole::Assistant => "Assistant".bright_magenta(),
            MessageRole::Tool => "Tool".bright_yellow(),
            _ => "Unknown".white(),
        };
        if msg.content.is_empty() {
            println!("[{idx}] {role}");
        } else {
            println!("[{idx}] {role}: {}", preview(&msg.content));
        }

        for call in &msg.tool_calls {
            println!(
                "      ├─○ {} {}",
                call.function.name.bright_green(),
                call.function.arguments.dimmed()
            );
        }
    }
    println!();
}
