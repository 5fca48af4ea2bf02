//! Interactive chat with session memory.

use anyhow::Result;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;

use stratus::{OpenAIClient, Session, Usage};

use crate::display;

/// What a `/command` asked the loop to do.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Clear,
    Stats,
    History,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let name = line.strip_prefix('/')?.split_whitespace().next().unwrap_or("");
        Some(match name {
            "clear" => Self::Clear,
            "stats" => Self::Stats,
            "history" => Self::History,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        })
    }
}

fn print_help() {
    println!("{}", "Commands:".bright_cyan().bold());
    println!("  {} - Forget the conversation", "/clear".bright_yellow());
    println!("  {} - Show message counts and token usage", "/stats".bright_yellow());
    println!("  {} - List every message", "/history".bright_yellow());
    println!("  {} - Exit", "/quit".bright_yellow());
    println!();
}

/// Runs the REPL until `/quit` or Ctrl-D.
///
/// Ctrl-C while a query is running cancels that query only.
///
/// # Errors
///
/// Returns an error if the line editor cannot be initialised.
pub async fn run_repl(mut session: Session<OpenAIClient>) -> Result<()> {
    println!("{}", "Stratus".bright_magenta().bold());
    println!("{}", "Ask anything; /help for commands, Ctrl-D to exit".dimmed());
    println!();

    let mut rl = DefaultEditor::new()?;
    let history_file = history_path();
    if let Some(path) = &history_file
        && rl.load_history(path).is_err()
    {
        log::debug!("No readline history at {}", path.display());
    }

    let mut total_usage = Usage::default();

    loop {
        let prompt = format!("{} ", ">".bold().bright_green());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                display::display_error(&err);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = rl.add_history_entry(line) {
            log::debug!("Failed to record history entry: {e}");
        }

        if let Some(command) = Command::parse(line) {
            match command {
                Command::Quit => break,
                Command::Clear => {
                    session.clear();
                    total_usage = Usage::default();
                    println!("Conversation cleared.");
                }
                Command::Stats => display::display_stats(&session.stats(), &total_usage),
                Command::History => display::display_history(session.conversation()),
                Command::Help => print_help(),
                Command::Unknown(name) => {
                    display::display_error(&format!("Unknown command: /{name} (try /help)"));
                }
            }
            continue;
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let result = session.run_turn(line, &cancel).await;
        watcher.abort();

        match result {
            Ok(outcome) => {
                total_usage.accumulate(&outcome.usage);
                display::display_answer(&outcome.answer);
            }
            Err(e) => display::display_agent_error(&e),
        }
    }

    if let Some(path) = &history_file
        && let Err(e) = rl.save_history(path)
    {
        log::warn!("Failed to save history to {}: {e}", path.display());
    }
    println!("Goodbye!");
    Ok(())
}

fn history_path() -> Option<std::path::PathBuf> {
    let dir = dirs::data_local_dir()?.join("stratus");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history"))
}
