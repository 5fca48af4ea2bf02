//! Stratus CLI - ask a tool-augmented model a question, once or interactively.
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use stratus::{
    AgentLoop, Config, MemoryMode, OpenAIClient, PromptAssembler, Session, ToolRegistry,
    WeatherTool,
};

mod config;
mod display;
mod repl;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (default: ~/.config/stratus/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model to use for chat completion
    #[arg(long, global = true)]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// API key (or set GROQ_API_KEY, GROQ_API or OPENAI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Maximum tool rounds per query
    #[arg(long, global = true)]
    max_rounds: Option<u32>,

    /// Forget earlier turns on every query
    #[arg(long, global = true)]
    stateless: bool,

    /// Print each model turn and tool call
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask a single question and print the answer
    Ask {
        /// The question to ask
        question: String,
    },
    /// Start an interactive chat
    Chat,
}

impl Args {
    /// Command-line flags win over the config file.
    fn apply_overrides(&self, config: &mut CliConfig) {
        if let Some(model) = &self.model {
            config.model.model.clone_from(model);
        }
        if let Some(base_url) = &self.base_url {
            config.model.base_url.clone_from(base_url);
        }
        if let Some(max_rounds) = self.max_rounds {
            config.agent.max_rounds = max_rounds;
        }
        if self.stateless {
            config.agent.memory = MemoryMode::Stateless;
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "warn,stratus=info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn resolve_api_key(args: &Args, config: &CliConfig) -> Result<String> {
    if let Some(key) = &args.api_key {
        return Ok(key.clone());
    }
    let vars = config.api_key_vars();
    vars.iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .with_context(|| {
            format!(
                "API key must be provided via --api-key or one of: {}",
                vars.join(", ")
            )
        })
}

fn build_session(config: &CliConfig, api_key: String, verbose: bool) -> Result<Session<OpenAIClient>> {
    let llm_config = Config::new(&config.model.provider, &config.model.model)
        .with_base_url(&config.model.base_url)
        .with_api_key(api_key)
        .with_timeout(config.model.timeout_seconds)
        .with_temperature(config.model.temperature)
        .with_max_tokens(config.model.max_tokens);
    let client = OpenAIClient::new(llm_config).context("Failed to create LLM client")?;

    let registry = ToolRegistry::new();
    let weather = WeatherTool::new()
        .with_base_url(&config.weather.base_url)
        .with_timeout(Duration::from_secs(config.agent.tool_timeout_seconds));
    registry.register(Arc::new(weather))?;

    let mut agent = AgentLoop::new(client, registry)
        .with_max_rounds(config.agent.max_rounds)?
        .with_model_timeout(Duration::from_secs(config.agent.model_timeout_seconds));
    if verbose {
        agent = agent.with_event_callback(display::display_event);
    }

    Ok(Session::new(
        agent,
        PromptAssembler::new(config.agent.system_prompt.clone()),
        config.agent.memory,
    ))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Missing .env is fine
    dotenv::dotenv().ok();

    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = CliConfig::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate()?;

    let api_key = resolve_api_key(&args, &config)?;
    let mut session = build_session(&config, api_key, args.verbose)?;

    match args.command {
        Command::Ask { question } => {
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let outcome = match session.run_turn(&question, &cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    display::display_agent_error(&e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            println!("Final LLM answer: {}", outcome.answer);
            if args.verbose {
                println!("{}", display::format_usage(&outcome.usage));
            }
        }
        Command::Chat => repl::run_repl(session).await?,
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_ask_parses_question_and_global_flags() {
        let args = Args::try_parse_from([
            "stratus",
            "ask",
            "Weather in Kathmandu?",
            "--max-rounds",
            "3",
            "--stateless",
        ])
        .unwrap();

        assert!(matches!(&args.command, Command::Ask { question } if question == "Weather in Kathmandu?"));
        let mut config = CliConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.agent.max_rounds, 3);
        assert_eq!(config.agent.memory, MemoryMode::Stateless);
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "stratus",
            "--model",
            "llama-3.1-8b-instant",
            "--base-url",
            "http://localhost:8080/v1",
            "chat",
        ])
        .unwrap();

        let mut config = CliConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.model.model, "llama-3.1-8b-instant");
        assert_eq!(config.model.base_url, "http://localhost:8080/v1");
        assert_eq!(config.agent.memory, MemoryMode::Buffered);
    }

    #[test]
    fn test_api_key_flag_wins() {
        let args = Args::try_parse_from(["stratus", "--api-key", "gsk-test", "chat"]).unwrap();
        let key = resolve_api_key(&args, &CliConfig::default()).unwrap();
        assert_eq!(key, "gsk-test");
    }

    #[test]
    fn test_build_session_registers_weather_tool() {
        let session = build_session(&CliConfig::default(), "gsk-test".to_string(), false).unwrap();
        assert!(session.agent().registry.contains("get_weather"));
        assert_eq!(session.agent().max_rounds(), 10);
        assert_eq!(session.stats().total, 0);
        assert_eq!(session.conversation().len(), 1);
    }
}
