pub mod assistant;
pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod input;
pub mod llm;
pub mod logging;
pub mod output;
pub mod prompts;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

use anyhow::{anyhow, Context};
use serde_json::json;

pub use assistant::{AssistantConfig, AssistantModel};
pub use error::AssistantError;
pub use gate::RequestGate;

/// Largest request body accepted from the command line or STDIN
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Process exit status for an error returned by [`run`]: 2 when the
/// backend could not be initialized, 1 otherwise
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<AssistantError>() {
        Some(error) if error.is_fatal() => 2,
        _ => 1,
    }
}

pub fn run() -> anyhow::Result<()> {
    let mut cli = cli::CliConfig::from_env().map_err(|error| anyhow!(error))?;

    if cli.show_version {
        cli::print_version();
    }

    if cli.show_help {
        cli::print_help();
    }

    if cli.show_version || cli.show_help {
        return Ok(());
    }

    let command = cli
        .command
        .take()
        .ok_or_else(|| anyhow!("a command is required. Run `mealway --help` for usage."))?;

    logging::init(cli.debug);
    log::debug!("debug logging enabled");

    let config = config::AppConfig::from_env();

    match command {
        cli::Command::Config => {
            print_json(json!({
                "status": "ok",
                "bind_address": config.bind_address(),
                "config": config,
            }));
            Ok(())
        }
        cli::Command::Ask { question } => {
            let gate = start(&config)?;
            let answer = gate
                .run(|model| model.ask(&question))
                .context("ask failed")?;

            print_json(json!({ "answer": answer }));
            Ok(())
        }
        cli::Command::Generate { route, body, save } => {
            let body = match body {
                Some(body) => body,
                None => collect_body()?.content,
            };
            enforce_body_limit(&body)?;

            let gate = start(&config)?;
            let response = service::handle(&gate, route, &body, save)
                .with_context(|| format!("{} failed", route.path()))?;

            print_json(response);
            Ok(())
        }
    }
}

fn start(config: &config::AppConfig) -> anyhow::Result<RequestGate<AssistantModel>> {
    log::info!(
        "starting assistant: {} via {} (would bind {})",
        config.model,
        config.backend,
        config.bind_address()
    );

    let model = config
        .build_assistant()
        .context("failed to initialize the assistant")?;

    Ok(RequestGate::new(model))
}

fn collect_body() -> anyhow::Result<input::InputBody> {
    if input::InputCollector::stdin_is_terminal() {
        return Ok(input::InputBody::empty());
    }

    let input = input::InputCollector::collect().context("failed to read from STDIN")?;
    log::debug!("read {} byte request body from STDIN", input.bytes);
    Ok(input)
}

fn enforce_body_limit(body: &str) -> anyhow::Result<()> {
    if body.len() > MAX_BODY_BYTES {
        return Err(anyhow!(
            "request body is too long ({} bytes > {} allowed)",
            body.len(),
            MAX_BODY_BYTES
        ));
    }

    Ok(())
}

fn print_json(value: serde_json::Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(json_text) => println!("{json_text}"),
        Err(error) => eprintln!("failed to serialize CLI output: {error}"),
    }
}
