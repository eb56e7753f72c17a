//! Zukus Engine - Main entry point.

use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zukus_domain::CharacterId;
use zukus_engine::{use_cases::SheetOperation, App, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the binary may run from `crates/engine`).
    let env_files = load_dotenv_from_repo_root();
    let config = AppConfig::from_env()?;

    // Logs go to stderr; stdout carries the JSON output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    for path in env_files {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let app = App::from_config(&config);
    let sheets = &app.use_cases.character_sheet;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [command, id] if command == "derive" => {
            let sheet = sheets.derive(&parse_id(id)?).await?;
            print_json(&sheet, config.pretty_json)
        }
        [command, id, operation, rest @ ..] if command == "apply" => {
            let operation = SheetOperation::parse(operation, rest)?;
            let applied = sheets.apply(&parse_id(id)?, &operation).await?;
            print_json(&applied, config.pretty_json)?;
            if !applied.result.success {
                bail!(
                    "{} refused: {}",
                    applied.operation,
                    applied.result.error.unwrap_or_default()
                );
            }
            Ok(())
        }
        [command] if command == "list" => {
            let summaries = sheets.list().await?;
            print_json(&summaries, config.pretty_json)
        }
        [command, ..] if !matches!(command.as_str(), "derive" | "apply" | "list") => {
            bail!("Unknown command: {command}\n\n{}", usage())
        }
        _ => bail!("{}", usage()),
    }
}

fn parse_id(raw: &str) -> anyhow::Result<CharacterId> {
    raw.parse()
        .with_context(|| format!("invalid character id {raw:?}"))
}

fn print_json(value: &impl Serialize, pretty: bool) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("serializing output")?;
    println!("{json}");
    Ok(())
}

fn usage() -> String {
    let mut usage = String::from(
        "Usage: zukus-engine <command>\n\nCommands:\n  derive <character-id>\n  apply <character-id> <operation> [args...]\n  list\n\nOperations:",
    );
    for (name, synopsis) in SheetOperation::USAGE {
        usage.push_str(&format!("\n  {name} {synopsis}"));
    }
    usage
}

/// Loads `.env.local` then `.env`; earlier files win. Returns the files found.
fn load_dotenv_from_repo_root() -> Vec<PathBuf> {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    [".env.local", ".env"]
        .into_iter()
        .map(|filename| repo_root.join(filename))
        .filter(|path| path.exists() && dotenvy::from_path(path).is_ok())
        .collect()
}
