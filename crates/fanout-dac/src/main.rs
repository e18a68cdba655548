use std::sync::Arc;

use clap::Parser;
use fanout_dac::config::{Cli, Command};
use fanout_dac::{ContentInfo, ContentRecordService, DacConfig, RecordResult};
use fanout_storage::{FileGateway, LegacyBackend};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

fn parse_metadata(raw: Option<String>) -> anyhow::Result<Map<String, Value>> {
    let Some(text) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(&text)? {
        Value::Object(metadata) => Ok(metadata),
        other => anyhow::bail!("Metadata must be a JSON object, got {}", other),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn finish_record(result: RecordResult) -> anyhow::Result<()> {
    print_json(&result)?;
    if let Some(error) = result.error {
        anyhow::bail!("Record failed: {}", error);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, command output to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => DacConfig::load(path)?,
        None => DacConfig::default(),
    };

    // The file store has no versions, so writes are unconditional
    let gateway = Arc::new(FileGateway::new(&cli.root).await?);
    let backend = Arc::new(LegacyBackend::new(gateway));
    let service = ContentRecordService::init(&config, &cli.referrer, backend)?;

    match cli.command {
        Command::Login => {
            let outcome = service.on_user_login().join().await?;
            print_json(&json!({
                "domain": service.domain(),
                "registered": outcome.registered,
                "warmed": outcome.precreate.warmed,
                "materialized": outcome.precreate.materialized,
                "failed": outcome
                    .precreate
                    .failed
                    .iter()
                    .map(|(kind, error)| json!({ "kind": kind, "error": error }))
                    .collect::<Vec<_>>(),
            }))?;
        }
        Command::RecordContent { content, metadata } => {
            let info = ContentInfo::new(content).with_metadata(parse_metadata(metadata)?);
            finish_record(service.record_new_content_sync(&info).await)?;
        }
        Command::RecordInteraction { content, metadata } => {
            let info = ContentInfo::new(content).with_metadata(parse_metadata(metadata)?);
            finish_record(service.record_interaction_sync(&info).await)?;
        }
        Command::ShowIndex { kind } => {
            let index = service.engine().fetch_index(kind.into()).await?;
            print_json(&index)?;
        }
        Command::ShowPage { kind, page } => {
            let kind = kind.into();
            let page = match page {
                Some(number) => service.engine().page(kind, number).await?,
                None => service.engine().current_page(kind).await?,
            };
            print_json(&page)?;
        }
        Command::Owners => {
            for owner in service.registry().owners().await? {
                println!("{}", owner);
            }
        }
    }

    Ok(())
}
