//! Subcommand execution.

use std::io::Write;
use std::sync::Arc;

use shelflife_core::{format_expiry, parse_production_date, Connectivity};
use shelflife_sync::{LoadOutcome, LoadReport, SearchWorker, Session, UiSink};
use tracing::info;

use crate::cli::{Cli, Command};
use crate::config;
use crate::console::{render_hit, render_record, ConsoleUi};
use crate::error::CliError;

/// Load the config, open a session and run the requested command.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = config::load(cli.config.as_deref())?;
    let connectivity = Connectivity::from(!cli.offline);
    let ui: Arc<dyn UiSink> = Arc::new(ConsoleUi::new());

    info!(
        dataset_url = %config.dataset_url,
        cache_path = %config.cache_path.display(),
        ?connectivity,
        "opening session"
    );
    let session = Session::from_config(&config, ui, connectivity)?;

    let mut out = std::io::stdout();
    run_command(&session, &cli.command, &mut out).await
}

/// Run one command against an open session, writing results to `out`.
pub async fn run_command(
    session: &Session,
    command: &Command,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match command {
        Command::Lookup { code } => {
            session.orchestrator().load().await;
            let record = session.lookup(code).ok_or_else(|| CliError::NotFound {
                code: code.trim().to_string(),
            })?;
            writeln!(out, "{}", render_record(&record))?;
        }
        Command::Search { term } => {
            session.orchestrator().load().await;
            let mut worker = SearchWorker::spawn()?;
            worker.set_data(&session.index());
            worker.search(term.as_str());
            let hits = worker.latest_results().await.unwrap_or_default();
            if hits.is_empty() {
                writeln!(out, "No matching products")?;
            }
            for hit in hits {
                writeln!(
                    out,
                    "{}",
                    render_hit(&hit.code, &hit.name, hit.shelf_life_days)
                )?;
            }
        }
        Command::Expiry { code, produced } => {
            let produced = parse_production_date(produced)?;
            session.orchestrator().load().await;
            let record = session.lookup(code).ok_or_else(|| CliError::NotFound {
                code: code.trim().to_string(),
            })?;
            let expires = session.expiry(&record.code, Some(produced))?;
            writeln!(
                out,
                "{} {}: expires {}",
                record.code,
                record.name,
                format_expiry(expires)
            )?;
        }
        Command::Refresh => match session.force_refresh().await {
            Some(report) => writeln!(out, "{}", describe_report(&report))?,
            None => writeln!(out, "Refresh skipped: offline")?,
        },
        Command::ClearCache => {
            session.orchestrator().store().clear().await;
            writeln!(out, "Cache cleared")?;
        }
        Command::Watch => {
            let report = session.start().await;
            writeln!(out, "{}", describe_report(&report))?;
            writeln!(out, "Watching for updates. Press Ctrl-C to stop.")?;
            out.flush()?;
            tokio::signal::ctrl_c().await?;
            session.stop();
            info!("watch stopped");
        }
    }
    Ok(())
}

pub fn describe_report(report: &LoadReport) -> String {
    let source = match report.outcome {
        LoadOutcome::Fetched => "fetched from endpoint",
        LoadOutcome::Cached => "served from cache",
        LoadOutcome::Revalidated => "cache revalidated",
        LoadOutcome::StaleCache => "served from stale cache",
        LoadOutcome::Fallback => "sample data",
        LoadOutcome::Skipped => "load skipped",
    };
    format!("{} products ({source})", report.records)
}
