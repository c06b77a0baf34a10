//! Command-line entry point: pick a run mode, attach to the browser
//! session, drive one reconciliation run and merge the result into the
//! ledger.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use fantoccini::ClientBuilder;
use tracing::{info, warn};

use betledger::infrastructure::config::AppConfig;
use betledger::infrastructure::logging::init_logging;
use betledger::infrastructure::page::FantocciniPage;
use betledger::infrastructure::store::{LedgerStore, MergeMode};
use betledger::scraping::engine::ReconciliationEngine;
use betledger::scraping::modes::RunMode;

const USAGE: &str = "\
betledger — scrape betting history into a CSV ledger

USAGE:
    betledger [OPTIONS] incremental <N>   process the N most recent events, keep the new ones
    betledger [OPTIONS] date <DD.MM.YYYY> collect events placed on one date
    betledger [OPTIONS] rewrite <N>       collect N events and replace the ledger

OPTIONS:
    --config <path>   configuration file (default: ./betledger.toml if present)
    --store <path>    ledger CSV location (overrides configuration)
    -h, --help        show this help
";

struct CliArgs {
    config: Option<PathBuf>,
    store: Option<PathBuf>,
    mode: RunMode,
}

fn parse_args() -> Result<Option<CliArgs>> {
    let mut config = None;
    let mut store = None;
    let mut mode = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(PathBuf::from(
                    args.next().context("missing value for --config")?,
                ));
            }
            "--store" => {
                store = Some(PathBuf::from(
                    args.next().context("missing value for --store")?,
                ));
            }
            "-h" | "--help" => return Ok(None),
            "incremental" => {
                let n: u64 = args
                    .next()
                    .context("missing event count for incremental")?
                    .parse()
                    .context("event count must be a number")?;
                mode = Some(RunMode::Incremental(n));
            }
            "rewrite" => {
                let n: u64 = args
                    .next()
                    .context("missing event count for rewrite")?
                    .parse()
                    .context("event count must be a number")?;
                mode = Some(RunMode::Rewrite(n));
            }
            "date" => {
                let raw = args.next().context("missing date for date mode")?;
                let date = NaiveDate::parse_from_str(&raw, "%d.%m.%Y")
                    .with_context(|| format!("'{raw}' is not a DD.MM.YYYY date"))?;
                mode = Some(RunMode::ByDate(date));
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    let Some(mode) = mode else {
        bail!("no run mode given");
    };
    Ok(Some(CliArgs {
        config,
        store,
        mode,
    }))
}

async fn run(args: CliArgs) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(store_path) = args.store {
        config.store_path = Some(store_path);
    }
    init_logging(&config.logging)?;
    info!("betledger starting, mode {:?}", args.mode);

    let client = ClientBuilder::native()
        .connect(&config.webdriver_url)
        .await
        .with_context(|| {
            format!(
                "failed to attach to the WebDriver session at {}",
                config.webdriver_url
            )
        })?;
    let page = FantocciniPage::new(client, config.selectors.clone(), config.timings.clone());

    page.goto(&config.history_url).await?;
    page.wait_for_list()
        .await
        .context("the betting-history list never appeared; is the session logged in?")?;
    if config.scraping.preload {
        page.preload().await?;
    }

    let store = LedgerStore::new(config.store_path());
    let existing = store
        .load_existing_ids()
        .with_context(|| format!("failed to read the ledger at {}", store.path().display()))?;
    let today = chrono::Local::now().date_naive();

    let engine = ReconciliationEngine::new(
        &page,
        config.scraping.clone(),
        args.mode,
        existing,
        today,
    );
    let report = engine.run().await;

    let collected = report.collected_count();
    let achieved = match args.mode {
        RunMode::Rewrite(_) => collected as u64,
        _ => report.processed,
    };
    if let Some(requested) = report.requested {
        if achieved < requested {
            warn!("requested {requested} events but the run reached only {achieved} ({collected} collected)");
        }
    }

    let mut records = report.records;
    if records.is_empty() && args.mode.merge_mode() == MergeMode::Prepend {
        info!("nothing new to persist, ledger left as is");
    } else {
        let outcome = store
            .merge_write(&mut records, args.mode.merge_mode(), today)
            .with_context(|| format!("failed to update the ledger at {}", store.path().display()))?;
        info!(
            "ledger updated: {} new rows, {} existing kept",
            outcome.written_new, outcome.kept_existing
        );
        if let Some(backup) = outcome.backup {
            info!("previous ledger preserved at {}", backup.display());
        }
    }

    if let Err(err) = page.into_client().close().await {
        warn!("failed to close the browser session cleanly: {err}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => {
            eprint!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("error: {err}");
            eprint!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
