//! Process wrapper around the indexing pipeline and the HTTP server
//! (§6): `serve` runs both the scheduler and the API, `index` runs a
//! one-shot pass over a directory, `settings` reads or edits the
//! persisted configuration snapshot directly.

mod config;
mod wiring;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::AppConfig;
use context_indexer::{DiscoveryConfig, FileDiscovery};
use context_server::SettingsPatch;
use std::path::PathBuf;
use std::time::Duration;
use wiring::Runtime;

#[derive(Parser)]
#[command(name = "context", version, about = "Local RAG indexing and search workspace")]
struct Cli {
    /// Path to a TOML config file. Missing is fine (defaults apply);
    /// present-but-malformed is a configuration error (exit code 2).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server, optionally watching a folder for changes.
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        watch: Option<PathBuf>,
    },
    /// Register a directory and run the indexing pipeline to completion.
    Index {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "fast")]
        mode: IndexMode,
    },
    /// Inspect or update the persisted settings snapshot.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings as JSON.
    Get,
    /// Apply one key=value pair and persist it.
    Set { key: String, value: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexMode {
    Fast,
    Deep,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Command::Serve { bind, watch } => run_serve(config, bind, watch).await,
        Command::Index { path, mode } => run_index(config, path, mode).await,
        Command::Settings { action } => run_settings(config, action),
    };

    if let Err(err) = result {
        log::error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run_serve(config: AppConfig, bind: Option<String>, watch: Option<PathBuf>) -> Result<()> {
    let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());
    let runtime = Runtime::build(&config)?;
    runtime.scheduler.start();

    if let Some(root) = watch {
        let discovery = std::sync::Arc::new(FileDiscovery::new(root, runtime.storage.clone(), DiscoveryConfig::default()));
        let registered = discovery.initial_scan().context("initial directory scan")?;
        log::info!("registered {registered} files from watched folder");
        let _watcher = discovery.watch().context("starting folder watch")?;
        // Keep the watcher alive for the lifetime of the process.
        std::mem::forget(_watcher);
    }

    let deps = runtime.into_server_deps();
    context_server::serve(&bind_addr, deps).await
}

async fn run_index(config: AppConfig, path: PathBuf, mode: IndexMode) -> Result<()> {
    if !path.exists() {
        bail!("path does not exist: {}", path.display());
    }
    let runtime = Runtime::build(&config)?;
    let discovery = FileDiscovery::new(path, runtime.storage.clone(), DiscoveryConfig::default());
    let registered = discovery.initial_scan().context("initial directory scan")?;
    log::info!("registered {registered} files");

    if matches!(mode, IndexMode::Deep) {
        log::info!("deep mode requested; the scheduler still runs fast-before-deep per file (§4.6)");
    }

    runtime.scheduler.start();
    loop {
        let pending_fast = runtime.storage.list_pending_fast()?.len();
        let pending_deep = runtime.storage.list_pending_deep()?.len();
        if pending_fast == 0 && pending_deep == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    runtime.scheduler.stop();

    let status = runtime.state.status();
    if let Some(error) = &status.last_error {
        bail!("indexing finished with errors: {error}");
    }
    println!("indexing complete");
    Ok(())
}

fn run_settings(config: AppConfig, action: SettingsAction) -> Result<()> {
    let store = context_server::SettingsStore::load(&config.settings_path)?;
    match action {
        SettingsAction::Get => {
            let snapshot = store.snapshot();
            println!("{}", serde_json::to_string_pretty(&*snapshot)?);
        }
        SettingsAction::Set { key, value } => {
            let patch = patch_from_key_value(&key, &value)?;
            let updated = store.update(patch)?;
            println!("{}", serde_json::to_string_pretty(&*updated)?);
        }
    }
    Ok(())
}

/// Parses one `key=value` CLI argument into a [`SettingsPatch`]. Matches
/// the recognized-keys list (§6); an unknown key is a configuration
/// error, not a silently ignored no-op.
fn patch_from_key_value(key: &str, value: &str) -> Result<SettingsPatch> {
    let mut patch = SettingsPatch::default();
    match key {
        "vision_max_pixels" => patch.vision_max_pixels = Some(value.parse()?),
        "video_max_pixels" => patch.video_max_pixels = Some(value.parse()?),
        "embed_batch_size" => patch.embed_batch_size = Some(value.parse()?),
        "embed_batch_delay_ms" => patch.embed_batch_delay_ms = Some(value.parse()?),
        "vision_batch_delay_ms" => patch.vision_batch_delay_ms = Some(value.parse()?),
        "search_result_limit" => patch.search_result_limit = Some(value.parse()?),
        "qa_context_limit" => patch.qa_context_limit = Some(value.parse()?),
        "max_snippet_length" => patch.max_snippet_length = Some(value.parse()?),
        "summary_max_tokens" => patch.summary_max_tokens = Some(value.parse()?),
        "pdf_one_chunk_per_page" => patch.pdf_one_chunk_per_page = Some(value.parse()?),
        "rag_chunk_size" => patch.rag_chunk_size = Some(value.parse()?),
        "rag_chunk_overlap" => patch.rag_chunk_overlap = Some(value.parse()?),
        "pdf_fast_allow_vision_fallback" => patch.pdf_fast_allow_vision_fallback = Some(value.parse()?),
        "default_indexing_mode" => {
            patch.default_indexing_mode = Some(match value {
                "fast" => context_protocol::IndexingMode::Fast,
                "deep" => context_protocol::IndexingMode::Deep,
                other => bail!("invalid default_indexing_mode: {other} (expected fast|deep)"),
            });
        }
        "pdf_mode" => {
            patch.pdf_mode = Some(match value {
                "text" => context_protocol::PdfMode::Text,
                "vision" => context_protocol::PdfMode::Vision,
                other => bail!("invalid pdf_mode: {other} (expected text|vision)"),
            });
        }
        other => bail!("unrecognized settings key: {other}"),
    }
    Ok(patch)
}
