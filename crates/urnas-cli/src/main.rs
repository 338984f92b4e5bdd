mod display;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use urnas_core::catalog::{self, CYCLES, STATES};
use urnas_core::{HarvestConfig, NoEnrichment, RoundCode, SectionLayout, SectionSink};
use urnas_fetch::{
    ClientOptions, DownloadOrchestrator, DownloadRequest, DownloadStats, Fetcher,
    RateLimitedClient, ResourceNavigator,
};
use urnas_pipeline::{IngestionPipeline, PipelineOptions};
use urnas_store::{SnapshotReader, SnapshotStore};

const DEFAULT_CONFIG: &str = "urnas.toml";

#[derive(Parser)]
#[command(
    name = "urnas",
    about = "Harvest, compile, and inspect polling-station ballot files",
    version
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// TOML config file (defaults to ./urnas.toml when present)
    #[arg(long, global = true, env = "URNAS_CONFIG")]
    config: Option<PathBuf>,

    /// Root for raw downloads and compiled stores
    #[arg(long, global = true, env = "URNAS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Authority API root
    #[arg(long, global = true, env = "URNAS_BASE_URL")]
    base_url: Option<String>,

    /// Requests per second
    #[arg(long, global = true)]
    rate_limit: Option<u32>,

    /// In-flight file and section budget
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Clone)]
struct RoundArgs {
    /// Authority round code
    #[arg(long, default_value = "406")]
    round: String,

    /// Election cycle (derived from the round code when omitted)
    #[arg(long)]
    cycle: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// List election cycles and the rounds the authority has published
    Elections {
        /// Only print the built-in catalog
        #[arg(long)]
        offline: bool,
    },

    /// Summarise a state's municipalities, zones, and sections
    Info {
        state: String,
        #[command(flatten)]
        round: RoundArgs,
    },

    /// Download one state's files without compiling
    Download {
        state: String,
        #[command(flatten)]
        round: RoundArgs,
        /// File types to keep, e.g. bu,rdv,logjez
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
        /// Random sample of at most this many sections
        #[arg(long)]
        max_sections: Option<usize>,
        /// Restrict to these municipality codes
        #[arg(long = "municipality")]
        municipalities: Vec<String>,
    },

    /// Download a few sections from several states
    Sample {
        #[command(flatten)]
        round: RoundArgs,
        #[arg(long, value_delimiter = ',', default_value = "ac,ce,df,sp,rs")]
        states: Vec<String>,
        /// Sections per state
        #[arg(long, default_value_t = 20)]
        sections: usize,
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },

    /// Download states and compile them into the store as sections finish
    Harvest {
        /// Round codes to harvest, in order
        #[arg(long, value_delimiter = ',', default_value = "406,407")]
        rounds: Vec<String>,
        /// States to harvest (all when omitted)
        #[arg(long, value_delimiter = ',')]
        states: Vec<String>,
        /// States downloaded at the same time
        #[arg(long, default_value_t = 3)]
        concurrent_states: usize,
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },

    /// Compile ballot files already on disk
    Build {
        /// Clear the store and recompile everything
        #[arg(long)]
        rebuild: bool,
        /// Refuse a rebuild below this many ballot files
        #[arg(long)]
        min_files: Option<usize>,
    },

    /// Decode one ballot file and print it as JSON
    Decode { file: PathBuf },

    /// Report on the published snapshot (read-only)
    Stats {
        /// Snapshot to read instead of the configured one
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Run an ad-hoc SQL query
        #[arg(long, conflicts_with = "section")]
        sql: Option<String>,
        /// Print one compiled section, e.g. 1T/df/97012/0001/0001
        #[arg(long)]
        section: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    info!("urnas v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli.global)?;

    match cli.command {
        Command::Elections { offline } => cmd_elections(&config, offline),
        Command::Info { state, round } => cmd_info(&config, &state, &round),
        Command::Download {
            state,
            round,
            types,
            max_sections,
            municipalities,
        } => {
            let (cycle, code) = resolve_round(&round)?;
            let mut req = DownloadRequest::new(cycle, code, state.to_lowercase());
            req.file_types = types;
            req.max_sections = max_sections;
            req.municipalities = municipalities;
            let stats = runtime()?.block_on(download_one(&config, &req))?;
            display::print_download_stats(&format!("Download {}", req.state.to_uppercase()), &stats);
            Ok(())
        }
        Command::Sample {
            round,
            states,
            sections,
            types,
        } => cmd_sample(&config, &round, &states, sections, &types),
        Command::Harvest {
            rounds,
            states,
            concurrent_states,
            types,
        } => cmd_harvest(&config, &rounds, &states, concurrent_states, &types),
        Command::Build { rebuild, min_files } => cmd_build(&config, rebuild, min_files),
        Command::Decode { file } => {
            let record = urnas_ballot::decode_file(&file)
                .with_context(|| format!("decoding {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Stats {
            snapshot,
            sql,
            section,
        } => cmd_stats(&config, snapshot, sql, section),
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &GlobalArgs) -> anyhow::Result<HarvestConfig> {
    let mut config = match &args.config {
        Some(path) => HarvestConfig::from_file(path)?,
        None if std::path::Path::new(DEFAULT_CONFIG).exists() => {
            HarvestConfig::from_file(std::path::Path::new(DEFAULT_CONFIG))?
        }
        None => HarvestConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(url) = &args.base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(rate) = args.rate_limit {
        config.rate_limit = rate;
    }
    if let Some(n) = args.max_concurrent {
        config.max_concurrent = n;
    }
    Ok(config)
}

fn resolve_round(args: &RoundArgs) -> anyhow::Result<(String, RoundCode)> {
    let cycle = match &args.cycle {
        Some(c) => c.clone(),
        None => match catalog::cycle_for_round(&args.round) {
            Some(c) => c.cycle.to_string(),
            None => bail!("unknown round code {}; pass --cycle", args.round),
        },
    };
    Ok((cycle, RoundCode::new(args.round.clone())))
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("starting async runtime")
}

fn fetcher(config: &HarvestConfig) -> anyhow::Result<Arc<dyn Fetcher>> {
    let client = RateLimitedClient::new(ClientOptions::from(config))?;
    Ok(Arc::new(client))
}

fn navigator(config: &HarvestConfig) -> anyhow::Result<ResourceNavigator> {
    Ok(ResourceNavigator::new(fetcher(config)?, &config.base_url))
}

// ── Network commands ──

fn cmd_elections(config: &HarvestConfig, offline: bool) -> anyhow::Result<()> {
    display::print_cycles(CYCLES);
    if offline {
        return Ok(());
    }
    let nav = navigator(config)?;
    match runtime()?.block_on(nav.list_elections()) {
        Ok(catalog) => display::print_catalog(&catalog),
        Err(e) => warn!(error = %e, "could not list published elections"),
    }
    Ok(())
}

fn cmd_info(config: &HarvestConfig, state: &str, round: &RoundArgs) -> anyhow::Result<()> {
    let (cycle, code) = resolve_round(round)?;
    let state = state.to_lowercase();
    let nav = navigator(config)?;
    let manifest = runtime()?.block_on(nav.state_manifest(&cycle, &code, &state))?;
    match manifest {
        Some(m) => display::print_state_manifest(&m, &cycle, code.as_str()),
        None => println!("{cycle}/{code}: nothing published for {state}", code = code.as_str()),
    }
    Ok(())
}

async fn download_one(config: &HarvestConfig, req: &DownloadRequest) -> anyhow::Result<DownloadStats> {
    let orchestrator = DownloadOrchestrator::from_config(navigator(config)?, config);
    Ok(orchestrator.download_state(req).await?)
}

fn cmd_sample(
    config: &HarvestConfig,
    round: &RoundArgs,
    states: &[String],
    sections: usize,
    types: &[String],
) -> anyhow::Result<()> {
    let (cycle, code) = resolve_round(round)?;
    let rt = runtime()?;
    let mut total = DownloadStats::default();
    for state in states {
        let mut req = DownloadRequest::new(cycle.clone(), code.clone(), state.trim().to_lowercase());
        req.file_types = types.to_vec();
        req.max_sections = Some(sections);
        match rt.block_on(download_one(config, &req)) {
            Ok(stats) => {
                info!(state = %req.state, downloaded = stats.downloaded, "sample state done");
                total.merge(&stats);
            }
            Err(e) => {
                warn!(state = %req.state, error = %e, "sample state failed");
                total.errors += 1;
            }
        }
    }
    display::print_download_stats("Sample", &total);
    Ok(())
}

fn cmd_harvest(
    config: &HarvestConfig,
    rounds: &[String],
    states: &[String],
    concurrent_states: usize,
    types: &[String],
) -> anyhow::Result<()> {
    let rounds = rounds
        .iter()
        .map(|r| {
            resolve_round(&RoundArgs {
                round: r.trim().to_string(),
                cycle: None,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let states: Vec<String> = if states.is_empty() {
        STATES.iter().map(|s| s.to_string()).collect()
    } else {
        states.iter().map(|s| s.trim().to_lowercase()).collect()
    };

    let started = Utc::now();
    let pipeline = IngestionPipeline::start(
        SnapshotStore::open(&config.db_path())?,
        SectionLayout::new(config.raw_dir()),
        PipelineOptions::from_config(config),
        Box::new(NoEnrichment),
    )?;
    let from_disk = pipeline.compile_remaining_from_disk();
    info!(from_disk, "queued sections already on disk");

    let sink: Arc<dyn SectionSink> = Arc::new(pipeline.handle());
    // One orchestrator for every round and state keeps the concurrency budget global.
    let orchestrator = DownloadOrchestrator::from_config(navigator(config)?, config).with_sink(sink);
    let rt = runtime()?;
    let mut total = DownloadStats::default();

    for (cycle, code) in &rounds {
        info!(cycle = %cycle, round = code.as_str(), states = states.len(), "harvesting round");
        let results: Vec<(String, Result<DownloadStats, urnas_fetch::FetchError>)> =
            rt.block_on(
                stream::iter(states.iter().cloned())
                    .map(|state| {
                        let orchestrator = &orchestrator;
                        let mut req = DownloadRequest::new(cycle.clone(), code.clone(), state.clone());
                        req.file_types = types.to_vec();
                        async move { (state, orchestrator.download_state(&req).await) }
                    })
                    .buffer_unordered(concurrent_states.max(1))
                    .collect(),
            );
        for (state, result) in results {
            match result {
                Ok(stats) => total.merge(&stats),
                Err(e) => {
                    warn!(state = %state, error = %e, "state download failed");
                    total.errors += 1;
                }
            }
        }
    }
    // Releases the sink so the pipeline can drain.
    drop(orchestrator);

    display::print_download_stats("Harvest", &total);
    let report = pipeline.finish()?;
    display::print_pipeline_report(&report, (Utc::now() - started).num_seconds());
    Ok(())
}

// ── Local commands ──

fn cmd_build(config: &HarvestConfig, rebuild: bool, min_files: Option<usize>) -> anyhow::Result<()> {
    let started = Utc::now();
    let store = SnapshotStore::open(&config.db_path())?;
    let layout = SectionLayout::new(config.raw_dir());
    let options = PipelineOptions::from_config(config);

    let pipeline = if rebuild {
        let min_files = min_files.unwrap_or(config.min_rebuild_files);
        IngestionPipeline::rebuild(store, layout, options, Box::new(NoEnrichment), min_files)?
    } else {
        let pipeline = IngestionPipeline::start(store, layout, options, Box::new(NoEnrichment))?;
        let queued = pipeline.compile_remaining_from_disk();
        info!(queued, "queued sections from disk");
        pipeline
    };

    let report = pipeline.finish()?;
    display::print_pipeline_report(&report, (Utc::now() - started).num_seconds());
    Ok(())
}

fn cmd_stats(
    config: &HarvestConfig,
    snapshot: Option<PathBuf>,
    sql: Option<String>,
    section: Option<String>,
) -> anyhow::Result<()> {
    let path = snapshot.unwrap_or_else(|| config.snapshot_path());
    let reader = SnapshotReader::open(&path)
        .with_context(|| format!("no readable snapshot at {}", path.display()))?;

    if let Some(sql) = sql {
        let batches = reader.query(&sql, &[])?;
        return display::print_batches(&batches);
    }

    if let Some(id) = section {
        let sql = format!(
            "SELECT * FROM sections WHERE id = '{}'",
            id.replace('\'', "''")
        );
        let batches = reader.query(&sql, &[])?;
        let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
            bail!("section {id} is not in {}", path.display());
        };
        return display::print_section_card(batch);
    }

    let summary = reader.summary()?;
    let rounds = reader.round_counts()?;
    display::print_summary(&path, &summary, &rounds);
    Ok(())
}
