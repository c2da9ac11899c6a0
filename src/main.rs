use clap::{Parser, Subcommand};
use cryoet_db::db::RichTomogram;
use cryoet_db::secrets::{FirstRunSeed, VaultClient};
use cryoet_db::{Config, EtlPipeline, QueryService, RunOutcome, WarehouseError};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use std::process::ExitCode;
use tabled::{Table, Tabled, settings::Style};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Secrets were seeded; the command must be run again (EX_TEMPFAIL).
const EXIT_RERUN_REQUIRED: u8 = 75;
const EXIT_FATAL: u8 = 1;

#[derive(Parser)]
#[command(name = "cryoet-db")]
#[command(version)]
#[command(about = "CryoET-DB loader and query tool")]
struct Cli {
    /// Configuration file (defaults to ./cryoet.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load tomograms and annotations from the labels CSV
    Load,

    #[command(flatten)]
    Query(QueryCommand),
}

#[derive(Subcommand)]
enum QueryCommand {
    /// Count annotations for a tomogram
    CountAnnotations {
        #[arg(long)]
        tomo_name: String,
    },

    /// Find tomograms with more than N annotations
    FindRichTomograms {
        #[arg(long, default_value = "20")]
        min_annotations: i64,
    },

    /// Resolve an annotation to its volume slice and point
    Visualize {
        #[arg(long)]
        annotation_id: i64,
    },
}

#[derive(Tabled)]
struct RichRow {
    tomo_name: String,
    annotation_count: i64,
}

impl From<RichTomogram> for RichRow {
    fn from(r: RichTomogram) -> Self {
        Self {
            tomo_name: r.tomo_name,
            annotation_count: r.annotation_count,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let default_level = if cli.verbose {
        "debug".to_string()
    } else {
        cfg.loglevel.clone()
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    ExitCode::from(exit_status(run(cli.command, cfg).await))
}

/// Process status for a finished command; fatal errors are logged here.
fn exit_status(result: Result<u8, WarehouseError>) -> u8 {
    match result {
        Ok(status) => status,
        Err(e) if e.is_connection_failure() => {
            error!("{e}. Ensure the database is running and healthy.");
            EXIT_FATAL
        }
        Err(e) => {
            error!("{e}");
            EXIT_FATAL
        }
    }
}

/// A missing source is a clean abort, not a failure.
fn load_status(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Loaded(_) | RunOutcome::SourceMissing(_) => 0,
        RunOutcome::SeededAwaitingRerun => EXIT_RERUN_REQUIRED,
    }
}

async fn run(command: Commands, cfg: Config) -> Result<u8, WarehouseError> {
    let store = VaultClient::new(&cfg.vault)?;

    let query = match command {
        Commands::Load => {
            let pipeline = EtlPipeline::new(store, cfg, FirstRunSeed::from_env());
            let outcome = pipeline.run().await?;
            if outcome == RunOutcome::SeededAwaitingRerun {
                info!("Re-run the command to load data with the stored credentials");
            }
            return Ok(load_status(&outcome));
        }
        Commands::Query(query) => query,
    };

    let service = QueryService::connect(&store, &cfg).await?;
    let result = run_query(&service, query, &cfg).await;
    service.close().await;
    result.map(|()| 0)
}

async fn run_query(
    service: &QueryService,
    query: QueryCommand,
    cfg: &Config,
) -> Result<(), WarehouseError> {
    match query {
        QueryCommand::CountAnnotations { tomo_name } => {
            let count = service.count_annotations(&tomo_name).await?;
            println!("Tomogram '{tomo_name}' has {count} annotations.");
        }
        QueryCommand::FindRichTomograms { min_annotations } => {
            let rows = service.find_rich(min_annotations).await?;
            if rows.is_empty() {
                println!("No tomograms found with > {min_annotations} annotations.");
            } else {
                let rows: Vec<RichRow> = rows.into_iter().map(RichRow::from).collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
        QueryCommand::Visualize { annotation_id } => {
            match service.lookup_for_visualization(annotation_id).await? {
                Some(target) => {
                    println!("Annotation ID: {annotation_id}");
                    println!(
                        "Volume: {}",
                        target.volume_array_path(&cfg.data_dir).display()
                    );
                    println!("Slice: Z={}", target.slice_index());
                    println!("Point: x={}, y={}", target.coord_x, target.coord_y);
                }
                None => eprintln!("Error: Annotation with ID {annotation_id} not found."),
            }
        }
    }
    Ok(())
}
