//! adpulse CLI entry point

use adpulse::{
    commands::{
        cmd_add_source, cmd_edit_source, cmd_init, cmd_list_mappings, cmd_list_runs,
        cmd_list_sources, cmd_monthly, cmd_platforms, cmd_remove_mapping, cmd_remove_source,
        cmd_set_mapping, cmd_set_source_active, cmd_status, cmd_suggest_mappings, cmd_summary,
        cmd_sync, cmd_trend, print_init, print_mappings, print_monthly, print_platforms,
        print_remove_stats, print_runs, print_source, print_source_completions, print_sources,
        print_status, print_suggestions, print_summary, print_sync_report, print_trend,
        AddSourceOptions, EditSourceOptions, InitOptions, RangeOptions, SyncOptions,
    },
    config::Config,
    error::{Error, Result},
    meta::{DataType, MetaDb},
    metrics::RangePreset,
    progress::LogWriterFactory,
    sheets::GoogleSheetsClient,
    sync::SyncMode,
};
use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "adpulse")]
#[command(version, about = "Sync platform ads and sales sheets into daily marketing metrics", long_about = None)]
struct Cli {
    /// Path to config file or adpulse directory
    #[arg(short, long, global = true, env = "ADPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize adpulse configuration and database
    Init {
        /// Overwrite an existing config with defaults
        #[arg(long)]
        force: bool,
    },

    /// Manage registered sheet tabs
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Manage per-platform column mappings
    Mappings {
        #[command(subcommand)]
        action: MappingsAction,
    },

    /// Fetch a source's headers and suggest column mappings
    Suggest {
        /// Source ID (use 'adpulse sources list' to find it)
        source_id: String,
    },

    /// Sync active sources into daily metrics
    Sync {
        /// Only sync this source ID
        #[arg(long)]
        source: Option<String>,

        /// Fetch path (defaults to sync.mode from the config)
        #[arg(long, value_enum)]
        mode: Option<SyncMode>,
    },

    /// Totals and averages over a date range
    Summary {
        #[command(flatten)]
        range: RangeArgs,

        /// Only this platform
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Totals per platform over a date range
    Platforms {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Day-by-day totals over a date range
    Trend {
        #[command(flatten)]
        range: RangeArgs,

        /// Only this platform
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Month-by-platform rollups over a date range
    Monthly {
        #[command(flatten)]
        range: RangeArgs,

        /// Only this platform
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Show recent sync runs
    Runs {
        /// Only runs for this source ID
        #[arg(long)]
        source: Option<String>,

        /// Maximum number of runs
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show system status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum SourcesAction {
    /// List registered sources
    List {
        /// Output only source IDs (one per line, for scripting)
        #[arg(long)]
        ids_only: bool,

        /// Output source IDs with descriptions for shell completions
        #[arg(long, value_enum, hide = true)]
        completion: Option<Shell>,
    },

    /// Register a sheet tab
    Add {
        /// Sheet URL or sheet ID
        sheet: String,

        /// Platform the tab comes from, e.g. swiggy
        #[arg(short, long)]
        platform: String,

        /// What the tab holds
        #[arg(short = 't', long, value_enum)]
        data_type: DataType,

        /// Display name (defaults to "<platform> <data type>")
        #[arg(short, long)]
        name: Option<String>,

        /// Tab name to export
        #[arg(long)]
        tab_name: Option<String>,

        /// Tab grid id (overrides a gid in the URL)
        #[arg(long)]
        gid: Option<String>,
    },

    /// Change fields of a source
    Edit {
        source_id: String,

        #[arg(short, long)]
        name: Option<String>,

        /// New sheet URL or sheet ID
        #[arg(long)]
        sheet: Option<String>,

        #[arg(short, long)]
        platform: Option<String>,

        #[arg(short = 't', long, value_enum)]
        data_type: Option<DataType>,

        /// Tab name; an empty value clears it
        #[arg(long)]
        tab_name: Option<String>,

        /// Tab grid id; an empty value clears it
        #[arg(long)]
        gid: Option<String>,
    },

    /// Include a source in batch syncs
    Enable { source_id: String },

    /// Exclude a source from batch syncs
    Disable { source_id: String },

    /// Remove a source and its sync history
    Remove { source_id: String },
}

#[derive(Subcommand)]
enum MappingsAction {
    /// List custom mappings
    List {
        /// Only this platform
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Map a sheet header to a field
    Set {
        #[arg(short, long)]
        platform: String,

        #[arg(short = 't', long, value_enum)]
        data_type: DataType,

        /// Header as it appears in the sheet
        source_column: String,

        /// Canonical field (date, spend, impressions, clicks, sales, orders,
        /// campaign_name, city, brand) or a custom column name
        target: String,
    },

    /// Delete a mapping by ID
    Remove { mapping_id: String },
}

#[derive(Args, Clone, Default)]
struct RangeArgs {
    /// Named range (defaults to dashboard.default_range from the config)
    #[arg(short, long, value_enum, conflicts_with_all = ["from", "to", "all"])]
    range: Option<RangePreset>,

    /// First day, YYYY-MM-DD
    #[arg(long, conflicts_with = "all")]
    from: Option<NaiveDate>,

    /// Last day, YYYY-MM-DD
    #[arg(long, conflicts_with = "all")]
    to: Option<NaiveDate>,

    /// Every stored day
    #[arg(long)]
    all: bool,
}

impl From<RangeArgs> for RangeOptions {
    fn from(args: RangeArgs) -> Self {
        Self {
            preset: args.range,
            from: args.from,
            to: args.to,
            all: args.all,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { force } => {
            let stats = cmd_init(InitOptions {
                base_dir: cli.config.as_deref().map(base_dir_for),
                force,
            })
            .await?;
            if cli.json {
                print_json(&stats)?;
            } else {
                print_init(&stats);
            }
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "adpulse", &mut std::io::stdout());
            print_completion_extras(shell);
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;
    let db = MetaDb::new(&config.paths.db_file).await?;
    let json = cli.json;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Sources { action } => handle_sources(&db, action, json).await?,

        Commands::Mappings { action } => handle_mappings(&db, action, json).await?,

        Commands::Suggest { source_id } => {
            let client = GoogleSheetsClient::new(&config.sheets)?;
            let report = cmd_suggest_mappings(&db, &client, &source_id).await?;
            if json {
                print_json(&report)?;
            } else {
                print_suggestions(&report);
            }
        }

        Commands::Sync { source, mode } => {
            let client = GoogleSheetsClient::new(&config.sheets)?;
            let options = SyncOptions {
                source_id: source,
                mode: mode.unwrap_or(config.sync.mode),
                quiet: json,
            };
            let report = cmd_sync(&db, &client, &client, options).await?;

            if json {
                print_json(&report)?;
            } else {
                print_sync_report(&report);
            }

            if report.has_failures() {
                return Err(Error::Other(format!(
                    "{} of {} sources failed to sync",
                    report.failed,
                    report.results.len()
                )));
            }
        }

        Commands::Summary { range, platform } => {
            let report = cmd_summary(&config, &db, &range.into(), platform.as_deref()).await?;
            if json {
                print_json(&report)?;
            } else {
                print_summary(&report);
            }
        }

        Commands::Platforms { range } => {
            let report = cmd_platforms(&config, &db, &range.into()).await?;
            if json {
                print_json(&report)?;
            } else {
                print_platforms(&report);
            }
        }

        Commands::Trend { range, platform } => {
            let report = cmd_trend(&config, &db, &range.into(), platform.as_deref()).await?;
            if json {
                print_json(&report)?;
            } else {
                print_trend(&report);
            }
        }

        Commands::Monthly { range, platform } => {
            let report = cmd_monthly(&config, &db, &range.into(), platform.as_deref()).await?;
            if json {
                print_json(&report)?;
            } else {
                print_monthly(&report);
            }
        }

        Commands::Runs { source, limit } => {
            let runs = cmd_list_runs(&db, source.as_deref(), limit).await?;
            if json {
                print_json(&runs)?;
            } else {
                print_runs(&runs);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;
            if json {
                print_json(&status)?;
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

async fn handle_sources(db: &MetaDb, action: SourcesAction, json: bool) -> Result<()> {
    match action {
        SourcesAction::List {
            ids_only,
            completion,
        } => {
            let sources = cmd_list_sources(db).await?;

            if let Some(shell) = completion {
                print_source_completions(&sources, shell);
            } else if ids_only {
                for source in &sources {
                    println!("{}", source.id);
                }
            } else if json {
                print_json(&sources)?;
            } else {
                print_sources(&sources);
            }
        }

        SourcesAction::Add {
            sheet,
            platform,
            data_type,
            name,
            tab_name,
            gid,
        } => {
            let source = cmd_add_source(
                db,
                AddSourceOptions {
                    sheet,
                    platform,
                    data_type,
                    name,
                    tab_name,
                    gid,
                },
            )
            .await?;
            if json {
                print_json(&source)?;
            } else {
                println!("✓ Added source");
                print_source(&source);
            }
        }

        SourcesAction::Edit {
            source_id,
            name,
            sheet,
            platform,
            data_type,
            tab_name,
            gid,
        } => {
            let options = EditSourceOptions {
                name,
                sheet,
                platform,
                data_type,
                tab_name,
                gid,
            };
            let source = cmd_edit_source(db, &source_id, options).await?;
            if json {
                print_json(&source)?;
            } else {
                println!("✓ Updated source");
                print_source(&source);
            }
        }

        SourcesAction::Enable { source_id } => {
            let source = cmd_set_source_active(db, &source_id, true).await?;
            if json {
                print_json(&source)?;
            } else {
                println!("✓ Enabled source '{}'", source.name);
            }
        }

        SourcesAction::Disable { source_id } => {
            let source = cmd_set_source_active(db, &source_id, false).await?;
            if json {
                print_json(&source)?;
            } else {
                println!("✓ Disabled source '{}'", source.name);
            }
        }

        SourcesAction::Remove { source_id } => {
            let stats = cmd_remove_source(db, &source_id).await?;
            if json {
                print_json(&stats)?;
            } else {
                print_remove_stats(&source_id, &stats);
            }
        }
    }

    Ok(())
}

async fn handle_mappings(db: &MetaDb, action: MappingsAction, json: bool) -> Result<()> {
    match action {
        MappingsAction::List { platform } => {
            let mappings = cmd_list_mappings(db, platform.as_deref()).await?;
            if json {
                print_json(&mappings)?;
            } else {
                print_mappings(&mappings);
            }
        }

        MappingsAction::Set {
            platform,
            data_type,
            source_column,
            target,
        } => {
            let mapping = cmd_set_mapping(db, &platform, data_type, &source_column, &target).await?;
            if json {
                print_json(&mapping)?;
            } else {
                println!(
                    "✓ [{} {}] {} → {}",
                    mapping.platform, mapping.data_type, mapping.source_column, mapping.target_column
                );
                println!("  ID: {}", mapping.id);
            }
        }

        MappingsAction::Remove { mapping_id } => {
            cmd_remove_mapping(db, &mapping_id).await?;
            if json {
                println!(r#"{{"removed": "{}"}}"#, mapping_id);
            } else {
                println!("✓ Mapping '{}' removed", mapping_id);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `--config` may name either the TOML file or the directory holding it
fn base_dir_for(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "toml") {
        path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::default_base_dir)
    } else {
        path.to_path_buf()
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => Config::load(path)?,
        Some(dir) => Config::load_from(Some(dir.to_path_buf()))?,
        None => Config::load_from(None)?,
    };

    if !config.is_initialized() {
        return Err(Error::NotInitialized);
    }
    Ok(config)
}

fn print_completion_extras(shell: Shell) {
    match shell {
        Shell::Fish => {
            println!();
            println!("# Dynamic completion for source IDs");
            for sub in ["edit", "enable", "disable", "remove"] {
                println!(
                    "complete -c adpulse -n '__fish_seen_subcommand_from sources; and __fish_seen_subcommand_from {}' -a '(adpulse sources list --completion fish 2>/dev/null)'",
                    sub
                );
            }
            println!(
                "complete -c adpulse -n '__fish_seen_subcommand_from suggest' -a '(adpulse sources list --completion fish 2>/dev/null)'"
            );
        }
        _ => {}
    }
}
