#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
//! `aqo` CLI - operator tool for an adaptive cardinality predictor's
//! learning store.
//!
//! Usage:
//!   `aqo repl`
//!   `aqo stat`
//!   `aqo set-preferences 42 --learn true --use-predictor true`
//!   `aqo demo 42 --relations 2 --actual-rows 500`

mod repl;
mod repl_output;

use std::path::PathBuf;

use anyhow::Context;
use aqo_core::config::AqoConfig;
use aqo_core::store::{snapshot, Preferences, Store};
use aqo_core::LearnCache;
use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "aqo")]
#[command(author, version, about = "Operator CLI for an adaptive cardinality predictor")]
#[command(propagate_version = true)]
struct Cli {
    /// Directory the store's snapshot files are read from and written to.
    #[arg(long, global = true, default_value = "./aqo_data", env = "AQO_DATA_DIR")]
    data_dir: PathBuf,

    /// Path to the predictor configuration file.
    #[arg(long, global = true, default_value = "aqo.toml", env = "AQO_CONFIG_PATH")]
    config: PathBuf,

    /// Output format for table-producing commands.
    #[arg(long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive REPL.
    Repl,

    /// Dump the predictor configuration, fully resolved and defaulted.
    Config,

    /// List every class's statistics, or one class's if `fs` is given.
    Stat {
        /// Feature-space identifier.
        fs: Option<u64>,
    },

    /// List every stored query text.
    QueryTexts,

    /// List every registered query class and its policy bits.
    Queries,

    /// List every `data` table entry, summarized.
    Data,

    /// Show current heap-budget usage.
    Heap,

    /// Set a class's `learn`/`use_predictor`/`auto_tune` bits.
    SetPreferences {
        /// Feature-space identifier.
        fs: u64,

        /// Whether new samples should be recorded for this class.
        #[arg(long)]
        learn: Option<bool>,

        /// Whether the predictor's estimate should be used for this class.
        #[arg(long = "use-predictor")]
        use_predictor: Option<bool>,

        /// Whether the auto-tuner should manage this class's policy bits.
        #[arg(long = "auto-tune")]
        auto_tune: Option<bool>,
    },

    /// Drop a class's preferences and every `data` entry recorded under it.
    DropClass {
        /// Feature-space identifier.
        fs: u64,
    },

    /// Remove every `data` entry whose relations are all gone.
    Cleanup,

    /// Clear every table and re-seed the common feature space.
    Reset,

    /// Run one simulated predict-then-learn cycle through a fake
    /// planner/executor, for observing the predictor end to end.
    Demo {
        /// Feature-space identifier for the simulated query class.
        fs: u64,

        /// Number of relations the simulated query joins.
        #[arg(long, default_value_t = 1)]
        relations: u32,

        /// Simulated true row count the fake executor reports.
        #[arg(long = "actual-rows")]
        actual_rows: f64,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: clap_complete::Shell,
    },
}

fn open_store(config: &AqoConfig, data_dir: &std::path::Path) -> anyhow::Result<Store> {
    let store = Store::new(config.store.clone());
    if data_dir.exists() {
        snapshot::load(&store, data_dir).context("failed to load snapshot")?;
    }
    Ok(store)
}

fn persist(store: &Store, data_dir: &std::path::Path) -> anyhow::Result<()> {
    snapshot::flush(store, data_dir).context("failed to persist snapshot")
}

fn print_rows(rows: &[std::collections::HashMap<String, serde_json::Value>], format: &str) {
    if format.eq_ignore_ascii_case("json") {
        println!("{}", serde_json::to_string_pretty(rows).unwrap());
    } else {
        repl_output::print_table(rows);
    }
}

fn row<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> std::collections::HashMap<String, serde_json::Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let aqo_config = AqoConfig::load_from_path(&cli.config).unwrap_or_else(|err| {
        eprintln!("{} failed to load {}: {err}, using defaults", "Warning:".yellow().bold(), cli.config.display());
        AqoConfig::default()
    });

    match cli.command {
        Commands::Repl => {
            repl::run(cli.data_dir, aqo_config)?;
        }

        Commands::Config => {
            println!("{}", aqo_config.to_toml()?);
        }

        Commands::Stat { fs } => {
            let store = open_store(&aqo_config, &cli.data_dir)?;
            let rows: Vec<_> = if let Some(fs) = fs {
                store
                    .stat_entry(fs)
                    .into_iter()
                    .map(|entry| {
                        row([
                            ("fs", serde_json::json!(fs)),
                            ("execs_with", serde_json::json!(entry.execs_with)),
                            ("execs_without", serde_json::json!(entry.execs_without)),
                            ("cardinality_error", store.cardinality_error(fs).map_or(serde_json::Value::Null, |v| serde_json::json!(v))),
                            ("execution_time", store.execution_time(fs).map_or(serde_json::Value::Null, |v| serde_json::json!(v))),
                        ])
                    })
                    .collect()
            } else {
                store
                    .stat_snapshot()
                    .into_iter()
                    .map(|(fs, entry)| {
                        row([
                            ("fs", serde_json::json!(fs)),
                            ("execs_with", serde_json::json!(entry.execs_with)),
                            ("execs_without", serde_json::json!(entry.execs_without)),
                            ("cardinality_error", store.cardinality_error(fs).map_or(serde_json::Value::Null, |v| serde_json::json!(v))),
                            ("execution_time", store.execution_time(fs).map_or(serde_json::Value::Null, |v| serde_json::json!(v))),
                        ])
                    })
                    .collect()
            };
            print_rows(&rows, &cli.format);
        }

        Commands::QueryTexts => {
            let store = open_store(&aqo_config, &cli.data_dir)?;
            let rows: Vec<_> = store
                .qtext_snapshot()
                .into_iter()
                .map(|(fs, text)| row([("fs", serde_json::json!(fs)), ("query_text", serde_json::json!(text))]))
                .collect();
            print_rows(&rows, &cli.format);
        }

        Commands::Queries => {
            let store = open_store(&aqo_config, &cli.data_dir)?;
            let rows: Vec<_> = store
                .queries_snapshot()
                .into_iter()
                .map(|(fs, prefs)| {
                    row([
                        ("fs", serde_json::json!(fs)),
                        ("target_fs", serde_json::json!(prefs.target_fs)),
                        ("learn", serde_json::json!(prefs.learn)),
                        ("use_predictor", serde_json::json!(prefs.use_predictor)),
                        ("auto_tune", serde_json::json!(prefs.auto_tune)),
                    ])
                })
                .collect();
            print_rows(&rows, &cli.format);
        }

        Commands::Data => {
            let store = open_store(&aqo_config, &cli.data_dir)?;
            let rows: Vec<_> = store
                .data_rows()
                .into_iter()
                .map(|(fs, fss, cols, nrows)| {
                    row([
                        ("fs", serde_json::json!(fs)),
                        ("fss", serde_json::json!(fss)),
                        ("cols", serde_json::json!(cols)),
                        ("rows", serde_json::json!(nrows)),
                    ])
                })
                .collect();
            print_rows(&rows, &cli.format);
        }

        Commands::Heap => {
            let store = open_store(&aqo_config, &cli.data_dir)?;
            let (used, capacity) = store.heap_usage();
            let rows = vec![row([("used_bytes", serde_json::json!(used)), ("capacity_bytes", serde_json::json!(capacity))])];
            print_rows(&rows, &cli.format);
        }

        Commands::SetPreferences { fs, learn, use_predictor, auto_tune } => {
            let store = open_store(&aqo_config, &cli.data_dir)?;
            let existing = store.preferences(fs);
            let target_fs = existing.map_or(fs, |p| p.target_fs);
            let prefs = Preferences {
                target_fs,
                learn: learn.unwrap_or_else(|| existing.map_or(true, |p| p.learn)),
                use_predictor: use_predictor.unwrap_or_else(|| existing.map_or(false, |p| p.use_predictor)),
                auto_tune: auto_tune.unwrap_or_else(|| existing.map_or(false, |p| p.auto_tune)),
            };
            store.update_preferences(fs, prefs);
            persist(&store, &cli.data_dir)?;
            println!("{} preferences updated for fs={fs}", "OK:".green().bold());
        }

        Commands::DropClass { fs } => {
            let store = open_store(&aqo_config, &cli.data_dir)?;
            store.drop_class(fs);
            persist(&store, &cli.data_dir)?;
            println!("{} dropped class fs={fs}", "OK:".green().bold());
        }

        Commands::Cleanup => {
            let store = open_store(&aqo_config, &cli.data_dir)?;
            store.cleanup(|_relid| true);
            persist(&store, &cli.data_dir)?;
            println!("{} cleanup complete", "OK:".green().bold());
        }

        Commands::Reset => {
            let store = open_store(&aqo_config, &cli.data_dir)?;
            store.reset();
            persist(&store, &cli.data_dir)?;
            println!("{} store reset", "OK:".green().bold());
        }

        Commands::Demo { fs, relations, actual_rows } => {
            let store = open_store(&aqo_config, &cli.data_dir)?;
            let cache = LearnCache::new();
            let cycle = repl::run_demo_cycle(&store, &cache, fs, relations, actual_rows, &aqo_config);
            persist(&store, &cli.data_dir)?;

            let rows = vec![row([
                ("fss", cycle.fss.map_or(serde_json::Value::Null, |v| serde_json::json!(v))),
                ("predicted_rows", cycle.predicted_rows.map_or(serde_json::Value::Null, |v| serde_json::json!(v))),
                ("actual_rows", serde_json::json!(cycle.actual_rows)),
            ])];
            print_rows(&rows, &cli.format);
        }

        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
    }

    Ok(())
}
