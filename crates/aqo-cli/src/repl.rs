#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
//! Interactive REPL for operating on a predictor's learning store.

use anyhow::{Context, Result};
use aqo_core::config::AqoConfig;
use aqo_core::hash::{ClauseInput, Expr, RelationSignature};
use aqo_core::store::{snapshot, Preferences, Store};
use aqo_core::{learn_node, predict_for_node, ExecutionOutcome, LearnCache, Prediction};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Completer, Editor, Helper, Highlighter, Hinter, Validator};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// REPL configuration.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    pub timing: bool,
    pub format: OutputFormat,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            timing: true,
            format: OutputFormat::Table,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Table,
    Json,
}

/// A command's result rows, plus how long it took.
#[derive(Debug)]
pub struct QueryResult {
    pub rows: Vec<HashMap<String, serde_json::Value>>,
    pub duration_ms: f64,
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct ReplHelper;

/// Runs the interactive REPL against the store persisted under
/// `data_dir`, using `aqo_config` for any demo prediction cycles.
#[allow(clippy::needless_pass_by_value)]
pub fn run(data_dir: PathBuf, aqo_config: AqoConfig) -> Result<()> {
    println!("\n{}", format!("aqo v{VERSION} - learning store REPL").bold().cyan());
    println!("Data directory: {}", data_dir.display().to_string().green());
    println!("Type {} for commands, {} to exit\n", ".help".yellow(), ".quit".yellow());

    let store = Store::new(aqo_config.store.clone());
    if data_dir.exists() {
        snapshot::load(&store, &data_dir).context("failed to load snapshot")?;
    }
    let cache = LearnCache::new();

    let mut rl: Editor<ReplHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(ReplHelper));

    let history_path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join(".aqo_history");
    let _ = rl.load_history(&history_path);

    let mut config = ReplConfig::default();

    loop {
        let prompt = "aqo> ".bold().blue().to_string();
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match handle_command(&store, &cache, &aqo_config, line, &mut config) {
                    CommandResult::Continue => (),
                    CommandResult::Ran(result) => {
                        print_result(&result, &format!("{:?}", config.format).to_lowercase());
                        if config.timing {
                            println!("\n{} rows ({:.2}ms)\n", result.rows.len().to_string().green(), result.duration_ms);
                        }
                    }
                    CommandResult::Quit => break,
                    CommandResult::Error(e) => {
                        println!("{} {}\n", "Error:".red().bold(), e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Use .quit to exit");
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("{} {:?}", "Error:".red().bold(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    if let Err(e) = snapshot::flush(&store, &data_dir) {
        println!("{} failed to persist snapshot: {}", "Warning:".yellow().bold(), e);
    }
    println!("Goodbye!");
    Ok(())
}

enum CommandResult {
    Continue,
    Ran(QueryResult),
    Quit,
    Error(String),
}

fn handle_command(
    store: &Store,
    cache: &LearnCache,
    aqo_config: &AqoConfig,
    line: &str,
    config: &mut ReplConfig,
) -> CommandResult {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let cmd = parts.first().map(|s| s.to_lowercase()).unwrap_or_default();
    let start = Instant::now();

    match cmd.as_str() {
        ".quit" | ".exit" | ".q" => CommandResult::Quit,

        ".help" | ".h" => {
            crate::repl_output::print_help();
            CommandResult::Continue
        }

        ".clear" => {
            print!("\x1B[2J\x1B[1;1H");
            CommandResult::Continue
        }

        ".timing" => {
            if parts.len() < 2 {
                println!("Timing is {}\n", if config.timing { "ON" } else { "OFF" });
            } else {
                match parts[1].to_lowercase().as_str() {
                    "on" | "true" | "1" => {
                        config.timing = true;
                        println!("Timing ON\n");
                    }
                    "off" | "false" | "0" => {
                        config.timing = false;
                        println!("Timing OFF\n");
                    }
                    _ => return CommandResult::Error("Use: .timing on|off".to_string()),
                }
            }
            CommandResult::Continue
        }

        ".format" => {
            if parts.len() < 2 {
                println!("Format is {:?}\n", config.format);
            } else {
                match parts[1].to_lowercase().as_str() {
                    "table" => {
                        config.format = OutputFormat::Table;
                        println!("Format: table\n");
                    }
                    "json" => {
                        config.format = OutputFormat::Json;
                        println!("Format: json\n");
                    }
                    _ => return CommandResult::Error("Use: .format table|json".to_string()),
                }
            }
            CommandResult::Continue
        }

        ".stat" => {
            let rows = if let Some(fs) = parts.get(1).and_then(|s| s.parse::<u64>().ok()) {
                store.stat_entry(fs).into_iter().map(|entry| stat_row(store, fs, &entry)).collect()
            } else {
                store.stat_snapshot().into_iter().map(|(fs, entry)| stat_row(store, fs, &entry)).collect()
            };
            CommandResult::Ran(finish(rows, start))
        }

        ".qtext" => {
            let rows = store
                .qtext_snapshot()
                .into_iter()
                .map(|(fs, text)| row([("fs", serde_json::json!(fs)), ("query_text", serde_json::json!(text))]))
                .collect();
            CommandResult::Ran(finish(rows, start))
        }

        ".queries" => {
            let rows = store
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
            CommandResult::Ran(finish(rows, start))
        }

        ".data" => {
            let rows = store
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
            CommandResult::Ran(finish(rows, start))
        }

        ".heap" => {
            let (used, capacity) = store.heap_usage();
            let rows = vec![row([("used_bytes", serde_json::json!(used)), ("capacity_bytes", serde_json::json!(capacity))])];
            CommandResult::Ran(finish(rows, start))
        }

        ".set-preferences" | ".set-prefs" => {
            if parts.len() < 5 {
                return CommandResult::Error("Usage: .set-preferences <fs> <learn:bool> <use_predictor:bool> <auto_tune:bool>".to_string());
            }
            let Ok(fs) = parts[1].parse::<u64>() else {
                return CommandResult::Error(format!("Invalid fs: {}", parts[1]));
            };
            let (Ok(learn), Ok(use_predictor), Ok(auto_tune)) =
                (parse_bool(parts[2]), parse_bool(parts[3]), parse_bool(parts[4]))
            else {
                return CommandResult::Error("learn/use_predictor/auto_tune must be true or false".to_string());
            };
            let target_fs = store.preferences(fs).map_or(fs, |p| p.target_fs);
            store.update_preferences(fs, Preferences { target_fs, learn, use_predictor, auto_tune });
            println!("Preferences updated for fs={fs}\n");
            CommandResult::Continue
        }

        ".drop-class" => {
            let Some(fs) = parts.get(1).and_then(|s| s.parse::<u64>().ok()) else {
                return CommandResult::Error("Usage: .drop-class <fs>".to_string());
            };
            store.drop_class(fs);
            println!("Dropped class fs={fs}\n");
            CommandResult::Continue
        }

        ".cleanup" => {
            store.cleanup(|_relid| true);
            println!("Cleanup complete\n");
            CommandResult::Continue
        }

        ".reset" => {
            store.reset();
            println!("Store reset\n");
            CommandResult::Continue
        }

        ".demo" => {
            if parts.len() < 4 {
                return CommandResult::Error("Usage: .demo <fs> <relations> <actual_rows>".to_string());
            }
            let (Ok(fs), Ok(relation_count), Ok(actual_rows)) =
                (parts[1].parse::<u64>(), parts[2].parse::<u32>(), parts[3].parse::<f64>())
            else {
                return CommandResult::Error("fs/relations must be integers, actual_rows a float".to_string());
            };
            let cycle = run_demo_cycle(store, cache, fs, relation_count, actual_rows, aqo_config);
            let rows = vec![row([
                ("fss", cycle.fss.map_or(serde_json::Value::Null, |v| serde_json::json!(v))),
                ("predicted_rows", cycle.predicted_rows.map_or(serde_json::Value::Null, |v| serde_json::json!(v))),
                ("actual_rows", serde_json::json!(cycle.actual_rows)),
            ])];
            CommandResult::Ran(finish(rows, start))
        }

        _ => CommandResult::Error(format!("Unknown command: {cmd}")),
    }
}

fn stat_row(store: &Store, fs: u64, entry: &aqo_core::store::StatEntry) -> HashMap<String, serde_json::Value> {
    row([
        ("fs", serde_json::json!(fs)),
        ("execs_with", serde_json::json!(entry.execs_with)),
        ("execs_without", serde_json::json!(entry.execs_without)),
        ("cardinality_error", store.cardinality_error(fs).map_or(serde_json::Value::Null, |v| serde_json::json!(v))),
        ("execution_time", store.execution_time(fs).map_or(serde_json::Value::Null, |v| serde_json::json!(v))),
    ])
}

fn row<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> HashMap<String, serde_json::Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn finish(rows: Vec<HashMap<String, serde_json::Value>>, start: Instant) -> QueryResult {
    QueryResult { rows, duration_ms: start.elapsed().as_secs_f64() * 1000.0 }
}

fn parse_bool(value: &str) -> Result<bool, ()> {
    match value.to_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(()),
    }
}

/// The outcome of one simulated predict-then-learn cycle.
pub struct DemoCycle {
    pub fss: Option<i32>,
    pub predicted_rows: Option<f64>,
    pub actual_rows: f64,
}

/// Synthesizes `relation_count` equality clauses over that many
/// relations, predicts against them, "executes" the node by reporting
/// `actual_rows`, and learns from the result.
pub fn run_demo_cycle(
    store: &Store,
    cache: &LearnCache,
    fs: u64,
    relation_count: u32,
    actual_rows: f64,
    config: &AqoConfig,
) -> DemoCycle {
    let relation_count = relation_count.max(1);
    let clause_exprs: Vec<Expr> = (0..relation_count)
        .map(|i| Expr::BinaryOp { op: 1, left: Box::new(Expr::Var(u64::from(i))), right: Box::new(Expr::Constant) })
        .collect();
    let clauses: Vec<ClauseInput<'_>> =
        clause_exprs.iter().map(|expr| ClauseInput { expr, is_eq_clause: false, selectivity: 0.1 }).collect();
    let relations: Vec<RelationSignature> = (0..relation_count).map(|i| RelationSignature::Permanent(i as i32)).collect();

    let prediction =
        predict_for_node(store, fs, &relations, &clauses, &[], &config.predict, &config.learning);

    let outcome = ExecutionOutcome { ntuples: actual_rows, nloops: 1.0, workers: None };

    let _ = learn_node(
        store,
        cache,
        fs,
        &prediction,
        &outcome,
        true,
        false,
        actual_rows,
        &config.learning,
        &config.predict,
        &config.timeout,
    );

    let predicted_rows = match prediction.cardinality {
        Prediction::Rows(rows) => Some(rows),
        Prediction::Refused => None,
    };

    DemoCycle { fss: prediction.fss, predicted_rows, actual_rows }
}

/// Print a command's result in the specified format.
pub fn print_result(result: &QueryResult, format: &str) {
    crate::repl_output::print_result(result, format);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repl_config_default() {
        let config = ReplConfig::default();
        assert!(config.timing);
        assert_eq!(config.format, OutputFormat::Table);
    }

    #[test]
    fn output_format_eq() {
        assert_eq!(OutputFormat::Table, OutputFormat::Table);
        assert_ne!(OutputFormat::Table, OutputFormat::Json);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("true"), Ok(true));
        assert_eq!(parse_bool("OFF"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn run_demo_cycle_eventually_predicts() {
        let store = Store::new(aqo_core::config::StoreConfig::default());
        let cache = LearnCache::new();
        let config = AqoConfig::default();
        let mut last = None;
        for _ in 0..5 {
            last = Some(run_demo_cycle(&store, &cache, 1, 1, 42.0, &config));
        }
        let last = last.unwrap();
        assert!(last.fss.is_some());
        assert!(last.predicted_rows.is_some());
    }
}
