//! REPL output formatting: table and JSON rendering of row sets.

use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use std::collections::HashMap;

use crate::repl::QueryResult;

/// Print a command's result rows in the requested format.
pub fn print_result(result: &QueryResult, format: &str) {
    if result.rows.is_empty() {
        println!("{}", "No rows.".dimmed());
        return;
    }

    match format.to_lowercase().as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result.rows).unwrap());
        }
        _ => {
            print_table(&result.rows);
        }
    }
}

/// Print a row set as a formatted table.
pub fn print_table(rows: &[HashMap<String, serde_json::Value>]) {
    if rows.is_empty() {
        return;
    }

    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns.sort();

    if let Some(pos) = columns.iter().position(|c| c == "fs") {
        columns.remove(pos);
        columns.insert(0, "fs".to_string());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header: Vec<Cell> = columns.iter().map(|c| Cell::new(c).fg(Color::Cyan)).collect();
    table.set_header(header);

    for row in rows {
        let cells: Vec<Cell> = columns
            .iter()
            .map(|col| {
                let value = row.get(col).map_or("-".to_string(), |v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => "-".to_string(),
                    other => other.to_string(),
                });
                Cell::new(value)
            })
            .collect();
        table.add_row(cells);
    }

    println!("{table}");
}

/// Print REPL help message.
pub fn print_help() {
    println!("\n{}", "aqo REPL Commands".bold().underline());
    println!();
    println!("  {}                       Show this help", ".help".yellow());
    println!("  {}                       Exit the REPL", ".quit".yellow());
    println!("  {}                      List the stat table", ".stat".yellow());
    println!("  {}                 One class's statistics", ".stat <fs>".yellow());
    println!("  {}                Dump stored query texts", ".qtext".yellow());
    println!(
        "  {}               Dump every registered class's preferences",
        ".queries".yellow()
    );
    println!("  {}                      Dump the data table, summarized", ".data".yellow());
    println!("  {}                      Current heap budget usage", ".heap".yellow());
    println!(
        "  {} Set a class's learn/use/auto-tune bits",
        ".set-preferences <fs> <learn> <use> <auto_tune>".yellow()
    );
    println!("  {}         Drop a class and its data entries", ".drop-class <fs>".yellow());
    println!(
        "  {}        Remove dead data entries (nothing is ever dead here)",
        ".cleanup".yellow()
    );
    println!("  {}                     Clear every table", ".reset".yellow());
    println!(
        "  {} Run one simulated predict-then-learn cycle",
        ".demo <fs> <relations> <actual_rows>".yellow()
    );
    println!("  {}            Toggle timing display", ".timing on|off".yellow());
    println!("  {}             Set output format", ".format table|json".yellow());
    println!("  {}                     Clear screen", ".clear".yellow());
    println!();
}
