//! Formatting and display utilities for the playground.

use std::fmt::Write;

use hyperlens_engine::{EntityItemCounts, FilterReport};
use hyperlens_store::ResultSet;

/// Print a result set as a table.
pub fn print_results(result: &ResultSet) {
    println!("\n{}", "=".repeat(60));
    if result.is_empty() {
        println!("(empty result set)");
    } else {
        match result.pretty() {
            Ok(table) => println!("{table}"),
            Err(e) => println!("(cannot format result: {e})"),
        }
    }
    println!("{}", "=".repeat(60));
    let stats = result.stats();
    println!("Rows: {}", result.num_rows());
    println!("Query: {} in {:?}", stats.query_id, stats.elapsed);
}

/// One line per transition of a filter pass.
pub fn format_report(report: &FilterReport) -> String {
    let mut output = String::new();
    for transition in &report.transitions {
        let via = transition
            .via
            .map_or_else(|| "start".to_string(), |a| format!("via {a}"));
        let _ = writeln!(
            output,
            "  {:<12} {:>6} rows  ({via})",
            transition.alias, transition.rows
        );
    }
    let _ = writeln!(output, "  elapsed: {:?}", report.elapsed);
    output
}

/// Distinct value counts of every entity, one block per entity.
pub fn format_counts(counts: &[EntityItemCounts]) -> String {
    let mut output = String::new();
    for entity in counts {
        let _ = writeln!(output, "{}", entity.alias);
        for count in &entity.counts {
            let _ = writeln!(output, "  {:<12} {:>6}", count.alias, count.count);
        }
    }
    output
}

/// Print a divider line.
pub fn print_divider() {
    println!("{}", "-".repeat(60));
}

/// Print a section header.
pub fn print_header(title: &str) {
    println!();
    println!("{}", "=".repeat(60));
    println!("  {title}");
    println!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hyperlens_core::{AttributeKey, EntityKey};
    use hyperlens_engine::{AttributeCount, Transition};

    #[test]
    fn test_format_report() {
        let report = FilterReport {
            transitions: vec![
                Transition {
                    entity: EntityKey::new(1, 1),
                    alias: "supplier".to_string(),
                    via: None,
                    rows: 2,
                },
                Transition {
                    entity: EntityKey::new(1, 3),
                    alias: "catalog".to_string(),
                    via: Some(AttributeKey::new(1, 7)),
                    rows: 5,
                },
            ],
            elapsed: Duration::from_millis(3),
        };
        let output = format_report(&report);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("supplier") && lines[0].contains("(start)"));
        assert!(lines[1].contains("catalog") && lines[1].contains("5 rows"));
    }

    #[test]
    fn test_format_counts() {
        let counts = vec![EntityItemCounts {
            entity: EntityKey::new(1, 2),
            alias: "part".to_string(),
            counts: vec![AttributeCount {
                attribute: AttributeKey::new(1, 6),
                alias: "color".to_string(),
                count: 4,
            }],
        }];
        let output = format_counts(&counts);
        assert!(output.starts_with("part\n"));
        assert!(output.contains("color"));
        assert!(output.trim_end().ends_with('4'));
    }
}
