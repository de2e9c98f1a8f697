//! export_alerts - alert archive export to a local CSV artifact

use anyhow::{Context, Result};
use clap::Parser;

use presence_sentinel::{AlertStore, SqliteAlertStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the alert archive database.
    #[arg(long, default_value = "sentinel.db")]
    db_path: String,
    /// Output file path for the CSV artifact.
    #[arg(long, default_value = "sentinel_alerts.csv")]
    output: String,
    /// Maximum number of alerts to export, newest kept.
    #[arg(long, default_value_t = 100_000)]
    limit: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let store = SqliteAlertStore::open(&args.db_path)
        .with_context(|| format!("failed to open alert archive {}", args.db_path))?;
    let mut alerts = store.recent(args.limit)?;
    // recent() is newest first; the artifact reads chronologically.
    alerts.reverse();

    let mut csv = String::from("epoch_s,label,track_id,region_index,snapshot\n");
    for alert in &alerts {
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            alert.epoch_s,
            csv_field(&alert.label),
            alert.track_id,
            alert.region_index,
            csv_field(alert.snapshot.as_deref().unwrap_or("")),
        ));
    }
    std::fs::write(&args.output, csv).with_context(|| format!("failed to write {}", args.output))?;

    println!("{} alert(s) written to {}", alerts.len(), args.output);
    Ok(())
}

/// Quotes a field only when it needs quoting (comma, quote, newline).
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::csv_field;

    #[test]
    fn plain_fields_pass_through() {
        assert_eq!(csv_field("package"), "package");
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
