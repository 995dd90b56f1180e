use std::path::Path;

use garmin_ledger::collect::{self, DayOutcome};
use garmin_ledger::config::{Credentials, TokenStore};
use garmin_ledger::ledger;
use garmin_ledger::models::daily::format_real;
use garmin_ledger::session::SessionProvider;

/// Days in the reporting window, today included.
const WINDOW_DAYS: u32 = 7;

#[tokio::main]
async fn main() -> garmin_ledger::Result<()> {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run() -> garmin_ledger::Result<()> {
    dotenvy::dotenv().ok();
    let credentials = Credentials::from_env()?;

    let provider = SessionProvider::new(TokenStore::open()?);
    let session = provider.acquire(&credentials).await?;

    println!(
        "Collecting the last {} days for {}...",
        WINDOW_DAYS,
        session.display_name()
    );
    let outcomes = collect::collect_window(&session, WINDOW_DAYS).await;
    for outcome in &outcomes {
        if let DayOutcome::Skipped { date, reason } = outcome {
            eprintln!("Warning: skipping {}: {}", date, reason);
        }
    }
    let records = collect::records(&outcomes);
    println!("Collected {} of {} days.", records.len(), outcomes.len());

    match ledger::merge(Path::new(ledger::LEDGER_FILENAME), &records)? {
        Some(report) => {
            println!(
                "Updated {} rows in {}.",
                report.rows_written,
                ledger::LEDGER_FILENAME
            );
            if !report.averages.is_empty() {
                let parts: Vec<String> = report
                    .averages
                    .iter()
                    .map(|(label, avg)| format!("{}: {}", label, format_real(*avg)))
                    .collect();
                println!("Averages: {}.", parts.join(", "));
            }
        }
        None => println!("No records collected; ledger left untouched."),
    }

    Ok(())
}
