use clap::Parser;
use user_migration::cli::{Cli, Command};
use user_migration::error::Result;
use user_migration::load::{Applied, LoadCounts};
use user_migration::pipeline::RunSummary;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load .env
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "user_migration=info".into()),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Migrate(args) => {
            let config = args.into_config()?;
            let summary = user_migration::migrate(&config).await?;
            print_summary(&summary);
        }
        Command::InitSchema(args) => {
            let db = user_migration::db::pool::connect(&args.target_url).await?;
            user_migration::db::migration::run(&db).await?;
            println!("Target schema is up to date.");
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("=== User Migration Summary ===\n");
    println!("  Extracted: {}", summary.extracted);
    println!("  Migrated:  {}", summary.migrated());
    println!("  Rejected:  {}", summary.rejected.len());

    let totals = summary.totals();
    if totals != LoadCounts::default() {
        println!(
            "  Users:     {} inserted, {} already present",
            totals.users_inserted, totals.users_skipped
        );
        println!(
            "  Accounts:  {} inserted, {} already present",
            totals.accounts_inserted, totals.accounts_skipped
        );
    }

    println!();
    for outcome in &summary.committed {
        match &outcome.applied {
            Applied::Committed(counts) => println!(
                "  batch {:>3}: committed {} rows ({} new users)",
                outcome.index, outcome.rows, counts.users_inserted
            ),
            Applied::Written { path, statements } => println!(
                "  batch {:>3}: {} rows, {} statements -> {}",
                outcome.index,
                outcome.rows,
                statements,
                path.display()
            ),
        }
    }

    for row in &summary.rejected {
        println!("  skipped {row}");
    }

    if summary.failed.is_empty() {
        println!("\n=== Migration complete ===");
    } else {
        println!("\nFailed batches (retry with the same options):");
        for failed in &summary.failed {
            println!("  batch {:>3}: {}", failed.index, failed.error);
        }
    }
}
