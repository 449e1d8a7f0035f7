use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tube_batch::{
    utils, BatchOptions, BatchOutcome, BatchRunner, Cli, Config, OverwritePolicy, StdinPrompter,
    YtDlpExtractor,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "tube_batch=debug"
    } else if cli.quiet {
        "tube_batch=warn"
    } else {
        "tube_batch=info"
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Check for required external dependencies (non-fatal)
    let missing_deps = utils::check_dependencies().await;
    if !missing_deps.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }

    let config = Config::load().await?;

    let extractor = YtDlpExtractor::new(&config)?;
    let runner = BatchRunner::new(
        Box::new(extractor),
        BatchOptions {
            table: cli.table.clone(),
            output_root: cli.output_dir.clone(),
            quiet: cli.quiet,
        },
    );

    let policy = if cli.assume_yes {
        OverwritePolicy::AssumeYes
    } else {
        OverwritePolicy::Ask
    };

    match runner.run(policy, &mut StdinPrompter).await? {
        BatchOutcome::Completed(summary) => {
            println!("Batch complete:");
            println!("  • {} rows extracted", summary.rows);
            for (person, clips) in &summary.clips {
                println!("  • {}: {} clip(s)", person, clips);
            }
            println!("  • Output in {}", summary.output_root.display());
        }
        BatchOutcome::Declined => {
            println!(
                "Keeping existing {}. Nothing was changed.",
                cli.output_dir.display()
            );
        }
    }

    Ok(())
}
