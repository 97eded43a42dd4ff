use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use nesearch::Store;
use tracing_subscriber::EnvFilter;

/// Builds the NE lookup database from a `name, ip` text list.
#[derive(Parser)]
#[command(name = "ne-import", version, about)]
struct Args {
    /// Text file with one `name, ip` pair per line; the first line is
    /// treated as a header and skipped.
    list: PathBuf,

    /// Where to write the database.
    #[arg(short, long, default_value = "ne_database.db")]
    database: PathBuf,
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let args = Args::parse();
    match Store::build_from_text(&args.database, &args.list) {
        Ok(report) => {
            for name in &report.skipped {
                eprintln!("warning: duplicate NE name '{name}' skipped");
            }
            println!(
                "created {} with {} entries ({} duplicates skipped)",
                args.database.display(),
                report.inserted,
                report.skipped.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("import failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
