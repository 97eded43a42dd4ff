use std::process::ExitCode;

use nesearch::{App, Config};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let config = Config::resolve();
    init_logging(&config);

    // a missing database is the one fatal startup condition
    if !config.db_path.is_file() {
        eprintln!(
            "Database not found at {}.\nBuild it with `ne-import <list.txt>` and place it next to the executable.",
            config.db_path.display()
        );
        return ExitCode::FAILURE;
    }

    match App::new(config).and_then(|mut app| app.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// logs go to a file: stderr would bleed into the alternate screen
fn init_logging(config: &Config) {
    let Ok(file) = std::fs::File::create(config.data_dir.join("nesearch.log")) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init();
}
