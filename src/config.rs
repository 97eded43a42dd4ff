use std::fs;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "nesearch";
pub const DB_FILE: &str = "ne_database.db";
const SETTINGS_FILE: &str = "settings.json";

/// Every path the tool needs, resolved once at startup and passed down
/// instead of read from globals.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_dir: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub settings_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn resolve() -> Self {
        let app_dir = app_dir();
        let data_dir = user_data_dir();
        let _ = fs::create_dir_all(&data_dir);
        let log_dir = resolve_log_dir(&app_dir, &data_dir);

        Self {
            db_path: app_dir.join(DB_FILE),
            settings_path: data_dir.join(SETTINGS_FILE),
            app_dir,
            data_dir,
            log_dir,
        }
    }
}

fn app_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn user_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// A `logs` folder beside the executable if writable, else one under the
/// user data dir, else one under the temp dir. First writable wins.
pub fn resolve_log_dir(app_dir: &Path, data_dir: &Path) -> PathBuf {
    let candidates = [
        app_dir.join("logs"),
        data_dir.join("logs"),
        std::env::temp_dir().join(APP_NAME).join("logs"),
    ];
    for dir in &candidates {
        if dir_is_writable(dir) {
            return dir.clone();
        }
    }

    // last resort: the temp candidate, created best-effort
    let dir = std::env::temp_dir().join(APP_NAME).join("logs");
    let _ = fs::create_dir_all(&dir);
    dir
}

fn dir_is_writable(dir: &Path) -> bool {
    if fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".__writetest.tmp");
    match fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
