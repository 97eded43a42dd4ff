use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// Full terminal client that manages its own window (PuTTY).
    Interactive,
    /// Command-line-only client that needs a console of its own (plink).
    Headless,
}

impl ClientKind {
    fn basenames(self) -> &'static [&'static str] {
        match self {
            ClientKind::Interactive => &["putty.exe", "putty"],
            ClientKind::Headless => &["plink.exe", "plink"],
        }
    }
}

/// Three-tier search for the external SSH clients: preferred per-user
/// directories, then PATH, then common install locations. First existing
/// file wins; a missing client is `None`, not an error.
pub struct Locator {
    preferred_dirs: Vec<PathBuf>,
    common_dirs: Vec<PathBuf>,
    desktop_dir: Option<PathBuf>,
    path_var: Option<OsString>,
    cwd: PathBuf,
}

impl Locator {
    pub fn new(config: &Config) -> Self {
        Self {
            preferred_dirs: preferred_client_dirs(),
            common_dirs: common_client_dirs(&config.app_dir),
            desktop_dir: dirs::desktop_dir(),
            path_var: std::env::var_os("PATH"),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_search_paths(
        preferred_dirs: Vec<PathBuf>,
        common_dirs: Vec<PathBuf>,
        path_var: Option<OsString>,
        cwd: PathBuf,
    ) -> Self {
        Self {
            preferred_dirs,
            common_dirs,
            desktop_dir: None,
            path_var,
            cwd,
        }
    }

    pub fn find(&self, kind: ClientKind) -> Option<PathBuf> {
        let basenames = kind.basenames();

        for dir in &self.preferred_dirs {
            if let Some(path) = find_in_dir(dir, basenames) {
                debug!(path = %path.display(), "client found in preferred dir");
                return Some(path);
            }
        }

        for name in basenames {
            if let Some(path) = self.find_on_path(name) {
                debug!(path = %path.display(), "client found on PATH");
                return Some(path);
            }
        }

        for dir in &self.common_dirs {
            if let Some(path) = find_in_dir(dir, basenames) {
                debug!(path = %path.display(), "client found in common dir");
                return Some(path);
            }
        }

        // PuTTY sometimes just gets unpacked onto the desktop
        if kind == ClientKind::Interactive {
            if let Some(path) = self
                .desktop_dir
                .as_deref()
                .and_then(|dir| find_in_dir(dir, basenames))
            {
                return Some(path);
            }
        }

        None
    }

    /// The directories named in the "no SSH client found" report.
    pub fn searched_dirs(&self) -> Vec<PathBuf> {
        self.preferred_dirs
            .iter()
            .chain(&self.common_dirs)
            .cloned()
            .collect()
    }

    fn find_on_path(&self, name: &str) -> Option<PathBuf> {
        let paths = self.path_var.as_ref()?;
        which::which_in(name, Some(paths), &self.cwd).ok()
    }
}

// derived from the roaming/config root so no account name is hard-coded
fn preferred_client_dirs() -> Vec<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("putty"))
        .into_iter()
        .collect()
}

#[cfg(windows)]
fn common_client_dirs(app_dir: &Path) -> Vec<PathBuf> {
    vec![
        PathBuf::from(r"C:\Program Files\PuTTY"),
        PathBuf::from(r"C:\Program Files (x86)\PuTTY"),
        app_dir.to_path_buf(),
    ]
}

#[cfg(not(windows))]
fn common_client_dirs(app_dir: &Path) -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/usr/bin"),
        app_dir.to_path_buf(),
    ]
}

fn find_in_dir(dir: &Path, basenames: &[&str]) -> Option<PathBuf> {
    basenames.iter().map(|name| dir.join(name)).find(|p| p.is_file())
}
