use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const OVERRIDE_VAR: &str = "SSH_USERNAME";

// environment variables tried, in order, when nothing else applies
const FALLBACK_VARS: [&str; 3] = ["USER", "USERNAME", "LOGNAME"];

/// Where the resolver reads identity from; swapped for a fake in tests.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
    fn login_name(&self) -> Option<String>;
}

/// The live process environment plus the OS user database.
pub struct SystemEnv;

impl EnvSource for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn login_name(&self) -> Option<String> {
        let name = whoami::username();
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// The persisted per-user preference file. A missing or unreadable file is
/// simply "no preference".
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    pub ssh_username: Option<String>,
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    // best-effort: a failed write is logged and otherwise ignored
    pub fn save(&self, path: &Path) {
        let write = || -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, serde_json::to_string_pretty(self)?)?;
            Ok(())
        };
        if let Err(e) = write() {
            warn!(path = %path.display(), error = %e, "failed to persist settings");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsernameSource {
    Override,
    UiField,
    Saved,
    EnvVar,
    Login,
}

pub struct UsernameResolver<E = SystemEnv> {
    settings_path: PathBuf,
    env: E,
}

impl UsernameResolver<SystemEnv> {
    pub fn new(settings_path: PathBuf) -> Self {
        Self {
            settings_path,
            env: SystemEnv,
        }
    }
}

impl<E: EnvSource> UsernameResolver<E> {
    pub fn with_env(settings_path: PathBuf, env: E) -> Self {
        Self { settings_path, env }
    }

    /// Resolves the SSH login identity, trying each source in turn:
    /// explicit override variable, the UI field, the saved preference,
    /// the usual identity variables, then the OS login name. A value taken
    /// from the UI field is persisted for the next session. Never errors;
    /// a source that cannot produce a value is just skipped.
    pub fn resolve(&self, ui_field: Option<&str>) -> Option<(String, UsernameSource)> {
        if let Some(name) = self.env.var(OVERRIDE_VAR) {
            return Some((name, UsernameSource::Override));
        }

        if let Some(name) = ui_field.map(str::trim).filter(|v| !v.is_empty()) {
            let name = name.to_string();
            self.persist(&name);
            return Some((name, UsernameSource::UiField));
        }

        if let Some(name) = Settings::load(&self.settings_path)
            .ssh_username
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            return Some((name, UsernameSource::Saved));
        }

        if let Some(name) = self.detect_env() {
            return Some((name, UsernameSource::EnvVar));
        }

        if let Some(name) = self.env.login_name() {
            return Some((name, UsernameSource::Login));
        }

        None
    }

    /// Auto-detection only (override, identity variables, OS login name);
    /// what the reset-to-default action falls back to.
    pub fn detect(&self) -> Option<String> {
        self.env
            .var(OVERRIDE_VAR)
            .or_else(|| self.detect_env())
            .or_else(|| self.env.login_name())
    }

    pub fn persist(&self, name: &str) {
        Settings {
            ssh_username: Some(name.to_string()),
        }
        .save(&self.settings_path);
    }

    fn detect_env(&self) -> Option<String> {
        FALLBACK_VARS.iter().find_map(|var| self.env.var(var))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeEnv {
        vars: HashMap<&'static str, &'static str>,
        login: Option<&'static str>,
    }

    impl EnvSource for FakeEnv {
        fn var(&self, key: &str) -> Option<String> {
            self.vars.get(key).map(|v| v.to_string())
        }

        fn login_name(&self) -> Option<String> {
            self.login.map(str::to_string)
        }
    }

    fn make_resolver(env: FakeEnv) -> (tempfile::TempDir, UsernameResolver<FakeEnv>) {
        let dir = tempfile::tempdir().unwrap();
        let resolver = UsernameResolver::with_env(dir.path().join("settings.json"), env);
        (dir, resolver)
    }

    #[test]
    fn override_beats_saved_preference() {
        let (_dir, resolver) = make_resolver(FakeEnv {
            vars: HashMap::from([(OVERRIDE_VAR, "ovr")]),
            ..Default::default()
        });
        resolver.persist("saved");

        assert_eq!(
            resolver.resolve(None),
            Some(("ovr".to_string(), UsernameSource::Override))
        );
    }

    #[test]
    fn ui_field_beats_saved_and_is_persisted() {
        let (dir, resolver) = make_resolver(FakeEnv::default());
        resolver.persist("saved");

        assert_eq!(
            resolver.resolve(Some("  edited  ")),
            Some(("edited".to_string(), UsernameSource::UiField))
        );
        let settings = Settings::load(&dir.path().join("settings.json"));
        assert_eq!(settings.ssh_username.as_deref(), Some("edited"));
    }

    #[test]
    fn blank_ui_field_is_ignored() {
        let (_dir, resolver) = make_resolver(FakeEnv {
            login: Some("osuser"),
            ..Default::default()
        });

        assert_eq!(
            resolver.resolve(Some("   ")),
            Some(("osuser".to_string(), UsernameSource::Login))
        );
    }

    #[test]
    fn saved_preference_beats_identity_variables() {
        let (_dir, resolver) = make_resolver(FakeEnv {
            vars: HashMap::from([("USER", "bob")]),
            ..Default::default()
        });
        resolver.persist("saved");

        assert_eq!(
            resolver.resolve(None),
            Some(("saved".to_string(), UsernameSource::Saved))
        );
    }

    #[test]
    fn identity_variables_tried_in_fixed_order() {
        let (_dir, resolver) = make_resolver(FakeEnv {
            vars: HashMap::from([("USER", "u1"), ("USERNAME", "u2"), ("LOGNAME", "u3")]),
            ..Default::default()
        });
        assert_eq!(
            resolver.resolve(None),
            Some(("u1".to_string(), UsernameSource::EnvVar))
        );

        let (_dir, resolver) = make_resolver(FakeEnv {
            vars: HashMap::from([("USERNAME", "u2"), ("LOGNAME", "u3")]),
            ..Default::default()
        });
        assert_eq!(
            resolver.resolve(None),
            Some(("u2".to_string(), UsernameSource::EnvVar))
        );
    }

    #[test]
    fn nothing_resolves_to_none() {
        let (_dir, resolver) = make_resolver(FakeEnv::default());
        assert_eq!(resolver.resolve(None), None);
        assert_eq!(resolver.detect(), None);
    }

    #[test]
    fn detect_skips_saved_preference() {
        let (_dir, resolver) = make_resolver(FakeEnv {
            login: Some("osuser"),
            ..Default::default()
        });
        resolver.persist("saved");

        assert_eq!(resolver.detect(), Some("osuser".to_string()));
    }

    #[test]
    fn missing_settings_file_means_no_preference() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.json"));
        assert_eq!(settings.ssh_username, None);
    }

    #[test]
    fn unreadable_settings_file_means_no_preference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json at all").unwrap();
        assert_eq!(Settings::load(&path).ssh_username, None);
    }
}
