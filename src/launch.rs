use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::locate::{ClientKind, Locator};

/// How long the spawned client gets to create its session log before the
/// advisory check fires.
pub const LOG_GRACE: Duration = Duration::from_secs(8);

/// Messages sent from launcher worker threads back to the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The session log was still missing or empty after the grace period.
    SessionLogEmpty(PathBuf),
}

/// What a successful login launched: the client binary and the transcript
/// path it was told to write.
#[derive(Debug)]
pub struct Session {
    pub client: PathBuf,
    pub log_path: PathBuf,
}

pub struct Launcher {
    locator: Locator,
    log_dir: PathBuf,
    grace: Duration,
}

impl Launcher {
    pub fn new(locator: Locator, log_dir: PathBuf) -> Self {
        Self {
            locator,
            log_dir,
            grace: LOG_GRACE,
        }
    }

    /// Fire-and-forget login: spawns whichever client is available, then a
    /// worker that checks the session log once after the grace period. The
    /// caller is never blocked on the session itself.
    pub fn login(
        &self,
        username: &str,
        name: &str,
        ip: &str,
        notices: Sender<Notice>,
    ) -> Result<Session> {
        fs::create_dir_all(&self.log_dir).with_context(|| {
            format!("failed to create log directory {}", self.log_dir.display())
        })?;
        let log_path = session_log_path(&self.log_dir, name, ip, Local::now());

        let client = if let Some(client) = self.locator.find(ClientKind::Interactive) {
            spawn_detached(&client, interactive_args(username, ip, &log_path), false)?;
            client
        } else if let Some(client) = self.locator.find(ClientKind::Headless) {
            // the headless client would block our console; give it its own
            spawn_detached(&client, headless_args(username, ip, &log_path), true)?;
            client
        } else {
            let searched: Vec<String> = self
                .locator
                .searched_dirs()
                .iter()
                .map(|dir| dir.display().to_string())
                .collect();
            bail!(
                "no SSH client found (putty/plink); looked in {} and PATH",
                searched.join(", ")
            );
        };

        info!(client = %client.display(), log = %log_path.display(), "ssh session launched");
        watch_session_log(log_path.clone(), self.grace, notices);

        Ok(Session { client, log_path })
    }
}

/// Filename-safe form of a name or IP: anything outside alphanumerics,
/// `_`, `-`, `.`, `@` becomes `_`.
pub fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn session_log_path(log_dir: &Path, name: &str, ip: &str, now: DateTime<Local>) -> PathBuf {
    log_dir.join(format!(
        "ssh_{}_{}_{}.log",
        sanitize(name),
        sanitize(ip),
        now.format("%Y-%m-%d_%H%M%S")
    ))
}

// Both builders keep every flag ahead of the host token: the clients stop
// reading options at the first non-flag argument.

fn interactive_args(username: &str, ip: &str, log_path: &Path) -> Vec<OsString> {
    vec![
        "-ssh".into(),
        "-l".into(),
        username.into(),
        "-sessionlog".into(),
        log_path.as_os_str().to_os_string(),
        "-logappend".into(),
        ip.into(),
    ]
}

fn headless_args(username: &str, ip: &str, log_path: &Path) -> Vec<OsString> {
    vec![
        "-ssh".into(),
        "-t".into(),
        "-sessionlog".into(),
        log_path.as_os_str().to_os_string(),
        "-logappend".into(),
        format!("{username}@{ip}").into(),
    ]
}

fn spawn_detached(exe: &Path, args: Vec<OsString>, own_console: bool) -> Result<()> {
    let mut cmd = Command::new(exe);
    cmd.args(&args);

    #[cfg(windows)]
    if own_console {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
        cmd.creation_flags(CREATE_NEW_CONSOLE);
    }
    #[cfg(not(windows))]
    let _ = own_console;

    // the child handle is dropped: the session outlives this process
    cmd.spawn()
        .with_context(|| format!("failed to start {}", exe.display()))?;
    Ok(())
}

/// One delayed check per launched session: sleep out the grace period, then
/// look at the log file once. No retry, no cancellation; if the receiver is
/// gone the notice is dropped.
pub fn watch_session_log(
    path: PathBuf,
    grace: Duration,
    notices: Sender<Notice>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(grace);
        let empty = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        if empty {
            warn!(path = %path.display(), "session log missing or empty after grace period");
            let _ = notices.send(Notice::SessionLogEmpty(path));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::mpsc::{channel, TryRecvError};

    #[test]
    fn sanitize_keeps_only_permitted_characters() {
        assert_eq!(sanitize("My NE #1"), "My_NE__1");
        assert_eq!(sanitize("core-rtr.site@lab"), "core-rtr.site@lab");
        assert_eq!(sanitize("10.0.0.1"), "10.0.0.1");
        assert_eq!(sanitize("a/b\\c:d"), "a_b_c_d");
    }

    #[test]
    fn session_log_path_is_deterministic() {
        let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let path = session_log_path(Path::new("/logs"), "My NE #1", "10.0.0.1", now);
        assert_eq!(
            path,
            PathBuf::from("/logs/ssh_My_NE__1_10.0.0.1_2024-01-02_030405.log")
        );
    }

    #[test]
    fn interactive_host_argument_comes_last() {
        let args = interactive_args("alice", "10.0.0.1", Path::new("/logs/s.log"));
        assert_eq!(args.last().unwrap(), &OsString::from("10.0.0.1"));
        // every other token is a flag or a flag value
        assert!(!args[..args.len() - 1].contains(&OsString::from("10.0.0.1")));
        assert!(args.contains(&OsString::from("-l")));
        assert!(args.contains(&OsString::from("alice")));
        assert!(args.contains(&OsString::from("-sessionlog")));
    }

    #[test]
    fn headless_user_at_host_comes_last() {
        let args = headless_args("alice", "10.0.0.1", Path::new("/logs/s.log"));
        assert_eq!(args.last().unwrap(), &OsString::from("alice@10.0.0.1"));
        assert!(args.contains(&OsString::from("-t")));
    }

    #[test]
    fn login_without_any_client_reports_searched_dirs() {
        let logs = tempfile::tempdir().unwrap();
        let locator = crate::locate::Locator::with_search_paths(
            vec![PathBuf::from("/pref")],
            Vec::new(),
            None,
            PathBuf::from("."),
        );
        let launcher = Launcher::new(locator, logs.path().to_path_buf());

        let (tx, _rx) = channel();
        let err = launcher
            .login("alice", "ne1", "10.0.0.1", tx)
            .unwrap_err()
            .to_string();
        assert!(err.contains("no SSH client found"));
        assert!(err.contains("/pref"));
    }

    #[test]
    fn missing_log_raises_a_notice_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-created.log");
        let (tx, rx) = channel();

        watch_session_log(path.clone(), Duration::from_millis(10), tx)
            .join()
            .unwrap();

        assert_eq!(rx.try_recv(), Ok(Notice::SessionLogEmpty(path)));
    }

    #[test]
    fn empty_log_raises_a_notice_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.log");
        fs::write(&path, b"").unwrap();
        let (tx, rx) = channel();

        watch_session_log(path, Duration::from_millis(10), tx)
            .join()
            .unwrap();

        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn populated_log_stays_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        fs::write(&path, b"login banner").unwrap();
        let (tx, rx) = channel();

        watch_session_log(path, Duration::from_millis(10), tx)
            .join()
            .unwrap();

        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }
}
