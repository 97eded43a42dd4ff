mod app;
mod config;
mod input;
mod launch;
mod locate;
mod store;
mod terminal;
mod username;

pub use app::App;
pub use config::Config;
pub use launch::{Launcher, Notice, Session};
pub use locate::{ClientKind, Locator};
pub use store::{ImportReport, NetworkElement, Store};
pub use terminal::Terminal;
pub use username::{EnvSource, Settings, SystemEnv, UsernameResolver, UsernameSource};
