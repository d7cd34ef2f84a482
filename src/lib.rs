pub mod command;
pub mod config;
pub mod error;
pub mod util;
pub mod vcs;

pub use command::{CommandRunner, ProcessHandle, SystemCommandRunner};
pub use config::Config;
pub use error::VcsError;
pub use vcs::{driver, driver_by_name, VcsDriver, VcsKind};
