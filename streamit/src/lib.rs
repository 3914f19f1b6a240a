pub mod app;
pub mod cli;
pub mod logging;

pub use app::{login, logout, profile_card, status};
pub use cli::{Cli, Command};
