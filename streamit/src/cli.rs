use clap::{Parser, Subcommand};

/// StreamIt on the big screen
#[derive(Parser, Debug)]
#[command(name = "streamit", version, about = "StreamIt TV client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Sign in with a code entered on another device
    Login,
    /// Forget the stored session
    Logout,
    /// Show who is signed in
    Status,
}

impl Cli {
    /// `login` when no subcommand is given.
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_is_default() {
        let cli = Cli::try_parse_from(["streamit"]).unwrap();
        assert_eq!(cli.command(), Command::Login);
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["streamit", "logout"]).unwrap();
        assert_eq!(cli.command(), Command::Logout);

        let cli = Cli::try_parse_from(["streamit", "status"]).unwrap();
        assert_eq!(cli.command(), Command::Status);

        assert!(Cli::try_parse_from(["streamit", "watch"]).is_err());
    }
}
