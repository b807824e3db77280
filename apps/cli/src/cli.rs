use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Orbit application server.
#[derive(Parser, Debug)]
#[command(name = "orbit", version, about = "Run and inspect an Orbit server")]
pub struct Cli {
    /// TOML configuration file; repeat to layer several.
    #[arg(short, long = "config", global = true, env = "ORBIT_CONFIG_FILE")]
    pub config: Vec<PathBuf>,

    /// Ignore `ORBIT_*` environment overrides.
    #[arg(long, global = true)]
    pub no_env: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Boot the engine and serve until Ctrl-C.
    Start,
    /// Load and validate the configuration, then print it.
    CheckConfig {
        /// Print the merged configuration as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_layered_config_files() {
        let cli = Cli::parse_from(["orbit", "-c", "base.toml", "start", "--config", "local.toml"]);
        assert_eq!(cli.command, Command::Start);
        assert_eq!(
            cli.config,
            vec![PathBuf::from("base.toml"), PathBuf::from("local.toml")]
        );
        assert!(!cli.no_env);
    }

    #[test]
    fn parses_check_config() {
        let cli = Cli::parse_from(["orbit", "check-config", "--json", "--no-env"]);
        assert_eq!(cli.command, Command::CheckConfig { json: true });
        assert!(cli.no_env);
    }
}
