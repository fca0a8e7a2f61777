mod commands;
mod invocation;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

/// Exit code for failures after the arguments were accepted (config,
/// discovery, authentication, catalog, log file).
const SETUP_FAILURE: u8 = 5;

#[derive(Parser)]
#[command(name = "holidir")]
#[command(about = "Insert or remove holiday calendar entries across every mailbox")]
#[command(after_help = invocation::USAGE)]
struct Cli {
    /// Config file (defaults to ~/.config/holidir/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the confirmation prompt of full_* modes
    #[arg(short, long)]
    yes: bool,

    /// <mode> <username> <password> [<mailbox-list>]
    ///
    /// Options go before <mode>; everything from <mode> on is taken
    /// verbatim, so credentials may start with '-'.
    #[arg(
        value_name = "ARGS",
        num_args = 0..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let invocation = match invocation::classify(&cli.args) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            eprintln!("{}", invocation::USAGE);
            eprintln!("Exit code {}", e.exit_code());
            return ExitCode::from(e.exit_code());
        }
    };

    match commands::run(invocation, cli.config.as_deref(), cli.yes).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::from(SETUP_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_starting_with_dash_is_positional() {
        let cli = Cli::try_parse_from(["holidir", "full_insert", "admin", "-s3cret"]).unwrap();
        assert_eq!(cli.args, vec!["full_insert", "admin", "-s3cret"]);
        assert!(!cli.yes);
    }

    #[test]
    fn test_options_before_mode_with_dashed_credentials() {
        let cli = Cli::try_parse_from([
            "holidir",
            "--yes",
            "--config",
            "/etc/holidir.toml",
            "list_insert",
            "-admin",
            "--pw",
            "/tmp/list.txt",
        ])
        .unwrap();

        assert!(cli.yes);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/holidir.toml")));
        assert_eq!(cli.args, vec!["list_insert", "-admin", "--pw", "/tmp/list.txt"]);
    }
}
