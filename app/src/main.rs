//! Webmail - operator command line entry point

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use webmail_core::Config;

mod commands;

use commands::Command;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mailbox to act on (an already-authenticated address)
    #[arg(long, global = true, env = "WEBMAIL_OWNER")]
    owner: Option<String>,

    /// Print messages as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = match args.config.clone() {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config.apply_env();

    let log_level = if args.debug {
        "debug".to_string()
    } else {
        config.app.log_level.clone()
    };
    init_logging(&log_level);

    info!("Starting {} v{}", webmail_core::APP_NAME, webmail_core::VERSION);
    config.validate()?;

    let mut stdout = std::io::stdout();

    if let Command::InitConfig { force } = args.command {
        return commands::init_config(&config, &config_path, force, &mut stdout);
    }

    let owner = args
        .owner
        .context("--owner (or WEBMAIL_OWNER) is required for mailbox commands")?;

    let engine = webmail_core::open_engine(&config).await?;
    commands::run(&engine, &owner, args.command, args.json, &mut stdout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_options() {
        let args = Args::try_parse_from([
            "webmail",
            "list",
            "Projects",
            "--owner",
            "alice@test.com",
            "--json",
        ])
        .unwrap();

        assert_eq!(args.owner.as_deref(), Some("alice@test.com"));
        assert!(args.json);
        assert!(matches!(
            args.command,
            Command::List { folder: Some(ref f), outgoing: false } if f == "Projects"
        ));
    }

    #[test]
    fn test_forward_requires_recipients() {
        assert!(Args::try_parse_from(["webmail", "forward", "some-id"]).is_err());

        let args = Args::try_parse_from([
            "webmail", "forward", "some-id", "--to", "a@test.com", "--to", "b@test.com",
        ])
        .unwrap();
        match args.command {
            Command::Forward { to, .. } => assert_eq!(to, vec!["a@test.com", "b@test.com"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
