//! `docbridge` binary.

use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;

use docbridge_server::{BridgeConfig, BridgeServer};

/// Variables read by [`BridgeConfig::with_env_overrides`] and the logger.
const ENV_VARS: &[(&str, &str)] = &[
    ("DOCBRIDGE_LISTEN_ADDR", "Listen address (default: 0.0.0.0)"),
    ("DOCBRIDGE_LISTEN_PORT", "Listen port (default: 8080)"),
    ("DOCBRIDGE_BACKEND_URL", "Document store API base URL"),
    ("DOCBRIDGE_BACKEND_TENANT", "Tenant sent with every login"),
    ("DOCBRIDGE_BACKEND_CLIENT_ID", "Identity provider client id"),
    ("DOCBRIDGE_BACKEND_CLIENT_SECRET", "Identity provider client secret"),
    ("DOCBRIDGE_REFRESH_PERIOD", "Session refresh period, e.g. 30m"),
    ("DOCBRIDGE_RELEASE_GRACE", "Delay before a replaced session is released"),
    ("DOCBRIDGE_PROVISIONAL_TYPE_ID", "Document type used while keywords are pending"),
    ("DOCBRIDGE_AUTH_USERNAME", "Inbound basic auth user"),
    ("DOCBRIDGE_AUTH_PASSWORD", "Inbound basic auth password"),
    ("DOCBRIDGE_LOG_LEVEL", "Log filter directive"),
    ("RUST_LOG", "Overrides DOCBRIDGE_LOG_LEVEL"),
];

/// What the command line asks for.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Serve { config: Option<PathBuf> },
    Help,
    Version,
}

impl Command {
    fn from_args<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => match args.next() {
                    Some(path) => config = Some(PathBuf::from(path)),
                    None => bail!("{arg} needs a path"),
                },
                "--help" | "-h" => return Ok(Self::Help),
                "--version" | "-v" => return Ok(Self::Version),
                other => bail!("unknown argument '{other}', see --help"),
            }
        }

        Ok(Self::Serve { config })
    }
}

fn usage() -> String {
    let width = ENV_VARS.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let env: String = ENV_VARS
        .iter()
        .map(|(name, about)| format!("    {name:<width$}  {about}\n"))
        .collect();

    format!(
        "docbridge {version}
REST facade for the document store

USAGE:
    docbridge [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Configuration file (TOML or JSON)
    -h, --help             Print this help
    -v, --version          Print the version

ENVIRONMENT:
{env}",
        version = docbridge_server::VERSION,
    )
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<BridgeConfig> {
    let config = match path {
        Some(path) => BridgeConfig::from_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => BridgeConfig::default(),
    }
    .with_env_overrides();

    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Command::from_args(std::env::args().skip(1))? {
        Command::Help => {
            print!("{}", usage());
            return Ok(());
        }
        Command::Version => {
            println!("docbridge {}", docbridge_server::VERSION);
            return Ok(());
        }
        Command::Serve { config } => load_config(config)?,
    };

    docbridge_telemetry::init_telemetry(&config.telemetry)
        .context("failed to initialize telemetry")?;
    info!(
        version = docbridge_server::VERSION,
        listen_addr = %config.server.listen_addr,
        listen_port = config.server.listen_port,
        profiles = config.profiles.len(),
        "starting docbridge"
    );

    BridgeServer::new(config)
        .context("failed to create server")?
        .run()
        .await
        .context("server error")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Command> {
        Command::from_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_no_args_serves_defaults() {
        assert_eq!(parse(&[]).unwrap(), Command::Serve { config: None });
    }

    #[test]
    fn test_config_path() {
        assert_eq!(
            parse(&["-c", "/etc/docbridge.toml"]).unwrap(),
            Command::Serve {
                config: Some(PathBuf::from("/etc/docbridge.toml"))
            }
        );
    }

    #[test]
    fn test_help_wins_over_other_flags() {
        assert_eq!(parse(&["--config", "a.toml", "--help"]).unwrap(), Command::Help);
        assert_eq!(parse(&["-v"]).unwrap(), Command::Version);
    }

    #[test]
    fn test_bad_arguments_are_errors() {
        assert!(parse(&["--config"]).is_err());
        let err = parse(&["--port", "80"]).unwrap_err();
        assert!(err.to_string().contains("--port"));
    }

    #[test]
    fn test_usage_lists_every_variable() {
        let text = usage();
        for (name, _) in ENV_VARS {
            assert!(text.contains(name), "{name} missing from usage");
        }
    }
}
