use std::path::PathBuf;

use clap::Parser;
use classroom_common::{ClassroomError, ConfigError};
use classroom_config::{ClassroomConfig, LogLevel};
use classroom_relay::RelayServer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

#[derive(Parser)]
#[command(name = "classroom-relay", about = "WebSocket relay for classroom rooms")]
struct Args {
    /// Path to a TOML config file. Defaults to `$CLASSROOM_CONFIG`, then the
    /// platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides config).
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides config).
    #[arg(short, long)]
    port: Option<u16>,
}

fn default_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::new(format!("classroom_relay={}", level.as_filter()))
}

/// Load the config file and apply command-line overrides.
fn load(args: &Args) -> Result<ClassroomConfig, ConfigError> {
    let mut config = classroom_config::load_config(args.config.as_deref())?;
    if let Some(bind) = &args.bind {
        config.relay.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.relay.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), ClassroomError> {
    // Installed before loading so the loader's messages are visible; the
    // configured level replaces the default once the file is read.
    let from_env = EnvFilter::try_from_default_env().ok();
    let has_env_filter = from_env.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| default_filter(LogLevel::default())));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let args = Args::parse();
    let config = load(&args)?;

    if !has_env_filter {
        if let Err(e) = filter_handle.reload(default_filter(config.logging.level)) {
            tracing::warn!(error = %e, "Failed to apply configured log level");
        }
    }

    let server = RelayServer::bind(&config.relay).await?;
    tracing::info!("classroom-relay listening on {}", server.local_addr()?);

    server.run().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("classroom-relay").chain(argv.iter().copied()))
    }

    #[test]
    fn config_comes_from_env_path_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[relay]\nport = 4100\nbind = \"127.0.0.1\"\n").unwrap();
        std::env::set_var(classroom_config::toml_loader::CONFIG_PATH_ENV, &path);

        let config = load(&args(&[])).unwrap();
        assert_eq!(config.relay.port, 4100);
        assert_eq!(config.relay.bind, "127.0.0.1");

        let config = load(&args(&["--port", "4200", "--bind", "0.0.0.0"])).unwrap();
        assert_eq!(config.relay.port, 4200);
        assert_eq!(config.relay.bind, "0.0.0.0");

        std::env::remove_var(classroom_config::toml_loader::CONFIG_PATH_ENV);
    }

    #[test]
    fn explicit_config_flag_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[relay]\nport = 4300\n").unwrap();

        let config = load(&args(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(config.relay.port, 4300);
    }
}
