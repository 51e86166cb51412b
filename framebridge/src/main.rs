use anyhow::Result;
use framebridge_core::iface;

mod cli;
mod config;
mod runtime;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = <cli::Cli as clap::Parser>::parse();
    let config_path = match cli.config {
        Some(p) => p,
        None => config::default_config_path()?,
    };

    match cli.command.unwrap_or(cli::Command::Run) {
        cli::Command::PrintConfigPath => {
            println!("{}", config_path.display());
            Ok(())
        }
        cli::Command::InitConfig { force } => {
            let cfg = config::BridgeConfig::default();
            config::save(&config_path, &cfg, force)?;
            println!("Wrote default config to {}", config_path.display());
            Ok(())
        }
        cli::Command::ListInterfaces => {
            for descriptor in iface::discover()? {
                println!(
                    "{} (index {}, {})",
                    descriptor.name,
                    descriptor.index,
                    iface::format_hw_addr(&descriptor.hw_addr)
                );
            }
            Ok(())
        }
        cli::Command::Run => {
            let cfg = config::load(&config_path)?;
            let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
            runtime::run_bridge(cfg, stop_rx).await
        }
    }
}
