use anyhow::Result;
use framebridge_core::{DeviceIdentity, Master, Registration};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::BridgeConfig;

/// Running totals reported on the health tick.
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub frames_delivered: AtomicU64,
    pub link_changes: AtomicU64,
}

/// Master that accepts every offered device and reports its traffic
/// through tracing. Stands in for an embedding master when the bridge
/// runs on its own.
struct LoggingMaster {
    stats: Arc<BridgeStats>,
}

impl Master for LoggingMaster {
    fn register(&self, identity: &DeviceIdentity) -> Option<Box<dyn Registration>> {
        tracing::info!(interface = %identity.interface, "accepting device");
        Some(Box::new(LoggingRegistration {
            interface: identity.interface.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct LoggingRegistration {
    interface: String,
    stats: Arc<BridgeStats>,
}

impl Registration for LoggingRegistration {
    fn open(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        tracing::info!(interface = %self.interface, "device closed");
    }

    fn deliver_frame(&mut self, frame: &[u8]) {
        self.stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(interface = %self.interface, len = frame.len(), "frame received");
    }

    fn set_link_state(&mut self, up: bool) {
        self.stats.link_changes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(interface = %self.interface, up, "link state");
    }
}

pub async fn run_bridge(cfg: BridgeConfig, stop: watch::Receiver<bool>) -> Result<()> {
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (cfg, stop);
        anyhow::bail!("raw packet endpoints are currently Linux-only");
    }

    #[cfg(target_os = "linux")]
    {
        run_bridge_linux(cfg, stop).await
    }
}

#[cfg(target_os = "linux")]
async fn run_bridge_linux(cfg: BridgeConfig, mut stop: watch::Receiver<bool>) -> Result<()> {
    use anyhow::Context;
    use framebridge_core::endpoint::PacketEndpointFactory;
    use framebridge_core::{iface, BridgeOptions, DeviceRegistry, Dispatcher};

    tracing::info!(
        protocol = %format_args!("{:#06x}", cfg.protocol),
        poll_budget = cfg.poll_budget,
        rx_buffer_size = cfg.rx_buffer_size,
        "bridge config"
    );

    let stats = Arc::new(BridgeStats::default());
    let master = Arc::new(LoggingMaster {
        stats: Arc::clone(&stats),
    });

    let dispatcher = Dispatcher::spawn().context("failed to start the bounded-latency worker")?;

    let mut interfaces =
        iface::discover().context("failed to enumerate network interfaces")?;
    if !cfg.interfaces.is_empty() {
        interfaces.retain(|descriptor| cfg.interfaces.iter().any(|name| *name == descriptor.name));
    }

    let mut registry = DeviceRegistry::new(
        master,
        Arc::new(PacketEndpointFactory),
        dispatcher.clone(),
        BridgeOptions {
            protocol: cfg.protocol,
            rx_buffer_size: cfg.rx_buffer_size,
            poll_budget: cfg.poll_budget,
        },
    );

    let accepted = registry.start(interfaces)?;
    tracing::info!(accepted, "bridge started");

    let mut poll_tick = tokio::time::interval(cfg.poll_interval);
    let mut health_tick = tokio::time::interval(cfg.health_interval);

    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                registry.poll_all();
            }

            _ = health_tick.tick() => {
                tracing::info!(
                    devices = registry.len(),
                    frames_delivered = stats.frames_delivered.load(Ordering::Relaxed),
                    link_changes = stats.link_changes.load(Ordering::Relaxed),
                    "health tick"
                );
            }

            _ = stop.changed() => {
                if *stop.borrow() {
                    tracing::info!("stop requested");
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("ctrl-c received");
                break;
            }
        }
    }

    registry.stop();
    dispatcher.shutdown();
    tracing::info!("unloaded");
    Ok(())
}
