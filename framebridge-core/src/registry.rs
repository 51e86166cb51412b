//! Registry of active bridged devices.
//!
//! The registry consumes one enumeration of physical interfaces, offers
//! each to the master and keeps the accepted devices until `stop`. It is
//! the single owner of every device it accepted; devices the master
//! rejects (or that fail socket setup) never enter it.

use std::sync::Arc;

use crate::device::{Device, DEFAULT_POLL_BUDGET};
use crate::dispatch::Dispatcher;
use crate::endpoint::EndpointFactory;
use crate::iface::InterfaceDescriptor;
use crate::master::Master;
use crate::socket::{DEFAULT_PROTOCOL, DEFAULT_RX_BUFFER_SIZE};

/// Tunables applied to every offered device.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// EtherType the raw endpoints are filtered to.
    pub protocol: u16,
    /// Capacity of each device's receive buffer.
    pub rx_buffer_size: usize,
    /// Receive attempts per device and poll pass.
    pub poll_budget: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL,
            rx_buffer_size: DEFAULT_RX_BUFFER_SIZE,
            poll_budget: DEFAULT_POLL_BUDGET,
        }
    }
}

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("no usable network interfaces found")]
    NoDevicesFound,
}

/// Owner of all active devices.
pub struct DeviceRegistry {
    master: Arc<dyn Master>,
    endpoints: Arc<dyn EndpointFactory>,
    dispatcher: Dispatcher,
    options: BridgeOptions,
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new(
        master: Arc<dyn Master>,
        endpoints: Arc<dyn EndpointFactory>,
        dispatcher: Dispatcher,
        options: BridgeOptions,
    ) -> Self {
        Self {
            master,
            endpoints,
            dispatcher,
            options,
            devices: Vec::new(),
        }
    }

    /// Offer every discovered interface to the master.
    ///
    /// Rejected devices are torn down and discarded on the spot. An
    /// empty enumeration is a startup failure. Returns the number of
    /// accepted devices; expects a stopped registry.
    pub fn start(
        &mut self,
        interfaces: impl IntoIterator<Item = InterfaceDescriptor>,
    ) -> Result<usize, StartError> {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            "starting raw-Ethernet device bridge"
        );

        let mut discovered = 0;
        for descriptor in interfaces {
            discovered += 1;
            let mut device = Device::new(descriptor);
            match device.offer(
                self.master.as_ref(),
                self.endpoints.as_ref(),
                self.options.protocol,
                self.options.rx_buffer_size,
                self.dispatcher.clone(),
            ) {
                Ok(()) => {
                    tracing::info!(interface = device.interface(), "device accepted");
                    self.devices.push(device);
                }
                Err(err) => {
                    tracing::warn!(interface = device.interface(), %err, "device not accepted");
                    device.teardown();
                }
            }
        }

        if discovered == 0 {
            tracing::error!("no network interfaces found");
            return Err(StartError::NoDevicesFound);
        }
        if self.devices.is_empty() {
            tracing::warn!(discovered, "no discovered interface was accepted");
        }
        Ok(self.devices.len())
    }

    /// Tear down every device, in registration order. Idempotent.
    pub fn stop(&mut self) {
        if self.devices.is_empty() {
            return;
        }
        tracing::info!(devices = self.devices.len(), "stopping device bridge");
        for mut device in self.devices.drain(..) {
            device.teardown();
        }
    }

    /// One poll pass over all devices with the configured budget.
    /// Returns the number of frames delivered to the master.
    pub fn poll_all(&mut self) -> usize {
        let budget = self.options.poll_budget;
        let mut delivered = 0;
        for device in &mut self.devices {
            match device.poll_with_budget(budget) {
                Ok(count) => delivered += count,
                Err(err) => {
                    tracing::warn!(interface = device.interface(), %err, "poll failed");
                }
            }
        }
        delivered
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [Device] {
        &mut self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}
