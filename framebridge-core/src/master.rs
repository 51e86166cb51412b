//! Registration seam towards the latency-sensitive master.
//!
//! The bridge proposes devices; the master may accept or reject each one.
//! An accepted device holds a [`Registration`] for the rest of its life
//! and uses it to push received frames and link-state changes back to
//! the master. Dropping the registration withdraws the device.

use std::io;

/// Virtual device identity presented to the master.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Name of the physical interface backing the device.
    pub interface: String,
    /// Hardware address copied from the backing interface.
    pub hw_addr: [u8; 6],
}

/// The consumer of bridged devices.
pub trait Master: Send + Sync {
    /// Propose a device. `Some` means accepted; `None` means rejected.
    fn register(&self, identity: &DeviceIdentity) -> Option<Box<dyn Registration>>;
}

/// Live registration of one accepted device.
pub trait Registration: Send {
    /// Mark the registration ready for traffic.
    fn open(&mut self) -> io::Result<()>;

    /// Mark the registration closed, ahead of withdrawal.
    fn close(&mut self);

    /// Hand one received frame to the master.
    fn deliver_frame(&mut self, frame: &[u8]);

    /// Report the carrier state of the backing interface.
    fn set_link_state(&mut self, up: bool);
}
