//! Core library for the Framebridge raw-Ethernet device bridge.
//!
//! Framebridge exposes discovered physical Ethernet interfaces as
//! raw-frame transport devices to a latency-sensitive consumer (the
//! master). Frame I/O is context-aware: operations started on a
//! bounded-latency thread call the transport endpoint directly, while
//! operations started on an ordinary thread are relayed through a
//! bounded-latency worker, with identical results either way.
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! - `iface`: physical interface discovery and link sensing
//! - `endpoint`: raw transport endpoints (Linux packet sockets)
//! - `dispatch`: context probe and the bounded-latency relay worker
//! - `socket`: one bound endpoint plus its receive buffer
//! - `master`: the registration seam towards the master
//! - `device`: device lifecycle, transmit and poll
//! - `registry`: discovery/offer loop and start/stop lifecycle
//!
//! # Example
//!
//! ```no_run
//! # fn example() -> std::io::Result<()> {
//! // Wire a registry to a master implementation (sketch):
//! // let dispatcher = framebridge_core::Dispatcher::spawn()?;
//! // let mut registry = DeviceRegistry::new(master, endpoints, dispatcher, options);
//! // registry.start(framebridge_core::iface::discover()?)?;
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod dispatch;
pub mod endpoint;
pub mod iface;
pub mod master;
pub mod registry;
pub mod socket;

pub use device::{Device, OfferError, TxStatus, DEFAULT_POLL_BUDGET};
pub use dispatch::{in_rt_context, DispatchError, Dispatcher, RtScope, TransportError};
pub use iface::{InterfaceDescriptor, LinkSense};
pub use master::{DeviceIdentity, Master, Registration};
pub use registry::{BridgeOptions, DeviceRegistry, StartError};
pub use socket::{FrameSocket, SocketError, DEFAULT_PROTOCOL, DEFAULT_RX_BUFFER_SIZE};
