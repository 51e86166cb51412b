//! Raw-frame socket bound to one physical interface.
//!
//! A [`FrameSocket`] owns one transport endpoint plus the receive buffer
//! that is reused for every receive over the socket's lifetime. All I/O
//! goes through the [`Dispatcher`](crate::dispatch::Dispatcher), so the
//! socket behaves identically from bounded-latency and ordinary threads.

use std::collections::TryReserveError;
use std::io;
use std::sync::Arc;

use crate::dispatch::{Dispatcher, TransportError};
use crate::endpoint::{EndpointFactory, RawEndpoint};

/// Default EtherType the bridge filters its endpoints to.
pub const DEFAULT_PROTOCOL: u16 = 0x88A4;

/// Default receive-buffer capacity, sized for a full Ethernet frame with
/// VLAN headroom.
pub const DEFAULT_RX_BUFFER_SIZE: usize = 1600;

/// Socket setup failures.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("failed to allocate the receive buffer: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("failed to open raw endpoint: {0}")]
    EndpointCreation(#[source] io::Error),

    #[error("failed to bind endpoint to interface {index}: {source}")]
    Bind { index: u32, source: io::Error },
}

/// One endpoint bound to one interface, with its receive buffer.
pub struct FrameSocket {
    // Declaration order doubles as release order: endpoint first, then
    // the receive buffer.
    endpoint: Arc<dyn RawEndpoint>,
    rx_buf: Vec<u8>,
    index: u32,
    dispatcher: Dispatcher,
}

impl FrameSocket {
    /// Allocate the receive buffer, open a `protocol`-filtered endpoint
    /// and bind it to interface `index`.
    ///
    /// On failure, whatever was already acquired is released before the
    /// error is returned.
    pub fn create_and_bind(
        factory: &dyn EndpointFactory,
        protocol: u16,
        index: u32,
        rx_capacity: usize,
        dispatcher: Dispatcher,
    ) -> Result<Self, SocketError> {
        let mut rx_buf = Vec::new();
        rx_buf.try_reserve_exact(rx_capacity)?;
        rx_buf.resize(rx_capacity, 0);

        let endpoint = factory.open(protocol).map_err(SocketError::EndpointCreation)?;
        endpoint
            .bind(index)
            .map_err(|source| SocketError::Bind { index, source })?;

        Ok(Self {
            endpoint,
            rx_buf,
            index,
            dispatcher,
        })
    }

    /// Index of the bound interface.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Send one frame, returning the number of bytes sent.
    pub fn send(&self, frame: &[u8]) -> Result<usize, TransportError> {
        self.dispatcher.send(&self.endpoint, frame)
    }

    /// Receive one frame into the owned buffer. `Ok(0)` means no frame
    /// was pending.
    pub fn receive(&mut self) -> Result<usize, TransportError> {
        self.dispatcher.recv(&self.endpoint, &mut self.rx_buf)
    }

    /// The first `len` bytes of the receive buffer: the frame the last
    /// successful [`receive`](Self::receive) produced.
    pub fn rx_frame(&self, len: usize) -> &[u8] {
        &self.rx_buf[..len]
    }
}
