//! Raw-frame transport endpoints.
//!
//! An endpoint is a protocol-filtered, interface-bound datagram-style
//! handle that moves whole Ethernet frames. The traits here are the seam
//! between the bridge and the host's transport primitive; the Linux
//! implementation lives in the `packet` submodule.
//!
//! # Safety
//!
//! The packet-socket implementation uses FFI and `unsafe` code, which is
//! isolated to the `packet` submodule.

use std::io;
use std::sync::Arc;

#[cfg(target_os = "linux")]
pub mod packet;

#[cfg(target_os = "linux")]
pub use packet::PacketEndpointFactory;

/// A raw frame endpoint.
///
/// `recv` never blocks: `Ok(0)` means no frame is pending, which is
/// unambiguous because an Ethernet frame is never empty.
pub trait RawEndpoint: Send + Sync {
    /// Bind the endpoint to a physical interface.
    fn bind(&self, index: u32) -> io::Result<()>;

    /// Send one frame, returning the number of bytes sent.
    fn send(&self, frame: &[u8]) -> io::Result<usize>;

    /// Receive one frame into `buf` without waiting for one to arrive.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens raw endpoints filtered to a single EtherType.
pub trait EndpointFactory: Send + Sync {
    /// Open an unbound endpoint that only carries `protocol` frames.
    fn open(&self, protocol: u16) -> io::Result<Arc<dyn RawEndpoint>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mock endpoint for testing the trait surface.
    struct MockEndpoint {
        bound: Mutex<Option<u32>>,
    }

    impl RawEndpoint for MockEndpoint {
        fn bind(&self, index: u32) -> io::Result<()> {
            *self.bound.lock().unwrap() = Some(index);
            Ok(())
        }

        fn send(&self, frame: &[u8]) -> io::Result<usize> {
            Ok(frame.len())
        }

        fn recv(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_mock_endpoint() {
        let endpoint = MockEndpoint {
            bound: Mutex::new(None),
        };

        endpoint.bind(4).unwrap();
        assert_eq!(*endpoint.bound.lock().unwrap(), Some(4));

        assert_eq!(endpoint.send(&[1, 2, 3]).unwrap(), 3);

        let mut buf = [0u8; 64];
        assert_eq!(endpoint.recv(&mut buf).unwrap(), 0);
    }
}
