//! Linux `AF_PACKET` endpoint implementation.
//!
//! One socket per endpoint, opened non-blocking and filtered to a single
//! EtherType, so receive attempts return immediately when nothing is
//! queued. Requires `CAP_NET_RAW`.
//!
//! # Platform
//!
//! This module is Linux-only and will not compile on other platforms.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;

use super::{EndpointFactory, RawEndpoint};

/// Raw packet socket filtered to one EtherType.
pub struct PacketEndpoint {
    fd: OwnedFd,
    protocol: u16,
}

impl PacketEndpoint {
    /// Open an unbound non-blocking packet socket for `protocol`.
    pub fn open(protocol: u16) -> io::Result<Self> {
        // SAFETY: plain socket(2) call; the returned fd is checked before
        // being handed to OwnedFd.
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK,
                protocol.to_be() as libc::c_int,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            // SAFETY: fd is a freshly created, owned socket descriptor.
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            protocol,
        })
    }
}

impl RawEndpoint for PacketEndpoint {
    fn bind(&self, index: u32) -> io::Result<()> {
        // SAFETY: sockaddr_ll is a plain-old-data struct; zeroing it is a
        // valid initial state.
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = self.protocol.to_be();
        addr.sll_ifindex = index as libc::c_int;

        // SAFETY: addr is a valid sockaddr_ll for the lifetime of the call.
        let rc = unsafe {
            libc::bind(
                self.fd.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn send(&self, frame: &[u8]) -> io::Result<usize> {
        // SAFETY: frame is a valid buffer for the duration of the call.
        let sent = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                frame.as_ptr().cast(),
                frame.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(sent as usize)
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: buf is a valid writable buffer for the duration of the call.
        let received = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                libc::MSG_DONTWAIT,
            )
        };
        if received < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(received as usize)
    }
}

/// Factory producing [`PacketEndpoint`]s.
pub struct PacketEndpointFactory;

impl EndpointFactory for PacketEndpointFactory {
    fn open(&self, protocol: u16) -> io::Result<Arc<dyn RawEndpoint>> {
        Ok(Arc::new(PacketEndpoint::open(protocol)?))
    }
}
