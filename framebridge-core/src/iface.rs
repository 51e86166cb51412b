//! Physical interface discovery and link sensing.
//!
//! Discovery yields one [`InterfaceDescriptor`] per usable Ethernet
//! interface. A descriptor is produced once and consumed to construct
//! exactly one device; the only part of it that stays live afterwards is
//! the [`LinkSense`] handle the device keeps for carrier queries.
//!
//! The built-in enumeration reads `/sys/class/net`, which is sufficient
//! for physical Ethernet interfaces and avoids a netlink dependency.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// ARP hardware type for Ethernet, as exposed by sysfs `type` files.
const ARPHRD_ETHER: u16 = 1;

/// Carrier-state probe for one physical interface.
///
/// Implementations must be cheap and side-effect-free; devices call this
/// on every transmit and poll.
pub trait LinkSense: Send + Sync {
    /// Returns true while the interface has carrier.
    fn carrier_ok(&self) -> bool;
}

/// One discovered physical interface.
#[derive(Clone)]
pub struct InterfaceDescriptor {
    /// Interface name (e.g. "eth0").
    pub name: String,
    /// Interface index as known to the host.
    pub index: u32,
    /// Hardware address of the interface.
    pub hw_addr: [u8; 6],
    link: Arc<dyn LinkSense>,
}

impl InterfaceDescriptor {
    /// Create a descriptor with an explicit link probe.
    pub fn new(name: String, index: u32, hw_addr: [u8; 6], link: Arc<dyn LinkSense>) -> Self {
        Self {
            name,
            index,
            hw_addr,
            link,
        }
    }

    /// Shared handle to the interface's link probe.
    pub fn link(&self) -> Arc<dyn LinkSense> {
        Arc::clone(&self.link)
    }
}

impl fmt::Debug for InterfaceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceDescriptor")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("hw_addr", &format_hw_addr(&self.hw_addr))
            .finish()
    }
}

/// Formats a hardware address in the usual colon-separated form.
pub fn format_hw_addr(addr: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        addr[0], addr[1], addr[2], addr[3], addr[4], addr[5]
    )
}

/// Enumerate the host's Ethernet interfaces via sysfs.
///
/// Non-Ethernet interfaces (loopback, tunnels, ...) are skipped.
/// Interfaces with unreadable attributes are skipped with a warning
/// rather than failing the whole enumeration.
pub fn discover() -> io::Result<Vec<InterfaceDescriptor>> {
    discover_in(Path::new("/sys/class/net"))
}

fn discover_in(root: &Path) -> io::Result<Vec<InterfaceDescriptor>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match read_descriptor(&entry.path(), &name) {
            Ok(Some(descriptor)) => {
                tracing::debug!(interface = %name, index = descriptor.index, "discovered interface");
                found.push(descriptor);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(interface = %name, %err, "skipping interface");
            }
        }
    }
    Ok(found)
}

fn read_descriptor(path: &Path, name: &str) -> io::Result<Option<InterfaceDescriptor>> {
    let if_type: u16 = read_attr(&path.join("type"))?
        .parse()
        .map_err(|_| invalid_attr("type"))?;
    if if_type != ARPHRD_ETHER {
        return Ok(None);
    }

    let index: u32 = read_attr(&path.join("ifindex"))?
        .parse()
        .map_err(|_| invalid_attr("ifindex"))?;
    let hw_addr =
        parse_hw_addr(&read_attr(&path.join("address"))?).ok_or_else(|| invalid_attr("address"))?;

    let link = Arc::new(SysfsLink {
        carrier_path: path.join("carrier"),
    });
    Ok(Some(InterfaceDescriptor::new(
        name.to_owned(),
        index,
        hw_addr,
        link,
    )))
}

fn read_attr(path: &Path) -> io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_owned())
}

fn invalid_attr(attr: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("malformed sysfs attribute '{attr}'"),
    )
}

fn parse_hw_addr(raw: &str) -> Option<[u8; 6]> {
    let mut addr = [0u8; 6];
    let mut parts = raw.split(':');
    for byte in &mut addr {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    // Longer addresses (e.g. InfiniBand) are not ours to bridge.
    if parts.next().is_some() {
        return None;
    }
    Some(addr)
}

/// Link probe backed by the interface's sysfs `carrier` attribute.
///
/// Reading `carrier` fails while the interface is administratively down;
/// that is reported as "no carrier".
struct SysfsLink {
    carrier_path: PathBuf,
}

impl LinkSense for SysfsLink {
    fn carrier_ok(&self) -> bool {
        matches!(fs::read_to_string(&self.carrier_path), Ok(raw) if raw.trim() == "1")
    }
}
