//! One bridged device: a physical interface exposed to the master.
//!
//! A device pairs a virtual identity with one raw-frame socket. Its life
//! runs discovery → offer → active traffic (transmit/poll) → teardown;
//! a failed offer unwinds completely, so no partially initialized device
//! ever stays reachable.

use std::io;
use std::sync::Arc;

use crate::dispatch::{DispatchError, Dispatcher, TransportError};
use crate::endpoint::EndpointFactory;
use crate::iface::{InterfaceDescriptor, LinkSense};
use crate::master::{DeviceIdentity, Master, Registration};
use crate::socket::{FrameSocket, SocketError};

/// Receive attempts per poll unless the caller chooses a budget.
///
/// The bound keeps one poll's work deterministic even under frame
/// flooding.
pub const DEFAULT_POLL_BUDGET: usize = 128;

/// Outcome of handing one frame to [`Device::transmit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// The whole frame was sent.
    Accepted,
    /// The frame was not (fully) sent; retry later.
    Busy,
}

/// Why an offer did not produce an active device.
#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("master rejected the device")]
    Rejected,

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error("master failed to open the device: {0}")]
    Open(#[source] io::Error),
}

/// A physical interface bridged to the master.
pub struct Device {
    identity: DeviceIdentity,
    index: u32,
    link: Arc<dyn LinkSense>,
    socket: Option<FrameSocket>,
    registration: Option<Box<dyn Registration>>,
    link_up: bool,
}

impl Device {
    /// Consume one discovery descriptor.
    pub fn new(descriptor: InterfaceDescriptor) -> Self {
        let link = descriptor.link();
        Self {
            index: descriptor.index,
            identity: DeviceIdentity {
                interface: descriptor.name,
                hw_addr: descriptor.hw_addr,
            },
            link,
            socket: None,
            registration: None,
            link_up: false,
        }
    }

    /// Name of the backing interface.
    pub fn interface(&self) -> &str {
        &self.identity.interface
    }

    /// Index of the backing interface.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Last observed carrier state.
    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// Propose this device to the master and bring it up.
    ///
    /// Registers the identity, creates and binds the socket, opens the
    /// registration and reports the initial link state. Any sub-step
    /// failure unwinds everything acquired so far; afterwards the device
    /// is active iff this returned `Ok`.
    pub fn offer(
        &mut self,
        master: &dyn Master,
        endpoints: &dyn EndpointFactory,
        protocol: u16,
        rx_capacity: usize,
        dispatcher: Dispatcher,
    ) -> Result<(), OfferError> {
        // Dropping `registration` on an error path withdraws it again.
        let mut registration = master.register(&self.identity).ok_or(OfferError::Rejected)?;

        let socket =
            FrameSocket::create_and_bind(endpoints, protocol, self.index, rx_capacity, dispatcher)?;
        tracing::info!(
            interface = %self.identity.interface,
            index = self.index,
            "bound raw socket to interface"
        );

        registration.open().map_err(OfferError::Open)?;

        self.link_up = self.link.carrier_ok();
        registration.set_link_state(self.link_up);

        self.socket = Some(socket);
        self.registration = Some(registration);
        Ok(())
    }

    /// The socket is already bound at offer time; nothing to do.
    pub fn open(&self) -> io::Result<()> {
        Ok(())
    }

    /// Leaves the socket bound so the device can reopen without a
    /// re-bind.
    pub fn stop(&self) -> io::Result<()> {
        Ok(())
    }

    /// Refresh link state and send one frame.
    ///
    /// `Busy` is back-pressure, not failure: the frame was not consumed
    /// and the caller should retry. Only a broken dispatch relay is an
    /// error.
    pub fn transmit(&mut self, frame: &[u8]) -> Result<TxStatus, DispatchError> {
        self.refresh_link();
        let Some(socket) = self.socket.as_ref() else {
            return Ok(TxStatus::Busy);
        };

        match socket.send(frame) {
            Ok(sent) if sent == frame.len() => Ok(TxStatus::Accepted),
            Ok(sent) => {
                tracing::debug!(
                    interface = %self.identity.interface,
                    sent,
                    len = frame.len(),
                    "short send"
                );
                Ok(TxStatus::Busy)
            }
            Err(TransportError::Endpoint(err)) => {
                tracing::debug!(interface = %self.identity.interface, %err, "send failed");
                Ok(TxStatus::Busy)
            }
            Err(TransportError::Dispatch(err)) => Err(err),
        }
    }

    /// [`poll_with_budget`](Self::poll_with_budget) with the default
    /// budget.
    pub fn poll(&mut self) -> Result<usize, TransportError> {
        self.poll_with_budget(DEFAULT_POLL_BUDGET)
    }

    /// Refresh link state, then drain received frames to the master.
    ///
    /// Performs at most `budget` receive attempts, delivering each frame
    /// before the next attempt. Stops at the first empty receive, or at
    /// the first failed one. Frames delivered up to that point stay
    /// delivered, and the error is returned for the caller to act on.
    pub fn poll_with_budget(&mut self, budget: usize) -> Result<usize, TransportError> {
        self.refresh_link();

        let Device {
            socket,
            registration,
            ..
        } = self;
        let Some(socket) = socket.as_mut() else {
            return Ok(0);
        };

        let mut delivered = 0;
        for _ in 0..budget {
            let received = socket.receive()?;
            if received == 0 {
                break;
            }
            if let Some(registration) = registration.as_mut() {
                registration.deliver_frame(socket.rx_frame(received));
            }
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Release the registration (close, then withdraw) and the socket.
    /// Safe to call more than once.
    pub fn teardown(&mut self) {
        if let Some(mut registration) = self.registration.take() {
            registration.close();
        }
        if self.socket.take().is_some() {
            tracing::debug!(interface = %self.identity.interface, "closed raw socket");
        }
    }

    fn refresh_link(&mut self) {
        let up = self.link.carrier_ok();
        if up == self.link_up {
            return;
        }
        self.link_up = up;
        tracing::info!(interface = %self.identity.interface, up, "link state changed");
        if let Some(registration) = self.registration.as_mut() {
            registration.set_link_state(up);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::RawEndpoint;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct StubLink {
        up: AtomicBool,
    }

    impl StubLink {
        fn new(up: bool) -> Arc<Self> {
            Arc::new(Self {
                up: AtomicBool::new(up),
            })
        }

        fn set(&self, up: bool) {
            self.up.store(up, Ordering::Relaxed);
        }
    }

    impl LinkSense for StubLink {
        fn carrier_ok(&self) -> bool {
            self.up.load(Ordering::Relaxed)
        }
    }

    struct ScriptedEndpoint {
        rx: Mutex<VecDeque<io::Result<Vec<u8>>>>,
        send_results: Mutex<VecDeque<io::Result<usize>>>,
    }

    impl ScriptedEndpoint {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                rx: Mutex::new(VecDeque::new()),
                send_results: Mutex::new(VecDeque::new()),
            })
        }
    }

    impl RawEndpoint for ScriptedEndpoint {
        fn bind(&self, _index: u32) -> io::Result<()> {
            Ok(())
        }

        fn send(&self, frame: &[u8]) -> io::Result<usize> {
            self.send_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(frame.len()))
        }

        fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            match self.rx.lock().unwrap().pop_front() {
                Some(Ok(frame)) => {
                    buf[..frame.len()].copy_from_slice(&frame);
                    Ok(frame.len())
                }
                Some(Err(err)) => Err(err),
                None => Ok(0),
            }
        }
    }

    struct SharedFactory {
        endpoint: Arc<ScriptedEndpoint>,
    }

    impl EndpointFactory for SharedFactory {
        fn open(&self, _protocol: u16) -> io::Result<Arc<dyn RawEndpoint>> {
            Ok(self.endpoint.clone())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Registered,
        Opened,
        Frame(Vec<u8>),
        Link(bool),
        Closed,
        Withdrawn,
    }

    type EventLog = Arc<Mutex<Vec<Event>>>;

    struct RecordingMaster {
        events: EventLog,
    }

    impl Master for RecordingMaster {
        fn register(&self, _identity: &DeviceIdentity) -> Option<Box<dyn Registration>> {
            self.events.lock().unwrap().push(Event::Registered);
            Some(Box::new(RecordingRegistration {
                events: self.events.clone(),
            }))
        }
    }

    struct RecordingRegistration {
        events: EventLog,
    }

    impl Registration for RecordingRegistration {
        fn open(&mut self) -> io::Result<()> {
            self.events.lock().unwrap().push(Event::Opened);
            Ok(())
        }

        fn close(&mut self) {
            self.events.lock().unwrap().push(Event::Closed);
        }

        fn deliver_frame(&mut self, frame: &[u8]) {
            self.events.lock().unwrap().push(Event::Frame(frame.to_vec()));
        }

        fn set_link_state(&mut self, up: bool) {
            self.events.lock().unwrap().push(Event::Link(up));
        }
    }

    impl Drop for RecordingRegistration {
        fn drop(&mut self) {
            self.events.lock().unwrap().push(Event::Withdrawn);
        }
    }

    fn descriptor(link: Arc<StubLink>) -> InterfaceDescriptor {
        InterfaceDescriptor::new("eth0".to_string(), 2, [2, 0, 0, 0, 0, 1], link)
    }

    fn active_device(
        link: Arc<StubLink>,
        endpoint: Arc<ScriptedEndpoint>,
        events: EventLog,
    ) -> Device {
        let mut device = Device::new(descriptor(link));
        let master = RecordingMaster { events };
        let factory = SharedFactory { endpoint };
        device
            .offer(&master, &factory, 0x88A4, 1600, Dispatcher::spawn().unwrap())
            .unwrap();
        device
    }

    #[test]
    fn test_offer_reports_initial_link_state() {
        let events: EventLog = Default::default();
        let device = active_device(StubLink::new(true), ScriptedEndpoint::new(), events.clone());

        assert!(device.link_up());
        assert_eq!(
            *events.lock().unwrap(),
            vec![Event::Registered, Event::Opened, Event::Link(true)]
        );
    }

    #[test]
    fn test_transmit_accepted_and_busy() {
        let events: EventLog = Default::default();
        let endpoint = ScriptedEndpoint::new();
        {
            let mut sends = endpoint.send_results.lock().unwrap();
            sends.push_back(Ok(4)); // full frame
            sends.push_back(Ok(2)); // short send
            sends.push_back(Err(io::Error::from_raw_os_error(11))); // EAGAIN
        }
        let mut device = active_device(StubLink::new(true), endpoint, events);

        assert_eq!(device.transmit(&[0; 4]).unwrap(), TxStatus::Accepted);
        assert_eq!(device.transmit(&[0; 4]).unwrap(), TxStatus::Busy);
        assert_eq!(device.transmit(&[0; 4]).unwrap(), TxStatus::Busy);
    }

    #[test]
    fn test_link_change_is_reported_once() {
        let events: EventLog = Default::default();
        let link = StubLink::new(true);
        let mut device = active_device(link.clone(), ScriptedEndpoint::new(), events.clone());

        // No change, no report.
        device.poll().unwrap();
        device.transmit(&[0; 4]).unwrap();
        link.set(false);
        device.poll().unwrap();
        device.poll().unwrap();

        let links: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Link(_)))
            .cloned()
            .collect();
        assert_eq!(links, vec![Event::Link(true), Event::Link(false)]);
        assert!(!device.link_up());
    }

    #[test]
    fn test_poll_delivers_then_stops_on_empty() {
        let events: EventLog = Default::default();
        let endpoint = ScriptedEndpoint::new();
        {
            let mut rx = endpoint.rx.lock().unwrap();
            rx.push_back(Ok(vec![1, 1]));
            rx.push_back(Ok(vec![2, 2]));
        }
        let mut device = active_device(StubLink::new(true), endpoint, events.clone());

        assert_eq!(device.poll().unwrap(), 2);
        let frames: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Frame(_)))
            .cloned()
            .collect();
        assert_eq!(frames, vec![Event::Frame(vec![1, 1]), Event::Frame(vec![2, 2])]);
    }

    #[test]
    fn test_poll_stops_on_error_after_delivering() {
        let events: EventLog = Default::default();
        let endpoint = ScriptedEndpoint::new();
        {
            let mut rx = endpoint.rx.lock().unwrap();
            rx.push_back(Ok(vec![1]));
            rx.push_back(Err(io::Error::from_raw_os_error(100)));
            rx.push_back(Ok(vec![2]));
        }
        let mut device = active_device(StubLink::new(true), endpoint, events.clone());

        assert!(device.poll().is_err());
        let frames = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Frame(_)))
            .count();
        assert_eq!(frames, 1);
    }

    #[test]
    fn test_teardown_closes_then_withdraws_once() {
        let events: EventLog = Default::default();
        let mut device = active_device(StubLink::new(true), ScriptedEndpoint::new(), events.clone());

        device.teardown();
        device.teardown();

        let trailing: Vec<_> = events.lock().unwrap().iter().rev().take(2).cloned().collect();
        assert_eq!(trailing, vec![Event::Withdrawn, Event::Closed]);
        assert_eq!(
            events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| matches!(e, Event::Closed | Event::Withdrawn))
                .count(),
            2
        );
    }

    #[test]
    fn test_rejected_offer_keeps_device_inactive() {
        struct RejectingMaster;
        impl Master for RejectingMaster {
            fn register(&self, _identity: &DeviceIdentity) -> Option<Box<dyn Registration>> {
                None
            }
        }

        let mut device = Device::new(descriptor(StubLink::new(true)));
        let factory = SharedFactory {
            endpoint: ScriptedEndpoint::new(),
        };
        let result = device.offer(
            &RejectingMaster,
            &factory,
            0x88A4,
            1600,
            Dispatcher::spawn().unwrap(),
        );

        assert!(matches!(result, Err(OfferError::Rejected)));
        assert_eq!(device.poll().unwrap(), 0);
        assert_eq!(device.transmit(&[0; 4]).unwrap(), TxStatus::Busy);
    }
}
