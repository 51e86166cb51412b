//! Context-aware dispatch of endpoint operations.
//!
//! Frame I/O is initiated from two kinds of threads: bounded-latency
//! threads, which must never block or sleep, and ordinary threads, which
//! may. Endpoint operations themselves are only legal from a
//! bounded-latency thread, so the [`Dispatcher`] routes each request:
//!
//! - already bounded-latency: call the endpoint directly, in place;
//! - ordinary thread: hand the request to the single bounded-latency
//!   worker over a channel and block until its reply arrives.
//!
//! Either way the caller observes the same result. Waiting for the reply
//! is the only suspension point in the bridge, and it only occurs on
//! ordinary threads.

use std::cell::Cell;
use std::io;
use std::marker::PhantomData;
use std::mem;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use crate::endpoint::RawEndpoint;

const WORKER_THREAD_NAME: &str = "framebridge-rt";

/// Pending requests the worker has not picked up yet. Senders past this
/// depth block, which is acceptable on ordinary threads.
const REQUEST_QUEUE_DEPTH: usize = 16;

thread_local! {
    static BOUNDED_LATENCY: Cell<bool> = const { Cell::new(false) };
}

/// Returns true when the current thread runs under the bounded-latency
/// contract. Cheap and side-effect-free.
pub fn in_rt_context() -> bool {
    BOUNDED_LATENCY.with(Cell::get)
}

/// Marks the current thread bounded-latency for the guard's lifetime.
///
/// The dispatch worker marks itself; an embedding master should hold one
/// of these on its own cyclic thread so its transmit/poll calls take the
/// direct path.
pub struct RtScope {
    prev: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl RtScope {
    pub fn enter() -> Self {
        let prev = BOUNDED_LATENCY.with(|flag| flag.replace(true));
        Self {
            prev,
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for RtScope {
    fn drop(&mut self) {
        BOUNDED_LATENCY.with(|flag| flag.set(self.prev));
    }
}

/// Relay failures, distinct from anything the endpoint itself reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("bounded-latency worker is not running")]
    WorkerUnavailable,

    #[error("bounded-latency worker dropped the reply")]
    ReplyLost,
}

/// Send/receive failure as seen by callers, identical on both paths.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("endpoint error: {0}")]
    Endpoint(#[from] io::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

enum Request {
    Send {
        endpoint: Arc<dyn RawEndpoint>,
        frame: Vec<u8>,
        reply: SyncSender<io::Result<usize>>,
    },
    Recv {
        endpoint: Arc<dyn RawEndpoint>,
        buf: Vec<u8>,
        reply: SyncSender<(io::Result<usize>, Vec<u8>)>,
    },
    Shutdown,
}

/// Handle to the bounded-latency worker. Cheap to clone; every socket
/// holds one.
#[derive(Clone)]
pub struct Dispatcher {
    requests: SyncSender<Request>,
}

impl Dispatcher {
    /// Spawn the bounded-latency worker thread.
    ///
    /// Thread creation failure is reported here, before the first
    /// dispatch can be attempted.
    pub fn spawn() -> io::Result<Self> {
        let (requests, incoming) = mpsc::sync_channel(REQUEST_QUEUE_DEPTH);
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(incoming))?;
        Ok(Self { requests })
    }

    /// Send one frame on `endpoint`, routed by the calling context.
    pub fn send(
        &self,
        endpoint: &Arc<dyn RawEndpoint>,
        frame: &[u8],
    ) -> Result<usize, TransportError> {
        if in_rt_context() {
            return Ok(endpoint.send(frame)?);
        }

        let (reply, result) = mpsc::sync_channel(1);
        self.requests
            .send(Request::Send {
                endpoint: Arc::clone(endpoint),
                frame: frame.to_vec(),
                reply,
            })
            .map_err(|_| DispatchError::WorkerUnavailable)?;
        Ok(result.recv().map_err(|_| DispatchError::ReplyLost)??)
    }

    /// Receive one frame from `endpoint` into `buf`, routed by the
    /// calling context. `Ok(0)` means no frame was pending.
    ///
    /// On the relayed path the buffer travels to the worker and back, so
    /// no copy of the frame payload is made.
    pub fn recv(
        &self,
        endpoint: &Arc<dyn RawEndpoint>,
        buf: &mut Vec<u8>,
    ) -> Result<usize, TransportError> {
        if in_rt_context() {
            return Ok(endpoint.recv(buf)?);
        }

        let capacity = buf.len();
        let (reply, result) = mpsc::sync_channel(1);
        self.requests
            .send(Request::Recv {
                endpoint: Arc::clone(endpoint),
                buf: mem::take(buf),
                reply,
            })
            .map_err(|_| DispatchError::WorkerUnavailable)?;
        match result.recv() {
            Ok((outcome, returned)) => {
                *buf = returned;
                Ok(outcome?)
            }
            Err(_) => {
                // The buffer went down with the worker; restore a usable one.
                buf.resize(capacity, 0);
                Err(DispatchError::ReplyLost.into())
            }
        }
    }

    /// Stop the worker. Requests dispatched from ordinary threads
    /// afterwards fail with a [`DispatchError`].
    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
    }
}

fn worker_loop(incoming: Receiver<Request>) {
    let _scope = RtScope::enter();
    while let Ok(request) = incoming.recv() {
        match request {
            Request::Send {
                endpoint,
                frame,
                reply,
            } => {
                let _ = reply.send(endpoint.send(&frame));
            }
            Request::Recv {
                endpoint,
                mut buf,
                reply,
            } => {
                let outcome = endpoint.recv(&mut buf);
                let _ = reply.send((outcome, buf));
            }
            Request::Shutdown => break,
        }
    }
    tracing::debug!("bounded-latency worker exiting");
}
