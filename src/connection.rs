//! The connection record (SPEC_FULL.md §3) and the reactor/worker
//! handoff protocol (§9 "Shared access to C between reactor and worker").
//!
//! Grounded on `http_conn.h`'s field layout, translated per Resolved
//! Design Questions 6 and 7: owned strings instead of raw pointers into
//! the read buffer, and an atomic completion handshake (`improv`,
//! `timer_flag`, `state`) alongside a `Mutex`-guarded body instead of
//! plain shared scalars.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use mio::net::TcpStream;
use mio::Token;

use crate::request::HttpRequest;
use crate::response::WriteVector;

/// Direction tag set by the reactor before handing a connection to a
/// worker in the Reactor dispatch model (`m_state` in the original).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IoDirection {
    Read = 0,
    Write = 1,
}

impl IoDirection {
    fn from_u8(v: u8) -> IoDirection {
        if v == 0 { IoDirection::Read } else { IoDirection::Write }
    }
}

/// The mutable body of a connection: buffers, parser state, and the
/// in-flight response plan. Owned exclusively by whichever component
/// currently holds the `ConnHandle`'s mutex.
pub struct Connection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub request: HttpRequest,
    pub response: Option<WriteVector>,
    pub last_activity: Instant,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Connection {
            stream,
            peer,
            request: HttpRequest::new(),
            response: None,
            last_activity: Instant::now(),
        }
    }

    /// Reinitialize for the next keep-alive request on the same socket
    /// (SPEC_FULL.md §3 lifecycle, §8 "Keep-alive cycling").
    pub fn reinit(&mut self) {
        self.request.reinit();
        self.response = None;
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// The reactor/worker handoff: a `Mutex`-guarded connection body plus a
/// sibling set of atomics the reactor can poll without contending for
/// the lock (SPEC_FULL.md §9's suggested "atomic completion flag with
/// acquire/release ordering").
pub struct ConnHandle {
    pub token: Token,
    pub conn: Mutex<Connection>,
    state: AtomicU8,
    /// Set by the worker when it has finished its assigned unit of work
    /// (successfully or not). The reactor must not touch `conn` until
    /// this is observed `true`.
    improv: AtomicBool,
    /// Set by the worker alongside `improv` when the work failed; tells
    /// the reactor to close the connection instead of rearming it.
    timer_flag: AtomicBool,
    /// Set by the timing wheel when it wants to close a connection that
    /// is currently lent to a worker (SPEC_FULL.md §5 cancellation). The
    /// reactor checks this instead of closing directly.
    close_pending: AtomicBool,
    /// Set by the reactor exactly when it hands this connection to a
    /// worker (`submit_or_close`), cleared when the reactor reclaims it
    /// (`acknowledge`). This, not `improv`, is the source of truth for
    /// "is a worker currently holding this connection" — `improv` starts
    /// `false` for a freshly accepted connection too, which made
    /// `!is_done()` indistinguishable from "never submitted".
    in_worker: AtomicBool,
}

impl ConnHandle {
    pub fn new(token: Token, conn: Connection) -> Self {
        ConnHandle {
            token,
            conn: Mutex::new(conn),
            state: AtomicU8::new(IoDirection::Read as u8),
            improv: AtomicBool::new(false),
            timer_flag: AtomicBool::new(false),
            close_pending: AtomicBool::new(false),
            in_worker: AtomicBool::new(false),
        }
    }

    pub fn set_direction(&self, dir: IoDirection) {
        self.state.store(dir as u8, Ordering::Release);
        self.improv.store(false, Ordering::Release);
        self.timer_flag.store(false, Ordering::Release);
    }

    pub fn direction(&self) -> IoDirection {
        IoDirection::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Called by the reactor at the point it hands this connection to a
    /// worker, i.e. submission (successful or not — if submission is
    /// rejected the connection is closed immediately regardless).
    pub fn mark_submitted(&self) {
        self.in_worker.store(true, Ordering::Release);
    }

    /// Called by a worker on completion (success or failure).
    pub fn mark_done(&self, failed: bool) {
        if failed {
            self.timer_flag.store(true, Ordering::Release);
        }
        self.improv.store(true, Ordering::Release);
    }

    /// Polled by the reactor: has the worker finished with this
    /// connection yet?
    pub fn is_done(&self) -> bool {
        self.improv.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> bool {
        self.timer_flag.load(Ordering::Acquire)
    }

    pub fn request_close(&self) {
        self.close_pending.store(true, Ordering::Release);
    }

    pub fn close_requested(&self) -> bool {
        self.close_pending.load(Ordering::Acquire)
    }

    /// Called by the reactor once it has reclaimed a connection handed
    /// back by a worker (`settle`), before rearming or closing it, so a
    /// reclaimed connection is not mistaken for a freshly completed one
    /// on the next wakeup (SPEC_FULL.md §4.F one-shot discipline).
    pub fn acknowledge(&self) {
        self.improv.store(false, Ordering::Release);
        self.timer_flag.store(false, Ordering::Release);
        self.in_worker.store(false, Ordering::Release);
    }

    /// True while a worker owns this connection (submitted, not yet
    /// reclaimed by the reactor) — the reactor must not lock `conn` in
    /// this window.
    pub fn in_flight(&self) -> bool {
        self.in_worker.load(Ordering::Acquire)
    }
}
