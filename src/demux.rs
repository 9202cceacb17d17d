//! The readiness demultiplexer (SPEC_FULL.md §4.A): a thin wrapper over
//! `mio::Poll` giving the reactor register/rearm/unregister with a
//! one-shot discipline.
//!
//! Grounded on the epoll setup in `examples/original_source/http/main.cpp`
//! (`epoll_create`, `epoll_ctl` add/mod/del, `EPOLLONESHOT`). `mio`'s
//! portable backend does not expose a raw level/edge flag the way epoll
//! does directly — on Linux it always registers edge-triggered under the
//! hood — so the LEVEL/EDGE knob in `ServerConfig::trigger_mode` is
//! reimplemented as a logical policy one layer up, in
//! [`crate::pool::perform_read`]'s single-receive-vs-drain-loop choice,
//! rather than as a raw `epoll_ctl` flag here. The one-shot part of the
//! contract is real: every source is always re-registered with a fresh
//! interest set after each readiness, exactly like `EPOLLONESHOT` requires.

use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token};

use crate::error::Result;

pub struct Demultiplexer {
    poll: Poll,
}

impl Demultiplexer {
    pub fn new() -> Result<Self> {
        Ok(Demultiplexer { poll: Poll::new()? })
    }

    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    pub fn register_listener(&self, listener: &mut TcpListener, token: Token) -> Result<()> {
        self.registry().register(listener, token, Interest::READABLE)?;
        Ok(())
    }

    pub fn register_client(&self, stream: &mut TcpStream, token: Token) -> Result<()> {
        self.registry().register(stream, token, Interest::READABLE)?;
        Ok(())
    }

    /// One-shot rearm: every readiness must be followed by exactly one of
    /// these before the source will report again.
    pub fn rearm(&self, stream: &mut TcpStream, token: Token, interest: Interest) -> Result<()> {
        self.registry().reregister(stream, token, interest)?;
        Ok(())
    }

    pub fn unregister(&self, stream: &mut TcpStream) -> Result<()> {
        self.registry().deregister(stream)?;
        Ok(())
    }

    pub fn poll(&mut self, events: &mut Events, timeout: Option<Duration>) -> Result<()> {
        match self.poll.poll(events, timeout) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener as StdListener;

    #[test]
    fn listener_becomes_readable_after_connect() {
        let std_listener = StdListener::bind("127.0.0.1:0").unwrap();
        std_listener.set_nonblocking(true).unwrap();
        let addr = std_listener.local_addr().unwrap();
        let mut listener = TcpListener::from_std(std_listener);

        let mut demux = Demultiplexer::new().unwrap();
        demux.register_listener(&mut listener, Token(0)).unwrap();

        let _client = std::net::TcpStream::connect(addr).unwrap();

        let mut events = Events::with_capacity(8);
        demux.poll(&mut events, Some(Duration::from_secs(2))).unwrap();
        assert!(events.iter().any(|e| e.token() == Token(0)));
    }
}
