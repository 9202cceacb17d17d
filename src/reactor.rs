//! The reactor loop (SPEC_FULL.md §4.F): owns the listener, the
//! readiness demultiplexer, the connection table, the worker pool, and
//! the timing wheel, and runs the per-wakeup protocol from SPEC_FULL.md
//! §4.F over them.
//!
//! Grounded on the `epoll_wait` loop in
//! `examples/original_source/http/main.cpp` for the event classification
//! (listener vs client, read-closed vs readable vs writable) and on
//! `threadpool.h`'s `actor_model` branch for which side — reactor thread
//! or worker — performs the read/write syscalls in each dispatch model.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::TcpListener;
use mio::{Events, Interest, Token};
use tracing::{debug, info, warn};

use crate::config::{DispatchModel, ServerConfig};
use crate::connection::{ConnHandle, Connection, IoDirection};
use crate::credentials::{CredentialCache, CredentialPool};
use crate::demux::Demultiplexer;
use crate::error::{Error, Result};
use crate::pool::{perform_read, perform_write, WorkerPool};
use crate::timer::TimingWheel;

const LISTENER_TOKEN: Token = Token(0);
const FIRST_CLIENT_TOKEN: usize = 1;
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// What to do with a connection once its pending work (a direct reactor
/// write, or a worker's completed job) is accounted for.
enum Next {
    NeedMoreInput,
    NeedMoreWrite,
    Done { linger: bool },
}

pub struct Reactor {
    config: Arc<ServerConfig>,
    demux: Demultiplexer,
    listener: TcpListener,
    connections: HashMap<Token, Arc<ConnHandle>>,
    next_token: usize,
    pool: WorkerPool,
    timer: Arc<TimingWheel>,
}

impl Reactor {
    pub fn new(
        config: ServerConfig,
        credentials: CredentialCache,
        store: Arc<dyn CredentialPool>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let addr: SocketAddr = format!("0.0.0.0:{}", config.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| Error::Config(e.to_string()))?;
        let mut listener = TcpListener::bind(addr)?;

        let demux = Demultiplexer::new()?;
        demux.register_listener(&mut listener, LISTENER_TOKEN)?;

        let credentials = Arc::new(credentials);
        let timer = Arc::new(TimingWheel::new(config.idle_timeout));
        let pool = WorkerPool::new(
            config.worker_count,
            config.queue_capacity,
            config.dispatch_model,
            config.clone(),
            credentials,
            store,
        );

        Ok(Reactor {
            config,
            demux,
            listener,
            connections: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
            pool,
            timer,
        })
    }

    /// The address actually bound, useful when `config.port` was `0` and
    /// the OS picked an ephemeral port (e.g. in tests).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run until the process is killed. There is no graceful-shutdown
    /// path (SPEC_FULL.md Non-goals: no administrative control plane).
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(1024);
        let mut last_sweep = Instant::now();
        info!(port = self.config.port, "reactor loop starting");
        loop {
            self.demux.poll(&mut events, Some(SWEEP_INTERVAL))?;

            for event in events.iter() {
                let token = event.token();
                if token == LISTENER_TOKEN {
                    if let Err(e) = self.accept_all() {
                        warn!(error = %e, "accept loop failed");
                    }
                    continue;
                }
                if event.is_read_closed() || event.is_error() {
                    self.close(token);
                    continue;
                }
                if event.is_readable() {
                    self.on_readable(token);
                }
                if event.is_writable() {
                    self.on_writable(token);
                }
            }

            self.poll_completions();

            if last_sweep.elapsed() >= SWEEP_INTERVAL {
                self.sweep_idle();
                last_sweep = Instant::now();
            }
        }
    }

    fn allocate_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    fn accept_all(&mut self) -> Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = self.allocate_token();
                    self.demux.register_client(&mut stream, token)?;
                    let conn = Connection::new(stream, peer);
                    let handle = Arc::new(ConnHandle::new(token, conn));
                    self.timer.insert(token, handle.clone());
                    self.connections.insert(token, handle);
                    debug!(?peer, ?token, "accepted connection");
                    if !self.config.trigger_mode.listener_edge() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn on_readable(&mut self, token: Token) {
        let Some(handle) = self.connections.get(&token).cloned() else { return };
        self.timer.extend(token);

        match self.config.dispatch_model {
            DispatchModel::Proactor => {
                let edge = self.config.trigger_mode.client_edge();
                let read_ok = {
                    let mut conn = handle.conn.lock().expect("connection mutex poisoned");
                    conn.touch();
                    perform_read(&mut conn, edge).unwrap_or(false)
                };
                if !read_ok {
                    self.close(token);
                    return;
                }
                handle.set_direction(IoDirection::Read);
                self.submit_or_close(token, handle);
            }
            DispatchModel::Reactor => {
                handle.set_direction(IoDirection::Read);
                self.submit_or_close(token, handle);
            }
        }
    }

    fn on_writable(&mut self, token: Token) {
        let Some(handle) = self.connections.get(&token).cloned() else { return };

        match self.config.dispatch_model {
            DispatchModel::Proactor => {
                let write_ok = {
                    let mut conn = handle.conn.lock().expect("connection mutex poisoned");
                    perform_write(&mut conn).unwrap_or(false)
                };
                if !write_ok {
                    self.close(token);
                    return;
                }
                self.settle(token, &handle);
            }
            DispatchModel::Reactor => {
                handle.set_direction(IoDirection::Write);
                self.submit_or_close(token, handle);
            }
        }
    }

    fn submit_or_close(&mut self, token: Token, handle: Arc<ConnHandle>) {
        handle.mark_submitted();
        if self.pool.submit(handle).is_err() {
            self.close(token);
        }
    }

    /// Worker-completion polling (SPEC_FULL.md §4.F step 5): any
    /// connection a worker has finished with gets rearmed or closed here.
    fn poll_completions(&mut self) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            let Some(handle) = self.connections.get(&token).cloned() else { continue };
            if !handle.is_done() {
                continue;
            }
            if handle.failed() || handle.close_requested() {
                self.close(token);
                continue;
            }
            self.settle(token, &handle);
        }
    }

    /// Inspect the connection's pending response and decide the rearm
    /// direction, or close it if the response is complete and the client
    /// did not ask to keep the connection alive.
    ///
    /// This is the point at which the reactor reclaims the connection,
    /// whether it was just handed back by a worker or never left the
    /// reactor at all (the proactor model's direct-write path). Either
    /// way `acknowledge` runs first so a stale `improv` doesn't cause
    /// `poll_completions` to re-settle the same connection on the next
    /// wakeup before any new work has actually completed (SPEC_FULL.md
    /// §4.F one-shot discipline).
    fn settle(&mut self, token: Token, handle: &Arc<ConnHandle>) {
        handle.acknowledge();
        let next = {
            let conn = handle.conn.lock().expect("connection mutex poisoned");
            match &conn.response {
                None => Next::NeedMoreInput,
                Some(wv) if !wv.is_complete() => Next::NeedMoreWrite,
                Some(wv) => Next::Done { linger: wv.linger },
            }
        };
        match next {
            Next::NeedMoreInput => self.rearm(token, handle, Interest::READABLE),
            Next::NeedMoreWrite => self.rearm(token, handle, Interest::WRITABLE),
            Next::Done { linger: true } => {
                handle.conn.lock().expect("connection mutex poisoned").reinit();
                self.rearm(token, handle, Interest::READABLE);
            }
            Next::Done { linger: false } => self.close(token),
        }
    }

    fn rearm(&mut self, token: Token, handle: &Arc<ConnHandle>, interest: Interest) {
        let failed = {
            let mut conn = handle.conn.lock().expect("connection mutex poisoned");
            self.demux.rearm(&mut conn.stream, token, interest).is_err()
        };
        if failed {
            self.close(token);
        }
    }

    fn sweep_idle(&mut self) {
        for token in self.timer.sweep() {
            self.close(token);
        }
    }

    fn close(&mut self, token: Token) {
        if let Some(handle) = self.connections.remove(&token) {
            self.timer.cancel(token);
            let mut conn = handle.conn.lock().expect("connection mutex poisoned");
            let _ = self.demux.unregister(&mut conn.stream);
            debug!(?token, "closed connection");
        }
    }
}
