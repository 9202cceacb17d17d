//! Worker pool (SPEC_FULL.md §4.E): a bounded FIFO of pending connection
//! work consumed by a fixed set of threads, with the Proactor/Reactor
//! dispatch split.
//!
//! Grounded on `append`/`run` in
//! `examples/original_source/threadpool/threadpool.h` (reject-on-full
//! submission, pop-under-mutex-then-release-before-processing, the exact
//! `actor_model` branching), translated to `crossbeam_channel::bounded`
//! instead of a hand-rolled mutex + condvar + `std::list` — the channel
//! already gives the bounded-FIFO-with-reject semantics the original
//! built from a semaphore and a linked list.

use std::io::{ErrorKind, Read, Write as _};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::config::{DispatchModel, ServerConfig};
use crate::connection::{ConnHandle, Connection, IoDirection};
use crate::credentials::{CredentialCache, CredentialPool};
use crate::dispatch::dispatch as dispatch_request;
use crate::request::ParseOutcome;
use crate::response::{HttpCode, ResponseBody, WriteVector};

struct Job {
    handle: Arc<ConnHandle>,
}

pub struct WorkerPool {
    sender: Sender<Job>,
    _workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        queue_capacity: usize,
        model: DispatchModel,
        config: Arc<ServerConfig>,
        credentials: Arc<CredentialCache>,
        store: Arc<dyn CredentialPool>,
    ) -> Self {
        let (sender, receiver) = bounded::<Job>(queue_capacity);
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let receiver = receiver.clone();
            let config = config.clone();
            let credentials = credentials.clone();
            let store = store.clone();
            workers.push(std::thread::spawn(move || {
                worker_loop(receiver, model, &config, &credentials, store.as_ref());
            }));
        }
        WorkerPool { sender, _workers: workers }
    }

    /// Submit a connection for processing. Rejects rather than blocking
    /// if the queue is at capacity (SPEC_FULL.md §4.E); the caller
    /// should then close or reschedule.
    pub fn submit(&self, handle: Arc<ConnHandle>) -> Result<(), Arc<ConnHandle>> {
        match self.sender.try_send(Job { handle }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => Err(job.handle),
        }
    }
}

fn worker_loop(
    receiver: Receiver<Job>,
    model: DispatchModel,
    config: &ServerConfig,
    credentials: &CredentialCache,
    store: &dyn CredentialPool,
) {
    while let Ok(job) = receiver.recv() {
        let handle = job.handle;
        match model {
            DispatchModel::Reactor => match handle.direction() {
                IoDirection::Read => {
                    let edge = config.trigger_mode.client_edge();
                    let mut conn = handle.conn.lock().expect("connection mutex poisoned");
                    conn.touch();
                    let read_ok = perform_read(&mut conn, edge).unwrap_or(false);
                    if !read_ok {
                        drop(conn);
                        handle.mark_done(true);
                        continue;
                    }
                    let parsed = process(&mut conn, config, credentials, store).is_ok();
                    drop(conn);
                    handle.mark_done(!parsed);
                }
                IoDirection::Write => {
                    let mut conn = handle.conn.lock().expect("connection mutex poisoned");
                    let write_ok = perform_write(&mut conn).unwrap_or(false);
                    drop(conn);
                    handle.mark_done(!write_ok);
                }
            },
            DispatchModel::Proactor => {
                // The reactor has already performed the read for this
                // wakeup; the worker parses, dispatches, and fully
                // writes in one step (SPEC_FULL.md §4.E).
                let mut conn = handle.conn.lock().expect("connection mutex poisoned");
                let parsed = process(&mut conn, config, credentials, store).is_ok();
                if !parsed {
                    drop(conn);
                    handle.mark_done(true);
                    continue;
                }
                let write_ok = perform_write(&mut conn).unwrap_or(false);
                drop(conn);
                handle.mark_done(!write_ok);
            }
        }
    }
}

/// Non-blocking read loop into the connection's request buffer.
/// LEVEL mode performs exactly one receive call; EDGE mode drains until
/// the buffer fills or the kernel reports "would block"
/// (SPEC_FULL.md §4.B "Read semantics"). Returns `Ok(false)` when the
/// peer has closed or the buffer would overflow.
pub(crate) fn perform_read(conn: &mut Connection, edge: bool) -> std::io::Result<bool> {
    loop {
        if !conn.request.buf.has_room() {
            return Ok(false);
        }
        match conn.stream.read(conn.request.buf.spare_capacity_mut()) {
            Ok(0) => return Ok(false),
            Ok(n) => {
                conn.request.buf.commit(n);
                if !edge {
                    return Ok(true);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Drain the connection's pending response via scatter/gather writes
/// until complete or the kernel reports "would block"
/// (SPEC_FULL.md §9 "Scatter/gather writer"). A response that blocks
/// partway is left in place for the next writable readiness to resume.
pub(crate) fn perform_write(conn: &mut Connection) -> std::io::Result<bool> {
    let Some(wv) = conn.response.as_mut() else { return Ok(true) };
    while !wv.is_complete() {
        let slices = wv.io_slices();
        match conn.stream.write_vectored(&slices) {
            Ok(0) => return Ok(false),
            Ok(n) => wv.advance(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Advance the parser over whatever is buffered and, on a terminal
/// outcome, build the response plan (SPEC_FULL.md §4.B return codes
/// feeding into §4.D).
pub(crate) fn process(
    conn: &mut Connection,
    config: &ServerConfig,
    credentials: &CredentialCache,
    store: &dyn CredentialPool,
) -> crate::error::Result<ParseOutcome> {
    let outcome = conn.request.advance()?;
    match outcome {
        ParseOutcome::NoRequest => {}
        ParseOutcome::Dispatch => {
            let wv = dispatch_request(&conn.request, config, credentials, store)?;
            conn.response = Some(wv);
        }
        ParseOutcome::BadRequest => {
            let linger = conn.request.linger && config.keep_alive_default;
            conn.response = Some(WriteVector::new(HttpCode::BadRequest, ResponseBody::None, linger)?);
        }
        ParseOutcome::InternalError => {
            conn.response = Some(WriteVector::new(HttpCode::InternalError, ResponseBody::None, false)?);
        }
    }
    Ok(outcome)
}
