//! Credential cache (SPEC_FULL.md §4.H) and the opaque lease-acquire /
//! lease-release interface onto the persistent store, which SPEC_FULL.md
//! §1 and §6 treat as an external collaborator the core must not bake a
//! concrete SQL client into.
//!
//! Grounded on the `/2`/`/3` login/register branches of `do_request` in
//! `examples/original_source/http/http_conn.cpp` (check-under-lock,
//! insert-on-success, refuse-on-duplicate) and `initmysql_result`'s
//! load-once-at-startup shape from `http_conn.h`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::CredentialError;

/// A leased handle onto the persistent store, held for the duration of a
/// single registration. `Drop` is the guaranteed release on every exit
/// path that SPEC_FULL.md §4.E requires — no explicit release call is
/// needed by callers.
pub trait CredentialLease {
    fn insert_user(&mut self, username: &str, password: &str) -> Result<(), CredentialError>;
}

/// The external collaborator: a pool of handles onto a persistent
/// relational store (SPEC_FULL.md §6). The core only ever calls
/// `acquire` (once per request needing the store) and `load_all` (once
/// at startup); it never speaks the store's wire protocol directly.
pub trait CredentialPool: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn CredentialLease + '_>, CredentialError>;
    fn load_all(&self) -> Result<HashMap<String, String>, CredentialError>;
}

/// In-memory snapshot of username → password, loaded once at startup and
/// mutated only under `mutex` on successful registration. Login checks
/// also go through `mutex`, matching the reference source's single-lock
/// read/write policy for `m_users`.
pub struct CredentialCache {
    snapshot: Mutex<HashMap<String, String>>,
}

impl CredentialCache {
    pub fn load(pool: &dyn CredentialPool) -> Result<Self, CredentialError> {
        let snapshot = pool.load_all()?;
        Ok(CredentialCache { snapshot: Mutex::new(snapshot) })
    }

    #[cfg(test)]
    pub fn from_map(map: HashMap<String, String>) -> Self {
        CredentialCache { snapshot: Mutex::new(map) }
    }

    /// LOGIN (`/2`): true if `username` exists and its stored password
    /// matches exactly.
    pub fn check_login(&self, username: &str, password: &str) -> bool {
        let snapshot = self.snapshot.lock().expect("credential mutex poisoned");
        matches!(snapshot.get(username), Some(stored) if stored == password)
    }

    /// REGISTER (`/3`): insert into the persistent store via a scoped
    /// lease, then into the snapshot, all while holding the snapshot
    /// mutex so a concurrent login/register sees a consistent view.
    /// Refuses on a duplicate username without touching the store.
    pub fn register(
        &self,
        pool: &dyn CredentialPool,
        username: &str,
        password: &str,
    ) -> Result<(), CredentialError> {
        let mut snapshot = self.snapshot.lock().expect("credential mutex poisoned");
        if snapshot.contains_key(username) {
            return Err(CredentialError::Duplicate);
        }
        let mut lease = pool.acquire()?;
        lease.insert_user(username, password)?;
        snapshot.insert(username.to_string(), password.to_string());
        Ok(())
    }
}

/// A simple in-memory stand-in for the persistent store, used by the
/// demonstration binary and by tests. Production deployments provide
/// their own `CredentialPool` wired to a real store; this crate does not
/// ship one (SPEC_FULL.md §1: the store is external to the core).
pub struct InMemoryCredentialPool {
    rows: Mutex<HashMap<String, String>>,
}

impl InMemoryCredentialPool {
    pub fn new(seed: HashMap<String, String>) -> Self {
        InMemoryCredentialPool { rows: Mutex::new(seed) }
    }
}

struct InMemoryLease<'a> {
    rows: &'a Mutex<HashMap<String, String>>,
}

impl CredentialLease for InMemoryLease<'_> {
    fn insert_user(&mut self, username: &str, password: &str) -> Result<(), CredentialError> {
        let mut rows = self.rows.lock().expect("store mutex poisoned");
        if rows.contains_key(username) {
            return Err(CredentialError::Duplicate);
        }
        rows.insert(username.to_string(), password.to_string());
        Ok(())
    }
}

impl CredentialPool for InMemoryCredentialPool {
    fn acquire(&self) -> Result<Box<dyn CredentialLease + '_>, CredentialError> {
        Ok(Box::new(InMemoryLease { rows: &self.rows }))
    }

    fn load_all(&self) -> Result<HashMap<String, String>, CredentialError> {
        Ok(self.rows.lock().expect("store mutex poisoned").clone())
    }
}
