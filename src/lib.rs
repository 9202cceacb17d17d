//! `httpd-core`: the per-connection request pipeline and concurrency
//! substrate for a single-host HTTP/1.1 serving engine (see
//! `SPEC_FULL.md`). Process bootstrap, flag parsing, textual logging
//! configuration, the listening-socket setup, and the persistent
//! credential store are external collaborators (`SPEC_FULL.md` §1); this
//! crate is handed accepted connections, a document root, and a
//! `CredentialPool` implementation, and drives the rest.

pub mod config;
pub mod connection;
pub mod credentials;
pub mod demux;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod reactor;
pub mod request;
pub mod response;
pub mod timer;

pub use config::{DispatchModel, ServerConfig, TriggerMode};
pub use credentials::{CredentialCache, CredentialLease, CredentialPool, InMemoryCredentialPool};
pub use error::{Error, Result};
pub use reactor::Reactor;
