//! Configuration surface for the core (SPEC_FULL.md §6).
//!
//! The core does not parse flags or files itself — that bootstrap work is
//! an external collaborator's job (see `src/bin/main.rs`, which uses
//! `clap`). This module only defines the struct that surface hands the
//! core, plus validation of the values it receives.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// `m_TRIGMode` equivalent: whether the listen and client sockets use
/// level- or edge-triggered readiness notifications. Values 2 and 3 mix
/// the two, matching the reference source's listen/client split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Both listener and client sockets are level-triggered.
    BothLevel,
    /// Both listener and client sockets are edge-triggered.
    BothEdge,
    /// Listener level-triggered, client sockets edge-triggered.
    ListenLevelClientEdge,
    /// Listener edge-triggered, client sockets level-triggered.
    ListenEdgeClientLevel,
}

impl TriggerMode {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(TriggerMode::BothLevel),
            1 => Ok(TriggerMode::BothEdge),
            2 => Ok(TriggerMode::ListenLevelClientEdge),
            3 => Ok(TriggerMode::ListenEdgeClientLevel),
            other => Err(Error::Config(format!("trigger mode must be 0-3, got {other}"))),
        }
    }

    pub fn listener_edge(self) -> bool {
        matches!(self, TriggerMode::BothEdge | TriggerMode::ListenEdgeClientLevel)
    }

    pub fn client_edge(self) -> bool {
        matches!(self, TriggerMode::BothEdge | TriggerMode::ListenLevelClientEdge)
    }
}

/// Dispatch model selecting how read/write work is split between the
/// reactor thread and the worker pool (SPEC_FULL.md §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchModel {
    Proactor,
    Reactor,
}

impl DispatchModel {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(DispatchModel::Proactor),
            1 => Ok(DispatchModel::Reactor),
            other => Err(Error::Config(format!("dispatch model must be 0 or 1, got {other}"))),
        }
    }
}

/// Flat server configuration: one listener, one document root, no virtual
/// hosting (an explicit Non-goal).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub document_root: PathBuf,
    pub keep_alive_default: bool,
    pub trigger_mode: TriggerMode,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub dispatch_model: DispatchModel,
    pub idle_timeout: Duration,
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_WORKER_COUNT: usize = 8;
    pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
    pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 15;

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be greater than zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be greater than zero".into()));
        }
        if !self.document_root.is_dir() {
            return Err(Error::Config(format!(
                "document root {:?} does not exist or is not a directory",
                self.document_root
            )));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: Self::DEFAULT_PORT,
            document_root: PathBuf::from("./www"),
            keep_alive_default: true,
            trigger_mode: TriggerMode::BothLevel,
            worker_count: Self::DEFAULT_WORKER_COUNT,
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            dispatch_model: DispatchModel::Proactor,
            idle_timeout: Duration::from_secs(Self::DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(root: &std::path::Path) -> ServerConfig {
        ServerConfig {
            document_root: root.to_path_buf(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn trigger_mode_from_u8_rejects_out_of_range() {
        assert!(TriggerMode::from_u8(4).is_err());
        assert!(TriggerMode::from_u8(0).is_ok());
    }

    #[test]
    fn trigger_mode_edge_flags() {
        assert!(!TriggerMode::BothLevel.listener_edge());
        assert!(TriggerMode::BothEdge.listener_edge());
        assert!(TriggerMode::ListenEdgeClientLevel.listener_edge());
        assert!(!TriggerMode::ListenEdgeClientLevel.client_edge());
        assert!(TriggerMode::ListenLevelClientEdge.client_edge());
    }

    #[test]
    fn validate_rejects_missing_document_root() {
        let cfg = make_config(std::path::Path::new("/no/such/directory/exists"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = make_config(dir.path());
        cfg.worker_count = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_sane_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = make_config(dir.path());
        assert!(cfg.validate().is_ok());
    }
}
