//! The long-running signer daemon.
//!
//! This module provides:
//! - The session contract and connect handling (`session`)
//! - Transport-free sessions used by `knox start` (`local`)
//! - The add / remove / refresh state machine (`reconciler`)
//! - The file-watching event loop (`watch`)

pub mod local;
pub mod reconciler;
pub mod session;
pub mod watch;

pub use local::{LocalSession, LocalSessionFactory};
pub use reconciler::{DaemonPhase, ReconcileReport, Reconciler};
pub use session::{
    ConnectHandler, ConnectRequest, ConnectResponse, SessionFactory, SessionSpec, SignerSession,
};
pub use watch::run_daemon;
