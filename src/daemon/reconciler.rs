//! Keeps the set of live sessions in step with the bunker file.
//!
//! Sessions are keyed by authorization secret.  Each reconcile pass
//! diffs the previous key set against the new one:
//!
//! - added secrets get a fresh session
//! - removed secrets have their session closed
//! - secrets present in both get their authorized set replaced
//!
//! Sessions are never restarted just because the file changed.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::session::{ConnectHandler, SessionFactory, SessionSpec, SignerSession};
use crate::bunker::{KnoxAuthorization, KnoxState};
use crate::crypto::PassphraseCipher;
use crate::errors::{KnoxError, Result};

/// Lifecycle of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonPhase {
    Starting,
    Watching,
    Reconciling,
    Terminated,
}

/// What a start or reconcile pass did, by authorization secret.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub refreshed: Vec<String>,
    /// Authorizations that could not be brought up.
    pub skipped: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.skipped.is_empty()
    }
}

pub struct Reconciler<F: SessionFactory> {
    factory: F,
    path: Arc<PathBuf>,
    cipher: PassphraseCipher,
    sessions: HashMap<String, F::Session>,
    phase: DaemonPhase,
}

impl<F: SessionFactory> Reconciler<F> {
    pub fn new(factory: F, path: PathBuf, cipher: PassphraseCipher) -> Self {
        Self {
            factory,
            path: Arc::new(path),
            cipher,
            sessions: HashMap::new(),
            phase: DaemonPhase::Starting,
        }
    }

    pub fn phase(&self) -> DaemonPhase {
        self.phase
    }

    /// Secrets with a live session, sorted.
    pub fn tracked(&self) -> Vec<String> {
        let mut secrets: Vec<String> = self.sessions.keys().cloned().collect();
        secrets.sort();
        secrets
    }

    pub fn session(&self, secret: &str) -> Option<&F::Session> {
        self.sessions.get(secret)
    }

    pub fn session_mut(&mut self, secret: &str) -> Option<&mut F::Session> {
        self.sessions.get_mut(secret)
    }

    /// Bring up one session per authorization and enter `Watching`.
    pub fn start(&mut self, state: &KnoxState) -> Result<ReconcileReport> {
        if self.phase != DaemonPhase::Starting {
            return Err(KnoxError::CommandFailed(format!(
                "reconciler cannot start from {:?}",
                self.phase
            )));
        }

        let mut report = ReconcileReport::default();
        for auth in &state.authorizations {
            self.bring_up(state, auth, &mut report);
        }

        self.phase = DaemonPhase::Watching;
        debug!(sessions = self.sessions.len(), "initial sessions started");
        Ok(report)
    }

    /// Apply a freshly loaded state.  Does nothing once terminated.
    pub fn reconcile(&mut self, state: &KnoxState) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if self.phase == DaemonPhase::Terminated {
            return report;
        }
        self.phase = DaemonPhase::Reconciling;

        let next: HashSet<&str> = state
            .authorizations
            .iter()
            .map(|a| a.secret.as_str())
            .collect();

        let mut gone: Vec<String> = self
            .sessions
            .keys()
            .filter(|secret| !next.contains(secret.as_str()))
            .cloned()
            .collect();
        gone.sort();

        for secret in gone {
            if let Some(mut session) = self.sessions.remove(&secret) {
                session.close();
            }
            report.removed.push(secret);
        }

        for auth in &state.authorizations {
            match self.sessions.get_mut(&auth.secret) {
                Some(session) => {
                    session.set_authorized_pubkeys(pubkey_set(auth));
                    report.refreshed.push(auth.secret.clone());
                }
                None => self.bring_up(state, auth, &mut report),
            }
        }

        if !report.is_empty() {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                skipped = report.skipped.len(),
                "changed"
            );
        }

        self.phase = DaemonPhase::Watching;
        report
    }

    /// Close every session and enter `Terminated`.
    pub fn shutdown(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.close();
        }
        self.phase = DaemonPhase::Terminated;
    }

    fn bring_up(&mut self, state: &KnoxState, auth: &KnoxAuthorization, report: &mut ReconcileReport) {
        let Some(key) = state.key(&auth.key) else {
            error!(key = %auth.key, secret = %auth.secret, "Key not found");
            report.skipped.push(auth.secret.clone());
            return;
        };

        let spec = SessionSpec {
            key_name: key.name.clone(),
            secret: auth.secret.clone(),
            relays: auth.relays.clone(),
            bunker_sec: auth.bunker_sec.clone(),
            user_sec: key.sec.clone(),
            authorized: pubkey_set(auth),
            handler: ConnectHandler::new(
                Arc::clone(&self.path),
                self.cipher.clone(),
                &key.name,
                &auth.secret,
            ),
        };

        match self.factory.start(spec) {
            Ok(session) => {
                self.sessions.insert(auth.secret.clone(), session);
                report.added.push(auth.secret.clone());
            }
            Err(e) => {
                error!(key = %auth.key, secret = %auth.secret, error = %e, "session failed to start");
                report.skipped.push(auth.secret.clone());
            }
        }
    }
}

fn pubkey_set(auth: &KnoxAuthorization) -> BTreeSet<String> {
    auth.pubkeys.iter().cloned().collect()
}
