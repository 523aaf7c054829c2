//! The contract between the daemon and a live signer session.
//!
//! A signer session speaks the remote-signing protocol over relays on
//! behalf of one authorization.  The transport itself lives behind
//! `SessionFactory`; the daemon only starts, refreshes and closes
//! sessions, and supplies the `ConnectHandler` that decides whether a
//! connect request may redeem the authorization.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, error, warn};

use crate::bunker::CredentialStore;
use crate::crypto::{PassphraseCipher, SecretBuffer};
use crate::errors::Result;

/// Everything a factory needs to bring up one session.
pub struct SessionSpec {
    /// Name of the user key (for logging).
    pub key_name: String,
    /// Capability token of the authorization this session serves.
    pub secret: String,
    /// Relays scoped to this authorization.
    pub relays: Vec<String>,
    /// Identity the session answers as.
    pub bunker_sec: SecretBuffer,
    /// Identity whose signatures the session produces.
    pub user_sec: SecretBuffer,
    /// Application pubkeys already allowed to use the session.
    pub authorized: BTreeSet<String>,
    /// Callback for inbound connect requests.
    pub handler: ConnectHandler,
}

/// A running session for one authorization.
pub trait SignerSession: Send {
    /// Grant one application pubkey access.
    fn authorize(&mut self, pubkey: &str);

    fn authorized_pubkeys(&self) -> &BTreeSet<String>;

    /// Replace the whole authorized set.
    fn set_authorized_pubkeys(&mut self, pubkeys: BTreeSet<String>);

    /// Release session resources.  Calling it twice is harmless.
    fn close(&mut self);
}

/// Builds sessions.  Implemented by the relay transport.
pub trait SessionFactory: Send {
    type Session: SignerSession;

    fn start(&mut self, spec: SessionSpec) -> Result<Self::Session>;
}

/// A `connect` request as seen by the session: `(app pubkey, secret)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// JSON-RPC request id.
    pub id: String,
    /// Pubkey of the application that sent the request.
    pub app_pubkey: String,
    /// Capability token supplied by the application, if any.
    pub secret: Option<String>,
}

/// JSON-RPC style response to a connect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub id: String,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectResponse {
    pub fn ack(id: &str) -> Self {
        Self {
            id: id.to_string(),
            result: "ack".to_string(),
            error: None,
        }
    }

    pub fn error(id: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            result: String::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.error.is_none()
    }
}

/// Decides connect requests for one authorization and records
/// successful redemptions in the bunker file.
#[derive(Clone)]
pub struct ConnectHandler {
    path: Arc<PathBuf>,
    cipher: PassphraseCipher,
    key_name: String,
    secret: String,
}

impl ConnectHandler {
    pub fn new(path: Arc<PathBuf>, cipher: PassphraseCipher, key_name: &str, secret: &str) -> Self {
        Self {
            path,
            cipher,
            key_name: key_name.to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Handle a connect request on behalf of `session`.
    ///
    /// On a matching secret the redemption is persisted first; the
    /// session only learns the new pubkey once that succeeded.  Every
    /// failure becomes an error response, never a panic.
    ///
    /// Blocks on file I/O and scrypt.  Async transports should call it
    /// from `spawn_blocking`.
    pub fn handle(
        &self,
        session: &mut dyn SignerSession,
        request: &ConnectRequest,
    ) -> ConnectResponse {
        let matches = request
            .secret
            .as_deref()
            .is_some_and(|supplied| bool::from(supplied.as_bytes().ct_eq(self.secret.as_bytes())));
        if !matches {
            warn!(key = %self.key_name, app = %request.app_pubkey, "connect with invalid secret");
            return ConnectResponse::error(&request.id, "Invalid secret");
        }

        let result = CredentialStore::transaction(&self.path, &self.cipher, |state| {
            state.authorize(&request.app_pubkey, &self.secret)
        });

        match result {
            Ok(()) => {
                session.authorize(&request.app_pubkey);
                debug!(key = %self.key_name, app = %request.app_pubkey, "application authorized");
                ConnectResponse::ack(&request.id)
            }
            Err(e) if e.is_domain() => {
                warn!(key = %self.key_name, app = %request.app_pubkey, error = %e, "connect refused");
                ConnectResponse::error(&request.id, e.to_string())
            }
            Err(e) => {
                error!(key = %self.key_name, app = %request.app_pubkey, error = %e, "connect failed");
                ConnectResponse::error(&request.id, "Internal error")
            }
        }
    }

    /// Observability hook for any inbound request.
    pub fn on_request(&self, method: &str, request_id: &str, event_id: &str) {
        debug!(key = %self.key_name, method, request_id, event_id, "request");
    }

    /// Observability hook for any outbound response.
    pub fn on_response(&self, request_id: &str, event_id: &str) {
        debug!(key = %self.key_name, request_id, event_id, "response");
    }

    /// Observability hook for protocol errors.
    pub fn on_error(&self, event_id: &str, error: &str) {
        error!(key = %self.key_name, event_id, error, "session error");
    }
}
