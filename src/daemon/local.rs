//! In-process session bookkeeping with no relay transport attached.
//!
//! `LocalSession` tracks the authorized set and routes connect requests
//! through the `ConnectHandler`, which is enough to run the daemon's
//! lifecycle end to end.  A relay-backed factory plugs in through the
//! same `SessionFactory` trait.

use std::collections::BTreeSet;

use tracing::info;

use super::session::{
    ConnectHandler, ConnectRequest, ConnectResponse, SessionFactory, SessionSpec, SignerSession,
};
use crate::crypto::public_key_hex;
use crate::errors::Result;

/// Factory for `LocalSession`.
#[derive(Debug, Default)]
pub struct LocalSessionFactory;

impl LocalSessionFactory {
    pub fn new() -> Self {
        Self
    }
}

impl SessionFactory for LocalSessionFactory {
    type Session = LocalSession;

    fn start(&mut self, spec: SessionSpec) -> Result<LocalSession> {
        let bunker_pubkey = public_key_hex(&spec.bunker_sec)?;
        let user_pubkey = public_key_hex(&spec.user_sec)?;

        info!(
            key = %spec.key_name,
            secret = %spec.secret,
            bunker = %bunker_pubkey,
            user = %user_pubkey,
            relays = ?spec.relays,
            "up"
        );

        Ok(LocalSession {
            key_name: spec.key_name,
            secret: spec.secret,
            bunker_pubkey,
            user_pubkey,
            relays: spec.relays,
            authorized: spec.authorized,
            handler: spec.handler,
            closed: false,
        })
    }
}

/// A session that keeps state locally and never touches the network.
pub struct LocalSession {
    key_name: String,
    secret: String,
    bunker_pubkey: String,
    user_pubkey: String,
    relays: Vec<String>,
    authorized: BTreeSet<String>,
    handler: ConnectHandler,
    closed: bool,
}

impl LocalSession {
    /// Feed a connect request into the session as if it arrived over a relay.
    pub fn connect(&mut self, request: &ConnectRequest) -> ConnectResponse {
        let handler = self.handler.clone();
        handler.on_request("connect", &request.id, &request.id);
        let response = handler.handle(self, request);
        match &response.error {
            Some(error) => handler.on_error(&request.id, error),
            None => handler.on_response(&request.id, &request.id),
        }
        response
    }

    pub fn bunker_pubkey(&self) -> &str {
        &self.bunker_pubkey
    }

    pub fn user_pubkey(&self) -> &str {
        &self.user_pubkey
    }

    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl SignerSession for LocalSession {
    fn authorize(&mut self, pubkey: &str) {
        self.authorized.insert(pubkey.to_string());
    }

    fn authorized_pubkeys(&self) -> &BTreeSet<String> {
        &self.authorized
    }

    fn set_authorized_pubkeys(&mut self, pubkeys: BTreeSet<String>) {
        self.authorized = pubkeys;
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!(key = %self.key_name, secret = %self.secret, "down");
    }
}
