//! Directory connection lifecycle
//!
//! The [`ConnectionManager`] turns a username/password pair into an
//! authenticated [`DirectorySession`]. Every attempt builds fresh
//! [`ConnectionDetails`]; nothing is cached between attempts.
//!
//! ## Flow
//!
//! ```text
//! connect(user, pw) ──→ ConnectionDetails::new ──→ connector.open (bind)
//!                                                      │
//!                                          verification bind (same creds)
//!                                                      │
//!                                               DirectorySession
//! ```

use std::sync::Arc;

use adsync_core::domain::{
    ConnectionDetails, ConnectionError, DirectoryChange, DirectoryError, DirectoryPrincipal,
};
use adsync_core::ports::{IDirectoryConnector, IDirectorySession, SearchRequest};
use tracing::{debug, info, warn};

/// Opens verified directory sessions
#[derive(Clone)]
pub struct ConnectionManager {
    connector: Arc<dyn IDirectoryConnector>,
    account_suffix: Option<String>,
    span: tracing::Span,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn IDirectoryConnector>) -> Self {
        Self {
            connector,
            account_suffix: None,
            span: tracing::info_span!("connection"),
        }
    }

    /// Suffix appended to bare account names (`jdoe` → `jdoe@suffix`)
    #[must_use]
    pub fn with_account_suffix(mut self, suffix: Option<String>) -> Self {
        self.account_suffix = suffix;
        self
    }

    /// Emits all events of this component under `span`
    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Opens a session and verifies it with a second bind
    ///
    /// Rejected credentials are an ordinary `Err` value.
    ///
    /// # Errors
    /// - `ConnectionError::MissingCredentials` if the username or password is blank
    /// - `ConnectionError::BindRejected` if the initial bind is refused
    /// - `ConnectionError::VerificationFailed` if the verification bind is refused
    /// - `ConnectionError::Unreachable` if the server cannot be reached
    #[tracing::instrument(parent = &self.span, skip(self, password))]
    pub async fn connect(
        &self,
        username: &str,
        password: &str,
    ) -> Result<DirectorySession, ConnectionError> {
        if username.trim().is_empty() {
            return Err(ConnectionError::MissingCredentials(
                "username is empty".to_string(),
            ));
        }
        // An empty password would turn the bind into an unauthenticated one
        if password.is_empty() {
            return Err(ConnectionError::MissingCredentials(format!(
                "no password for '{username}'"
            )));
        }

        let details = ConnectionDetails::new(username.trim(), password)
            .with_account_suffix(self.account_suffix.as_deref());
        let principal = details.username().to_string();
        debug!(principal = %principal, "Opening directory session");

        let mut inner = self
            .connector
            .open(details)
            .await
            .map_err(|err| match err {
                DirectoryError::Rejected { .. } => ConnectionError::BindRejected {
                    username: principal.clone(),
                },
                other => ConnectionError::Unreachable(other.to_string()),
            })?;

        match inner.bind(&principal, password).await {
            Ok(true) => {
                info!(principal = %principal, "Directory session verified");
                Ok(DirectorySession {
                    inner,
                    username: principal,
                })
            }
            Ok(false) => {
                warn!(principal = %principal, "Verification bind rejected");
                close_quietly(inner).await;
                Err(ConnectionError::VerificationFailed {
                    username: principal,
                })
            }
            Err(err) => {
                warn!(principal = %principal, error = %err, "Verification bind failed");
                close_quietly(inner).await;
                Err(ConnectionError::Lost(err.to_string()))
            }
        }
    }

    /// Returns true if the credentials open a verified session
    ///
    /// The session is closed again before returning.
    pub async fn verify(&self, username: &str, password: &str) -> bool {
        match self.connect(username, password).await {
            Ok(session) => {
                session.close().await;
                true
            }
            Err(err) => {
                debug!(parent: &self.span, error = %err, "Credential check failed");
                false
            }
        }
    }
}

async fn close_quietly(session: Box<dyn IDirectorySession>) {
    if let Err(err) = session.close().await {
        debug!(error = %err, "Ignoring error while closing rejected session");
    }
}

/// An authenticated, single-use directory session
///
/// Owns the credentials it was opened with (through the adapter session).
/// Close it with [`close`](Self::close); dropping it releases everything
/// as well, without a polite unbind.
pub struct DirectorySession {
    inner: Box<dyn IDirectorySession>,
    username: String,
}

impl DirectorySession {
    /// The bound principal
    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn search(
        &mut self,
        request: &SearchRequest,
    ) -> Result<Vec<DirectoryPrincipal>, DirectoryError> {
        self.inner.search(request).await
    }

    pub async fn modify(
        &mut self,
        dn: &str,
        changes: &[DirectoryChange],
    ) -> Result<(), DirectoryError> {
        self.inner.modify(dn, changes).await
    }

    /// Unbinds and drops the credentials
    pub async fn close(self) {
        let username = self.username;
        match self.inner.close().await {
            Ok(()) => debug!(principal = %username, "Directory session closed"),
            Err(err) => warn!(principal = %username, error = %err, "Unbind failed"),
        }
    }
}

impl std::fmt::Debug for DirectorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySession")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
