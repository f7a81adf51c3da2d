//! adsync LDAP - Active Directory adapter
//!
//! Implements the directory ports of `adsync-core` on top of `ldap3`:
//! - Connection setup over `ldap://`, `ldaps://` or StartTLS
//! - Simple bind with the caller's credentials
//! - Paged subtree searches with RFC 4515 filter escaping
//! - Attribute replace/delete modifications
//!
//! ## Modules
//!
//! - [`client`] - Thin async wrapper over an `ldap3` connection
//! - [`filter`] - Rendering of [`SearchFilter`](adsync_core::ports::SearchFilter)s
//! - [`provider`] - [`IDirectoryConnector`](adsync_core::ports::IDirectoryConnector) implementation

pub mod client;
pub mod filter;
pub mod provider;

pub use provider::{LdapDirectory, LdapSession};

use adsync_core::domain::DirectoryError;
use thiserror::Error;

/// LDAP result codes the adapter distinguishes
pub mod rc {
    pub const SUCCESS: u32 = 0;
    pub const SIZE_LIMIT_EXCEEDED: u32 = 4;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const BUSY: u32 = 51;
    pub const UNAVAILABLE: u32 = 52;
    pub const SERVER_DOWN: u32 = 81;
}

/// Errors that can occur when talking to the directory server
#[derive(Debug, Error)]
pub enum LdapError {
    /// The server could not be reached
    #[error("cannot connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: ldap3::LdapError,
    },

    /// The bind was refused (result code 49)
    #[error("invalid credentials for '{0}'")]
    InvalidCredentials(String),

    /// The entry or search base does not exist (result code 32)
    #[error("no such object: {0}")]
    NoSuchObject(String),

    /// Any other non-success result code
    #[error("operation on '{dn}' failed with code {rc}: {text}")]
    Rejected { dn: String, rc: u32, text: String },

    /// The server is going away (result codes 51, 52, 81)
    #[error("server unavailable (code {rc}): {text}")]
    Unavailable { rc: u32, text: String },

    /// Protocol or I/O failure on an open connection
    #[error("transport error: {0}")]
    Transport(#[from] ldap3::LdapError),
}

impl LdapError {
    /// Classifies a non-success result code
    pub fn from_result(dn: &str, rc: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        match rc {
            rc::INVALID_CREDENTIALS => LdapError::InvalidCredentials(dn.to_string()),
            rc::NO_SUCH_OBJECT => LdapError::NoSuchObject(dn.to_string()),
            rc::BUSY | rc::UNAVAILABLE | rc::SERVER_DOWN => LdapError::Unavailable { rc, text },
            _ => LdapError::Rejected {
                dn: dn.to_string(),
                rc,
                text,
            },
        }
    }
}

impl From<LdapError> for DirectoryError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::InvalidCredentials(dn) => DirectoryError::Rejected {
                dn,
                message: "invalid credentials".to_string(),
            },
            LdapError::NoSuchObject(dn) => DirectoryError::NoSuchEntry(dn),
            LdapError::Rejected { dn, rc, text } => DirectoryError::Rejected {
                dn,
                message: format!("code {rc}: {text}"),
            },
            err @ (LdapError::Connect { .. }
            | LdapError::Unavailable { .. }
            | LdapError::Transport(_)) => DirectoryError::ConnectionLost(err.to_string()),
        }
    }
}
