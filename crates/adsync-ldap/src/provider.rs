//! LdapDirectory - IDirectoryConnector implementation for LDAP / AD
//!
//! Opens one [`LdapClient`] per session and translates between the port
//! types of `adsync-core` and what `ldap3` speaks.
//!
//! ## Design Notes
//!
//! - `objectGUID` is binary in Active Directory. `ldap3` files a value under
//!   `bin_attrs` unless it happens to be valid UTF-8, so both maps are
//!   checked and any 16-byte value is decoded as binary.
//! - Other binary attributes are dropped; they cannot be mapped to local
//!   text fields.

use adsync_core::config::DirectoryConfig;
use adsync_core::domain::{
    AttributeMap, AttributeName, ConnectionDetails, DirectoryChange, DirectoryError,
    DirectoryPrincipal, ObjectGuid,
};
use adsync_core::ports::{IDirectoryConnector, IDirectorySession, SearchRequest};
use async_trait::async_trait;
use ldap3::SearchEntry;
use tracing::{debug, trace};

use crate::client::{LdapClient, LdapSettings};
use crate::filter;

/// Connector for an LDAP directory server
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    settings: LdapSettings,
}

impl LdapDirectory {
    pub fn new(settings: LdapSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(LdapSettings::from_config(config))
    }

    pub fn settings(&self) -> &LdapSettings {
        &self.settings
    }
}

#[async_trait]
impl IDirectoryConnector for LdapDirectory {
    async fn open(
        &self,
        details: ConnectionDetails,
    ) -> Result<Box<dyn IDirectorySession>, DirectoryError> {
        let mut client = LdapClient::connect(&self.settings).await?;

        if !client.bind(details.username(), details.password()).await? {
            if let Err(err) = client.unbind().await {
                debug!(error = %err, "Unbind after rejected bind failed");
            }
            return Err(DirectoryError::Rejected {
                dn: details.username().to_string(),
                message: "invalid credentials".to_string(),
            });
        }

        debug!(url = %self.settings.url, principal = details.username(), "Directory bind succeeded");
        Ok(Box::new(LdapSession { client }))
    }
}

/// An open, bound LDAP session
pub struct LdapSession {
    client: LdapClient,
}

#[async_trait]
impl IDirectorySession for LdapSession {
    async fn bind(&mut self, username: &str, password: &str) -> Result<bool, DirectoryError> {
        Ok(self.client.bind(username, password).await?)
    }

    async fn search(
        &mut self,
        request: &SearchRequest,
    ) -> Result<Vec<DirectoryPrincipal>, DirectoryError> {
        let filter = filter::render(&request.filter);
        let attributes = requested_attribute_names(request);
        let entries = self.client.search(&filter, &attributes).await?;
        trace!(filter = %filter, entries = entries.len(), "Search returned");
        Ok(entries.into_iter().map(entry_to_principal).collect())
    }

    async fn modify(&mut self, dn: &str, changes: &[DirectoryChange]) -> Result<(), DirectoryError> {
        if changes.is_empty() {
            return Ok(());
        }
        self.client.modify(dn, to_modifications(changes)).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DirectoryError> {
        let mut client = self.client;
        client.unbind().await?;
        Ok(())
    }
}

/// Attribute names to request, identity attributes first, without duplicates
fn requested_attribute_names(request: &SearchRequest) -> Vec<String> {
    let mut names: Vec<AttributeName> = vec![
        AttributeName::object_guid(),
        AttributeName::sam_account_name(),
    ];
    for attribute in &request.attributes {
        if !names.contains(attribute) {
            names.push(attribute.clone());
        }
    }
    names.iter().map(|a| a.as_str().to_string()).collect()
}

/// `(attribute, values)` pairs for [`LdapClient::modify`]; empty means delete
fn to_modifications(changes: &[DirectoryChange]) -> Vec<(String, Vec<String>)> {
    changes
        .iter()
        .map(|change| match change {
            DirectoryChange::Replace { attribute, values } => {
                (attribute.as_str().to_string(), values.clone())
            }
            DirectoryChange::Clear { attribute } => (attribute.as_str().to_string(), Vec::new()),
        })
        .collect()
}

fn decode_guid(raw: &[u8]) -> Option<ObjectGuid> {
    if raw.len() == 16 {
        return ObjectGuid::from_bytes(raw).ok();
    }
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| ObjectGuid::new(text).ok())
}

/// Converts a search entry into a [`DirectoryPrincipal`]
///
/// The decoded objectGUID is stored in canonical text form so the
/// attribute map only ever holds strings.
fn entry_to_principal(entry: SearchEntry) -> DirectoryPrincipal {
    let guid_attribute = AttributeName::object_guid();
    let mut attributes = AttributeMap::new();
    let mut guid = None;

    for (name, values) in entry.attrs {
        let Ok(name) = AttributeName::new(name) else {
            continue;
        };
        if name == guid_attribute {
            guid = values.first().and_then(|v| decode_guid(v.as_bytes()));
        } else {
            attributes.insert(name, values);
        }
    }
    for (name, values) in entry.bin_attrs {
        match AttributeName::new(name) {
            Ok(name) if name == guid_attribute => {
                guid = values.first().and_then(|v| decode_guid(v.as_slice()));
            }
            Ok(name) => trace!(attribute = %name, "Skipping binary attribute"),
            Err(_) => {}
        }
    }

    if let Some(guid) = &guid {
        attributes.insert(guid_attribute, vec![guid.to_string()]);
    }
    let principal = DirectoryPrincipal::new(entry.dn, attributes);
    match guid {
        Some(guid) => principal.with_object_guid(guid),
        None => principal,
    }
}
