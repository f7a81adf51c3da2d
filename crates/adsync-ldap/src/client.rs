//! LDAP client
//!
//! Async wrapper over one `ldap3` connection. Every operation checks the
//! LDAP result code and turns non-success codes into [`LdapError`]s, so
//! callers never look at raw `LdapResult`s.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use adsync_ldap::client::{LdapClient, LdapSettings};
//!
//! # async fn example() -> Result<(), adsync_ldap::LdapError> {
//! let settings = LdapSettings::new("ldaps://dc1.example.com:636", "DC=example,DC=com");
//! let mut client = LdapClient::connect(&settings).await?;
//! if client.bind("svc-sync@example.com", "secret").await? {
//!     let entries = client.search("(sAMAccountName=jdoe)", &["mail".to_string()]).await?;
//!     println!("{} entries", entries.len());
//! }
//! client.unbind().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::time::Duration;

use adsync_core::config::DirectoryConfig;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use tracing::{debug, warn};

use crate::{rc, LdapError};

/// Connection parameters for [`LdapClient::connect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapSettings {
    pub url: String,
    pub base_dn: String,
    pub starttls: bool,
    pub timeout: Duration,
    /// Entries per page; 0 disables paging
    pub page_size: u32,
}

impl LdapSettings {
    pub fn new(url: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            base_dn: base_dn.into(),
            starttls: false,
            timeout: Duration::from_secs(10),
            page_size: 500,
        }
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self {
            url: config.url(),
            base_dn: config.base_dn.clone(),
            starttls: config.starttls,
            timeout: Duration::from_secs(config.timeout_secs),
            page_size: config.page_size,
        }
    }
}

/// One open LDAP connection
pub struct LdapClient {
    ldap: Ldap,
    base_dn: String,
    timeout: Duration,
    page_size: u32,
}

impl LdapClient {
    /// Opens the connection and spawns its driver task
    ///
    /// No bind happens here; call [`bind`](Self::bind) next.
    pub async fn connect(settings: &LdapSettings) -> Result<Self, LdapError> {
        debug!(url = %settings.url, starttls = settings.starttls, "Connecting to directory");

        let conn_settings = LdapConnSettings::new()
            .set_conn_timeout(settings.timeout)
            .set_starttls(settings.starttls);

        let (conn, ldap) = LdapConnAsync::with_settings(conn_settings, &settings.url)
            .await
            .map_err(|source| LdapError::Connect {
                url: settings.url.clone(),
                source,
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        Ok(Self {
            ldap,
            base_dn: settings.base_dn.clone(),
            timeout: settings.timeout,
            page_size: settings.page_size,
        })
    }

    /// Simple bind
    ///
    /// Returns `Ok(false)` when the server answers "invalid credentials";
    /// every other failure is an error.
    pub async fn bind(&mut self, dn: &str, password: &str) -> Result<bool, LdapError> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await?;
        match result.rc {
            rc::SUCCESS => Ok(true),
            rc::INVALID_CREDENTIALS => {
                debug!(dn, text = %result.text, "Bind rejected");
                Ok(false)
            }
            code => Err(LdapError::from_result(dn, code, result.text)),
        }
    }

    /// Subtree search under the base DN
    ///
    /// Uses the paged-results control when a page size is configured, so
    /// directories with a server-side size limit return every entry.
    pub async fn search(
        &mut self,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<SearchEntry>, LdapError> {
        debug!(base = %self.base_dn, filter, "Searching directory");
        let attributes = attributes.to_vec();

        if self.page_size == 0 {
            let result = self
                .ldap
                .with_timeout(self.timeout)
                .search(&self.base_dn, Scope::Subtree, filter, attributes)
                .await?;
            let ldap3::SearchResult(entries, outcome) = result;
            return match outcome.rc {
                rc::SUCCESS => Ok(entries.into_iter().map(SearchEntry::construct).collect()),
                rc::SIZE_LIMIT_EXCEEDED => {
                    warn!(returned = entries.len(), "Search hit the server size limit");
                    Ok(entries.into_iter().map(SearchEntry::construct).collect())
                }
                code => Err(LdapError::from_result(&self.base_dn, code, outcome.text)),
            };
        }

        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(self.page_size as i32)),
        ];
        // Applies to every page, not only the first request
        let mut stream = self
            .ldap
            .with_timeout(self.timeout)
            .streaming_search_with(adapters, &self.base_dn, Scope::Subtree, filter, attributes)
            .await?;

        let mut entries = Vec::new();
        while let Some(entry) = stream.next().await? {
            entries.push(SearchEntry::construct(entry));
        }
        let outcome = stream.finish().await;
        match outcome.rc {
            rc::SUCCESS => Ok(entries),
            code => Err(LdapError::from_result(&self.base_dn, code, outcome.text)),
        }
    }

    /// Replaces or deletes attributes of one entry
    ///
    /// An empty value set deletes the attribute.
    pub async fn modify(
        &mut self,
        dn: &str,
        changes: Vec<(String, Vec<String>)>,
    ) -> Result<(), LdapError> {
        let mods: Vec<Mod<String>> = changes
            .into_iter()
            .map(|(attribute, values)| {
                if values.is_empty() {
                    Mod::Delete(attribute, HashSet::new())
                } else {
                    Mod::Replace(attribute, values.into_iter().collect())
                }
            })
            .collect();

        let result = self
            .ldap
            .with_timeout(self.timeout)
            .modify(dn, mods)
            .await?;
        match result.rc {
            rc::SUCCESS => Ok(()),
            code => Err(LdapError::from_result(dn, code, result.text)),
        }
    }

    /// Ends the session
    pub async fn unbind(&mut self) -> Result<(), LdapError> {
        self.ldap.unbind().await?;
        Ok(())
    }
}
