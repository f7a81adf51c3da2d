//! Identity matching
//!
//! Directory principals are tied to local users through the objectGUID the
//! engine stores in each user's metadata. The [`GuidIndex`] is built once
//! per batch from the local store and stays read-only afterwards; any
//! inconsistencies found while building it are reported as
//! [`IdentityAnomaly`]s instead of failing the batch.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use adsync_core::domain::{
    DirectoryPrincipal, IdentityAmbiguityError, IdentityAnomaly, LocalUser, LocalUserId, MetaKey,
    ObjectGuid, ReservedIdentitySet,
};
use adsync_core::ports::{IUserStore, UserFilter};
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// A local user as seen by the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedUser {
    pub id: LocalUserId,
    pub login: String,
    pub guid: Option<ObjectGuid>,
}

/// Lookup tables from directory identity to local user
#[derive(Debug, Clone, Default)]
pub struct GuidIndex {
    by_guid: HashMap<ObjectGuid, IndexedUser>,
    by_account: HashMap<String, IndexedUser>,
    ambiguous: HashMap<ObjectGuid, Vec<LocalUserId>>,
    anomalies: Vec<IdentityAnomaly>,
}

impl GuidIndex {
    /// Login of the user bound to `guid`
    pub fn login(&self, guid: &ObjectGuid) -> Option<&str> {
        self.by_guid.get(guid).map(|u| u.login.as_str())
    }

    /// The user bound to `guid`
    pub fn get(&self, guid: &ObjectGuid) -> Option<&IndexedUser> {
        self.by_guid.get(guid)
    }

    /// The directory user whose sAMAccountName mirror is `name` (case-insensitive)
    pub fn by_account_name(&self, name: &str) -> Option<&IndexedUser> {
        self.by_account.get(&name.to_lowercase())
    }

    /// Returns true if several local users store `guid`
    pub fn is_ambiguous(&self, guid: &ObjectGuid) -> bool {
        self.ambiguous.contains_key(guid)
    }

    /// Ambiguity details for `guid`, if any
    pub fn ambiguity(&self, guid: &ObjectGuid) -> Option<IdentityAmbiguityError> {
        self.ambiguous
            .get(guid)
            .map(|users| IdentityAmbiguityError {
                guid: guid.clone(),
                users: users.clone(),
            })
    }

    /// Anomalies found while building the index
    pub fn anomalies(&self) -> &[IdentityAnomaly] {
        &self.anomalies
    }

    /// Iterates `(guid, login)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectGuid, &str)> {
        self.by_guid.iter().map(|(g, u)| (g, u.login.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_guid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_guid.is_empty()
    }

    /// Builds an index from users listed in ascending id order
    ///
    /// When several users store the same GUID the last one wins and the
    /// collision becomes an anomaly.
    pub fn from_users<'a>(users: impl IntoIterator<Item = &'a LocalUser>) -> Self {
        let mut index = GuidIndex::default();
        let mut claims: BTreeMap<ObjectGuid, Vec<LocalUserId>> = BTreeMap::new();

        for user in users {
            let guid = match user.meta(MetaKey::ObjectGuid).map(str::trim) {
                None | Some("") => None,
                Some(raw) => match ObjectGuid::new(raw) {
                    Ok(guid) => Some(guid),
                    Err(_) => {
                        index.anomalies.push(IdentityAnomaly::InvalidStoredGuid {
                            user: user.id(),
                            value: raw.to_string(),
                        });
                        None
                    }
                },
            };

            let entry = IndexedUser {
                id: user.id(),
                login: user.login().to_string(),
                guid: guid.clone(),
            };
            if let Some(account) = user.account_name() {
                index
                    .by_account
                    .insert(account.trim().to_lowercase(), entry.clone());
            }
            if let Some(guid) = guid {
                claims.entry(guid.clone()).or_default().push(user.id());
                index.by_guid.insert(guid, entry);
            }
        }

        for (guid, users) in claims {
            if users.len() > 1 {
                let kept = index.by_guid[&guid].id;
                index.anomalies.push(IdentityAnomaly::DuplicateGuid {
                    guid: guid.clone(),
                    users: users.clone(),
                    kept,
                });
                index.ambiguous.insert(guid, users);
            }
        }
        index
    }
}

/// How a directory principal relates to the local store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    /// The principal's objectGUID is stored on this user
    ByGuid(LocalUserId),
    /// No GUID binding; the user was found through sAMAccountName or login
    ByAccountName(LocalUserId),
    /// No local counterpart
    Unmatched,
    /// Several local users claim the principal's GUID
    Ambiguous(IdentityAmbiguityError),
}

impl Match {
    pub fn user_id(&self) -> Option<LocalUserId> {
        match self {
            Match::ByGuid(id) | Match::ByAccountName(id) => Some(*id),
            Match::Unmatched | Match::Ambiguous(_) => None,
        }
    }
}

/// Resolves directory principals to local users
#[derive(Clone)]
pub struct IdentityMatcher {
    store: Arc<dyn IUserStore>,
    reserved: ReservedIdentitySet,
    span: tracing::Span,
}

impl IdentityMatcher {
    pub fn new(store: Arc<dyn IUserStore>, reserved: ReservedIdentitySet) -> Self {
        Self {
            store,
            reserved,
            span: tracing::info_span!("identity"),
        }
    }

    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn reserved(&self) -> &ReservedIdentitySet {
        &self.reserved
    }

    fn directory_users(&self) -> UserFilter {
        UserFilter::new()
            .with_non_empty_meta(MetaKey::SamAccountName.as_str())
            .excluding(self.reserved.iter())
    }

    /// Builds the GUID → login index over every directory user
    ///
    /// Reserved users and users without the account-name marker are left
    /// out. Keys are normalized GUIDs, so differently-cased stored values
    /// of the same GUID collide.
    #[tracing::instrument(parent = &self.span, skip(self))]
    pub async fn build_guid_to_login_index(&self) -> Result<GuidIndex> {
        let users = self
            .store
            .query_users(&self.directory_users())
            .await
            .context("Failed to list directory users")?;

        let index = GuidIndex::from_users(users.iter());
        for anomaly in index.anomalies() {
            warn!(%anomaly, "Identity anomaly");
        }
        info!(
            users = users.len(),
            indexed = index.len(),
            anomalies = index.anomalies().len(),
            "Built objectGUID index"
        );
        Ok(index)
    }

    /// Local users eligible for synchronization
    ///
    /// With `target`, at most that user, and only when it carries the
    /// account-name marker and is not reserved. Without, every such user.
    #[tracing::instrument(parent = &self.span, skip(self))]
    pub async fn find_principal_candidates(
        &self,
        target: Option<LocalUserId>,
    ) -> Result<Vec<LocalUser>> {
        let mut filter = self.directory_users();
        if let Some(id) = target {
            if self.reserved.contains(id) {
                debug!(user = %id, "Target user is reserved");
                return Ok(Vec::new());
            }
            filter = filter.only(id);
        }
        let users = self
            .store
            .query_users(&filter)
            .await
            .context("Failed to list candidate users")?;
        // Adapters may ignore parts of the filter; re-check the invariants here
        Ok(users
            .into_iter()
            .filter(|u| filter.matches(u))
            .collect())
    }

    /// Finds the local user matching `principal`
    ///
    /// The objectGUID decides first. When it isn't indexed, a user whose
    /// sAMAccountName mirror or login equals the principal's sAMAccountName
    /// matches, unless that user is already bound to a different GUID.
    #[tracing::instrument(parent = &self.span, skip_all, fields(principal = %principal.display_id()))]
    pub async fn resolve(&self, principal: &DirectoryPrincipal, index: &GuidIndex) -> Result<Match> {
        let guid = principal.object_guid();

        if let Some(guid) = guid {
            if let Some(err) = index.ambiguity(guid) {
                return Ok(Match::Ambiguous(err));
            }
            if let Some(user) = index.get(guid) {
                return Ok(Match::ByGuid(user.id));
            }
        }

        let Some(account) = principal.sam_account_name() else {
            return Ok(Match::Unmatched);
        };
        let compatible = |bound: Option<&ObjectGuid>| match (bound, guid) {
            (Some(bound), Some(guid)) => bound == guid,
            _ => true,
        };

        if let Some(user) = index.by_account_name(account) {
            if compatible(user.guid.as_ref()) {
                debug!(user = %user.id, "Matched on sAMAccountName mirror");
                return Ok(Match::ByAccountName(user.id));
            }
            debug!(user = %user.id, "Account name bound to another objectGUID");
            return Ok(Match::Unmatched);
        }

        let by_login = self
            .store
            .find_by_login(account)
            .await
            .with_context(|| format!("Failed to look up login '{account}'"))?;
        match by_login {
            Some(user) if self.reserved.contains(user.id()) => {
                debug!(user = %user.id(), "Login belongs to a reserved user");
                Ok(Match::Unmatched)
            }
            Some(user) if compatible(user.object_guid().as_ref()) => {
                debug!(user = %user.id(), "Matched on login");
                Ok(Match::ByAccountName(user.id()))
            }
            _ => Ok(Match::Unmatched),
        }
    }
}
