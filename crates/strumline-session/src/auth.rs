//! Identity resolution against the external account service.
//!
//! Strumline does not own accounts. It reads them through the
//! [`ProfileStore`] trait and checks the client's signed token against the
//! account's own secret.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use strumline_protocol::Credential;

use crate::SessionError;
use crate::jwt::verify_hs256;

/// An account record as the account service stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub points: i64,
    /// Per-account signing secret for session tokens.
    pub secret: String,
    #[serde(default)]
    pub banned: bool,
}

/// Read access to account profiles.
///
/// # Example
///
/// ```rust
/// use strumline_session::{Profile, ProfileStore, SessionError};
///
/// /// Knows no accounts, so every client joins anonymously.
/// struct NoAccounts;
///
/// impl ProfileStore for NoAccounts {
///     async fn profile_by_id(&self, _id: &str) -> Result<Option<Profile>, SessionError> {
///         Ok(None)
///     }
/// }
/// ```
pub trait ProfileStore: Send + Sync + 'static {
    /// Looks up an account by id. `Ok(None)` when no such account exists.
    fn profile_by_id(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Profile>, SessionError>> + Send;
}

/// A [`ProfileStore`] backed by a map, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfiles {
    profiles: HashMap<String, Profile>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: Profile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl FromIterator<Profile> for InMemoryProfiles {
    fn from_iter<I: IntoIterator<Item = Profile>>(iter: I) -> Self {
        let mut profiles = Self::new();
        for profile in iter {
            profiles.insert(profile);
        }
        profiles
    }
}

impl ProfileStore for InMemoryProfiles {
    async fn profile_by_id(&self, id: &str) -> Result<Option<Profile>, SessionError> {
        Ok(self.profiles.get(id).cloned())
    }
}

/// Who a session turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No credential, or one that points at no account.
    Anonymous,
    /// Credential verified. Name and points come from the account record.
    Verified {
        account_id: String,
        name: String,
        points: i64,
    },
}

impl Identity {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

/// Turns an optional client credential into an [`Identity`].
pub struct IdentityBridge<P: ProfileStore> {
    store: P,
}

impl<P: ProfileStore> IdentityBridge<P> {
    pub fn new(store: P) -> Self {
        Self { store }
    }

    /// Resolves a credential.
    ///
    /// - no credential, unknown account, or store failure → `Anonymous`
    /// - banned account → [`SessionError::Banned`]
    /// - bad token → [`SessionError::InvalidCredential`]
    pub async fn resolve(
        &self,
        credential: Option<&Credential>,
    ) -> Result<Identity, SessionError> {
        let Some(credential) = credential else {
            return Ok(Identity::Anonymous);
        };

        let profile = match self.store.profile_by_id(&credential.account_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => return Ok(Identity::Anonymous),
            Err(e) => {
                tracing::warn!(
                    account_id = %credential.account_id,
                    error = %e,
                    "profile lookup failed, joining anonymously"
                );
                return Ok(Identity::Anonymous);
            }
        };

        if profile.banned {
            return Err(SessionError::Banned(profile.id));
        }

        verify_hs256(&credential.token, profile.secret.as_bytes(), unix_now())?;

        tracing::debug!(account_id = %profile.id, name = %profile.name, "credential verified");
        Ok(Identity::Verified {
            account_id: profile.id,
            name: profile.name,
            points: profile.points,
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
