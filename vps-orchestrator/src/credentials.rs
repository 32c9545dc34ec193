//! Panel credentials, issued once per tenant.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use vps_core::secrets::{self, PASSWORD_LENGTH};
use vps_core::validation::validate_tenant_id;

use crate::error::{FleetError, Result};
use crate::models::TenantAccount;
use crate::store::{self, DocumentStore};

pub const ACCOUNTS_DOCUMENT: &str = "accounts";

/// Accounts plus the username index, persisted together in one write.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsDocument {
    #[serde(default)]
    accounts: BTreeMap<String, TenantAccount>,
    #[serde(default)]
    usernames: BTreeMap<String, String>,
}

/// Result of [`CredentialIssuer::issue_if_absent`].
///
/// `secret` holds the plaintext password only on the call that created the
/// account.
#[derive(Clone)]
pub struct IssuedCredentials {
    pub account: TenantAccount,
    pub secret: Option<String>,
}

impl IssuedCredentials {
    pub fn is_new(&self) -> bool {
        self.secret.is_some()
    }
}

impl fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("account", &self.account)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone)]
pub struct CredentialIssuer {
    store: Arc<dyn DocumentStore>,
    lock: Arc<Mutex<()>>,
}

impl CredentialIssuer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn panel_username(tenant_id: &str) -> String {
        format!("user{}", tenant_id)
    }

    fn load(&self) -> Result<AccountsDocument> {
        store::load(self.store.as_ref(), ACCOUNTS_DOCUMENT)
    }

    /// Return the tenant's account, creating it with a fresh secret if absent.
    ///
    /// An existing account is never modified. If the new account cannot be
    /// persisted the error is returned and no plaintext leaves this function.
    #[instrument(skip(self))]
    pub async fn issue_if_absent(&self, tenant_id: &str) -> Result<IssuedCredentials> {
        validate_tenant_id(tenant_id)?;
        let _guard = self.lock.lock().await;

        let mut doc = self.load()?;
        if let Some(account) = doc.accounts.get(tenant_id) {
            debug!("account already exists");
            return Ok(IssuedCredentials {
                account: account.clone(),
                secret: None,
            });
        }

        let username = Self::panel_username(tenant_id);
        if let Some(owner) = doc.usernames.get(&username) {
            return Err(FleetError::Storage(format!(
                "Username index maps {} to tenant {} without an account",
                username, owner
            )));
        }

        let secret = secrets::generate_random_password(PASSWORD_LENGTH);
        let to_hash = secret.clone();
        let panel_password_hash = tokio::task::spawn_blocking(move || secrets::hash_password(&to_hash))
            .await
            .map_err(|e| FleetError::Storage(format!("Password hashing task failed: {}", e)))?;

        let account = TenantAccount {
            tenant_id: tenant_id.to_string(),
            panel_username: username.clone(),
            panel_password_hash,
            created_at: Utc::now(),
        };
        doc.accounts.insert(tenant_id.to_string(), account.clone());
        doc.usernames.insert(username, tenant_id.to_string());
        store::save(self.store.as_ref(), ACCOUNTS_DOCUMENT, &doc)?;

        info!(username = %account.panel_username, "issued panel credentials");
        Ok(IssuedCredentials {
            account,
            secret: Some(secret),
        })
    }

    pub async fn account(&self, tenant_id: &str) -> Result<Option<TenantAccount>> {
        let _guard = self.lock.lock().await;
        Ok(self.load()?.accounts.remove(tenant_id))
    }

    /// Look up `username` through the index and check `password`.
    ///
    /// `None` for an unknown user or a wrong password.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<TenantAccount>> {
        let account = {
            let _guard = self.lock.lock().await;
            let mut doc = self.load()?;
            let Some(tenant_id) = doc.usernames.remove(username) else {
                debug!("unknown username");
                return Ok(None);
            };
            match doc.accounts.remove(&tenant_id) {
                Some(account) => account,
                None => {
                    return Err(FleetError::Storage(format!(
                        "Username index points at missing account {}",
                        tenant_id
                    )))
                }
            }
        };

        let password = password.to_string();
        let encoded = account.panel_password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || secrets::verify_password(&password, &encoded))
            .await
            .map_err(|e| FleetError::Storage(format!("Password check task failed: {}", e)))??;

        if verified {
            Ok(Some(account))
        } else {
            debug!("wrong password");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_issue_is_idempotent() {
        let issuer = CredentialIssuer::new(Arc::new(MemoryStore::new()));

        let first = issuer.issue_if_absent("42").await.unwrap();
        assert!(first.is_new());
        let secret = first.secret.clone().unwrap();
        assert_eq!(secret.len(), PASSWORD_LENGTH);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(first.account.panel_username, "user42");
        assert_ne!(first.account.panel_password_hash, secret);

        let second = issuer.issue_if_absent("42").await.unwrap();
        assert!(second.secret.is_none());
        assert_eq!(second.account, first.account);
    }

    #[tokio::test]
    async fn test_authenticate_via_username_index() {
        let issuer = CredentialIssuer::new(Arc::new(MemoryStore::new()));
        let issued = issuer.issue_if_absent("42").await.unwrap();
        let secret = issued.secret.unwrap();

        let account = issuer.authenticate("user42", &secret).await.unwrap();
        assert_eq!(account.map(|a| a.tenant_id), Some("42".to_string()));

        assert!(issuer.authenticate("user42", "wrong").await.unwrap().is_none());
        assert!(issuer.authenticate("user43", &secret).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_failure_returns_no_secret() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes_with_prefix(ACCOUNTS_DOCUMENT);
        let issuer = CredentialIssuer::new(store.clone());

        let err = issuer.issue_if_absent("42").await.unwrap_err();
        assert!(matches!(err, FleetError::Storage(_)));

        store.clear_failures();
        assert!(issuer.account("42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_invalid_tenant_id() {
        let issuer = CredentialIssuer::new(Arc::new(MemoryStore::new()));
        let err = issuer.issue_if_absent("../x").await.unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let issued = IssuedCredentials {
            account: TenantAccount {
                tenant_id: "1".into(),
                panel_username: "user1".into(),
                panel_password_hash: "pbkdf2-sha256$1$a$b".into(),
                created_at: Utc::now(),
            },
            secret: Some("hunter2hunter2ab".into()),
        };
        let shown = format!("{:?}", issued);
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }
}
