use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::store::{self, DocumentStore};

pub const ADMINS_DOCUMENT: &str = "admins";

#[derive(Debug, Default, Serialize, Deserialize)]
struct AdminsDocument {
    #[serde(default)]
    admins: Vec<String>,
}

/// Tenants allowed to provision and delete. Loaded once at startup; changes
/// to the `admins` document take effect on restart.
#[derive(Debug, Clone)]
pub struct AdminSet {
    root: String,
    members: BTreeSet<String>,
}

impl AdminSet {
    pub fn new(root: impl Into<String>, members: impl IntoIterator<Item = String>) -> Self {
        Self {
            root: root.into(),
            members: members.into_iter().collect(),
        }
    }

    pub fn load(store: &dyn DocumentStore, root: &str) -> Result<Self> {
        let doc: AdminsDocument = store::load(store, ADMINS_DOCUMENT)?;
        let set = Self::new(root, doc.admins);
        info!(root, admins = set.members.len(), "loaded admin set");
        Ok(set)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn is_admin(&self, tenant_id: &str) -> bool {
        tenant_id == self.root || self.members.contains(tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_root_is_always_admin() {
        let set = AdminSet::new("1", Vec::new());
        assert!(set.is_admin("1"));
        assert!(!set.is_admin("2"));
    }

    #[test]
    fn test_load_from_document() {
        let store = MemoryStore::new();
        store
            .write_document(ADMINS_DOCUMENT, &json!({ "admins": ["5", "6"] }))
            .unwrap();

        let set = AdminSet::load(&store, "1").unwrap();
        assert!(set.is_admin("1"));
        assert!(set.is_admin("5"));
        assert!(set.is_admin("6"));
        assert!(!set.is_admin("7"));
    }

    #[test]
    fn test_missing_document_means_root_only() {
        let store = MemoryStore::new();
        let set = AdminSet::load(&store, "1").unwrap();
        assert_eq!(set.root(), "1");
        assert!(!set.is_admin("5"));
    }
}
