//! Selecting what gets exported.

use crate::{Cipher, VaultSnapshot, VaultSource};
use coffer_types::JobError;
use std::collections::HashSet;

/// Predicate over vault items.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExportFilter {
    /// Every item.
    #[default]
    All,
    /// Items with one of the given local ids.
    ById(Vec<String>),
    /// Items in the given folder.
    ByFolder(String),
    /// Items owned by the given organization.
    ByOrganization(String),
    /// Items shared through the given collection.
    ByCollection(String),
    /// Items matching every filter.
    And(Vec<ExportFilter>),
    /// Items matching at least one filter.
    Or(Vec<ExportFilter>),
}

impl ExportFilter {
    /// Returns true if `cipher` is selected.
    #[must_use]
    pub fn matches(&self, cipher: &Cipher) -> bool {
        match self {
            Self::All => true,
            Self::ById(ids) => ids.iter().any(|id| *id == cipher.id),
            Self::ByFolder(folder) => cipher.folder_id.as_ref() == Some(folder),
            Self::ByOrganization(org) => cipher.organization_id.as_ref() == Some(org),
            Self::ByCollection(collection) => cipher.collection_ids.contains(collection),
            Self::And(filters) => filters.iter().all(|f| f.matches(cipher)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(cipher)),
        }
    }
}

/// Reads the items selected by `filter` together with the folders,
/// collections and organizations they reference.
///
/// # Errors
///
/// Propagates errors from the vault.
pub async fn snapshot(
    vault: &dyn VaultSource,
    filter: &ExportFilter,
) -> Result<VaultSnapshot, JobError> {
    let ciphers: Vec<Cipher> = vault
        .ciphers()
        .await?
        .into_iter()
        .filter(|cipher| filter.matches(cipher))
        .collect();

    let folder_ids: HashSet<&str> = ciphers
        .iter()
        .filter_map(|c| c.folder_id.as_deref())
        .collect();
    let collection_ids: HashSet<&str> = ciphers
        .iter()
        .flat_map(|c| c.collection_ids.iter().map(String::as_str))
        .collect();
    let organization_ids: HashSet<&str> = ciphers
        .iter()
        .filter_map(|c| c.organization_id.as_deref())
        .collect();

    let mut folders = vault.folders().await?;
    folders.retain(|f| folder_ids.contains(f.id.as_str()));
    let mut collections = vault.collections().await?;
    collections.retain(|c| collection_ids.contains(c.id.as_str()));
    let mut organizations = vault.organizations().await?;
    organizations.retain(|o| organization_ids.contains(o.id.as_str()));

    tracing::debug!(
        items = ciphers.len(),
        folders = folders.len(),
        collections = collections.len(),
        organizations = organizations.len(),
        "vault snapshot taken"
    );

    Ok(VaultSnapshot {
        ciphers,
        folders,
        collections,
        organizations,
    })
}


#[cfg(test)]
mod tests {
    use super::testing::vault;
    use super::*;

    fn ids(snapshot: &VaultSnapshot) -> Vec<&str> {
        snapshot.ciphers.iter().map(|c| c.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_all_keeps_only_referenced_relations() {
        let snapshot = snapshot(&vault(), &ExportFilter::All).await.unwrap();
        assert_eq!(ids(&snapshot), ["c1", "c2", "c3"]);
        assert_eq!(snapshot.folders.len(), 1);
        assert_eq!(snapshot.folders[0].id, "f1");
        assert_eq!(snapshot.collections.len(), 1);
        assert_eq!(snapshot.organizations.len(), 1);
        assert_eq!(snapshot.organizations[0].id, "o1");
    }

    #[tokio::test]
    async fn test_by_folder() {
        let filter = ExportFilter::ByFolder("f1".to_string());
        let snapshot = snapshot(&vault(), &filter).await.unwrap();
        assert_eq!(ids(&snapshot), ["c1"]);
        assert!(snapshot.organizations.is_empty());
        assert!(snapshot.collections.is_empty());
    }

    #[tokio::test]
    async fn test_combinators() {
        let filter = ExportFilter::Or(vec![
            ExportFilter::ByCollection("col1".to_string()),
            ExportFilter::ById(vec!["c3".to_string()]),
        ]);
        let selected = snapshot(&vault(), &filter).await.unwrap();
        assert_eq!(ids(&selected), ["c2", "c3"]);
        assert!(selected.folders.is_empty());

        let filter = ExportFilter::And(vec![
            ExportFilter::ByOrganization("o1".to_string()),
            ExportFilter::ById(vec!["c1".to_string()]),
        ]);
        let selected = snapshot(&vault(), &filter).await.unwrap();
        assert!(selected.ciphers.is_empty());
    }

    #[test]
    fn test_empty_combinators() {
        let cipher = super::testing::cipher("x");
        assert!(ExportFilter::And(Vec::new()).matches(&cipher));
        assert!(!ExportFilter::Or(Vec::new()).matches(&cipher));
    }
}
