//! Export encodings.

use crate::{Cipher, VaultSnapshot};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use coffer_types::JobError;
use serde::Serialize;
use std::collections::HashMap;

/// Turns a vault snapshot into the bytes of an export document.
pub trait ExportEncoder: std::fmt::Debug + Send + Sync {
    /// Encodes `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Encode`] if serialization fails.
    fn encode(&self, snapshot: &VaultSnapshot) -> Result<Bytes, JobError>;

    /// Name of the document inside the archive.
    fn file_name(&self) -> &str;
}

/// JSON export, compatible with the unencrypted Bitwarden layout.
#[derive(Debug, Clone, Default)]
pub struct JsonExportEncoder {
    pretty: bool,
}

impl JsonExportEncoder {
    /// Creates a compact JSON encoder.
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: false }
    }

    /// Sets whether to pretty-print output.
    #[must_use]
    pub const fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

#[derive(Serialize)]
struct RootEntity<'a> {
    encrypted: bool,
    organizations: Vec<OrganizationEntity<'a>>,
    collections: Vec<CollectionEntity<'a>>,
    folders: Vec<FolderEntity<'a>>,
    items: Vec<ItemEntity<'a>>,
}

#[derive(Serialize)]
struct OrganizationEntity<'a> {
    id: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionEntity<'a> {
    id: &'a str,
    name: &'a str,
    organization_id: Option<&'a str>,
    external_id: Option<&'a str>,
}

#[derive(Serialize)]
struct FolderEntity<'a> {
    id: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemEntity<'a> {
    id: &'a str,
    folder_id: Option<&'a str>,
    organization_id: Option<&'a str>,
    collection_ids: Option<&'a [String]>,
    name: &'a str,
    notes: Option<&'a str>,
    favorite: bool,
    revision_date: DateTime<Utc>,
    creation_date: DateTime<Utc>,
    deleted_date: Option<DateTime<Utc>>,
    tags: &'a [String],
}

impl<'a> ItemEntity<'a> {
    fn new(cipher: &'a Cipher, folders: &HashMap<&str, &'a str>) -> Self {
        // Folder references use the server id so the export can be
        // imported elsewhere.
        let folder_id = cipher
            .folder_id
            .as_deref()
            .map(|id| folders.get(id).copied().unwrap_or(id));
        Self {
            id: cipher.remote_id.as_deref().unwrap_or(&cipher.id),
            folder_id,
            organization_id: cipher.organization_id.as_deref(),
            collection_ids: (!cipher.collection_ids.is_empty())
                .then_some(cipher.collection_ids.as_slice()),
            name: &cipher.name,
            notes: cipher.notes.as_deref(),
            favorite: cipher.favorite,
            revision_date: cipher.revision_date,
            creation_date: cipher.created_date.unwrap_or(cipher.revision_date),
            deleted_date: cipher.deleted_date,
            tags: &cipher.tags,
        }
    }
}

impl ExportEncoder for JsonExportEncoder {
    fn encode(&self, snapshot: &VaultSnapshot) -> Result<Bytes, JobError> {
        let local_to_remote: HashMap<&str, &str> = snapshot
            .folders
            .iter()
            .filter_map(|f| Some((f.id.as_str(), f.remote_id.as_deref()?)))
            .collect();

        let root = RootEntity {
            encrypted: false,
            organizations: snapshot
                .organizations
                .iter()
                .map(|o| OrganizationEntity {
                    id: &o.id,
                    name: &o.name,
                })
                .collect(),
            collections: snapshot
                .collections
                .iter()
                .map(|c| CollectionEntity {
                    id: &c.id,
                    name: &c.name,
                    organization_id: c.organization_id.as_deref(),
                    external_id: c.external_id.as_deref(),
                })
                .collect(),
            folders: snapshot
                .folders
                .iter()
                .map(|f| FolderEntity {
                    id: f.remote_id.as_deref().unwrap_or(&f.id),
                    name: &f.name,
                })
                .collect(),
            items: snapshot
                .ciphers
                .iter()
                .map(|c| ItemEntity::new(c, &local_to_remote))
                .collect(),
        };

        let encoded = if self.pretty {
            serde_json::to_vec_pretty(&root)
        } else {
            serde_json::to_vec(&root)
        };
        encoded
            .map(Bytes::from)
            .map_err(|e| JobError::Encode(e.to_string()))
    }

    fn file_name(&self) -> &str {
        "vault.json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::testing::vault;
    use crate::{ExportFilter, snapshot};
    use serde_json::Value;

    async fn encoded(encoder: &JsonExportEncoder) -> Value {
        let snapshot = snapshot(&vault(), &ExportFilter::All).await.unwrap();
        let bytes = encoder.encode(&snapshot).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_shape() {
        let json = encoded(&JsonExportEncoder::new()).await;
        assert_eq!(json["encrypted"], Value::Bool(false));
        assert_eq!(json["items"].as_array().unwrap().len(), 3);
        assert_eq!(json["organizations"][0]["name"], "Acme");
        assert_eq!(json["collections"][0]["organizationId"], "o1");
    }

    #[tokio::test]
    async fn test_ids_prefer_remote() {
        let json = encoded(&JsonExportEncoder::new()).await;
        assert_eq!(json["folders"][0]["id"], "rf1");

        let work = &json["items"][0];
        assert_eq!(work["id"], "r1");
        assert_eq!(work["folderId"], "rf1");
        assert_eq!(work["creationDate"], work["revisionDate"]);

        let loose = &json["items"][2];
        assert_eq!(loose["id"], "c3");
        assert_eq!(loose["folderId"], Value::Null);
        assert_eq!(loose["collectionIds"], Value::Null);
    }

    #[tokio::test]
    async fn test_pretty_json() {
        let compact = JsonExportEncoder::new();
        let pretty = JsonExportEncoder::new().with_pretty(true);
        let snapshot = snapshot(&vault(), &ExportFilter::All).await.unwrap();

        let compact = compact.encode(&snapshot).unwrap();
        let pretty = pretty.encode(&snapshot).unwrap();
        assert!(!compact.contains(&b'\n'));
        assert!(pretty.contains(&b'\n'));
        assert_eq!(
            serde_json::from_slice::<Value>(&compact).unwrap(),
            serde_json::from_slice::<Value>(&pretty).unwrap()
        );
    }
}
