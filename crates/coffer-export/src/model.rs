//! Vault data model as seen by exports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An organization items can belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A collection inside an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Owning organization.
    pub organization_id: Option<String>,
    /// Identifier in an external directory, if synced from one.
    pub external_id: Option<String>,
}

/// A folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    /// Local identifier.
    pub id: String,
    /// Server-side identifier, once synced.
    pub remote_id: Option<String>,
    /// Display name.
    pub name: String,
}

/// A file attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Identifier.
    pub id: String,
    /// Original file name.
    pub file_name: String,
    /// Size in bytes, if known.
    pub size: Option<u64>,
}

/// A vault item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cipher {
    /// Local identifier.
    pub id: String,
    /// Server-side identifier, once synced.
    pub remote_id: Option<String>,
    /// Containing folder, by local id.
    pub folder_id: Option<String>,
    /// Owning organization.
    pub organization_id: Option<String>,
    /// Collections the item is shared through.
    #[serde(default)]
    pub collection_ids: Vec<String>,
    /// Display name.
    pub name: String,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Whether the item is marked as a favorite.
    #[serde(default)]
    pub favorite: bool,
    /// Last modification.
    pub revision_date: DateTime<Utc>,
    /// Creation, when known.
    pub created_date: Option<DateTime<Utc>>,
    /// Deletion, for items in the trash.
    pub deleted_date: Option<DateTime<Utc>>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Attached files.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Where an attachment's content can be downloaded from.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSource {
    /// Download URL.
    pub url: String,
    /// Content key, if the content is encrypted.
    #[serde(default)]
    pub key: Option<Vec<u8>>,
}

impl std::fmt::Debug for AttachmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentSource")
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The data set an export is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultSnapshot {
    /// Selected items.
    pub ciphers: Vec<Cipher>,
    /// Folders referenced by the selected items.
    pub folders: Vec<Folder>,
    /// Collections referenced by the selected items.
    pub collections: Vec<Collection>,
    /// Organizations referenced by the selected items.
    pub organizations: Vec<Organization>,
}

impl VaultSnapshot {
    /// Iterates over every attachment together with its item.
    pub fn attachments(&self) -> impl Iterator<Item = (&Cipher, &Attachment)> {
        self.ciphers.iter().flat_map(|cipher| {
            cipher
                .attachments
                .iter()
                .map(move |attachment| (cipher, attachment))
        })
    }
}
