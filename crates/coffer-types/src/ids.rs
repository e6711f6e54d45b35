//! Job identities.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier of a download record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, From, Into)]
#[serde(transparent)]
pub struct DownloadId(String);

impl DownloadId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DownloadId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Identifier of an export job. A new one is generated per queued export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, From, Into)]
#[serde(transparent)]
pub struct ExportId(String);

impl ExportId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExportId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Identifies one attachment of one vault item.
///
/// Two requests with equal tags are the same download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display)]
#[display("{local_item_id}/{attachment_id}")]
pub struct AttachmentTag {
    /// Id of the item in local storage.
    pub local_item_id: String,
    /// Id of the item on the server, if it has been synced.
    pub remote_item_id: Option<String>,
    /// Id of the attachment within the item.
    pub attachment_id: String,
}

impl AttachmentTag {
    /// Creates a new tag.
    #[must_use]
    pub fn new(
        local_item_id: impl Into<String>,
        remote_item_id: Option<String>,
        attachment_id: impl Into<String>,
    ) -> Self {
        Self {
            local_item_id: local_item_id.into(),
            remote_item_id,
            attachment_id: attachment_id.into(),
        }
    }
}

/// Digest of a content key.
///
/// Pool entries remember the fingerprint of the key they were created with,
/// so a request with a different key is detected without keeping the key
/// itself around.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct KeyFingerprint(String);

impl KeyFingerprint {
    /// Fingerprints an optional key; `None` fingerprints as empty.
    #[must_use]
    pub fn of(key: Option<&[u8]>) -> Self {
        match key {
            Some(key) => {
                let digest = Sha256::digest(key);
                Self(hex::encode(&digest[..16]))
            }
            None => Self(String::new()),
        }
    }

    /// Returns true if this fingerprints the absence of a key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
