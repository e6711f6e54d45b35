//! Access to the vault being exported.

use crate::{Attachment, AttachmentSource, Cipher, Collection, Folder, Organization};
use async_trait::async_trait;
use coffer_types::JobError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Read access to the vault.
#[async_trait]
pub trait VaultSource: fmt::Debug + Send + Sync {
    /// Returns every item.
    async fn ciphers(&self) -> Result<Vec<Cipher>, JobError>;

    /// Returns every folder.
    async fn folders(&self) -> Result<Vec<Folder>, JobError>;

    /// Returns every collection.
    async fn collections(&self) -> Result<Vec<Collection>, JobError>;

    /// Returns every organization.
    async fn organizations(&self) -> Result<Vec<Organization>, JobError>;

    /// Resolves where `attachment` of `cipher` can be downloaded from.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Metadata`] if the attachment cannot be resolved.
    async fn attachment_source(
        &self,
        cipher: &Cipher,
        attachment: &Attachment,
    ) -> Result<AttachmentSource, JobError>;
}

/// A vault held in memory.
///
/// Deserializes from a JSON document with the same field names, every field
/// optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryVault {
    /// Items.
    pub ciphers: Vec<Cipher>,
    /// Folders.
    pub folders: Vec<Folder>,
    /// Collections.
    pub collections: Vec<Collection>,
    /// Organizations.
    pub organizations: Vec<Organization>,
    /// Download locations by attachment id.
    pub sources: HashMap<String, AttachmentSource>,
}

#[async_trait]
impl VaultSource for MemoryVault {
    async fn ciphers(&self) -> Result<Vec<Cipher>, JobError> {
        Ok(self.ciphers.clone())
    }

    async fn folders(&self) -> Result<Vec<Folder>, JobError> {
        Ok(self.folders.clone())
    }

    async fn collections(&self) -> Result<Vec<Collection>, JobError> {
        Ok(self.collections.clone())
    }

    async fn organizations(&self) -> Result<Vec<Organization>, JobError> {
        Ok(self.organizations.clone())
    }

    async fn attachment_source(
        &self,
        cipher: &Cipher,
        attachment: &Attachment,
    ) -> Result<AttachmentSource, JobError> {
        self.sources.get(&attachment.id).cloned().ok_or_else(|| {
            JobError::Metadata(format!(
                "no download location for attachment {} of item {}",
                attachment.id, cipher.id
            ))
        })
    }
}
