//! Decryption of staged downloads.

use coffer_types::JobError;
use std::fmt;
use std::io::{Read, Write};

/// Decrypts attachment content.
///
/// Implementations are blocking and run on the blocking thread pool.
pub trait Decryptor: fmt::Debug + Send + Sync {
    /// Decrypts `input` with `key`, writing plaintext to `output`.
    /// Returns the number of plaintext bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Decrypt`] for bad keys or corrupt input and
    /// [`JobError::Io`] for read/write failures.
    fn decrypt(
        &self,
        key: &[u8],
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<u64, JobError>;
}

/// A [`Decryptor`] for hosts that only handle plaintext attachments.
///
/// Every keyed download fails with [`JobError::Decrypt`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecryptor;

impl Decryptor for NoDecryptor {
    fn decrypt(
        &self,
        _key: &[u8],
        _input: &mut dyn Read,
        _output: &mut dyn Write,
    ) -> Result<u64, JobError> {
        Err(JobError::Decrypt(
            "content is encrypted but no decryptor is configured".to_string(),
        ))
    }
}

/// Copies `input` to `output`, decrypting it first when a key is present.
pub(crate) fn decrypt_or_copy(
    decryptor: &dyn Decryptor,
    key: Option<&[u8]>,
    input: &mut dyn Read,
    output: &mut dyn Write,
) -> Result<u64, JobError> {
    let written = match key {
        Some(key) => decryptor.decrypt(key, input, output)?,
        None => std::io::copy(input, output)?,
    };
    output.flush()?;
    Ok(written)
}
