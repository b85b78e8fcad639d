//! Attachment persistence with best-effort PDF decryption.
//!
//! Statement PDFs arrive password-protected. The vault spools the raw
//! bytes to a scoped temp file, tries to open and decrypt them with the
//! password the account policy selects for the destination directory, and
//! re-serializes the document unencrypted. When anything about that fails
//! (wrong password, corrupt file, not a PDF at all) it degrades to storing
//! the original bytes verbatim at the same destination — the caller never
//! sees a failure past this boundary.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use lopdf::Document;
use thiserror::Error;

use crate::store::PersistenceError;

/// Internal decrypt failure. Logged and degraded, never propagated as a
/// unit failure.
#[derive(Debug, Error)]
enum DocumentDecryptError {
    #[error("temp spool failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("pdf open/decrypt failed: {0}")]
    Pdf(#[from] lopdf::Error),
}

/// Selects the decryption password for a destination directory by account
/// ownership: the account whose email appears as a path component of the
/// destination owns it.
///
/// Matching is by exact component, so one account's password is never
/// applied to another account's directory.
#[derive(Debug, Default, Clone)]
pub struct PasswordPolicy {
    passwords: BTreeMap<String, String>,
}

impl PasswordPolicy {
    pub fn new(passwords: BTreeMap<String, String>) -> Self {
        Self { passwords }
    }

    /// The password for the account owning `dest_dir`, if any.
    pub fn password_for(&self, dest_dir: &Path) -> Option<&str> {
        self.passwords
            .iter()
            .find(|(email, _)| {
                dest_dir
                    .components()
                    .any(|c| c.as_os_str() == OsStr::new(email.as_str()))
            })
            .map(|(_, password)| password.as_str())
    }
}

/// Persist one attachment under `dest_dir/filename`, decrypting when
/// possible.
///
/// Always overwrites an existing file at the destination; skip-if-processed
/// markers are the caller's concern. Only the final write of the fallback
/// bytes can fail, and that failure is a [`PersistenceError`] because it
/// means the attachment was lost entirely.
pub fn store_attachment(
    data: &[u8],
    filename: &str,
    dest_dir: &Path,
    policy: &PasswordPolicy,
) -> Result<PathBuf, PersistenceError> {
    fs::create_dir_all(dest_dir).map_err(|source| PersistenceError::Write {
        path: dest_dir.to_path_buf(),
        source,
    })?;
    let dest = dest_dir.join(filename);

    match decrypt_to(data, &dest, policy.password_for(dest_dir)) {
        Ok(()) => {
            log::debug!("stored decrypted document at {}", dest.display());
        }
        Err(err) => {
            // Degrade, don't fail: keep the original (possibly still
            // encrypted) bytes so nothing is lost.
            log::warn!("storing {filename} as raw bytes: {err}");
            fs::write(&dest, data).map_err(|source| PersistenceError::Write {
                path: dest.clone(),
                source,
            })?;
        }
    }

    Ok(dest)
}

fn decrypt_to(data: &[u8], dest: &Path, password: Option<&str>) -> Result<(), DocumentDecryptError> {
    // Spool through a named temp file; it is removed on every exit path
    // when the handle drops.
    let mut spool = tempfile::NamedTempFile::new()?;
    spool.write_all(data)?;

    let mut doc = Document::load(spool.path())?;
    if doc.is_encrypted() {
        doc.decrypt(password.unwrap_or(""))?;
    }
    doc.save(dest)?;
    Ok(())
}
