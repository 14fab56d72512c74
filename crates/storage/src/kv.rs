// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key-value store
//!
//! One file per key under a single directory. Writes go to a temp file that
//! is fsynced and renamed over the target, so a reader (or a restart after a
//! crash) observes either the old value or the new one, never a torn write.
//!
//! The store does not serialize writers; callers hold their own writer lock.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix of in-progress writes. `~` is always escaped in file names, so no
/// key can map to a name containing it.
const TEMP_SUFFIX: &str = "~tmp";

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt store entry {name}: {reason}")]
    Corrupt { name: String, reason: String },
}

/// Atomic-write key-value store rooted at a directory
#[derive(Debug, Clone)]
pub struct KvStore {
    dir: PathBuf,
}

impl KvStore {
    /// Open or create a store, discarding writes interrupted by a crash
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().contains('~') {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::warn!(dir = %dir.display(), removed, "discarded interrupted writes");
            sync_dir(&dir)?;
        }

        Ok(Self { dir })
    }

    /// Read a value, `None` if the key is absent
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a value atomically; it is durable once this returns
    pub fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let target = self.path_for(key);
        let temp = self.dir.join(format!("{}{}", encode_key(key), TEMP_SUFFIX));

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp)?;
        file.write_all(value)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &target)?;
        sync_dir(&self.dir)?;
        Ok(())
    }

    /// Remove a key, returning whether it existed
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                sync_dir(&self.dir)?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All entries whose key starts with `prefix`, sorted by key
    pub fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains('~') {
                continue;
            }
            let key = decode_key(&name)?;
            if !key.starts_with(prefix) {
                continue;
            }
            match fs::read(entry.path()) {
                Ok(bytes) => entries.push((key, bytes)),
                // Deleted between listing and reading
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(encode_key(key))
    }
}

fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// Escape every byte outside `[A-Za-z0-9._-]` as `%XX`
pub(crate) fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

pub(crate) fn decode_key(name: &str) -> Result<String, StoreError> {
    let corrupt = |reason: &str| StoreError::Corrupt {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3).ok_or_else(|| corrupt("truncated escape"))?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| corrupt("invalid escape"))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| corrupt("key is not UTF-8"))
}

#[cfg(test)]
#[path = "kv_tests.rs"]
mod tests;
