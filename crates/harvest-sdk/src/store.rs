//! Persistence for formatted bundles.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::info;
use parking_lot::RwLock;
use tempfile::NamedTempFile;

use crate::{
    error::{BundleError, Result},
    format::{BundleDocument, OutputKind},
};

/// Identity of a saved bundle; names sort by creation time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleKey {
    pub created_at_ms: u64,
    pub wallet_name: String,
    pub kind: OutputKind,
}

impl BundleKey {
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_{}",
            self.created_at_ms,
            wallet_slug(&self.wallet_name),
            self.kind.slug()
        )
    }
}

/// Lowercase ASCII alphanumerics with single dashes between words.
pub fn wallet_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        "wallet".into()
    } else {
        trimmed.to_string()
    }
}

/// A bundle either lands in the store completely or not at all.
pub trait BundleStore: Send + Sync {
    /// Returns a location string that [`BundleStore::load`] accepts.
    fn save(&self, key: &BundleKey, document: &BundleDocument) -> Result<String>;
    fn load(&self, location: &str) -> Result<BundleDocument>;
    /// Saved locations, oldest first.
    fn list(&self) -> Result<Vec<String>>;
}

/// Writes each bundle as `{createdAtMs}_{walletSlug}_{kind}.json` under one directory.
pub struct FsBundleStore {
    dir: PathBuf,
}

impl FsBundleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn persistence(context: &str, err: impl std::fmt::Display) -> BundleError {
    BundleError::Persistence(format!("{context}: {err}"))
}

impl BundleStore for FsBundleStore {
    fn save(&self, key: &BundleKey, document: &BundleDocument) -> Result<String> {
        let json = document.to_json()?;
        fs::create_dir_all(&self.dir)
            .map_err(|err| persistence(&format!("create {}", self.dir.display()), err))?;

        // Written beside the target so the final rename stays on one filesystem.
        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|err| persistence("temp file", err))?;
        temp.write_all(json.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|err| persistence("write bundle", err))?;

        let stem = key.file_stem();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}-{attempt}.json")
            };
            let path = self.dir.join(name);
            match temp.persist_noclobber(&path) {
                Ok(_) => {
                    info!(target: "harvest::store", "saved bundle to {}", path.display());
                    return Ok(path.display().to_string());
                }
                Err(err) if err.error.kind() == ErrorKind::AlreadyExists && attempt < 1_000 => {
                    temp = err.file;
                    attempt += 1;
                }
                Err(err) => return Err(persistence(&format!("persist {}", path.display()), err.error)),
            }
        }
    }

    fn load(&self, location: &str) -> Result<BundleDocument> {
        let raw = fs::read_to_string(location).map_err(|err| persistence(location, err))?;
        BundleDocument::parse(&raw)
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(persistence(&self.dir.display().to_string(), err)),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| persistence("read dir", err))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path.display().to_string());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Keeps rendered JSON in memory; used by tests and dry runs.
#[derive(Default)]
pub struct InMemoryStore {
    kv: RwLock<BTreeMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.kv.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.kv.read().is_empty()
    }
}

impl BundleStore for InMemoryStore {
    fn save(&self, key: &BundleKey, document: &BundleDocument) -> Result<String> {
        let json = document.to_json()?;
        let mut kv = self.kv.write();
        let stem = key.file_stem();
        let mut location = format!("memory://{stem}.json");
        let mut attempt = 0u32;
        while kv.contains_key(&location) {
            attempt += 1;
            location = format!("memory://{stem}-{attempt}.json");
        }
        kv.insert(location.clone(), json);
        Ok(location)
    }

    fn load(&self, location: &str) -> Result<BundleDocument> {
        let kv = self.kv.read();
        let raw = kv
            .get(location)
            .ok_or_else(|| BundleError::Persistence(format!("no bundle at {location}")))?;
        BundleDocument::parse(raw)
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.kv.read().keys().cloned().collect())
    }
}
