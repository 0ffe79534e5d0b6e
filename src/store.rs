//! Persistence of rendered letters: a minimal document store interface, two
//! stores, and a persister that renders and submits documents in batches.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::address::Address;
use crate::engine::RenderingEngine;
use crate::model::standard_letter;
use crate::qr::QrPayload;
use crate::{Error, Result};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// A rendered PDF tied to the person it was created for.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub owner_id: u64,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of `pdf`.
    pub sha256: String,
    #[serde(skip)]
    pub pdf: Vec<u8>,
}

impl std::fmt::Debug for StoredDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredDocument")
            .field("owner_id", &self.owner_id)
            .field("filename", &self.filename)
            .field("created_at", &self.created_at)
            .field("bytes", &self.pdf.len())
            .finish()
    }
}

impl StoredDocument {
    pub fn new(owner_id: u64, owner_name: &str, pdf: Vec<u8>) -> Self {
        let last_name = owner_name.split_whitespace().last().unwrap_or("document");
        Self {
            owner_id,
            filename: format!("{last_name}_{owner_id}.pdf"),
            created_at: Utc::now(),
            sha256: hex_digest(&pdf),
            pdf,
        }
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut s = String::with_capacity(64);
    for b in digest {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

pub trait DocumentStore {
    /// Store every document of `batch` or none; returns the assigned ids.
    fn save_batch(&mut self, batch: &[StoredDocument]) -> Result<Vec<u64>>;

    fn count(&self) -> Result<usize>;

    fn find_by_id(&self, id: u64) -> Result<Option<StoredDocument>>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: Vec<StoredDocument>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryStore {
    fn save_batch(&mut self, batch: &[StoredDocument]) -> Result<Vec<u64>> {
        let first = self.documents.len() as u64 + 1;
        self.documents.extend_from_slice(batch);
        Ok((first..first + batch.len() as u64).collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.documents.len())
    }

    fn find_by_id(&self, id: u64) -> Result<Option<StoredDocument>> {
        Ok(id
            .checked_sub(1)
            .and_then(|idx| self.documents.get(idx as usize))
            .cloned())
    }
}

/// One `<id>.pdf` plus `<id>.json` metadata file per document.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    next_id: u64,
}

impl DirectoryStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let last = Self::ids(&root)?.into_iter().max().unwrap_or(0);
        Ok(Self {
            root,
            next_id: last + 1,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ids(root: &Path) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pdf") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn pdf_path(&self, id: u64) -> PathBuf {
        self.root.join(format!("{id:08}.pdf"))
    }

    fn meta_path(&self, id: u64) -> PathBuf {
        self.root.join(format!("{id:08}.json"))
    }
}

impl DocumentStore for DirectoryStore {
    fn save_batch(&mut self, batch: &[StoredDocument]) -> Result<Vec<u64>> {
        let first = self.next_id;
        let mut written = Vec::with_capacity(batch.len());
        for (offset, doc) in batch.iter().enumerate() {
            let id = first + offset as u64;
            let result = fs::write(self.pdf_path(id), &doc.pdf)
                .and_then(|_| {
                    let meta = serde_json::to_vec_pretty(doc)?;
                    fs::write(self.meta_path(id), meta)
                });
            if let Err(err) = result {
                for id in written {
                    let _ = fs::remove_file(self.pdf_path(id));
                    let _ = fs::remove_file(self.meta_path(id));
                }
                let _ = fs::remove_file(self.pdf_path(id));
                return Err(err.into());
            }
            written.push(id);
        }
        self.next_id = first + batch.len() as u64;
        debug!(first, count = batch.len(), root = %self.root.display(), "batch written");
        Ok(written)
    }

    fn count(&self) -> Result<usize> {
        Ok(Self::ids(&self.root)?.len())
    }

    fn find_by_id(&self, id: u64) -> Result<Option<StoredDocument>> {
        let pdf_path = self.pdf_path(id);
        if !pdf_path.is_file() {
            return Ok(None);
        }
        let mut doc: StoredDocument = serde_json::from_slice(&fs::read(self.meta_path(id))?)?;
        doc.pdf = fs::read(pdf_path)?;
        Ok(Some(doc))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub documents: usize,
    pub batches: usize,
    pub bytes: u64,
}

/// Renders letters with one engine and submits them to a store in batches.
pub struct BatchPersister<'e, S> {
    engine: &'e dyn RenderingEngine,
    store: S,
    batch_size: usize,
}

impl<'e, S: DocumentStore> BatchPersister<'e, S> {
    pub fn new(engine: &'e dyn RenderingEngine, store: S) -> Self {
        Self {
            engine,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Render and store one document per address starting at `start`.
    ///
    /// Owner ids are 1-based address positions. If the store rejects a batch
    /// the error carries the already rendered documents and the index of the
    /// first of them, so the caller can [`retry`](Self::retry) and continue
    /// from `resume_at + pending.len()`.
    pub fn persist(
        &mut self,
        addresses: &[Address],
        start: usize,
        qr: Option<&QrPayload>,
    ) -> Result<PersistSummary> {
        let repr = self.engine.image_repr();
        let mut summary = PersistSummary::default();
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut batch_start = start;

        for (i, address) in addresses.iter().enumerate().skip(start) {
            let model = standard_letter(address, qr, repr);
            let pdf = self
                .engine
                .render(&model)
                .map_err(|source| Error::EngineRunFailed {
                    engine: self.engine.name().to_string(),
                    document: i,
                    source: Box::new(source),
                })?;
            summary.bytes += pdf.len() as u64;
            batch.push(StoredDocument::new(i as u64 + 1, &address.recipient_name, pdf));

            if batch.len() >= self.batch_size {
                self.flush(&mut batch, batch_start, &mut summary)?;
                batch_start = i + 1;
            }
        }
        if !batch.is_empty() {
            self.flush(&mut batch, batch_start, &mut summary)?;
        }
        info!(
            engine = self.engine.name(),
            documents = summary.documents,
            batches = summary.batches,
            "documents persisted"
        );
        Ok(summary)
    }

    fn flush(
        &mut self,
        batch: &mut Vec<StoredDocument>,
        batch_start: usize,
        summary: &mut PersistSummary,
    ) -> Result<()> {
        if let Err(err) = self.store.save_batch(batch) {
            return Err(Error::Persistence {
                reason: err.to_string(),
                resume_at: batch_start,
                pending: std::mem::take(batch),
            });
        }
        summary.documents += batch.len();
        summary.batches += 1;
        batch.clear();
        Ok(())
    }

    /// Submit documents returned by a failed [`persist`](Self::persist) without re-rendering.
    pub fn retry(&mut self, pending: Vec<StoredDocument>) -> Result<Vec<u64>> {
        self.store.save_batch(&pending)
    }
}
