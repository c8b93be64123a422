use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::Annotation;
use crate::error::AnnotationError;
use crate::session::AnnotationSession;
use crate::store::PageAnnotationSet;
use crate::{DocumentId, DocumentInfo};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Live commands of one document, ordered by page then z-order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSnapshot {
    pub version: u32,
    pub commands: Vec<Annotation>,
}

impl AnnotationSnapshot {
    pub fn capture(annotations: &PageAnnotationSet) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            commands: annotations.iter().cloned().collect(),
        }
    }
}

pub trait AnnotationStore: Send + Sync {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<AnnotationSnapshot>>;
    fn save(&self, doc: &DocumentInfo, snapshot: &AnnotationSnapshot) -> Result<()>;
}

/// One JSON file per document, named after its id.
pub struct FileAnnotationStore {
    root: PathBuf,
}

impl FileAnnotationStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create annotation directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn snapshot_path(&self, doc: &DocumentInfo) -> PathBuf {
        self.root.join(format!("{}.json", doc.id))
    }
}

impl AnnotationStore for FileAnnotationStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<AnnotationSnapshot>> {
        let path = self.snapshot_path(doc);
        if !path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&path)
            .with_context(|| format!("failed to open annotation file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let snapshot: AnnotationSnapshot = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode annotation file {:?}", path))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(AnnotationError::UnsupportedVersion(snapshot.version).into());
        }
        Ok(Some(snapshot))
    }

    fn save(&self, doc: &DocumentInfo, snapshot: &AnnotationSnapshot) -> Result<()> {
        let path = self.snapshot_path(doc);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(snapshot)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp annotation file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, &path)?;
        debug!(path = %path.display(), commands = snapshot.commands.len(), "annotations saved");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAnnotationStore {
    inner: Mutex<HashMap<DocumentId, AnnotationSnapshot>>,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<AnnotationSnapshot>> {
        Ok(self.inner.lock().get(&doc.id).cloned())
    }

    fn save(&self, doc: &DocumentInfo, snapshot: &AnnotationSnapshot) -> Result<()> {
        self.inner.lock().insert(doc.id, snapshot.clone());
        Ok(())
    }
}

/// Loads saved annotations into `session`. Commands for pages the document no longer
/// has are dropped.
pub fn restore_session(
    store: &dyn AnnotationStore,
    doc: &DocumentInfo,
    session: &mut AnnotationSession,
) -> Result<usize> {
    let Some(snapshot) = store.load(doc)? else {
        return Ok(0);
    };
    let (valid, dropped): (Vec<_>, Vec<_>) = snapshot
        .commands
        .into_iter()
        .partition(|annotation| session.contains_page(annotation.page()));
    for annotation in &dropped {
        warn!(
            page = annotation.page(),
            id = %annotation.id,
            "dropping saved annotation outside the document"
        );
    }
    let restored = session.restore(valid)?;
    Ok(restored)
}

pub fn persist_session(
    store: &dyn AnnotationStore,
    doc: &DocumentInfo,
    session: &AnnotationSession,
) -> Result<()> {
    store.save(doc, &AnnotationSnapshot::capture(session.annotations()))
}
