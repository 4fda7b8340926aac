//! Source archives
//!
//! An archive yields the entries of one module. Reading concrete container
//! formats happens elsewhere; adapters present them through [`Archive`].
//! [`ingest`] fills a pool from a set of archives and closes every one of
//! them on every exit path.

use crate::error::{ImageError, Result};
use crate::pool::{ContentOpener, ResourceEntry, ResourceKind, ResourcePool};
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use tracing::{debug, info};

/// One entry yielded by an archive
#[derive(Clone)]
pub struct ArchiveEntry {
    /// Name relative to the module root, `/`-separated
    pub name: String,
    pub kind: ResourceKind,
    pub size: u64,
    pub open: ContentOpener,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, kind: ResourceKind, size: u64, open: ContentOpener) -> Self {
        ArchiveEntry {
            name: name.into(),
            kind,
            size,
            open,
        }
    }

    /// Entry over bytes already in memory
    pub fn from_bytes(name: impl Into<String>, kind: ResourceKind, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Arc<[u8]> = Arc::from(bytes.into());
        let size = bytes.len() as u64;
        let open: ContentOpener = Arc::new(move || -> io::Result<Box<dyn Read + Send>> {
            Ok(Box::new(Cursor::new(Arc::clone(&bytes))))
        });
        Self::new(name, kind, size, open)
    }

    /// Pool entry for this archive entry in `module`
    pub fn into_resource(self, module: &str) -> ResourceEntry {
        let path = format!("/{}/{}", module, self.name.trim_start_matches('/'));
        ResourceEntry::from_stream(module, path, self.kind, self.size, self.open)
    }
}

impl std::fmt::Debug for ArchiveEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .finish()
    }
}

/// The content source of one module
pub trait Archive {
    fn module_name(&self) -> &str;

    /// Prepare the archive for reading
    fn open(&mut self) -> io::Result<()>;

    fn entries(&mut self) -> io::Result<Vec<ArchiveEntry>>;

    /// Release the archive. Called exactly once per ingested archive.
    fn close(&mut self) -> io::Result<()>;
}

/// Archive over entries held in memory
#[derive(Debug, Clone)]
pub struct InMemoryArchive {
    module: String,
    entries: Vec<ArchiveEntry>,
    open: bool,
}

impl InMemoryArchive {
    pub fn new(module: impl Into<String>) -> Self {
        InMemoryArchive {
            module: module.into(),
            entries: Vec::new(),
            open: false,
        }
    }

    pub fn with_entry(mut self, name: impl Into<String>, kind: ResourceKind, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.push(ArchiveEntry::from_bytes(name, kind, bytes));
        self
    }

    pub fn push(&mut self, entry: ArchiveEntry) {
        self.entries.push(entry);
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Archive for InMemoryArchive {
    fn module_name(&self) -> &str {
        &self.module
    }

    fn open(&mut self) -> io::Result<()> {
        self.open = true;
        Ok(())
    }

    fn entries(&mut self) -> io::Result<Vec<ArchiveEntry>> {
        if !self.open {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("archive {} is not open", self.module),
            ));
        }
        Ok(self.entries.clone())
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        Ok(())
    }
}

fn ingest_one(pool: &mut ResourcePool, archive: &mut dyn Archive) -> Result<usize> {
    archive.open()?;
    let module = archive.module_name().to_string();
    let entries = archive.entries()?;
    let count = entries.len();
    for entry in entries {
        pool.add(entry.into_resource(&module))?;
    }
    debug!("ingested {} entries from module {}", count, module);
    Ok(count)
}

/// Add every entry of every archive to `pool`.
///
/// Ingestion stops at the first failure, but all archives are closed either
/// way. Close failures after success become one `Io` error carrying the rest
/// as suppressed errors; after a failure they are attached to that failure.
pub fn ingest(pool: &mut ResourcePool, archives: &mut [Box<dyn Archive>]) -> Result<usize> {
    let mut result = Ok(0);
    for archive in archives.iter_mut() {
        match ingest_one(pool, archive.as_mut()) {
            Ok(count) => {
                if let Ok(total) = &mut result {
                    *total += count;
                }
            }
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }

    let close_failures: Vec<io::Error> = archives
        .iter_mut()
        .filter_map(|archive| archive.close().err())
        .collect();

    match result {
        Ok(total) => match ImageError::from_io_failures(close_failures) {
            Some(err) => Err(err),
            None => {
                info!("ingested {} entries from {} archives", total, archives.len());
                Ok(total)
            }
        },
        Err(err) => Err(err.with_suppressed(close_failures)),
    }
}
