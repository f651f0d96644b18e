//! Reader facade.
//!
//! A [`Reader`] owns one Container Store handle, the topic catalog built when
//! it was opened, a schema registry and the payload decoder selected by its
//! serialization format. [`Reader::records`] hands out a lazy, single-pass
//! cursor; only one cursor may be live per reader at a time.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

use crate::catalog::TopicCatalog;
use crate::config::{MalformedPolicy, ReaderConfig};
use crate::decode::{decoder_for, PayloadDecoder};
use crate::filter::RecordFilter;
use crate::record::Record;
use crate::schema::{FieldLayout, SchemaRegistry};
use crate::store::{open_store, ContainerStore};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Open,
    Closed,
}

pub struct Reader {
    path: PathBuf,
    config: ReaderConfig,
    catalog: TopicCatalog,
    store: Mutex<Option<Box<dyn ContainerStore>>>,
    registry: Box<dyn SchemaRegistry>,
    decoder: Box<dyn PayloadDecoder>,
    layouts: Mutex<HashMap<String, Arc<FieldLayout>>>,
    cursor_active: AtomicBool,
}

impl Reader {
    /// Open the container at `path` with the given storage and serialization
    /// identifiers. Unknown identifiers fail as [`Error::ContainerOpen`].
    pub fn open<R>(
        path: impl AsRef<Path>,
        storage_id: &str,
        serialization_id: &str,
        registry: R,
    ) -> Result<Self>
    where
        R: SchemaRegistry + 'static,
    {
        let path = path.as_ref();
        let config = ReaderConfig::from_ids(storage_id, serialization_id)
            .map_err(|err| Error::open(path, err.to_string()))?;
        Self::open_with_config(path, config, registry)
    }

    pub fn open_with_config<R>(path: impl AsRef<Path>, config: ReaderConfig, registry: R) -> Result<Self>
    where
        R: SchemaRegistry + 'static,
    {
        let path = path.as_ref();
        let store = open_store(path, &config)?;
        Self::build(path.to_path_buf(), store, config, Box::new(registry))
    }

    /// Wrap an already opened store. `config.storage` is taken from the store.
    pub fn from_store<S, R>(store: S, mut config: ReaderConfig, registry: R) -> Result<Self>
    where
        S: ContainerStore + 'static,
        R: SchemaRegistry + 'static,
    {
        config.storage = store.storage_id();
        let path = PathBuf::from(config.storage.as_str());
        Self::build(path, Box::new(store), config, Box::new(registry))
    }

    fn build(
        path: PathBuf,
        mut store: Box<dyn ContainerStore>,
        config: ReaderConfig,
        registry: Box<dyn SchemaRegistry>,
    ) -> Result<Self> {
        let descriptors = store.metadata().map_err(|err| match err {
            err @ Error::ContainerOpen { .. } => err,
            other => Error::open(&path, format!("reading metadata: {other}")),
        })?;

        let expected = config.serialization.as_str();
        if let Some(mismatch) = descriptors
            .iter()
            .find(|d| !d.serialization.eq_ignore_ascii_case(expected))
        {
            let reason = format!(
                "topic {} is serialized as {:?}, reader expects {expected:?}",
                mismatch.name, mismatch.serialization
            );
            if let Err(err) = store.close() {
                log::warn!("closing {} after failed open: {err}", path.display());
            }
            return Err(Error::open(&path, reason));
        }

        let catalog = TopicCatalog::new(descriptors);
        log::debug!(
            "reader open on {} ({}, {}): {} topic(s), {} message(s)",
            path.display(),
            config.storage,
            config.serialization,
            catalog.len(),
            catalog.message_count()
        );

        Ok(Self {
            path,
            decoder: decoder_for(config.serialization),
            config,
            catalog,
            store: Mutex::new(Some(store)),
            registry,
            layouts: Mutex::new(HashMap::new()),
            cursor_active: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    pub fn topics(&self) -> HashSet<&str> {
        self.catalog.topics()
    }

    pub fn type_map(&self) -> IndexMap<String, String> {
        self.catalog.type_map()
    }

    /// Total messages reported by container metadata.
    pub fn message_count(&self) -> u64 {
        self.catalog.message_count()
    }

    pub fn state(&self) -> ReaderState {
        if self.lock_store().is_some() {
            ReaderState::Open
        } else {
            ReaderState::Closed
        }
    }

    /// Every record in container order.
    pub fn records(&self) -> Result<Records<'_>> {
        self.records_filtered(RecordFilter::default())
    }

    /// Records passing `filter`, in container order.
    ///
    /// Rewinds the store cursor to the first entry. Fails with
    /// [`Error::ConcurrentAccess`] while another cursor from this reader is
    /// still alive.
    pub fn records_filtered(&self, filter: RecordFilter) -> Result<Records<'_>> {
        if self.state() == ReaderState::Closed {
            return Err(Error::ReaderClosed);
        }
        let guard = CursorGuard::acquire(&self.cursor_active)?;
        {
            let mut store = self.lock_store();
            let store = store.as_mut().ok_or(Error::ReaderClosed)?;
            store.rewind()?;
        }
        Ok(Records {
            reader: self,
            filter,
            guard: Some(guard),
        })
    }

    /// Release the store handle. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        let store = self.lock_store().take();
        match store {
            Some(mut store) => {
                log::debug!("closing reader on {}", self.path.display());
                store.close()
            }
            None => Ok(()),
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, Option<Box<dyn ContainerStore>>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn layout_for(&self, type_name: &str) -> Result<Arc<FieldLayout>> {
        let cached = self
            .layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned();
        if let Some(layout) = cached {
            return Ok(layout);
        }
        let layout = self.registry.resolve(type_name)?;
        log::debug!("resolved {type_name}: {} field(s)", layout.fields.len());
        self.layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_name.to_string(), Arc::clone(&layout));
        Ok(layout)
    }

    fn next_record(&self, filter: &RecordFilter) -> Result<Option<Record>> {
        loop {
            let entry = {
                let mut store = self.lock_store();
                let store = store.as_mut().ok_or(Error::ReaderClosed)?;
                store.next_entry()?
            };
            let Some(entry) = entry else {
                return Ok(None);
            };

            let type_name = self.catalog.type_of(&entry.topic_name)?;
            if !filter.matches(&entry.topic_name, entry.time_ns) {
                continue;
            }

            let layout = self.layout_for(type_name)?;
            let fields = self
                .decoder
                .decode(&entry.payload, &layout)
                .map_err(|source| Error::MalformedPayload {
                    topic: entry.topic_name.clone(),
                    time_ns: entry.time_ns,
                    source,
                })?;
            return Ok(Some(Record::new(
                entry.topic_name,
                type_name,
                entry.time_ns,
                fields,
            )));
        }
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("topics", &self.catalog.len())
            .field("state", &self.state())
            .finish()
    }
}

struct CursorGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CursorGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::ConcurrentAccess)?;
        Ok(Self { flag })
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Lazy cursor over a reader's records.
///
/// Yields `Err` at most once; iteration ends after the first error unless
/// the reader skips malformed payloads. Dropping the cursor early leaves the
/// remaining entries undecoded and frees the reader for a new cursor.
pub struct Records<'r> {
    reader: &'r Reader,
    filter: RecordFilter,
    guard: Option<CursorGuard<'r>>,
}

impl Records<'_> {
    pub fn filter(&self) -> &RecordFilter {
        &self.filter
    }

    fn finish(&mut self) {
        self.guard = None;
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.guard.as_ref()?;
        loop {
            match self.reader.next_record(&self.filter) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {
                    self.finish();
                    return None;
                }
                Err(err @ Error::MalformedPayload { .. })
                    if self.reader.config.on_malformed == MalformedPolicy::Skip =>
                {
                    log::warn!("skipping record: {err}");
                }
                Err(err) => {
                    self.finish();
                    return Some(Err(err));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for Records<'_> {}
