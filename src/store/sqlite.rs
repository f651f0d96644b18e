//! rosbag2 sqlite3 storage.
//!
//! Reads the `topics` and `messages` tables written by the rosbag2 sqlite3
//! plugin. The path may be a single `.db3` file or a bag directory; for a
//! directory the files named in `metadata.yaml` are read in order as one
//! container. Messages are fetched in `messages.id` order, one bounded page
//! at a time.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};

use super::bag_metadata::{BagInfo, Compression};
use crate::catalog::TopicDescriptor;
use crate::config::StorageId;
use crate::store::{ContainerStore, RawEntry};
use crate::{Error, Result};

const DB3_EXTENSION: &str = "db3";

const SELECT_TOPICS: &str =
    "SELECT id, name, type, serialization_format FROM topics ORDER BY id";
const COUNT_MESSAGES: &str = "SELECT topic_id, COUNT(*) FROM messages GROUP BY topic_id";
const SELECT_PAGE: &str =
    "SELECT id, topic_id, timestamp, data FROM messages WHERE id > ?1 ORDER BY id LIMIT ?2";

struct BagFile {
    path: PathBuf,
    conn: Connection,
    topic_names: HashMap<i64, String>,
}

pub struct SqliteStore {
    root: PathBuf,
    files: Vec<BagFile>,
    topics: Vec<TopicDescriptor>,
    compression: Compression,
    page_size: usize,
    current: usize,
    last_id: i64,
    page: VecDeque<Result<RawEntry>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.exists() {
            return Err(Error::open(&root, "path does not exist"));
        }

        let (paths, compression, info) = if root.is_dir() {
            resolve_directory(&root)?
        } else {
            if root.extension().is_some_and(|ext| ext == "zstd") {
                return Err(Error::open(&root, "file-level compression is not supported"));
            }
            (vec![root.clone()], Compression::None, None)
        };
        if paths.is_empty() {
            return Err(Error::open(&root, "no storage files found"));
        }

        let mut files = Vec::with_capacity(paths.len());
        let mut topics: Vec<TopicDescriptor> = Vec::new();
        for path in paths {
            let (file, descriptors) = open_file(path)?;
            merge_topics(&mut topics, descriptors);
            files.push(file);
        }
        if let Some(info) = &info {
            log::debug!("{} written with bag format version {}", root.display(), info.version);
            for discrepancy in info.discrepancies(&topics) {
                log::warn!("{}: {discrepancy}", root.display());
            }
        }
        log::debug!(
            "opened {} ({} file(s), {} topic(s))",
            root.display(),
            files.len(),
            topics.len()
        );

        Ok(Self {
            root,
            files,
            topics,
            compression,
            page_size: page_size.max(1),
            current: 0,
            last_id: i64::MIN,
            page: VecDeque::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn file_paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    /// Pull the next page from the current file. Returns the number of rows read.
    fn fetch_page(&mut self) -> Result<usize> {
        let Some(file) = self.files.get(self.current) else {
            return Ok(0);
        };
        let mut stmt = file.conn.prepare_cached(SELECT_PAGE)?;
        let mut rows = stmt.query(params![self.last_id, self.page_size as i64])?;
        let mut fetched = 0;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let topic_id: i64 = row.get(1)?;
            let time_ns: i64 = row.get(2)?;
            let data: Vec<u8> = row.get(3)?;
            let entry = match file.topic_names.get(&topic_id) {
                Some(topic) => self.compression.decompress(data).map(|payload| RawEntry {
                    topic_name: topic.clone(),
                    payload,
                    time_ns,
                }),
                None => Err(Error::UnknownTopic {
                    topic: format!("topic_id {topic_id} (message {id} in {})", file.path.display()),
                }),
            };
            self.page.push_back(entry);
            self.last_id = id;
            fetched += 1;
        }
        log::trace!("fetched {fetched} entries from {}", file.path.display());
        Ok(fetched)
    }
}

impl ContainerStore for SqliteStore {
    fn storage_id(&self) -> StorageId {
        StorageId::Sqlite3
    }

    fn metadata(&self) -> Result<Vec<TopicDescriptor>> {
        Ok(self.topics.clone())
    }

    fn rewind(&mut self) -> Result<()> {
        if self.files.is_empty() {
            return Err(Error::ReaderClosed);
        }
        self.current = 0;
        self.last_id = i64::MIN;
        self.page.clear();
        log::debug!("rewound cursor on {}", self.root.display());
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<RawEntry>> {
        if self.files.is_empty() {
            return Err(Error::ReaderClosed);
        }
        loop {
            if let Some(entry) = self.page.pop_front() {
                return entry.map(Some);
            }
            if self.current >= self.files.len() {
                return Ok(None);
            }
            if self.fetch_page()? == 0 {
                self.current += 1;
                self.last_id = i64::MIN;
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.page.clear();
        for file in self.files.drain(..) {
            if let Err((_, err)) = file.conn.close() {
                log::warn!("closing {}: {err}", file.path.display());
            }
        }
        Ok(())
    }
}

fn resolve_directory(dir: &Path) -> Result<(Vec<PathBuf>, Compression, Option<BagInfo>)> {
    match BagInfo::load(dir)? {
        Some(info) => {
            if info.storage_identifier != StorageId::Sqlite3.as_str() {
                return Err(Error::open(
                    dir,
                    format!("bag uses storage {:?}", info.storage_identifier),
                ));
            }
            let compression = info.compression().map_err(|reason| Error::open(dir, reason))?;
            let mut files = info.files(dir);
            if files.is_empty() {
                files = scan_db3(dir)?;
            }
            Ok((files, compression, Some(info)))
        }
        None => Ok((scan_db3(dir)?, Compression::None, None)),
    }
}

fn scan_db3(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == DB3_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

fn open_file(path: PathBuf) -> Result<(BagFile, Vec<TopicDescriptor>)> {
    let conn = Connection::open_with_flags(
        &path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| Error::open(&path, err.to_string()))?;

    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('topics', 'messages')",
            [],
            |row| row.get(0),
        )
        .map_err(|err| Error::open(&path, err.to_string()))?;
    if tables != 2 {
        return Err(Error::open(&path, "missing rosbag2 topics/messages tables"));
    }

    let (descriptors, topic_names) =
        load_topics(&conn).map_err(|err| Error::open(&path, format!("corrupt metadata: {err}")))?;
    Ok((
        BagFile {
            path,
            conn,
            topic_names,
        },
        descriptors,
    ))
}

fn load_topics(
    conn: &Connection,
) -> std::result::Result<(Vec<TopicDescriptor>, HashMap<i64, String>), rusqlite::Error> {
    let mut counts: HashMap<i64, u64> = HashMap::new();
    let mut stmt = conn.prepare(COUNT_MESSAGES)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (topic_id, count) = row?;
        counts.insert(topic_id, count.max(0) as u64);
    }

    let mut descriptors = Vec::new();
    let mut names = HashMap::new();
    let mut stmt = conn.prepare(SELECT_TOPICS)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    for row in rows {
        let (id, name, type_name, serialization) = row?;
        names.insert(id, name.clone());
        descriptors.push(TopicDescriptor {
            message_count: counts.get(&id).copied().unwrap_or(0),
            ..TopicDescriptor::new(name, type_name, serialization)
        });
    }
    Ok((descriptors, names))
}

/// Fold the topics of a later split file into those already seen.
fn merge_topics(topics: &mut Vec<TopicDescriptor>, incoming: Vec<TopicDescriptor>) {
    for descriptor in incoming {
        match topics.iter_mut().find(|t| t.name == descriptor.name) {
            Some(existing) => {
                if existing.type_name != descriptor.type_name {
                    log::warn!(
                        "topic {} recorded as {} and {}, keeping {}",
                        descriptor.name,
                        existing.type_name,
                        descriptor.type_name,
                        existing.type_name
                    );
                }
                existing.message_count += descriptor.message_count;
            }
            None => topics.push(descriptor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_bag(path: &Path, messages: &[(i64, i64, &str)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE topics(id INTEGER PRIMARY KEY, name TEXT NOT NULL, type TEXT NOT NULL,
                 serialization_format TEXT NOT NULL, offered_qos_profiles TEXT NOT NULL);
             CREATE TABLE messages(id INTEGER PRIMARY KEY, topic_id INTEGER NOT NULL,
                 timestamp INTEGER NOT NULL, data BLOB NOT NULL);
             INSERT INTO topics VALUES (1, '/a', 'pkg/msg/A', 'cdr', '');
             INSERT INTO topics VALUES (2, '/b', 'pkg/msg/B', 'cdr', '');",
        )
        .unwrap();
        for (topic_id, ts, data) in messages {
            conn.execute(
                "INSERT INTO messages(topic_id, timestamp, data) VALUES (?1, ?2, ?3)",
                params![topic_id, ts, data.as_bytes()],
            )
            .unwrap();
        }
    }

    #[test]
    fn pages_through_messages_in_id_order() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bag_0.db3");
        create_bag(&path, &[(1, 30, "x"), (2, 10, "y"), (1, 20, "z")]);

        let mut store = SqliteStore::open(&path, 2).unwrap();
        let meta = store.metadata().unwrap();
        assert_eq!(meta.len(), 2);
        assert_eq!(meta[0].message_count, 2);
        assert_eq!(meta[1].message_count, 1);

        let mut seen = Vec::new();
        while let Some(entry) = store.next_entry().unwrap() {
            seen.push((entry.topic_name, entry.time_ns));
        }
        assert_eq!(
            seen,
            vec![("/a".to_string(), 30), ("/b".to_string(), 10), ("/a".to_string(), 20)]
        );

        store.rewind().unwrap();
        assert_eq!(store.next_entry().unwrap().unwrap().time_ns, 30);
    }

    #[test]
    fn message_with_unregistered_topic_id_is_an_error_in_place() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bag_0.db3");
        create_bag(&path, &[(1, 1, "ok"), (9, 2, "bad")]);

        let mut store = SqliteStore::open(&path, 16).unwrap();
        assert!(store.next_entry().unwrap().is_some());
        assert!(matches!(store.next_entry(), Err(Error::UnknownTopic { .. })));
    }

    #[test]
    fn rejects_missing_and_foreign_files() {
        let dir = tempdir().expect("tempdir");
        assert!(matches!(
            SqliteStore::open(dir.path().join("nope.db3"), 16),
            Err(Error::ContainerOpen { .. })
        ));

        let junk = dir.path().join("junk.db3");
        std::fs::write(&junk, b"definitely not sqlite").unwrap();
        assert!(matches!(
            SqliteStore::open(&junk, 16),
            Err(Error::ContainerOpen { .. })
        ));

        let empty = dir.path().join("empty.db3");
        Connection::open(&empty)
            .unwrap()
            .execute_batch("CREATE TABLE other(x INTEGER);")
            .unwrap();
        assert!(matches!(
            SqliteStore::open(&empty, 16),
            Err(Error::ContainerOpen { .. })
        ));
    }

    #[test]
    fn closed_store_refuses_cursor_calls() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bag_0.db3");
        create_bag(&path, &[(1, 1, "ok")]);
        let mut store = SqliteStore::open(&path, 16).unwrap();
        store.close().unwrap();
        assert!(matches!(store.next_entry(), Err(Error::ReaderClosed)));
    }
}
