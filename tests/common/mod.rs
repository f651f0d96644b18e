#![allow(dead_code)]

use std::path::Path;

use rusqlite::{params, Connection};

const SCHEMA: &str = "
CREATE TABLE schema(schema_version INTEGER PRIMARY KEY, ros_distro TEXT NOT NULL);
CREATE TABLE metadata(id INTEGER PRIMARY KEY, metadata_version INTEGER NOT NULL, metadata TEXT NOT NULL);
CREATE TABLE topics(id INTEGER PRIMARY KEY, name TEXT NOT NULL, type TEXT NOT NULL,
    serialization_format TEXT NOT NULL, offered_qos_profiles TEXT NOT NULL);
CREATE TABLE messages(id INTEGER PRIMARY KEY, topic_id INTEGER NOT NULL,
    timestamp INTEGER NOT NULL, data BLOB NOT NULL);
CREATE INDEX timestamp_idx ON messages (timestamp ASC);
INSERT INTO schema VALUES (3, 'humble');
";

pub const STRING_TYPE: &str = "example_interfaces/msg/String";

/// Writes `.db3` files with the rosbag2 sqlite3 schema.
pub struct BagWriter {
    conn: Connection,
}

impl BagWriter {
    pub fn create(path: &Path) -> Self {
        let conn = Connection::open(path).expect("create db3");
        conn.execute_batch(SCHEMA).expect("schema");
        Self { conn }
    }

    pub fn add_topic(&self, name: &str, type_name: &str) -> i64 {
        self.add_topic_with_format(name, type_name, "cdr")
    }

    pub fn add_topic_with_format(&self, name: &str, type_name: &str, format: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO topics(name, type, serialization_format, offered_qos_profiles) VALUES (?1, ?2, ?3, '')",
                params![name, type_name, format],
            )
            .expect("insert topic");
        self.conn.last_insert_rowid()
    }

    pub fn write(&self, topic_id: i64, time_ns: i64, payload: &[u8]) {
        self.conn
            .execute(
                "INSERT INTO messages(topic_id, timestamp, data) VALUES (?1, ?2, ?3)",
                params![topic_id, time_ns, payload],
            )
            .expect("insert message");
    }
}

/// Little-endian CDR encoder covering what the fixtures need.
pub struct Cdr {
    buf: Vec<u8>,
}

impl Cdr {
    pub fn new() -> Self {
        Self {
            buf: vec![0x00, 0x01, 0x00, 0x00],
        }
    }

    fn align(&mut self, n: usize) {
        while (self.buf.len() - 4) % n != 0 {
            self.buf.push(0);
        }
    }

    pub fn bool(mut self, v: bool) -> Self {
        self.buf.push(v as u8);
        self
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.align(4);
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.align(4);
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i64(mut self, v: i64) -> Self {
        self.align(8);
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f64(mut self, v: f64) -> Self {
        self.align(8);
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn string(self, s: &str) -> Self {
        let mut this = self.u32(s.len() as u32 + 1);
        this.buf.extend_from_slice(s.as_bytes());
        this.buf.push(0);
        this
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub fn cdr_string(s: &str) -> Vec<u8> {
    Cdr::new().string(s).finish()
}

pub fn write_metadata(dir: &Path, files: &[&str], compression_mode: &str, compression_format: &str) {
    let mut yaml = String::from("rosbag2_bagfile_information:\n  version: 5\n  storage_identifier: sqlite3\n");
    yaml.push_str(&format!("  compression_mode: \"{compression_mode}\"\n"));
    yaml.push_str(&format!("  compression_format: \"{compression_format}\"\n"));
    yaml.push_str("  relative_file_paths:\n");
    for file in files {
        yaml.push_str(&format!("    - {file}\n"));
    }
    std::fs::write(dir.join("metadata.yaml"), yaml).expect("write metadata");
}
