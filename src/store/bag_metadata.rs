//! `metadata.yaml` of a rosbag2 bag directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::catalog::TopicDescriptor;
use crate::{Error, Result};

pub const METADATA_FILE: &str = "metadata.yaml";

#[derive(Debug, Deserialize)]
struct MetadataFile {
    rosbag2_bagfile_information: BagInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BagInfo {
    #[serde(default)]
    pub version: u32,
    pub storage_identifier: String,
    #[serde(default)]
    pub relative_file_paths: Vec<String>,
    #[serde(default)]
    pub compression_format: String,
    #[serde(default)]
    pub compression_mode: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub topics_with_message_count: Vec<TopicWithCount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicWithCount {
    pub topic_metadata: TopicEntry,
    #[serde(default)]
    pub message_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    /// Each message payload is an independent zstd frame.
    MessageZstd,
}

impl Compression {
    pub fn decompress(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data),
            Compression::MessageZstd => Ok(zstd::stream::decode_all(data.as_slice())?),
        }
    }
}

impl BagInfo {
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(METADATA_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Self::parse(&text)
            .map(Some)
            .map_err(|reason| Error::open(&path, reason))
    }

    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        serde_yaml::from_str::<MetadataFile>(text)
            .map(|file| file.rosbag2_bagfile_information)
            .map_err(|err| format!("invalid bag metadata: {err}"))
    }

    pub fn compression(&self) -> std::result::Result<Compression, String> {
        let mode = self.compression_mode.to_ascii_uppercase();
        let format = self.compression_format.to_ascii_lowercase();
        match (mode.as_str(), format.as_str()) {
            ("" | "NONE", _) => Ok(Compression::None),
            ("MESSAGE", "zstd") => Ok(Compression::MessageZstd),
            ("MESSAGE", other) => Err(format!("unsupported message compression {other:?}")),
            ("FILE", _) => Err("file-level compression is not supported".to_string()),
            (other, _) => Err(format!("unknown compression mode {other:?}")),
        }
    }

    pub fn files(&self, dir: &Path) -> Vec<PathBuf> {
        self.relative_file_paths.iter().map(|p| dir.join(p)).collect()
    }

    /// Differences between the recorded summary and the topics found in the
    /// storage files. Empty when they agree.
    pub fn discrepancies(&self, topics: &[TopicDescriptor]) -> Vec<String> {
        let mut found = Vec::new();
        for entry in &self.topics_with_message_count {
            let meta = &entry.topic_metadata;
            let Some(topic) = topics.iter().find(|t| t.name == meta.name) else {
                found.push(format!("topic {} listed in metadata but not stored", meta.name));
                continue;
            };
            if topic.type_name != meta.type_name {
                found.push(format!(
                    "topic {}: metadata type {}, stored type {}",
                    meta.name, meta.type_name, topic.type_name
                ));
            }
            if topic.message_count != entry.message_count {
                found.push(format!(
                    "topic {}: metadata count {}, stored count {}",
                    meta.name, entry.message_count, topic.message_count
                ));
            }
        }
        let stored: u64 = topics.iter().map(|t| t.message_count).sum();
        if !self.topics_with_message_count.is_empty() && stored != self.message_count {
            found.push(format!(
                "metadata message_count {}, stored {stored}",
                self.message_count
            ));
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
rosbag2_bagfile_information:
  version: 5
  storage_identifier: sqlite3
  duration:
    nanoseconds: 1000
  starting_time:
    nanoseconds_since_epoch: 1650000000000000000
  message_count: 2
  topics_with_message_count:
    - topic_metadata:
        name: test
        type: example_interfaces/msg/String
        serialization_format: cdr
        offered_qos_profiles: ""
      message_count: 2
  compression_format: ""
  compression_mode: ""
  relative_file_paths:
    - bag_test_0.db3
"#;

    #[test]
    fn parses_rosbag2_metadata() {
        let info = BagInfo::parse(SAMPLE).unwrap();
        assert_eq!(info.version, 5);
        assert_eq!(info.storage_identifier, "sqlite3");
        assert_eq!(info.message_count, 2);
        assert_eq!(info.topics_with_message_count[0].topic_metadata.name, "test");
        assert_eq!(
            info.topics_with_message_count[0].topic_metadata.type_name,
            "example_interfaces/msg/String"
        );
        assert_eq!(info.compression().unwrap(), Compression::None);
        assert_eq!(
            info.files(Path::new("/bags/run")),
            vec![PathBuf::from("/bags/run/bag_test_0.db3")]
        );
    }

    #[test]
    fn compression_modes() {
        let mut info = BagInfo::parse(SAMPLE).unwrap();
        info.compression_mode = "MESSAGE".into();
        info.compression_format = "zstd".into();
        assert_eq!(info.compression().unwrap(), Compression::MessageZstd);
        info.compression_mode = "FILE".into();
        assert!(info.compression().is_err());
    }

    #[test]
    fn message_zstd_round_trips() {
        let packed = zstd::stream::encode_all(&b"payload"[..], 3).unwrap();
        let plain = Compression::MessageZstd.decompress(packed).unwrap();
        assert_eq!(plain, b"payload");
    }

    #[test]
    fn discrepancies_against_stored_topics() {
        let info = BagInfo::parse(SAMPLE).unwrap();
        let matching = TopicDescriptor {
            message_count: 2,
            ..TopicDescriptor::new("test", "example_interfaces/msg/String", "cdr")
        };
        assert!(info.discrepancies(&[matching.clone()]).is_empty());

        let short = TopicDescriptor {
            message_count: 1,
            ..matching.clone()
        };
        let found = info.discrepancies(&[short]);
        assert_eq!(found.len(), 2);
        assert!(found[0].contains("metadata count 2, stored count 1"));

        let retyped = TopicDescriptor {
            type_name: "std_msgs/msg/String".into(),
            ..matching
        };
        assert_eq!(info.discrepancies(&[retyped]).len(), 1);
        assert_eq!(info.discrepancies(&[]).len(), 2);
    }

    #[test]
    fn rejects_garbage() {
        assert!(BagInfo::parse("not: [valid").is_err());
        assert!(BagInfo::parse("other_key: 1").is_err());
    }
}
