mod common;

use bagrecords::{DecodeError, Error, MalformedPolicy, Reader, ReaderConfig, ReaderState, StaticRegistry};
use common::{cdr_string, BagWriter, Cdr, STRING_TYPE};
use tempfile::tempdir;

fn bag_with(path: &std::path::Path, extra: impl FnOnce(&BagWriter, i64)) {
    let bag = BagWriter::create(path);
    let topic = bag.add_topic("test", STRING_TYPE);
    bag.write(topic, 1, &cdr_string("Hello World!"));
    extra(&bag, topic);
    bag.write(topic, 9, &cdr_string("Goodbye World!"));
}

#[test]
fn open_rejects_missing_path() {
    let dir = tempdir().expect("tempdir");
    let err = Reader::open(dir.path().join("absent.db3"), "sqlite3", "cdr", StaticRegistry::new())
        .unwrap_err();
    assert!(matches!(err, Error::ContainerOpen { .. }));
}

#[test]
fn open_rejects_non_database_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("notes.db3");
    std::fs::write(&path, "just some text, not a bag").expect("write");
    let err = Reader::open(&path, "sqlite3", "cdr", StaticRegistry::new()).unwrap_err();
    assert!(matches!(err, Error::ContainerOpen { .. }));
}

#[test]
fn open_rejects_unknown_identifiers() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bag_0.db3");
    bag_with(&path, |_, _| {});

    for (storage, serialization) in [("mcap", "cdr"), ("sqlite3", "ros1"), ("", "")] {
        let err = Reader::open(&path, storage, serialization, StaticRegistry::new()).unwrap_err();
        assert!(matches!(err, Error::ContainerOpen { .. }), "{storage}/{serialization}");
    }
    assert!(Reader::open(&path, "SQLITE3", " cdr ", StaticRegistry::new()).is_ok());
}

#[test]
fn open_rejects_topics_in_other_serialization() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bag_0.db3");
    let bag = BagWriter::create(&path);
    bag.add_topic_with_format("/json", "std_msgs/msg/String", "json");
    drop(bag);

    let err = Reader::open(&path, "sqlite3", "cdr", StaticRegistry::with_builtins()).unwrap_err();
    assert!(matches!(err, Error::ContainerOpen { .. }));
}

#[test]
fn iteration_after_close_fails() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bag_0.db3");
    bag_with(&path, |_, _| {});

    let reader = Reader::open(&path, "sqlite3", "cdr", StaticRegistry::with_builtins()).expect("open");
    assert_eq!(reader.state(), ReaderState::Open);
    reader.close().expect("close");
    assert_eq!(reader.state(), ReaderState::Closed);
    assert!(matches!(reader.records(), Err(Error::ReaderClosed)));
    assert!(reader.close().is_ok());
    assert_eq!(reader.topics().len(), 1);
}

#[test]
fn overlapping_cursors_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bag_0.db3");
    bag_with(&path, |_, _| {});

    let reader = Reader::open(&path, "sqlite3", "cdr", StaticRegistry::with_builtins()).expect("open");
    let mut active = reader.records().expect("cursor");
    assert!(active.next().is_some());
    assert!(matches!(reader.records(), Err(Error::ConcurrentAccess)));
    assert!(active.next().is_some());
    drop(active);
    assert_eq!(reader.records().expect("cursor").count(), 2);
}

#[test]
fn overlapping_cursors_across_threads() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bag_0.db3");
    bag_with(&path, |_, _| {});

    let reader = Reader::open(&path, "sqlite3", "cdr", StaticRegistry::with_builtins()).expect("open");
    let held = reader.records().expect("cursor");
    std::thread::scope(|scope| {
        let result = scope.spawn(|| reader.records().map(|_| ())).join().expect("join");
        assert!(matches!(result, Err(Error::ConcurrentAccess)));
    });
    drop(held);
}

#[test]
fn malformed_payload_reports_location() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bag_0.db3");
    bag_with(&path, |bag, topic| {
        let trailing = Cdr::new().string("ok").u32(0xdead_beef).finish();
        bag.write(topic, 5, &trailing);
    });

    let reader = Reader::open(&path, "sqlite3", "cdr", StaticRegistry::with_builtins()).expect("open");
    let mut cursor = reader.records().expect("cursor");
    assert!(cursor.next().expect("first").is_ok());
    match cursor.next() {
        Some(Err(Error::MalformedPayload { topic, time_ns, source })) => {
            assert_eq!(topic, "test");
            assert_eq!(time_ns, 5);
            assert!(matches!(source, DecodeError::TrailingBytes { .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(cursor.next().is_none());
}

#[test]
fn malformed_payload_can_be_skipped() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bag_0.db3");
    bag_with(&path, |bag, topic| bag.write(topic, 5, &[0x00, 0x01]));

    let config = ReaderConfig::default().with_malformed_policy(MalformedPolicy::Skip);
    let reader = Reader::open_with_config(&path, config, StaticRegistry::with_builtins()).expect("open");
    let times: Vec<i64> = reader
        .records()
        .expect("cursor")
        .map(|r| r.expect("record").time_ns())
        .collect();
    assert_eq!(times, [1, 9]);
}

#[test]
fn unknown_type_is_surfaced() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bag_0.db3");
    let bag = BagWriter::create(&path);
    let topic = bag.add_topic("/pose", "geometry_msgs/msg/Pose");
    bag.write(topic, 1, &Cdr::new().f64(1.0).finish());
    drop(bag);

    let reader = Reader::open(&path, "sqlite3", "cdr", StaticRegistry::with_builtins()).expect("open");
    let result: Vec<_> = reader.records().expect("cursor").collect();
    assert_eq!(result.len(), 1);
    assert!(matches!(&result[0], Err(Error::UnknownType { type_name }) if type_name == "geometry_msgs/msg/Pose"));
}

#[test]
fn entry_with_unregistered_topic_aborts() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bag_0.db3");
    bag_with(&path, |bag, _| bag.write(42, 3, &cdr_string("orphan")));

    let reader = Reader::open(&path, "sqlite3", "cdr", StaticRegistry::with_builtins()).expect("open");
    let result: Vec<_> = reader.records().expect("cursor").collect();
    assert_eq!(result.len(), 2);
    assert!(result[0].is_ok());
    assert!(matches!(&result[1], Err(Error::UnknownTopic { .. })));
}
