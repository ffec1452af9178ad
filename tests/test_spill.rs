use std::io::Write;

use serde::{Deserialize, Serialize};

use gooze::spill::Spill;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Record {
    name: String,
    value: u64,
}

fn record(name: &str, value: u64) -> Record {
    Record {
        name: name.to_string(),
        value,
    }
}

#[test]
fn append_assigns_dense_indices() {
    let dir = tempfile::tempdir().unwrap();
    let mut spill = Spill::create(dir.path().join("data.spill")).unwrap();

    assert_eq!(spill.append(&record("a", 1)).unwrap(), 0);
    assert_eq!(spill.append(&record("b", 2)).unwrap(), 1);
    assert_eq!(spill.append(&record("c", 3)).unwrap(), 2);
    assert_eq!(spill.len(), 3);
}

#[test]
fn get_reads_back_by_index() {
    let dir = tempfile::tempdir().unwrap();
    let mut spill = Spill::create(dir.path().join("data.spill")).unwrap();
    spill.append(&record("a", 1)).unwrap();
    spill.append(&record("b", 2)).unwrap();

    assert_eq!(spill.get(0).unwrap(), record("a", 1));
    assert_eq!(spill.get(1).unwrap(), record("b", 2));
}

#[test]
fn get_out_of_bounds_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut spill = Spill::create(dir.path().join("data.spill")).unwrap();
    spill.append(&record("a", 1)).unwrap();

    assert!(spill.get(1).is_err());
    assert!(spill.get(100).is_err());
}

#[test]
fn range_iterates_in_insertion_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut spill = Spill::create(dir.path().join("data.spill")).unwrap();
    let items = vec![record("x", 10), record("y", 20), record("z", 30)];
    spill.append_batch(&items).unwrap();

    let mut seen = Vec::new();
    spill
        .range(|index, item: Record| {
            seen.push((index, item));
            Ok(())
        })
        .unwrap();

    assert_eq!(seen.len(), 3);
    for (i, (index, item)) in seen.iter().enumerate() {
        assert_eq!(*index, i as u64);
        assert_eq!(*item, items[i]);
    }
}

#[test]
fn reopen_recovers_all_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.spill");

    {
        let mut spill = Spill::create(&path).unwrap();
        spill.append(&record("a", 1)).unwrap();
        spill.append(&record("b", 2)).unwrap();
        spill.close().unwrap();
    }

    let spill: Spill<Record> = Spill::open(&path).unwrap();
    assert_eq!(spill.len(), 2);
    assert_eq!(spill.get(1).unwrap(), record("b", 2));
}

#[test]
fn reopen_ignores_truncated_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.spill");

    {
        let mut spill = Spill::create(&path).unwrap();
        spill.append(&record("a", 1)).unwrap();
        spill.close().unwrap();
    }

    // Simulate a crash mid-append: a frame header promising more payload
    // than was written.
    {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        file.write_all(&64u32.to_le_bytes()).unwrap();
        file.write_all(&1u16.to_le_bytes()).unwrap();
        file.write_all(b"partial").unwrap();
    }

    let mut spill: Spill<Record> = Spill::open(&path).unwrap();
    assert_eq!(spill.len(), 1);
    assert_eq!(spill.get(0).unwrap(), record("a", 1));

    // Appending after recovery overwrites the junk tail.
    spill.append(&record("b", 2)).unwrap();
    assert_eq!(spill.get(1).unwrap(), record("b", 2));
}

#[test]
fn unknown_schema_tag_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.spill");

    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&2u32.to_le_bytes()).unwrap();
        file.write_all(&9u16.to_le_bytes()).unwrap();
        file.write_all(b"xx").unwrap();
    }

    assert!(Spill::<Record>::open(&path).is_err());
}

#[test]
fn byte_offsets_are_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let mut spill = Spill::create(dir.path().join("data.spill")).unwrap();
    spill.append(&record("a", 1)).unwrap();
    spill.append(&record("bb", 2)).unwrap();
    spill.append(&record("ccc", 3)).unwrap();

    let offsets: Vec<u64> = (0..3).map(|i| spill.byte_offset(i).unwrap()).collect();
    assert_eq!(offsets[0], 0);
    assert!(offsets[1] > offsets[0]);
    assert!(offsets[2] > offsets[1]);
    assert!(spill.byte_offset(3).is_none());
}
