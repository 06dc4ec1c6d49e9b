use osdio::{
    get_header, load_record_set_data, read, read_channel, read_record_set, write, Channel,
    ChannelConfigType, FormatVersion, GenericDevice, NoProgress, OsdError, ReadOptions, Record,
    WriteOptions,
};
use proptest::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn device() -> GenericDevice {
    GenericDevice::new("UniLog 2")
}

/// One channel with two record sets: 100 fixed-step samples of 3
/// records, then 50 variable-step samples of 2 records.
fn sample_channel() -> Channel {
    let mut channel = Channel::new(1, "Ausgang", ChannelConfigType::Outlet);
    channel.file_comment = "bench run".to_string();
    channel.object_key = "glider-1".to_string();

    let set = channel.create_record_set("1) Laden");
    set.add_record(Record::new("Spannung", "V", "U"));
    set.add_record(Record::new("Strom", "A", "I"));
    set.add_record(Record::new("Leistung", "W", "P"));
    set.set_time_step_ms(100.0);
    set.set_start_time_stamp_ms(1_217_845_600_000);
    for i in 0..100i32 {
        set.push_row(None, &[4200 - i, 1500 + i, (4200 - i) * (1500 + i) / 1000])
            .unwrap();
    }

    let set = channel.create_record_set("2) Entladen");
    set.add_record(Record::new("Spannung", "V", "U"));
    set.add_record(Record::new("Strom", "A", "I"));
    for i in 0..50i32 {
        set.push_row(Some(i * 997), &[3700 - i, -2000 - i]).unwrap();
    }

    channel
}

fn write_sample(path: &Path, version: FormatVersion, zip: bool) {
    let mut channel = sample_channel();
    let opts = WriteOptions {
        version,
        zip,
        created: Some("2011-06-01 09:30:00".to_string()),
        ..Default::default()
    };
    write(path, &mut channel, &device(), opts).unwrap();
}

fn assert_matches_sample(path: &Path, version: FormatVersion) {
    let outcome = read(path, ReadOptions { first_choice: true, ..Default::default() }).unwrap();
    assert_eq!(outcome.container.version, version);
    assert_eq!(outcome.container.device_name, "UniLog 2");
    assert_eq!(outcome.container.created, "2011-06-01 09:30:00");
    assert_eq!(outcome.container.record_set_count, 2);
    if version.has_object_key() {
        assert_eq!(outcome.container.object_key, "glider-1");
    }

    let expected = sample_channel();
    let first = &outcome.record_sets[0];
    assert_eq!(first.name, "1) Laden");
    assert_eq!(first.time_step_ms(), Some(100.0));
    assert_eq!(first.start_time_stamp_ms(), Some(1_217_845_600_000));
    for record in &expected.record_sets[0].records {
        assert_eq!(first.get(&record.name).unwrap().points, record.points);
    }
    assert!(first.timestamps_ms.is_empty());
}

#[test]
fn round_trip_across_all_versions() {
    let dir = tempdir().unwrap();
    for version in [FormatVersion::V1, FormatVersion::V2, FormatVersion::V3, FormatVersion::V4] {
        let path = dir.path().join(format!("v{version}.osd"));
        write_sample(&path, version, false);
        assert_matches_sample(&path, version);
    }
}

#[test]
fn round_trip_through_zip_envelope() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wrapped.osd");
    write_sample(&path, FormatVersion::V4, true);

    let magic = std::fs::read(&path).unwrap();
    assert_eq!(&magic[..4], b"PK\x03\x04");
    assert_matches_sample(&path, FormatVersion::V4);
}

#[test]
fn pointers_are_contiguous_in_concrete_scenario() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("layout.osd");
    write_sample(&path, FormatVersion::V3, false);

    let outcome = read(&path, ReadOptions { preferred_channel: 0, ..Default::default() }).unwrap();
    let refs: Vec<_> = outcome.record_sets.iter().map(|s| s.file_ref.unwrap()).collect();

    // 100 samples x 3 records x 4 bytes, no timestamp column
    assert_eq!(refs[0].byte_size, 1200);
    // 50 samples x (timestamp + 2 records) x 4 bytes
    assert_eq!(refs[1].byte_size, 600);
    assert_eq!(refs[1].data_pointer, refs[0].data_pointer + 1200);

    let file_len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(file_len, refs[1].data_pointer + refs[1].byte_size);
}

#[test]
fn selective_read_equals_eager_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lazy.osd");
    write_sample(&path, FormatVersion::V4, false);

    // materialize only the second set, skipping the first's 1200 bytes
    let opts = ReadOptions {
        target_record_set: Some("2) Entladen".to_string()),
        ..Default::default()
    };
    let lazy = read(&path, opts).unwrap();
    assert_eq!(lazy.active, Some(1));
    assert!(!lazy.record_sets[0].has_data());

    let eager = read_channel(&path, 1, ReadOptions::default()).unwrap();
    assert!(eager.record_sets.iter().all(|s| s.has_data()));

    let wanted = &lazy.record_sets[1];
    let reference = &eager.record_sets[1];
    assert_eq!(wanted.timestamps_ms, reference.timestamps_ms);
    for (a, b) in wanted.records.iter().zip(&reference.records) {
        assert_eq!(a.points, b.points);
    }
}

#[test]
fn deferred_record_set_loads_later() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("deferred.osd");
    write_sample(&path, FormatVersion::V4, false);

    let mut outcome = read_record_set(&path, "2) Entladen").unwrap();
    assert_eq!(outcome.active, Some(1));
    let shell = &mut outcome.record_sets[0];
    assert!(!shell.has_data());

    load_record_set_data(&path, shell, &mut NoProgress).unwrap();
    assert_eq!(shell.sample_count(), 100);
    assert_eq!(shell.get("Spannung").unwrap().points[0], 4200);
}

#[test]
fn rewrite_of_lazy_sets_force_loads_bodies() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.osd");
    write_sample(&source, FormatVersion::V4, false);

    let outcome = read(&source, ReadOptions { preferred_channel: 0, ..Default::default() }).unwrap();
    let mut channel = Channel::new(1, "Ausgang", ChannelConfigType::Outlet);
    channel.file_comment = "bench run".to_string();
    channel.object_key = "glider-1".to_string();
    channel.origin_path = Some(source.clone());
    channel.record_sets = outcome.record_sets;
    assert!(channel.record_sets.iter().all(|s| !s.has_data()));

    let copy = dir.path().join("copy.osd");
    let opts = WriteOptions {
        version: FormatVersion::V4,
        created: Some("2011-06-01 09:30:00".to_string()),
        ..Default::default()
    };
    write(&copy, &mut channel, &device(), opts).unwrap();
    assert_matches_sample(&copy, FormatVersion::V4);
}

#[test]
fn oversized_descriptor_requires_version_4() {
    let dir = tempdir().unwrap();
    let mut channel = Channel::new(1, "Ausgang", ChannelConfigType::Outlet);
    let set = channel.create_record_set("wide");
    set.set_time_step_ms(10.0);
    // enough per-record metadata to push the descriptor past 64KB
    for i in 0..40 {
        let mut record = Record::new(format!("Kanal {i}"), "V", "U");
        record.extra = format!("_comment={}", "x".repeat(2000));
        set.add_record(record);
    }
    let row = vec![0i32; 40];
    set.push_row(None, &row).unwrap();

    let rejected = dir.path().join("v3.osd");
    let result = write(
        &rejected,
        &mut channel,
        &device(),
        WriteOptions { version: FormatVersion::V3, ..Default::default() },
    );
    assert!(matches!(result, Err(OsdError::DescriptorTooLong { .. })));

    let accepted = dir.path().join("v4.osd");
    write(
        &accepted,
        &mut channel,
        &device(),
        WriteOptions { version: FormatVersion::V4, ..Default::default() },
    )
    .unwrap();

    let outcome = read(&accepted, ReadOptions { first_choice: true, ..Default::default() }).unwrap();
    let set = outcome.active_record_set().unwrap();
    assert_eq!(set.records.len(), 40);
    assert!(set.records.iter().all(|r| r.extra.len() > 2000));
}

#[test]
fn header_inspection_reads_no_bodies() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("header.osd");
    write_sample(&path, FormatVersion::V2, false);

    let header = get_header(&path).unwrap();
    assert_eq!(header.get("DataExplorer version").map(String::as_str), Some("2"));
    assert_eq!(header.get("DeviceName").map(String::as_str), Some("UniLog 2"));
    assert_eq!(header.get("ObjectKey").map(String::as_str), Some("glider-1"));
    assert_eq!(header.get("NumberRecordSets").map(String::as_str), Some("2"));
    assert_eq!(header.get("1 RecordSetName").map(String::as_str), Some("1) Laden"));
    assert_eq!(header.get("2 RecordSetName").map(String::as_str), Some("2) Entladen"));
}

#[test]
fn truncated_container_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cut.osd");
    write_sample(&path, FormatVersion::V4, false);

    let full = std::fs::read(&path).unwrap();
    let cut = dir.path().join("short.osd");
    std::fs::write(&cut, &full[..full.len() - 500]).unwrap();

    let result = read_channel(&cut, 1, ReadOptions::default());
    assert!(matches!(result, Err(OsdError::TruncatedContainer(_))));
}

#[test]
fn garbage_file_is_rejected_as_unsupported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("noise.osd");
    std::fs::write(&path, b"\x00\x10not a container\n").unwrap();
    assert!(matches!(
        read(&path, ReadOptions::default()),
        Err(OsdError::UnsupportedFormatVersion(_))
    ));
}

#[test]
fn declined_confirmation_aborts_the_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("other-device.osd");
    write_sample(&path, FormatVersion::V4, false);

    let opts = ReadOptions {
        expected_device_name: Some("Picolario".to_string()),
        confirm: Some(Box::new(|_| false)),
        ..Default::default()
    };
    assert!(matches!(read(&path, opts), Err(OsdError::Aborted)));

    let opts = ReadOptions {
        expected_device_name: Some("Picolario".to_string()),
        confirm: Some(Box::new(|_| true)),
        first_choice: true,
        ..Default::default()
    };
    assert!(read(&path, opts).unwrap().active.is_some());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Blocks always sit back to back, whatever shapes are written.
    #[test]
    fn pointer_contiguity_holds_for_arbitrary_shapes(
        shapes in prop::collection::vec((1usize..6, 1usize..40, any::<bool>()), 1..5)
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prop.osd");

        let mut channel = Channel::new(1, "Ausgang", ChannelConfigType::Outlet);
        for (i, (records, samples, fixed)) in shapes.iter().enumerate() {
            let set = channel.create_record_set(&format!("set {i}"));
            for r in 0..*records {
                set.add_record(Record::new(format!("r{r}"), "V", ""));
            }
            if *fixed {
                set.set_time_step_ms(50.0);
            }
            let row = vec![7i32; *records];
            for s in 0..*samples {
                let ts = (!fixed).then_some(s as i32 * 10);
                set.push_row(ts, &row).unwrap();
            }
        }
        write(&path, &mut channel, &device(), WriteOptions::default()).unwrap();

        let outcome = read(&path, ReadOptions { preferred_channel: 0, ..Default::default() }).unwrap();
        let refs: Vec<_> = outcome.record_sets.iter().map(|s| s.file_ref.unwrap()).collect();
        for pair in refs.windows(2) {
            prop_assert_eq!(pair[1].data_pointer, pair[0].data_pointer + pair[0].byte_size);
        }
        let file_len = std::fs::metadata(&path).unwrap().len();
        let last = refs.last().unwrap();
        prop_assert_eq!(file_len, last.data_pointer + last.byte_size);
    }
}
