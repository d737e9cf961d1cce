use dm_io::{
    load_image, save_image, Calibration, DmError, DmReader, DmVersion, DmWriter, DmWriterOptions,
    Endianness, ImageRecord, SampleBuffer, TagArray, TagGroup, TagNode,
};

fn ramp_u16() -> ImageRecord {
    ImageRecord::new(
        SampleBuffer::U16((0..24).map(|i| (i * 37) as u16).collect()),
        vec![6, 4],
    )
}

#[test]
fn dm3_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ramp.dm3");

    let mut image = ramp_u16();
    image.title = Some("Ramp".to_string());
    save_image(&path, &image).expect("save dm3");

    let loaded = load_image(&path).expect("load dm3");
    assert_eq!(loaded.data, image.data);
    assert_eq!(loaded.shape, vec![6, 4]);
    assert_eq!(loaded.data_type, image.data_type);
    assert_eq!(loaded.title.as_deref(), Some("Ramp"));
}

#[test]
fn dm4_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ramp.dm4");

    let image = ramp_u16();
    let writer = DmWriter::with_options(DmWriterOptions {
        version: DmVersion::V4,
        ..Default::default()
    });
    writer.write(&path, &image).expect("save dm4");

    // The reader detects the framing version from the header.
    let loaded = load_image(&path).expect("load dm4");
    assert_eq!(loaded.data, image.data);
    assert_eq!(loaded.shape, vec![6, 4]);
}

#[test]
fn big_endian_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("be.dm3");

    let image = ImageRecord::new(
        SampleBuffer::F64((0..24).map(|i| i as f64 / 7.0).collect()),
        vec![6, 4],
    );
    let writer = DmWriter::with_options(DmWriterOptions {
        endianness: Endianness::Big,
        ..Default::default()
    });
    writer.write(&path, &image).expect("save big-endian");
    let loaded = load_image(&path).expect("load big-endian");
    assert_eq!(loaded.data, image.data);
}

#[test]
fn calibrations_and_metadata_survive_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("calibrated.dm3");

    let mut nested = TagGroup::new();
    nested.insert("one", 1i32);
    nested.insert("two", "TWO");
    nested.insert("three", TagArray::I32(vec![3, 4, 5]));
    let mut metadata = TagGroup::new();
    metadata.insert("abc", 1i32);
    metadata.insert("def", "abc");
    metadata.insert("efg", nested);

    let mut image = ramp_u16();
    image.dimensional_calibrations = vec![
        Calibration::new(1.0, 2.0, "nm"),
        Calibration::new(2.0, 3.0, "µm"),
    ];
    image.intensity_calibration = Some(Calibration::new(4.0, 5.0, "six"));
    image.metadata = metadata.clone();
    save_image(&path, &image).expect("save");

    let loaded = load_image(&path).expect("load");
    assert_eq!(
        loaded.dimensional_calibrations,
        image.dimensional_calibrations
    );
    assert_eq!(loaded.intensity_calibration, image.intensity_calibration);
    assert_eq!(
        loaded.metadata.get("imported_properties"),
        Some(&TagNode::Group(metadata))
    );
}

#[test]
fn truncated_file_reports_truncated_data() {
    let bytes = DmWriter::new()
        .write_to_memory(&ramp_u16())
        .expect("encode");
    for cut in [16, bytes.len() / 3, bytes.len() - 2] {
        match DmReader::new().read_from_memory(&bytes[..cut]) {
            Err(DmError::TruncatedData(_)) => {}
            other => panic!("cut at {cut}: expected TruncatedData, got {other:?}"),
        }
    }
}

#[test]
fn garbage_file_is_rejected_without_panicking() {
    let reader = DmReader::new();
    assert!(reader.read_from_memory(&[]).is_err());
    assert!(reader.read_from_memory(b"not a dm file at all").is_err());
    // A valid version field followed by noise.
    let mut bytes = vec![0, 0, 0, 3];
    bytes.extend_from_slice(&[0xFF; 40]);
    assert!(reader.read_from_memory(&bytes).is_err());
}

#[test]
fn sniffing_matches_written_headers() {
    let reader = DmReader::new();
    for version in [DmVersion::V3, DmVersion::V4] {
        let writer = DmWriter::with_options(DmWriterOptions {
            version,
            ..Default::default()
        });
        let bytes = writer.write_to_memory(&ramp_u16()).expect("encode");
        assert!(reader.can_read(&bytes[..4]));
    }
    assert!(!reader.can_read(b"II*\0"));
}
