use hidblock::block::{BlockView, GUID_SIZE};
use hidblock::descriptor::formats::{self, StandardFormat};
use hidblock::descriptor::{
    self, DataFormatFlags, DeviceReportDescriptor, ObjectFormatEntry, ObjectOptions, ObjectType,
    ANY_INSTANCE, HEADER_SIZE, RECORD_SIZE,
};
use hidblock::layout::PTR_SIZE;
use hidblock::BlockError;

/// Address of the record array, read from the raw header.
fn records_address(view: &BlockView<'_>) -> usize {
    let mut h = view.header(HEADER_SIZE).unwrap();
    for _ in 0..5 {
        h.u32().unwrap();
    }
    h.addr().unwrap()
}

/// `(identifier address, offset, type word, options)` of record `i`.
fn raw_record(view: &BlockView<'_>, i: usize) -> (usize, u32, u32, u32) {
    let first = view.resolve(records_address(view)).unwrap().unwrap();
    let mut r = view.record(first + i * RECORD_SIZE, RECORD_SIZE).unwrap();
    (r.addr().unwrap(), r.u32().unwrap(), r.u32().unwrap(), r.u32().unwrap())
}

fn axis(guid: Option<uuid::Uuid>, offset: u32) -> ObjectFormatEntry {
    ObjectFormatEntry::new(guid, offset, ObjectType::ABSOLUTE_AXIS)
}

#[test]
fn test_standard_formats_roundtrip() {
    for format in StandardFormat::ALL {
        let desc = format.descriptor();
        let block = descriptor::encode(&desc).unwrap();
        assert_eq!(
            block.len(),
            HEADER_SIZE + desc.objects().len() * RECORD_SIZE + desc.identifier_count() * GUID_SIZE,
            "{}",
            format.name()
        );
        let decoded = descriptor::decode(&block.view()).unwrap();
        assert_eq!(decoded, desc, "{}", format.name());
    }
}

#[test]
fn test_empty_descriptor_is_header_only() {
    let desc = DeviceReportDescriptor::new(DataFormatFlags::RELATIVE_AXIS, 0, Vec::new()).unwrap();
    let block = descriptor::encode(&desc).unwrap();
    assert_eq!(block.len(), HEADER_SIZE);
    assert_eq!(records_address(&block.view()), 0);

    let decoded = descriptor::decode(&block.view()).unwrap();
    assert!(decoded.objects().is_empty());
    assert_eq!(decoded.flags(), DataFormatFlags::RELATIVE_AXIS);
}

#[test]
fn test_identifier_array_is_dense() {
    let objects = vec![
        axis(Some(formats::GUID_X_AXIS), 0),
        axis(None, 4),
        axis(Some(formats::GUID_Y_AXIS), 8),
    ];
    let desc = DeviceReportDescriptor::new(DataFormatFlags::ABSOLUTE_AXIS, 12, objects).unwrap();
    assert_eq!(desc.identifier_count(), 2);

    let block = descriptor::encode(&desc).unwrap();
    let ids_start = HEADER_SIZE + 3 * RECORD_SIZE;
    assert_eq!(block.len(), ids_start + 2 * GUID_SIZE);

    let view = block.view();
    let (first, ..) = raw_record(&view, 0);
    let (second, ..) = raw_record(&view, 1);
    let (third, ..) = raw_record(&view, 2);
    assert_eq!(view.resolve(first).unwrap(), Some(ids_start));
    assert_eq!(second, 0);
    assert_eq!(view.resolve(third).unwrap(), Some(ids_start + GUID_SIZE));
    assert_eq!(view.read_guid(third).unwrap(), Some(formats::GUID_Y_AXIS));

    assert_eq!(descriptor::decode(&view).unwrap(), desc);
}

#[test]
fn test_records_follow_header() {
    let desc = StandardFormat::Mouse.descriptor();
    let block = descriptor::encode(&desc).unwrap();
    let view = block.view();
    assert_eq!(view.resolve(records_address(&view)).unwrap(), Some(HEADER_SIZE));

    let mut h = view.header(HEADER_SIZE).unwrap();
    assert_eq!(h.u32().unwrap() as usize, HEADER_SIZE);
    assert_eq!(h.u32().unwrap() as usize, RECORD_SIZE);
    assert_eq!(h.u32().unwrap(), desc.flags().bits());
    assert_eq!(h.u32().unwrap(), desc.report_size());
    assert_eq!(h.u32().unwrap() as usize, desc.objects().len());
}

#[test]
fn test_type_word_instance_packing() {
    let cases: [(i16, u32); 4] = [
        (ANY_INSTANCE, 0x00FF_FF00),
        (0, 0x0000_0000),
        (1, 0x0000_0100),
        (i16::MAX, 0x007F_FF00),
    ];
    let objects = cases
        .iter()
        .enumerate()
        .map(|(i, &(instance, _))| {
            ObjectFormatEntry::new(None, i as u32, ObjectType::PUSH_BUTTON | ObjectType::OPTIONAL)
                .with_instance(instance)
        })
        .collect();
    let desc = DeviceReportDescriptor::new(DataFormatFlags::ABSOLUTE_AXIS, 8, objects).unwrap();
    let block = descriptor::encode(&desc).unwrap();
    let view = block.view();

    for (i, &(instance, bits)) in cases.iter().enumerate() {
        let (_, offset, word, _) = raw_record(&view, i);
        assert_eq!(offset, i as u32);
        assert_eq!(word, 0x8000_0004 | bits, "instance {instance}");
        assert_eq!(descriptor::unpack_type_word(word).1, instance);
    }
}

#[test]
fn test_options_are_written_verbatim() {
    let entry = axis(Some(formats::GUID_X_AXIS), 0)
        .with_options(ObjectOptions::ASPECT_FORCE | ObjectOptions::FF_ACTUATOR);
    let desc = DeviceReportDescriptor::new(DataFormatFlags::ABSOLUTE_AXIS, 4, vec![entry]).unwrap();
    let block = descriptor::encode(&desc).unwrap();
    let (_, _, _, options) = raw_record(&block.view(), 0);
    assert_eq!(options, 0x0000_0401);
}

#[test]
fn test_keyboard_has_256_identified_keys() {
    let desc = StandardFormat::Keyboard.descriptor();
    assert_eq!(desc.objects().len(), 256);
    assert_eq!(desc.identifier_count(), 256);
    let block = descriptor::encode(&desc).unwrap();
    let decoded = descriptor::decode(&block.view()).unwrap();
    assert!(decoded.objects().iter().all(|o| o.guid == Some(formats::GUID_KEY)));
    assert_eq!(decoded.objects()[200].offset, 200);
}

#[test]
fn test_with_encoded_hands_out_live_block() {
    let desc = StandardFormat::Joystick.descriptor();
    let expected_len = HEADER_SIZE + desc.objects().len() * RECORD_SIZE + desc.identifier_count() * GUID_SIZE;
    let seen = descriptor::with_encoded(&desc, |block| {
        let view = unsafe { BlockView::from_raw_parts(block.as_mut_ptr(), block.len()) };
        (view.len(), descriptor::decode(&view).unwrap())
    })
    .unwrap();
    assert_eq!(seen.0, expected_len);
    assert_eq!(seen.1, desc);
}

#[test]
fn test_width_invariant_enforced() {
    let pov = ObjectFormatEntry::new(Some(formats::GUID_POV), 6, ObjectType::POV);
    let err = DeviceReportDescriptor::new(DataFormatFlags::ABSOLUTE_AXIS, 8, vec![pov]).unwrap_err();
    assert!(matches!(err, BlockError::InvalidLayout(_)));

    // Zero-width controls may sit at the very end of the report.
    let collection = ObjectFormatEntry::new(None, 8, ObjectType::COLLECTION);
    assert!(DeviceReportDescriptor::new(DataFormatFlags::ABSOLUTE_AXIS, 8, vec![collection]).is_ok());
}

#[test]
fn test_decode_rejects_foreign_record_size() {
    let desc = StandardFormat::Mouse.descriptor();
    let mut block = descriptor::encode(&desc).unwrap();
    block.as_bytes_mut()[4..8].copy_from_slice(&((RECORD_SIZE + PTR_SIZE) as u32).to_ne_bytes());
    assert!(matches!(descriptor::decode(&block.view()), Err(BlockError::InvalidLayout(_))));
}

#[test]
fn test_descriptor_json_is_validated() {
    let json = r#"{
        "flags": "ABSOLUTE_AXIS",
        "report_size": 4,
        "objects": [
            { "guid": null, "offset": 2, "object_type": "ABSOLUTE_AXIS", "instance": 0, "options": "" }
        ]
    }"#;
    let err = serde_json::from_str::<DeviceReportDescriptor>(json).unwrap_err();
    assert!(err.to_string().contains("overflows"));

    let desc = StandardFormat::Joystick.descriptor();
    let text = serde_json::to_string(&desc).unwrap();
    assert_eq!(serde_json::from_str::<DeviceReportDescriptor>(&text).unwrap(), desc);
}

/// Byte offset of `record_count` inside the data-format header.
const RECORD_COUNT_FIELD: usize = 16;

#[test]
fn test_huge_record_count_without_records_is_size_mismatch() {
    let desc = DeviceReportDescriptor::new(DataFormatFlags::ABSOLUTE_AXIS, 0, Vec::new()).unwrap();
    let mut block = descriptor::encode(&desc).unwrap();
    block.as_bytes_mut()[RECORD_COUNT_FIELD..RECORD_COUNT_FIELD + 4].copy_from_slice(&u32::MAX.to_ne_bytes());
    assert_eq!(block.len(), HEADER_SIZE);

    let err = descriptor::decode(&block.view()).unwrap_err();
    assert!(matches!(err, BlockError::SizeMismatch { actual: 0, .. }));
}

#[test]
fn test_record_count_past_block_end_is_out_of_bounds() {
    let desc = StandardFormat::Mouse.descriptor();
    let mut block = descriptor::encode(&desc).unwrap();
    block.as_bytes_mut()[RECORD_COUNT_FIELD..RECORD_COUNT_FIELD + 4].copy_from_slice(&u32::MAX.to_ne_bytes());
    let err = descriptor::decode(&block.view()).unwrap_err();
    assert!(matches!(err, BlockError::OutOfBounds { .. } | BlockError::InvalidLayout(_)));

    // One record too many also runs past the end.
    let mut block = descriptor::encode(&desc).unwrap();
    let count = ((block.len() - HEADER_SIZE) / RECORD_SIZE + 1) as u32;
    block.as_bytes_mut()[RECORD_COUNT_FIELD..RECORD_COUNT_FIELD + 4].copy_from_slice(&count.to_ne_bytes());
    assert!(matches!(descriptor::decode(&block.view()), Err(BlockError::OutOfBounds { .. })));
}
