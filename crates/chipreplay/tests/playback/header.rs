use crate::TestTrace;
use chipreplay::replay::TickRate;
use chipreplay::trace::{DeviceKind, PlaybackInterpreter, TraceBuffer, TraceEvent, parse_trace_header};
use chipreplay::FormatError;

#[test]
fn parses_header_fields_and_devices() {
    let t = TestTrace {
        devices: vec![(5, 3_579_545), (1, 2_000_000)],
        loop_at: Some(3),
        events: vec![0x00, 0x08, 0x00, 0xFF, 0xFD],
        ..Default::default()
    };
    let trace = TraceBuffer::parse(t.build()).unwrap();
    let h = trace.header();

    assert_eq!(h.version, b'3');
    assert_eq!(h.tick_rate(), TickRate::new(10, 1000));
    assert_eq!(h.event_data_offset as usize, 0x40);
    assert_eq!(h.loop_point(), Some(0x43));
    assert_eq!(h.tag_block(), None);
    assert_eq!(h.device_count, 2);
    assert_eq!(h.devices[0].kind, DeviceKind::Opm);
    assert_eq!(h.devices[0].clock, 3_579_545);
    assert_eq!(h.devices[1].kind, DeviceKind::Psg);
    assert_eq!(h.header_len(), 0x40);
}

#[test]
fn too_short_buffer() {
    let err = parse_trace_header(b"S983\x0a\x00").unwrap_err();
    assert_eq!(
        err,
        FormatError::HeaderTooShort {
            needed: 0x20,
            available: 6
        }
    );
}

#[test]
fn magic_mismatch() {
    let t = TestTrace {
        magic: *b"VGM3",
        events: vec![0xFD],
        ..Default::default()
    };
    assert_eq!(
        TraceBuffer::parse(t.build()),
        Err(FormatError::InvalidMagic(*b"VGM"))
    );
}

#[test]
fn zero_denominator() {
    let t = TestTrace {
        denominator: 0,
        events: vec![0xFD],
        ..Default::default()
    };
    assert_eq!(TraceBuffer::parse(t.build()), Err(FormatError::ZeroDenominator));
}

#[test]
fn offsets_must_be_inside_buffer() {
    let t = TestTrace::with_events(&[0xFD]);
    let mut bytes = t.build();
    let len = bytes.len();

    // event data offset == len
    bytes[0x14..0x18].copy_from_slice(&(len as u32).to_le_bytes());
    assert_eq!(
        TraceBuffer::parse(bytes.clone()),
        Err(FormatError::OffsetOutOfRange {
            field: "event_data_offset",
            offset: len,
            len,
        })
    );

    // loop point past the end
    let mut bytes = t.build();
    bytes[0x18..0x1C].copy_from_slice(&0x1000u32.to_le_bytes());
    assert!(matches!(
        TraceBuffer::parse(bytes),
        Err(FormatError::OffsetOutOfRange {
            field: "loop_point_offset",
            ..
        })
    ));

    // tag block past the end
    let mut bytes = t.build();
    bytes[0x10..0x14].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    assert!(matches!(
        TraceBuffer::parse(bytes),
        Err(FormatError::OffsetOutOfRange {
            field: "tag_offset",
            ..
        })
    ));
}

#[test]
fn legacy_versions_are_accepted() {
    for version in [b'1', b'2'] {
        let t = TestTrace {
            magic: [b'S', b'9', b'8', version],
            devices: Vec::new(),
            events: vec![0xFD],
            ..Default::default()
        };
        let trace = TraceBuffer::parse(t.build()).unwrap();
        assert_eq!(trace.header().version, version);
        assert!(trace.header().devices.is_empty());
    }
}

#[test]
fn tags_are_read_from_tag_block() {
    let mut tags = b"[S98]".to_vec();
    tags.extend_from_slice(b"title=Acid Shota\nartist=unknown\n\0");
    let t = TestTrace {
        events: vec![0xFD],
        tags: Some(tags),
        ..Default::default()
    };
    let trace = TraceBuffer::parse(t.build()).unwrap();
    let tags = trace.tags().unwrap();
    assert_eq!(tags.title(), Some("Acid Shota"));
    assert_eq!(tags.artist(), Some("unknown"));
}

#[test]
fn reparsing_is_idempotent() {
    let t = TestTrace {
        events: vec![
            0x00, 0x20, 0xC7, 0xFF, 0x7A, 0x00, 0x00, 0xFE, 0x03, 0x00, 0x08, 0x78, 0xFD,
        ],
        loop_at: Some(3),
        ..Default::default()
    };
    let bytes = t.build();
    let a = TraceBuffer::parse(bytes.clone()).unwrap();
    let b = TraceBuffer::try_from(bytes.as_slice()).unwrap();
    assert_eq!(a.header(), b.header());

    let first = |trace: &TraceBuffer| -> Vec<TraceEvent> {
        PlaybackInterpreter::new(trace)
            .take(50)
            .collect::<Result<_, _>>()
            .unwrap()
    };
    assert_eq!(first(&a), first(&b));
}
