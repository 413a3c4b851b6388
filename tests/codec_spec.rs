use racebin::{compute_checksum, ByteCursor, Codec, CodecError, PathKey, Structure, TypedStore, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

fn structure_path(name: &str) -> PathBuf {
    let mut p = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("structures");
    p.push(name);
    p
}

const BNK_ENTRIES: &[(u32, u32, u32)] = &[
    (0x1000_0001, 100, 120),
    (0x2000_0002, 200, 240),
    (0x3000_0003, 300, 360),
];

fn sample_bnk_map() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"BNK!");
    for (hash, size_a, size_b) in BNK_ENTRIES {
        buf.extend_from_slice(&hash.to_le_bytes());
        buf.extend_from_slice(&size_a.to_le_bytes());
        buf.extend_from_slice(&size_b.to_le_bytes());
        buf.extend_from_slice(&[0xCD; 4]);
    }
    buf
}

fn bnk_counts(n: usize) -> HashMap<String, usize> {
    HashMap::from([("entries".to_string(), n)])
}

#[test]
fn bnk_map_round_trip() {
    let buf = sample_bnk_map();
    let codec = Codec::new();
    let store = codec
        .decode_with_counts(structure_path("bnk_map.xml"), &buf, &bnk_counts(3))
        .expect("decode bnk map");

    assert_eq!(
        store.get(&PathKey::root().child("tag")),
        Some(&Value::Bytes(b"BNK!".to_vec()))
    );
    for (i, (hash, size_a, _)) in BNK_ENTRIES.iter().enumerate() {
        let entry = PathKey::root().item("entries", i);
        assert_eq!(
            store.get(&entry.clone().child("file_name_hash")),
            Some(&Value::UInt(*hash as u64))
        );
        assert_eq!(
            store.get(&entry.child("size_a")),
            Some(&Value::UInt(*size_a as u64))
        );
    }

    let encoded = codec
        .encode(structure_path("bnk_map.xml"), &store)
        .expect("encode bnk map");
    assert_eq!(encoded, buf, "round trip must be byte-identical");
}

#[test]
fn camera_set_round_trip() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&2u32.to_le_bytes()); // camera_count
    for (camera_id, view_count) in [(1u32, 1u32), (2, 2)] {
        buf.extend_from_slice(&camera_id.to_le_bytes());
        buf.extend_from_slice(&view_count.to_le_bytes());
    }
    for owner in [1u32, 2, 2] {
        buf.extend_from_slice(&owner.to_le_bytes()); // owner_id
        for f in [1.5f32, -2.25, 100.0, 0.0, 3.5, -7.75, 45.0] {
            buf.extend_from_slice(&f.to_le_bytes());
        }
        buf.extend_from_slice(&0u32.to_le_bytes()); // flags
    }

    let codec = Codec::new();
    // The camera index carries its own count; the flat view list does not.
    let counts = HashMap::from([("views".to_string(), 3usize)]);
    let store = codec
        .decode_with_counts(structure_path("camera_set.xml"), &buf, &counts)
        .expect("decode camera set");

    assert_eq!(
        store.get(&PathKey::root().item("cameras", 1).child("view_count")),
        Some(&Value::UInt(2))
    );
    assert_eq!(
        store.get(&PathKey::root().item("views", 0).child("position_x")),
        Some(&Value::Float(1.5))
    );

    let encoded = codec
        .encode(structure_path("camera_set.xml"), &store)
        .expect("encode camera set");
    assert_eq!(encoded, buf);
}

#[test]
fn save_slot_round_trip_with_padding_and_text() {
    let mut buf = Vec::new();
    let mut name = [0u8; 32];
    name[..4].copy_from_slice(b"Lena");
    buf.extend_from_slice(&name);
    buf.extend_from_slice(&125_000u32.to_le_bytes()); // money
    buf.extend_from_slice(&(-3i32).to_le_bytes()); // rank
    buf.extend_from_slice(&0.75f32.to_le_bytes()); // career_progress
    buf.extend_from_slice(&[0u8; 4]); // padding
    buf.extend_from_slice(&1u32.to_le_bytes()); // vehicle_count
    buf.extend_from_slice(&7u32.to_le_bytes()); // slot_id
    buf.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes()); // model_hash
    buf.extend_from_slice(&1234.5f32.to_le_bytes()); // odometer

    let codec = Codec::new();
    let store = codec
        .decode(structure_path("save_slot.xml"), &buf)
        .expect("decode save slot");

    assert_eq!(
        store.get(&PathKey::root().child("player_name")),
        Some(&Value::Text("Lena".to_string()))
    );
    assert_eq!(
        store.get(&PathKey::root().child("rank")),
        Some(&Value::Int(-3))
    );
    // The vehicle list count came from the preceding vehicle_count field.
    assert_eq!(
        store.get(&PathKey::root().item("vehicles", 0).child("slot_id")),
        Some(&Value::UInt(7))
    );
    // Padding produces no store entry.
    assert_eq!(store.len(), 8);

    let encoded = codec
        .encode(structure_path("save_slot.xml"), &store)
        .expect("encode save slot");
    assert_eq!(encoded, buf);
}

#[test]
fn zero_repeat_count_yields_no_entries() {
    let buf = 0u32.to_le_bytes();
    let codec = Codec::new();
    let store = codec
        .decode(structure_path("world_spots.xml"), &buf)
        .expect("decode empty spot table");

    assert_eq!(store.len(), 1, "only the count field should be stored");
    assert!(store
        .indices_under(&PathKey::root(), "spots")
        .is_empty());

    let encoded = codec
        .encode(structure_path("world_spots.xml"), &store)
        .expect("encode empty spot table");
    assert_eq!(encoded, buf);
}

#[test]
fn repeat_count_resolves_from_preceding_field() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&2u32.to_le_bytes()); // spot_count
    for (id, name) in [(10u32, "garage"), (11, "dealer")] {
        buf.extend_from_slice(&id.to_le_bytes());
        for f in [1.0f32, 2.0, 3.0, 90.0] {
            buf.extend_from_slice(&f.to_le_bytes());
        }
        let mut text = [0u8; 16];
        text[..name.len()].copy_from_slice(name.as_bytes());
        buf.extend_from_slice(&text);
    }

    let codec = Codec::new();
    let store = codec
        .decode(structure_path("world_spots.xml"), &buf)
        .expect("decode spot table");
    assert_eq!(
        store.get(&PathKey::root().item("spots", 1).child("name")),
        Some(&Value::Text("dealer".to_string()))
    );

    let encoded = codec
        .encode(structure_path("world_spots.xml"), &store)
        .expect("encode spot table");
    assert_eq!(encoded, buf);
}

#[test]
fn encoder_sorts_repetitions_by_index_not_insertion_order() {
    let schema_path = structure_path("bnk_map.xml");
    let codec = Codec::new();

    let fill = |store: &mut TypedStore, order: &[usize]| {
        store.insert(
            PathKey::root().child("tag"),
            Value::Bytes(b"BNK!".to_vec()),
        );
        for &i in order {
            let (hash, size_a, size_b) = BNK_ENTRIES[i];
            let entry = PathKey::root().item("entries", i);
            store.insert(
                entry.clone().child("file_name_hash"),
                Value::UInt(hash as u64),
            );
            store.insert(entry.clone().child("size_a"), Value::UInt(size_a as u64));
            store.insert(entry.clone().child("size_b"), Value::UInt(size_b as u64));
            store.insert(entry.child("end_marker"), Value::Bytes(vec![0xCD; 4]));
        }
    };

    let mut shuffled = TypedStore::new();
    fill(&mut shuffled, &[2, 0, 1]);
    let mut ordered = TypedStore::new();
    fill(&mut ordered, &[0, 1, 2]);

    let a = codec.encode(&schema_path, &shuffled).expect("encode shuffled");
    let b = codec.encode(&schema_path, &ordered).expect("encode ordered");
    assert_eq!(a, b, "insertion order must not affect output");
    assert_eq!(a, sample_bnk_map());
}

#[test]
fn checksum_matches_reference_vectors() {
    assert_eq!(compute_checksum("avatar/barb.bnk"), 0xc48bdcaa);
    assert_eq!(compute_checksum("bnk1.map"), 0xfe168a1c);
}

#[test]
fn checksum_normalizes_case_and_separators() {
    assert_eq!(
        compute_checksum("AVATAR\\BARB.BNK"),
        compute_checksum("avatar/barb.bnk")
    );
    assert_eq!(compute_checksum("Bnk1.Map"), compute_checksum("bnk1.map"));
}

#[test]
fn cursor_bounds_are_checked() {
    let data = [1u8, 2, 3];
    let mut cursor = ByteCursor::new(&data);

    for offset in 0..=2 {
        cursor.seek(offset).expect("in-range seek");
    }
    assert!(matches!(
        cursor.seek(3),
        Err(CodecError::OutOfBounds { offset: 3, len: 3 })
    ));

    cursor.seek(0).unwrap();
    assert_eq!(cursor.read(2).unwrap(), &[1, 2]);
    assert!(matches!(
        cursor.read(2),
        Err(CodecError::UnexpectedEndOfData {
            offset: 2,
            need: 2,
            have: 1
        })
    ));
}

#[test]
fn truncated_input_fails_mid_field() {
    let buf = sample_bnk_map();
    let codec = Codec::new();
    let err = codec
        .decode_with_counts(structure_path("bnk_map.xml"), &buf[..buf.len() - 2], &bnk_counts(3))
        .unwrap_err();
    assert!(matches!(err, CodecError::UnexpectedEndOfData { .. }));
}

#[test]
fn unresolvable_repeat_count_is_rejected() {
    let xml = r#"
        <structure name="headerless" byteorder="little">
            <field name="label" kind="text" size="4"/>
            <repeater name="items">
                <field name="value" kind="uint" size="2"/>
            </repeater>
        </structure>"#;
    let structure = Structure::parse("headerless", xml).expect("valid schema");
    let data = *b"abcd";
    let mut cursor = ByteCursor::new(&data);
    let err = racebin::codec::decoder::decode(&structure, &mut cursor).unwrap_err();
    assert!(
        matches!(err, CodecError::InvalidRepeatCount { ref repeater, .. } if repeater == "items")
    );
}

#[test]
fn negative_repeat_count_is_rejected() {
    let xml = r#"
        <structure name="negative" byteorder="big">
            <field name="count" kind="int" size="2"/>
            <repeater name="items">
                <field name="value" kind="uint" size="2"/>
            </repeater>
        </structure>"#;
    let structure = Structure::parse("negative", xml).expect("valid schema");
    let data = (-1i16).to_be_bytes();
    let mut cursor = ByteCursor::new(&data);
    let err = racebin::codec::decoder::decode(&structure, &mut cursor).unwrap_err();
    assert!(matches!(err, CodecError::InvalidRepeatCount { .. }));
}

#[test]
fn malformed_schemas_are_rejected() {
    let cases = [
        // unknown kind
        r#"<structure name="s" byteorder="little">
               <field name="a" kind="blob" size="4"/>
           </structure>"#,
        // missing size
        r#"<structure name="s" byteorder="little">
               <field name="a" kind="uint"/>
           </structure>"#,
        // non-positive size
        r#"<structure name="s" byteorder="little">
               <field name="a" kind="uint" size="0"/>
           </structure>"#,
        // bad float width
        r#"<structure name="s" byteorder="little">
               <field name="a" kind="float" size="3"/>
           </structure>"#,
        // missing field name
        r#"<structure name="s" byteorder="little">
               <field kind="uint" size="4"/>
           </structure>"#,
        // unknown byte order
        r#"<structure name="s" byteorder="middle">
               <field name="a" kind="uint" size="4"/>
           </structure>"#,
        // not even XML
        "nonsense",
    ];
    for xml in cases {
        assert!(
            matches!(
                Structure::parse("case", xml),
                Err(CodecError::SchemaLoad { .. })
            ),
            "expected SchemaLoad for {:?}",
            xml
        );
    }
}

#[test]
fn missing_schema_file_is_a_load_error() {
    let err = Codec::new()
        .decode(structure_path("no_such_format.xml"), &[])
        .unwrap_err();
    assert!(matches!(err, CodecError::SchemaLoad { .. }));
}

#[test]
fn encode_reports_missing_and_oversized_values() {
    let schema_path = structure_path("world_spots.xml");
    let codec = Codec::new();

    // Missing scalar entry
    let empty = TypedStore::new();
    let err = codec.encode(&schema_path, &empty).unwrap_err();
    assert!(
        matches!(err, CodecError::MissingStoreEntry { ref path } if path == "spot_count")
    );

    // Unsigned value wider than the field
    let mut store = TypedStore::new();
    store.insert(
        PathKey::root().child("spot_count"),
        Value::UInt(u64::from(u32::MAX) + 1),
    );
    let err = codec.encode(&schema_path, &store).unwrap_err();
    assert!(matches!(err, CodecError::ValueTooLarge { .. }));

    // Text longer than the field
    let mut store = TypedStore::new();
    store.insert(PathKey::root().child("spot_count"), Value::UInt(1));
    let spot = PathKey::root().item("spots", 0);
    store.insert(spot.clone().child("spot_id"), Value::UInt(1));
    for axis in ["position_x", "position_y", "position_z", "heading"] {
        store.insert(spot.clone().child(axis), Value::Float(0.0));
    }
    store.insert(
        spot.child("name"),
        Value::Text("a name much longer than sixteen bytes".to_string()),
    );
    let err = codec.encode(&schema_path, &store).unwrap_err();
    assert!(matches!(err, CodecError::ValueTooLarge { ref path, size: 16, .. } if path == "spots[0].name"));
}

#[test]
fn encode_rejects_text_outside_the_disk_encoding() {
    let schema_path = structure_path("world_spots.xml");
    let mut store = TypedStore::new();
    store.insert(PathKey::root().child("spot_count"), Value::UInt(1));
    let spot = PathKey::root().item("spots", 0);
    store.insert(spot.clone().child("spot_id"), Value::UInt(1));
    for axis in ["position_x", "position_y", "position_z", "heading"] {
        store.insert(spot.clone().child(axis), Value::Float(0.0));
    }
    // Fits in 16 bytes, but has no windows-1252 representation.
    store.insert(spot.child("name"), Value::Text("ガレージ".to_string()));

    let err = Codec::new().encode(&schema_path, &store).unwrap_err();
    assert!(
        matches!(err, CodecError::UnencodableText { ref path } if path == "spots[0].name"),
        "lossy text encoding must fail, got {:?}",
        err
    );
}

#[test]
fn nested_repeaters_round_trip() {
    let xml = r#"
        <structure name="championship" byteorder="little">
            <field name="series_count" kind="uint" size="2"/>
            <repeater name="series">
                <field name="series_id" kind="uint" size="2"/>
                <field name="race_count" kind="uint" size="2"/>
                <repeater name="races">
                    <field name="track_id" kind="uint" size="2"/>
                    <field name="laps" kind="uint" size="2"/>
                </repeater>
            </repeater>
        </structure>"#;
    let structure = Structure::parse("championship", xml).expect("valid schema");

    let mut buf = Vec::new();
    buf.extend_from_slice(&2u16.to_le_bytes()); // series_count
    buf.extend_from_slice(&1u16.to_le_bytes()); // series_id
    buf.extend_from_slice(&2u16.to_le_bytes()); // race_count
    for (track, laps) in [(10u16, 3u16), (11, 5)] {
        buf.extend_from_slice(&track.to_le_bytes());
        buf.extend_from_slice(&laps.to_le_bytes());
    }
    buf.extend_from_slice(&2u16.to_le_bytes()); // series_id
    buf.extend_from_slice(&1u16.to_le_bytes()); // race_count
    buf.extend_from_slice(&20u16.to_le_bytes());
    buf.extend_from_slice(&12u16.to_le_bytes());

    let mut cursor = ByteCursor::new(&buf);
    // Both levels resolve their counts from the preceding count field.
    let store = racebin::codec::decoder::decode(&structure, &mut cursor).expect("decode");

    assert_eq!(
        store.get(
            &PathKey::root()
                .item("series", 0)
                .item("races", 1)
                .child("laps")
        ),
        Some(&Value::UInt(5))
    );
    assert_eq!(
        store.get(
            &PathKey::root()
                .item("series", 1)
                .item("races", 0)
                .child("track_id")
        ),
        Some(&Value::UInt(20))
    );

    let encoded = racebin::codec::encoder::encode(&structure, &store).expect("encode");
    assert_eq!(encoded, buf);
}

#[test]
fn half_precision_nan_payloads_round_trip() {
    let xml = r#"
        <structure name="telemetry" byteorder="little">
            <field name="a" kind="float" size="2"/>
            <field name="b" kind="float" size="2"/>
            <field name="c" kind="float" size="2"/>
        </structure>"#;
    let structure = Structure::parse("telemetry", xml).expect("valid schema");

    // A signaling NaN, a negative quiet NaN and an ordinary value.
    let buf = [0x01u8, 0x7C, 0x00, 0xFE, 0x48, 0x42];
    let mut cursor = ByteCursor::new(&buf);
    let store = racebin::codec::decoder::decode(&structure, &mut cursor).expect("decode");

    let encoded = racebin::codec::encoder::encode(&structure, &store).expect("encode");
    assert_eq!(encoded, buf, "NaN bit patterns must survive the round trip");
}

#[test]
fn duplicate_field_names_are_rejected() {
    let top_level = r#"
        <structure name="s" byteorder="little">
            <field name="size" kind="uint" size="4"/>
            <field name="size" kind="uint" size="4"/>
        </structure>"#;
    let err = Structure::parse("s", top_level).unwrap_err();
    assert!(
        matches!(err, CodecError::SchemaLoad { ref reason, .. } if reason.contains("size")),
        "duplicate top-level name must fail, got {:?}",
        err
    );

    let inside_repeater = r#"
        <structure name="s" byteorder="little">
            <field name="count" kind="uint" size="4"/>
            <repeater name="items">
                <field name="id" kind="uint" size="4"/>
                <field name="id" kind="uint" size="4"/>
            </repeater>
        </structure>"#;
    assert!(matches!(
        Structure::parse("s", inside_repeater),
        Err(CodecError::SchemaLoad { .. })
    ));

    // Nameless padding may repeat freely.
    let repeated_padding = r#"
        <structure name="s" byteorder="little">
            <field name="a" kind="uint" size="4"/>
            <field kind="padding" size="2"/>
            <field kind="padding" size="2"/>
        </structure>"#;
    Structure::parse("s", repeated_padding).expect("repeated padding is fine");
}

#[test]
fn encode_rejects_wrong_value_kind() {
    let schema_path = structure_path("world_spots.xml");
    let mut store = TypedStore::new();
    store.insert(
        PathKey::root().child("spot_count"),
        Value::Text("zero".to_string()),
    );
    let err = Codec::new().encode(&schema_path, &store).unwrap_err();
    assert!(matches!(
        err,
        CodecError::ValueKindMismatch {
            expected: "uint",
            found: "text",
            ..
        }
    ));
}

#[test]
fn half_precision_floats_round_trip() {
    let xml = r#"
        <structure name="telemetry" byteorder="little">
            <field name="speed" kind="float" size="2"/>
            <field name="grip" kind="float" size="2"/>
        </structure>"#;
    let structure = Structure::parse("telemetry", xml).expect("valid schema");

    // 1.0 and the smallest half subnormal
    let buf = [0x00u8, 0x3C, 0x01, 0x00];
    let mut cursor = ByteCursor::new(&buf);
    let store = racebin::codec::decoder::decode(&structure, &mut cursor).expect("decode");

    assert_eq!(
        store.get(&PathKey::root().child("speed")),
        Some(&Value::Float(1.0))
    );

    let encoded = racebin::codec::encoder::encode(&structure, &store).expect("encode");
    assert_eq!(encoded, buf);
}

#[test]
fn big_endian_structures_decode_correctly() {
    let xml = r#"
        <structure name="be" byteorder="big">
            <field name="magic" kind="uint" size="4"/>
            <field name="delta" kind="int" size="2"/>
        </structure>"#;
    let structure = Structure::parse("be", xml).expect("valid schema");
    let buf = [0x00u8, 0x00, 0x01, 0x00, 0xFF, 0xFE];
    let mut cursor = ByteCursor::new(&buf);
    let store = racebin::codec::decoder::decode(&structure, &mut cursor).expect("decode");

    assert_eq!(
        store.get(&PathKey::root().child("magic")),
        Some(&Value::UInt(256))
    );
    assert_eq!(
        store.get(&PathKey::root().child("delta")),
        Some(&Value::Int(-2))
    );

    let encoded = racebin::codec::encoder::encode(&structure, &store).expect("encode");
    assert_eq!(encoded, buf);
}

#[test]
fn schema_cache_returns_the_same_structure() {
    let codec = Codec::new();
    let first = codec.structure(structure_path("bnk_map.xml")).expect("load");
    let second = codec.structure(structure_path("bnk_map.xml")).expect("reload");
    assert!(Arc::ptr_eq(&first, &second));
}
