//! Integration tests for the container reader
//!
//! These tests cover:
//! - Byte-for-byte round-trip of parsed containers
//! - Random access to chunks regardless of payload order
//! - Error mapping into the unified taxonomy
//! - Containers read out of pack archives

use bytes::Bytes;
use proptest::prelude::*;

use iwbridge_core::{AssetId, AssetKind, ErrorKind};
use iwbridge_parsers::{
    tags, AssetRecord, ChunkTag, Codec, Container, ContainerBuilder, PackParser, PackWriter,
    ParseError, ParseOptions, Parser, PayloadWriter, SourceAsset,
};

fn codec_strategy() -> impl Strategy<Value = Codec> {
    prop_oneof![
        Just(Codec::Store),
        Just(Codec::Deflate),
        Just(Codec::Zstd),
        Just(Codec::Lz4),
    ]
}

proptest! {
    #[test]
    fn parse_then_serialize_is_identity(
        payloads in prop::collection::vec(
            (prop::collection::vec(any::<u8>(), 0..200), codec_strategy()),
            1..8,
        ),
        trailing in prop::collection::vec(any::<u8>(), 0..16),
    ) {
        let mut builder = ContainerBuilder::new(AssetKind::Texture);
        for (i, (payload, codec)) in payloads.iter().enumerate() {
            builder = builder.chunk_with(tags::TEXTURE_MIP, i as u16, *codec, payload.clone());
        }
        let mut bytes = builder.build().unwrap();
        bytes.extend_from_slice(&trailing);

        let container = Container::parse(Bytes::from(bytes.clone())).unwrap();
        prop_assert_eq!(container.to_bytes(), bytes);

        for (entry, (payload, _)) in container.find_all(tags::TEXTURE_MIP).iter().zip(&payloads) {
            let decoded = container.decode(entry).unwrap();
            prop_assert_eq!(decoded.as_ref(), payload.as_slice());
        }
    }

    #[test]
    fn truncation_never_panics(cut in 0usize..120) {
        let bytes = ContainerBuilder::new(AssetKind::Physics)
            .chunk(tags::PHYSICS_SHAPES, 0u32.to_le_bytes().to_vec())
            .chunk(tags::NAME, b"crate_hull_with_a_longer_name".to_vec())
            .build()
            .unwrap();
        let cut = cut.min(bytes.len());
        let _ = Container::parse(Bytes::from(bytes[..cut].to_vec()));
    }
}

/// Directory first, payloads written back to front with gaps between them
#[test]
fn test_random_access_out_of_order_payloads() {
    let first = b"first payload".to_vec();
    let second = b"second".to_vec();

    let mut out = PayloadWriter::new();
    out.bytes(b"IWAC")
        .u32(1)
        .u8(AssetKind::Texture.to_u8())
        .u8(0)
        .u16(0)
        .u32(2)
        .u32(20);
    // entry 0 points past entry 1's payload
    out.bytes(b"TXMP").u32(100).u32(first.len() as u32).u32(first.len() as u32).u16(0).u8(0).u8(0);
    out.bytes(b"TXMP").u32(70).u32(second.len() as u32).u32(second.len() as u32).u16(1).u8(0).u8(0);
    let mut bytes = out.finish();
    bytes.resize(130, 0xAA);
    bytes[70..70 + second.len()].copy_from_slice(&second);
    bytes[100..100 + first.len()].copy_from_slice(&first);

    let container = Container::parse(Bytes::from(bytes.clone())).unwrap();
    let mips = container.find_all(tags::TEXTURE_MIP);
    assert_eq!(container.raw(mips[0]).as_ref(), first.as_slice());
    assert_eq!(container.raw(mips[1]).as_ref(), second.as_slice());
    assert_eq!(container.to_bytes(), bytes);
}

#[test]
fn test_overrun_maps_to_malformed_container() {
    let mut bytes = vec![0u8; 100];
    let mut header = PayloadWriter::new();
    header
        .bytes(b"IWAC")
        .u32(2)
        .u8(AssetKind::Mesh.to_u8())
        .u8(0)
        .u16(0)
        .u32(1)
        .u32(20)
        .bytes(b"VPOS")
        .u32(50)
        .u32(1000)
        .u32(1000)
        .u16(0)
        .u8(0)
        .u8(0);
    let header = header.finish();
    bytes[..header.len()].copy_from_slice(&header);

    let err: iwbridge_core::Error = Container::parse(Bytes::from(bytes)).unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
    assert_eq!(err.offset(), Some(50));
}

#[test]
fn test_version_out_of_range_maps_to_unsupported_version() {
    let mut bytes = ContainerBuilder::new(AssetKind::Physics)
        .chunk(tags::PHYSICS_SHAPES, 0u32.to_le_bytes().to_vec())
        .build()
        .unwrap();
    bytes[4..8].copy_from_slice(&0u32.to_le_bytes());

    let err: iwbridge_core::Error = Container::parse(Bytes::from(bytes)).unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
}

#[test]
fn test_version_one_rejects_compressed_entries() {
    let mut bytes = ContainerBuilder::new(AssetKind::Texture)
        .chunk_with(tags::TEXTURE_MIP, 0, Codec::Zstd, vec![1u8; 64])
        .build()
        .unwrap();
    bytes[4..8].copy_from_slice(&1u32.to_le_bytes());

    assert!(matches!(
        Container::parse(Bytes::from(bytes)),
        Err(ParseError::CorruptedData { .. })
    ));
}

#[test]
fn test_strict_validation_rejects_foreign_chunks() {
    let bytes = ContainerBuilder::new(AssetKind::Physics)
        .chunk(tags::PHYSICS_SHAPES, 0u32.to_le_bytes().to_vec())
        .chunk(tags::TEXTURE_MIP, vec![0u8; 8])
        .build()
        .unwrap();

    assert!(Container::parse(Bytes::from(bytes.clone())).is_ok());

    let options = ParseOptions {
        strict_validation: true,
        ..ParseOptions::default()
    };
    let strict = Container::parse_with(Bytes::from(bytes), &options, &iwbridge_parsers::GLOBAL_CHUNKS);
    assert!(strict.is_err());
}

#[test]
fn test_containers_inside_pack() {
    let physics = ContainerBuilder::new(AssetKind::Physics)
        .chunk(tags::PHYSICS_SHAPES, 0u32.to_le_bytes().to_vec())
        .chunk(tags::NAME, b"empty_body".to_vec())
        .build()
        .unwrap();

    let mut writer = PackWriter::new();
    writer
        .add("Physics/empty_body.iwa", &physics, Codec::Zstd)
        .unwrap();
    let pack = PackParser::new().parse(Bytes::from(writer.finish())).unwrap();

    let entry = pack.files().next().unwrap();
    let data = pack.read_entry(entry).unwrap();
    let asset = SourceAsset::read(
        AssetId::new("pack").join("Physics/empty_body"),
        data,
        &ParseOptions::default(),
    )
    .unwrap();

    assert_eq!(asset.id.as_str(), "pack/Physics/empty_body");
    match asset.parse_record().unwrap() {
        AssetRecord::Physics(record) => {
            assert_eq!(record.name, "empty_body");
            assert!(record.shapes.is_empty());
        }
        other => panic!("unexpected record {:?}", other.kind()),
    }
}

#[test]
fn test_unknown_tag_is_displayed_escaped() {
    let tag = ChunkTag([b'A', 0x01, b'C', b'D']);
    assert!(tag.to_string().starts_with('A'));
    assert_ne!(tag.to_string(), "A\u{1}CD");
}
