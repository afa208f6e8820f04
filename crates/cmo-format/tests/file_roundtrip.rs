//! Integration tests for composition file save and load.
//!
//! Files are produced by the writer and read back through the reader, with
//! hand patched headers where a test needs a damaged or unusual image.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use cmo_format::compression::{compute_crc, compute_crc_chain};
use cmo_format::header::RAW_HEADER_LEN;
use cmo_format::{
    ClassId, CmoError, Context, EncodingList, FileReader, FileWriter, ObjectId, ObjectKind,
    RawFileHeader, STATESAVE_ALL, StateChunk, Visibility, WriteMode,
};

/// Context with utf-8 names and a private temp folder.
fn context(temp: &tempfile::TempDir) -> Context {
    let mut ctx = Context::new()
        .unwrap()
        .with_encodings(EncodingList::parse("utf-8").unwrap());
    ctx.path_manager_mut().set_temp_folder(temp.path()).unwrap();
    ctx
}

/// Context collecting its diagnostics.
fn recording_context(temp: &tempfile::TempDir) -> (Context, Rc<RefCell<Vec<String>>>) {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&lines);
    let ctx = context(temp).with_output(move |line| sink.borrow_mut().push(line.to_string()));
    (ctx, lines)
}

fn tagged_chunk(tag: u32, words: &[u32]) -> StateChunk {
    let mut chunk = StateChunk::default();
    chunk.set_class_id(ClassId::MESH);
    chunk.start_write().unwrap();
    chunk.write_identifier(tag).unwrap();
    for word in words {
        chunk.write_struct(word).unwrap();
    }
    chunk.stop_write();
    chunk
}

/// Create an unknown-class object carrying `chunk` verbatim.
fn opaque_object(ctx: &mut Context, name: &str, chunk: StateChunk) -> ObjectId {
    let id = ctx.create_object(ClassId::MESH, name);
    ctx.object_mut(id).unwrap().kind = ObjectKind::Opaque { chunk: Some(chunk) };
    id
}

fn save_all(ctx: &mut Context) -> Vec<u8> {
    let mut writer = FileWriter::new();
    let ids = ctx.object_ids();
    writer.add_saved_objects(ctx, &ids, STATESAVE_ALL);
    writer.save_to_bytes(ctx).unwrap()
}

/// Replace the raw header of a version 8 image, recomputing the checksum.
fn patch_header(bytes: &mut Vec<u8>, edit: impl FnOnce(&mut RawFileHeader)) {
    let mut header = RawFileHeader::parse(bytes).unwrap();
    edit(&mut header);
    let hdr_end = RAW_HEADER_LEN + header.hdr1_pack_size as usize;
    let data_end = hdr_end + header.data_pack_size as usize;
    header.crc = compute_crc_chain(&[
        header.with_crc_cleared().to_bytes().as_slice(),
        &bytes[RAW_HEADER_LEN..hdr_end],
        &bytes[hdr_end..data_end],
    ]);
    bytes[..RAW_HEADER_LEN].copy_from_slice(&header.to_bytes());
}

#[test]
fn test_empty_document_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let mut ctx = context(&temp);
    let bytes = FileWriter::new().save_to_bytes(&mut ctx).unwrap();

    let mut reader = FileReader::new();
    reader.shallow_load_bytes(&mut ctx, &bytes).unwrap();
    let info = reader.file_info();
    assert_eq!(info.file_version, 8);
    assert_eq!(info.object_count, 0);
    assert_eq!(info.manager_count, 0);
    assert_eq!(info.file_size, bytes.len() as u64);
    assert!(reader.objects().is_empty());
    assert!(reader.included_files().is_empty());
}

#[test]
fn test_compressed_object_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let mut ctx = context(&temp).with_write_mode(WriteMode::WHOLECOMPRESSED);
    opaque_object(&mut ctx, "A", tagged_chunk(0x1000, &[42]));
    let path = temp.path().join("one.nmo");
    let mut writer = FileWriter::new();
    assert!(writer.add_saved_object(&ctx, ObjectId(1), STATESAVE_ALL));
    writer.save(&mut ctx, &path).unwrap();

    let mut loaded = context(&temp);
    let mut reader = FileReader::new();
    reader.deep_load(&mut loaded, &path).unwrap();
    assert_eq!(reader.file_info().write_mode, WriteMode::WHOLECOMPRESSED);
    assert_eq!(reader.objects()[0].name, "A");

    let created = reader.objects()[0].created_id;
    let object = loaded.object(created).unwrap();
    assert_eq!(object.class_id(), ClassId::MESH);
    let ObjectKind::Opaque { chunk: Some(kept) } = &object.kind else {
        panic!("expected an opaque object");
    };
    let mut kept = kept.clone();
    kept.start_read().unwrap();
    assert!(kept.seek_identifier(0x1000));
    assert_eq!(kept.read_struct::<u32>().unwrap(), 42);
}

#[test]
fn test_crc_corruption_detected() {
    let temp = tempfile::tempdir().unwrap();
    let (mut ctx, lines) = recording_context(&temp);
    opaque_object(&mut ctx, "A", tagged_chunk(0x1000, &[42]));
    let mut bytes = save_all(&mut ctx);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let result = FileReader::new().shallow_load_bytes(&mut ctx, &bytes);
    assert!(matches!(result, Err(CmoError::CrcMismatch { .. })));
    assert!(lines.borrow().iter().any(|line| line == "Virtools file CRC error."));
}

#[test]
fn test_crc_field_corruption_detected() {
    let temp = tempfile::tempdir().unwrap();
    let (mut ctx, lines) = recording_context(&temp);
    opaque_object(&mut ctx, "A", tagged_chunk(0x1000, &[42]));
    let mut bytes = save_all(&mut ctx);
    // stored checksum occupies bytes 8..12
    bytes[8] ^= 0x01;

    let result = FileReader::new().shallow_load_bytes(&mut ctx, &bytes);
    assert!(matches!(result, Err(CmoError::CrcMismatch { .. })));
    assert!(lines.borrow().iter().any(|line| line == "Virtools file CRC error."));
}

#[test]
fn test_full_checksum_accepted() {
    let temp = tempfile::tempdir().unwrap();
    let (mut ctx, lines) = recording_context(&temp);
    opaque_object(&mut ctx, "A", tagged_chunk(0x1000, &[1, 2, 3]));
    let bytes = save_all(&mut ctx);

    let header = RawFileHeader::parse(&bytes).unwrap();
    let hdr_end = RAW_HEADER_LEN + header.hdr1_pack_size as usize;
    let chain = compute_crc_chain(&[
        header.with_crc_cleared().to_bytes().as_slice(),
        &bytes[RAW_HEADER_LEN..hdr_end],
        &bytes[hdr_end..],
    ]);
    assert_eq!(header.crc, chain);

    let mut reader = FileReader::new();
    reader.shallow_load_bytes(&mut ctx, &bytes).unwrap();
    assert!(reader.objects()[0].chunk.is_some());
    assert!(!lines.borrow().iter().any(|line| line == "Virtools file CRC error."));
}

#[test]
fn test_data_only_checksum_accepted() {
    let temp = tempfile::tempdir().unwrap();
    let (mut ctx, lines) = recording_context(&temp);
    opaque_object(&mut ctx, "A", tagged_chunk(0x1000, &[1, 2, 3]));
    let mut bytes = save_all(&mut ctx);

    let mut header = RawFileHeader::parse(&bytes).unwrap();
    let data_start = RAW_HEADER_LEN + header.hdr1_pack_size as usize;
    header.crc = compute_crc(&bytes[data_start..], 0);
    bytes[..RAW_HEADER_LEN].copy_from_slice(&header.to_bytes());

    let mut reader = FileReader::new();
    reader.shallow_load_bytes(&mut ctx, &bytes).unwrap();
    assert!(reader.objects()[0].chunk.is_some());
    assert!(!lines.borrow().iter().any(|line| line == "Virtools file CRC error."));
}

#[test]
fn test_truncated_data_section_is_not_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let (mut ctx, lines) = recording_context(&temp);
    for name in ["first", "second", "third"] {
        opaque_object(&mut ctx, name, tagged_chunk(0x1000, &[7, 8, 9, 10]));
    }
    let mut bytes = save_all(&mut ctx);
    bytes.truncate(bytes.len() - 10);
    patch_header(&mut bytes, |header| {
        header.data_pack_size -= 10;
        header.data_unpack_size -= 10;
    });

    let mut reader = FileReader::new();
    reader.shallow_load_bytes(&mut ctx, &bytes).unwrap();
    let objects = reader.objects();
    assert_eq!(objects.len(), 3);
    assert!(objects[0].chunk.is_some());
    assert!(objects[1].chunk.is_some());
    assert!(objects[2].chunk.is_none());
    assert!(lines.borrow().iter().any(|line| line.contains("third")));
}

#[test]
fn test_shallow_copy_keeps_missing_chunk_empty() {
    let temp = tempfile::tempdir().unwrap();
    let (mut source, _) = recording_context(&temp);
    for name in ["first", "second", "third"] {
        opaque_object(&mut source, name, tagged_chunk(0x1000, &[7, 8, 9, 10]));
    }
    let mut bytes = save_all(&mut source);
    bytes.truncate(bytes.len() - 10);
    patch_header(&mut bytes, |header| {
        header.data_pack_size -= 10;
        header.data_unpack_size -= 10;
    });

    // live objects whose ids collide with the file ids 1..=3
    let (mut ctx, _) = recording_context(&temp);
    let groups: Vec<ObjectId> = ["g1", "g2", "g3"]
        .iter()
        .map(|name| ctx.create_object(ClassId::GROUP, name))
        .collect();
    assert_eq!(groups, [ObjectId(1), ObjectId(2), ObjectId(3)]);

    let mut reader = FileReader::new();
    reader.shallow_load_bytes(&mut ctx, &bytes).unwrap();
    assert!(reader.objects()[2].chunk.is_none());
    let resaved = FileWriter::from_reader(&reader, &ctx)
        .save_to_bytes(&mut ctx)
        .unwrap();

    let mut again = FileReader::new();
    again.shallow_load_bytes(&mut ctx, &resaved).unwrap();
    let objects = again.objects();
    assert_eq!(objects.len(), 3);
    for object in &objects[..2] {
        assert_eq!(object.class_id, ClassId::MESH);
        assert_eq!(object.chunk.as_ref().unwrap().class_id(), ClassId::MESH);
    }
    assert_eq!(objects[2].name, "third");
    assert_eq!(objects[2].class_id, ClassId::MESH);
    assert!(objects[2].chunk.is_none());
}

#[test]
fn test_version_window() {
    let temp = tempfile::tempdir().unwrap();
    let mut ctx = context(&temp);
    let bytes = FileWriter::new().save_to_bytes(&mut ctx).unwrap();

    for version in [6, 10] {
        let mut patched = bytes.clone();
        patch_header(&mut patched, |header| header.file_version = version);
        let result = FileReader::new().shallow_load_bytes(&mut ctx, &patched);
        assert!(
            matches!(result, Err(CmoError::ObsoleteVersion { version: v }) if v == version),
            "version {version}"
        );
    }

    let mut patched = bytes.clone();
    patch_header(&mut patched, |header| header.file_version = 9);
    let mut reader = FileReader::new();
    reader.shallow_load_bytes(&mut ctx, &patched).unwrap();
    assert_eq!(reader.file_info().file_version, 9);
}

#[test]
fn test_nonzero_reserved_field_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let mut ctx = context(&temp);
    let mut bytes = FileWriter::new().save_to_bytes(&mut ctx).unwrap();
    patch_header(&mut bytes, |header| header.zero = 1);
    assert!(matches!(
        FileReader::new().shallow_load_bytes(&mut ctx, &bytes),
        Err(CmoError::InvalidFile { .. })
    ));
}

/// Version 7 image holding one MESH record named "v7".
///
/// `declared_data_size` overrides the data size recorded in the header.
fn version_7_image(declared_data_size: Option<u32>) -> Vec<u8> {
    let chunk = tagged_chunk(0x1000, &[5]).to_bytes();

    let mut table = Vec::new();
    for word in [3u32, ClassId::MESH.0 as u32, 0, 2] {
        table.extend_from_slice(&word.to_le_bytes());
    }
    table.extend_from_slice(b"v7");

    let mut body = Vec::new();
    body.extend_from_slice(&3u32.to_le_bytes()); // max id saved
    body.extend_from_slice(&1u32.to_le_bytes()); // object count
    body.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
    body.extend_from_slice(&chunk);

    let header = RawFileHeader {
        crc: compute_crc(&body, 0),
        ck_version: 0x1302_2002,
        file_version: 7,
        data_pack_size: declared_data_size.unwrap_or(body.len() as u32),
        data_unpack_size: body.len() as u32,
        object_count: 1,
        max_id_saved: 3,
        ..RawFileHeader::default()
    };
    let mut bytes = header.to_bytes().to_vec();
    bytes.extend_from_slice(&table);
    bytes.extend_from_slice(&body);
    bytes
}

fn assert_version_7_record(reader: &FileReader) {
    let object = &reader.objects()[0];
    assert_eq!(object.object_id, ObjectId(3));
    assert_eq!(object.name, "v7");
    let mut chunk = object.chunk.clone().unwrap();
    chunk.start_read().unwrap();
    assert!(chunk.seek_identifier(0x1000));
    assert_eq!(chunk.read_struct::<u32>().unwrap(), 5);
}

#[test]
fn test_version_7_layout() {
    let bytes = version_7_image(None);

    let temp = tempfile::tempdir().unwrap();
    let mut ctx = context(&temp);
    let mut reader = FileReader::new();
    reader.shallow_load_bytes(&mut ctx, &bytes).unwrap();
    assert_eq!(reader.file_info().hdr1_pack_size, 0);
    assert_eq!(reader.document().max_id_saved, 3);
    assert_version_7_record(&reader);
}

#[test]
fn test_version_7_ignores_declared_data_size() {
    let temp = tempfile::tempdir().unwrap();
    let mut ctx = context(&temp);
    for declared in [0, 7, 0x0010_0000] {
        let bytes = version_7_image(Some(declared));
        let mut reader = FileReader::new();
        reader.shallow_load_bytes(&mut ctx, &bytes).unwrap();
        assert_eq!(reader.file_info().data_pack_size, declared);
        assert_version_7_record(&reader);
    }
}

#[test]
fn test_included_files_extracted() {
    let source = tempfile::tempdir().unwrap();
    let texture = source.path().join("wood.bmp");
    fs::write(&texture, b"BM fake texture").unwrap();

    let mut ctx = context(&source);
    let mut writer = FileWriter::new();
    assert!(writer.add_saved_file(&texture));
    let bytes = writer.save_to_bytes(&mut ctx).unwrap();

    let extracted = tempfile::tempdir().unwrap();
    let mut loaded = context(&extracted);
    let mut reader = FileReader::new();
    reader.shallow_load_bytes(&mut loaded, &bytes).unwrap();
    assert_eq!(reader.included_files(), &["wood.bmp".to_string()]);
    assert_eq!(
        fs::read(extracted.path().join("wood.bmp")).unwrap(),
        b"BM fake texture"
    );
}

#[test]
fn test_reader_is_single_use() {
    let temp = tempfile::tempdir().unwrap();
    let mut ctx = context(&temp);
    let bytes = FileWriter::new().save_to_bytes(&mut ctx).unwrap();
    let mut reader = FileReader::new();
    reader.shallow_load_bytes(&mut ctx, &bytes).unwrap();
    assert!(reader.is_done());
    assert!(matches!(
        reader.shallow_load_bytes(&mut ctx, &bytes),
        Err(CmoError::Cancelled { .. })
    ));
}

#[test]
fn test_group_members_remapped() {
    let temp = tempfile::tempdir().unwrap();
    let mut ctx = context(&temp);
    let a = ctx.create_object(ClassId::OBJECT, "a");
    let b = ctx.create_object(ClassId::OBJECT, "b");
    let group = ctx.create_object(ClassId::GROUP, "g");
    ctx.object_mut(b).unwrap().visibility = Visibility::Hidden;
    ctx.object_mut(group).unwrap().kind = ObjectKind::Group {
        members: vec![a, b],
    };
    let bytes = save_all(&mut ctx);

    let mut loaded = context(&temp);
    let placeholder = loaded.create_object(ClassId::OBJECT, "already here");
    let mut reader = FileReader::new();
    reader.deep_load_bytes(&mut loaded, &bytes).unwrap();
    assert!(reader.is_deep());

    let created: Vec<ObjectId> = reader.objects().iter().map(|o| o.created_id).collect();
    assert!(!created.contains(&placeholder));
    assert!(reader.objects().iter().all(|o| o.chunk.is_none()));
    assert_eq!(loaded.object(created[1]).unwrap().visibility, Visibility::Hidden);
    assert_eq!(
        loaded.object(created[2]).unwrap().members(),
        &[created[0], created[1]]
    );
}

#[test]
fn test_shallow_copy_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let mut ctx = context(&temp);
    opaque_object(&mut ctx, "mesh", tagged_chunk(0x2000, &[1, 2]));
    let group = ctx.create_object(ClassId::GROUP, "g");
    ctx.object_mut(group).unwrap().kind = ObjectKind::Group {
        members: vec![ObjectId(1)],
    };
    let original = save_all(&mut ctx);

    let mut reader = FileReader::new();
    reader.shallow_load_bytes(&mut ctx, &original).unwrap();
    let mut writer = FileWriter::from_reader(&reader, &ctx);
    let copy = writer.save_to_bytes(&mut ctx).unwrap();

    let mut again = FileReader::new();
    again.shallow_load_bytes(&mut ctx, &copy).unwrap();
    assert_eq!(again.document().max_id_saved, reader.document().max_id_saved);
    for (left, right) in reader.objects().iter().zip(again.objects()) {
        assert_eq!(left.object_id, right.object_id);
        assert_eq!(left.class_id, right.class_id);
        assert_eq!(left.name, right.name);
        let (left, right) = (left.chunk.as_ref().unwrap(), right.chunk.as_ref().unwrap());
        assert_eq!(left.data_words(), right.data_words());
        assert_eq!(left.object_refs(), right.object_refs());
    }
}

#[test]
fn test_deep_copy_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let mut ctx = context(&temp);
    ctx.create_object(ClassId::OBJECT, "a");
    ctx.create_object(ClassId::SCENEOBJECT, "b");
    let bytes = save_all(&mut ctx);

    let mut loaded = context(&temp);
    let mut reader = FileReader::new();
    reader.deep_load_bytes(&mut loaded, &bytes).unwrap();
    let mut writer = FileWriter::from_reader(&reader, &loaded);
    assert_eq!(writer.objects().len(), 2);
    let copy = writer.save_to_bytes(&mut loaded).unwrap();

    let mut again = FileReader::new();
    again.shallow_load_bytes(&mut loaded, &copy).unwrap();
    let names: Vec<&str> = again.objects().iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
}
