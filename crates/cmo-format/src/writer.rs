//! Composition file writer.
//!
//! Produces version 8 files. Layout on disk:
//!
//! | Part           | Content                                          |
//! |----------------|--------------------------------------------------|
//! | raw header     | 64 bytes, see [`RawFileHeader`]                  |
//! | header section | object table, plugin dependencies, file count    |
//! | data section   | manager chunks, then object chunks               |
//! | included files | `{name_len, name, body_len, body}` per file      |
//!
//! Both sections are deflated independently when the context write mode
//! asks for compression.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info, info_span, warn};

use crate::chunk::StateChunk;
use crate::compression::{compute_crc_chain, pack};
use crate::context::Context;
use crate::cursor::ByteCursor;
use crate::document::{FileObject, ManagerData, PluginDependency};
use crate::error::{CmoError, Result};
use crate::header::{RAW_HEADER_LEN, RawFileHeader};
use crate::reader::FileReader;
use crate::types::{CK_VERSION, CURRENT_FILE_VERSION, ObjectId, PRODUCT_BUILD, PRODUCT_VERSION};
use crate::visitor::FileVisitor;

/// Size of the included file placeholder in the header section.
const INCLUDED_PLACEHOLDER_LEN: usize = 8;

/// Collects objects and files, then writes them as one composition file.
///
/// Like [`FileReader`], a writer saves once; later saves fail with
/// [`CmoError::Cancelled`].
#[derive(Debug, Default)]
pub struct FileWriter {
    done: bool,
    copy_from_reader: bool,
    objects: Vec<FileObject>,
    managers: Vec<ManagerData>,
    dependencies: Vec<PluginDependency>,
    included_files: Vec<PathBuf>,
    max_id: u32,
    visitor: Rc<FileVisitor>,
}

/// Fully encoded parts of a file, before concatenation.
struct EncodedFile {
    header: RawFileHeader,
    hdr_section: Vec<u8>,
    data_section: Vec<u8>,
    included: Vec<(Vec<u8>, Vec<u8>)>,
}

impl FileWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare a writer re-emitting what `reader` loaded.
    ///
    /// After a deep load the live objects are saved again. After a shallow
    /// load the raw chunks, managers and dependencies are copied as they
    /// are and managers of `ctx` are not consulted on save.
    #[must_use]
    pub fn from_reader(reader: &FileReader, ctx: &Context) -> Self {
        let mut writer = Self::new();
        let document = reader.document();

        if reader.is_deep() {
            for object in &document.objects {
                if !object.created_id.is_null() {
                    writer.add_saved_object(ctx, object.created_id, object.save_flags);
                }
            }
        } else {
            writer.copy_from_reader = true;
            writer.max_id = document.max_id_saved;
            writer.objects = document
                .objects
                .iter()
                .map(|object| {
                    let mut copy = object.clone();
                    copy.created_id = ObjectId::NULL;
                    if let Some(chunk) = copy.chunk.as_mut() {
                        if chunk.visitor().is_some() {
                            chunk.bind_visitor(Some(Rc::clone(&writer.visitor)));
                        }
                    }
                    copy
                })
                .collect();
            writer.managers = document.managers.clone();
            writer.dependencies = document.dependencies.clone();
        }

        for name in &document.included_files {
            if let Some(file_name) = Path::new(name).file_name() {
                writer
                    .included_files
                    .push(ctx.path_manager().temp_file_path(&file_name.to_string_lossy()));
            }
        }
        writer
    }

    /// Queue a live object. Returns false after a save, for unknown ids
    /// and for ids already queued.
    pub fn add_saved_object(&mut self, ctx: &Context, id: ObjectId, save_flags: u32) -> bool {
        if self.done || self.objects.iter().any(|object| object.object_id == id) {
            return false;
        }
        let Some(live) = ctx.object(id) else {
            return false;
        };
        let mut object = FileObject::new(id, live.class_id(), live.name());
        object.created_id = id;
        object.save_flags = save_flags;
        self.objects.push(object);
        self.max_id = self.max_id.max(id.get());
        true
    }

    /// Queue several live objects, returning how many were accepted.
    pub fn add_saved_objects(&mut self, ctx: &Context, ids: &[ObjectId], save_flags: u32) -> usize {
        ids.iter()
            .filter(|&&id| self.add_saved_object(ctx, id, save_flags))
            .count()
    }

    /// Queue a file to embed after the data section.
    pub fn add_saved_file(&mut self, path: impl Into<PathBuf>) -> bool {
        if self.done {
            return false;
        }
        self.included_files.push(path.into());
        true
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn objects(&self) -> &[FileObject] {
        &self.objects
    }

    #[must_use]
    pub fn included_files(&self) -> &[PathBuf] {
        &self.included_files
    }

    /// Encode and write the file to `path`.
    pub fn save(&mut self, ctx: &mut Context, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let _span = info_span!("save", path = %path.display()).entered();
        self.begin()?;

        // fail before any encoding work when the destination is unwritable
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|_| CmoError::CantWriteFile {
                path: path.to_path_buf(),
            })?;

        let encoded = self.encode(ctx)?;
        let file = File::create(path).map_err(|_| CmoError::CantWriteFile {
            path: path.to_path_buf(),
        })?;
        let mut out = BufWriter::new(file);
        encoded.write_to(&mut out)?;
        out.flush()?;
        info!(
            objects = self.objects.len(),
            bytes = encoded.len(),
            "file saved"
        );
        Ok(())
    }

    /// Encode the file into memory.
    pub fn save_to_bytes(&mut self, ctx: &mut Context) -> Result<Vec<u8>> {
        self.begin()?;
        let encoded = self.encode(ctx)?;
        let mut out = Vec::with_capacity(encoded.len());
        encoded.write_to(&mut out)?;
        Ok(out)
    }

    fn begin(&mut self) -> Result<()> {
        if self.done {
            return Err(CmoError::cancelled("writer has already saved"));
        }
        self.done = true;
        Ok(())
    }

    fn encode(&mut self, ctx: &mut Context) -> Result<EncodedFile> {
        let saved_ids: Vec<ObjectId> = self.objects.iter().map(|object| object.object_id).collect();
        self.visitor.set_saved_ids(&saved_ids);

        self.serialize_objects(ctx);
        if !self.copy_from_reader {
            self.serialize_managers(ctx);
        }
        let included = self.read_included_files(ctx);

        let names: Vec<Vec<u8>> = self
            .objects
            .iter()
            .map(|object| {
                let (native, converted) = ctx.encodings().to_native_or_copy(&object.name);
                if !converted {
                    report(
                        ctx,
                        &format!("Fail to convert object name \"{}\", bytes copied.", object.name),
                    );
                }
                native
            })
            .collect();

        let hdr_len = names.iter().map(|name| 16 + name.len()).sum::<usize>()
            + 4
            + self
                .dependencies
                .iter()
                .map(PluginDependency::encoded_len)
                .sum::<usize>()
            + INCLUDED_PLACEHOLDER_LEN;
        let managers_len: usize = self
            .managers
            .iter()
            .map(|manager| 12 + manager.chunk.as_ref().map_or(0, StateChunk::encoded_len))
            .sum();
        let objects_len: usize = self
            .objects
            .iter()
            .map(|object| object.pack_size as usize + 4)
            .sum();

        let mut file_index = RAW_HEADER_LEN + hdr_len + managers_len;
        for object in &mut self.objects {
            object.file_index = to_u32(file_index, "file index")?;
            file_index += object.pack_size as usize + 4;
        }

        let hdr_section = self.encode_header_section(&names, hdr_len, included.len())?;
        let data_section = self.encode_data_section(managers_len + objects_len)?;
        debug!(
            header = hdr_section.len(),
            data = data_section.len(),
            "sections encoded"
        );

        let write_mode = ctx.write_mode();
        let (hdr_stored, data_stored) = if write_mode.is_compressed() {
            let level = ctx.compression_level();
            (
                deflate_or_keep(&hdr_section, level),
                deflate_or_keep(&data_section, level),
            )
        } else {
            (hdr_section.clone(), data_section.clone())
        };

        let mut header = RawFileHeader {
            ck_version: CK_VERSION,
            file_version: CURRENT_FILE_VERSION,
            write_mode: write_mode.0,
            hdr1_pack_size: to_u32(hdr_stored.len(), "header section")?,
            hdr1_unpack_size: to_u32(hdr_section.len(), "header section")?,
            data_pack_size: to_u32(data_stored.len(), "data section")?,
            data_unpack_size: to_u32(data_section.len(), "data section")?,
            manager_count: to_u32(self.managers.len(), "manager count")?,
            object_count: to_u32(self.objects.len(), "object count")?,
            max_id_saved: self.max_id,
            product_version: PRODUCT_VERSION,
            product_build: PRODUCT_BUILD,
            ..RawFileHeader::default()
        };
        header.crc = compute_crc_chain(&[header.to_bytes().as_slice(), &hdr_stored, &data_stored]);

        Ok(EncodedFile {
            header,
            hdr_section: hdr_stored,
            data_section: data_stored,
            included,
        })
    }

    /// Save every live object that has no chunk yet.
    ///
    /// Records copied from a reader have no live object behind them, so a
    /// copied record without a chunk stays empty.
    fn serialize_objects(&mut self, ctx: &mut Context) {
        for object in &mut self.objects {
            if object.chunk.is_none() && !object.created_id.is_null() {
                let mut chunk = StateChunk::new(Some(Rc::clone(&self.visitor)));
                let saved = chunk.start_write().and_then(|()| {
                    let result = ctx.save_object(object.created_id, &mut chunk);
                    chunk.stop_write();
                    result
                });
                match saved {
                    Ok(()) => object.chunk = Some(chunk),
                    Err(err) => report(
                        ctx,
                        &format!("Fail to save object {} \"{}\": {err}", object.object_id, object.name),
                    ),
                }
            }
            object.pack_size = object
                .chunk
                .as_ref()
                .map_or(0, |chunk| chunk.encoded_len() as u32);
        }
    }

    fn serialize_managers(&mut self, ctx: &mut Context) {
        self.managers.clear();
        for index in 0..ctx.managers().len() {
            let guid = ctx.managers()[index].guid;
            let mut chunk = StateChunk::new(Some(Rc::clone(&self.visitor)));
            let saved = chunk.start_write().and_then(|()| {
                let result = ctx.save_manager(index, &mut chunk);
                chunk.stop_write();
                result
            });
            match saved {
                Ok(()) => self.managers.push(ManagerData {
                    guid,
                    chunk: Some(chunk),
                }),
                Err(err) => report(ctx, &format!("Fail to save manager {guid}: {err}")),
            }
        }
    }

    /// Load queued files, dropping the unreadable ones.
    fn read_included_files(&self, ctx: &mut Context) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut included = Vec::with_capacity(self.included_files.len());
        for path in &self.included_files {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            match fs::read(path) {
                Ok(body) => {
                    let (native, _) = ctx.encodings().to_native_or_copy(&name);
                    included.push((native, body));
                }
                Err(err) => report(
                    ctx,
                    &format!("Fail to open included file: {} ({err})", path.display()),
                ),
            }
        }
        included
    }

    fn encode_header_section(
        &self,
        names: &[Vec<u8>],
        len: usize,
        included_count: usize,
    ) -> Result<Vec<u8>> {
        let mut cursor = ByteCursor::with_len(len);
        for (object, name) in self.objects.iter().zip(names) {
            cursor.write_u32(object.object_id.get())?;
            cursor.write_i32(object.class_id.0)?;
            cursor.write_u32(object.file_index)?;
            cursor.write_u32(to_u32(name.len(), "object name")?)?;
            cursor.write_bytes(name)?;
        }

        cursor.write_u32(to_u32(self.dependencies.len(), "dependency count")?)?;
        for dependency in &self.dependencies {
            cursor.write_u32(dependency.category.raw())?;
            cursor.write_u32(to_u32(dependency.guids.len(), "dependency guids")?)?;
            for guid in &dependency.guids {
                cursor.write_u32(guid.d1)?;
                cursor.write_u32(guid.d2)?;
            }
        }

        cursor.write_i32(4)?;
        cursor.write_u32(to_u32(included_count, "included file count")?)?;
        Ok(cursor.into_inner())
    }

    fn encode_data_section(&self, len: usize) -> Result<Vec<u8>> {
        let mut cursor = ByteCursor::with_len(len);
        for manager in &self.managers {
            cursor.write_u32(manager.guid.d1)?;
            cursor.write_u32(manager.guid.d2)?;
            write_chunk_record(&mut cursor, manager.chunk.as_ref())?;
        }
        for object in &self.objects {
            write_chunk_record(&mut cursor, object.chunk.as_ref())?;
        }
        Ok(cursor.into_inner())
    }
}

impl EncodedFile {
    fn len(&self) -> usize {
        RAW_HEADER_LEN
            + self.hdr_section.len()
            + self.data_section.len()
            + self
                .included
                .iter()
                .map(|(name, body)| 8 + name.len() + body.len())
                .sum::<usize>()
    }

    fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(&self.header.to_bytes())?;
        out.write_all(&self.hdr_section)?;
        out.write_all(&self.data_section)?;
        for (name, body) in &self.included {
            out.write_all(&to_u32(name.len(), "included file name")?.to_le_bytes())?;
            out.write_all(name)?;
            out.write_all(&to_u32(body.len(), "included file")?.to_le_bytes())?;
            out.write_all(body)?;
        }
        Ok(())
    }
}

fn write_chunk_record(cursor: &mut ByteCursor<'_>, chunk: Option<&StateChunk>) -> Result<()> {
    match chunk {
        Some(chunk) => {
            let bytes = chunk.to_bytes();
            cursor.write_u32(to_u32(bytes.len(), "chunk")?)?;
            cursor.write_bytes(&bytes)
        }
        None => cursor.write_u32(0),
    }
}

fn deflate_or_keep(section: &[u8], level: u32) -> Vec<u8> {
    match pack(section, level) {
        Ok(packed) => packed,
        Err(err) => {
            warn!(%err, "section does not deflate, storing it as is");
            section.to_vec()
        }
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| CmoError::invalid_parameter(format!("{what} of {value} bytes exceeds 4 GiB")))
}

fn report(ctx: &mut Context, message: &str) {
    warn!("{message}");
    ctx.output(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassId, WriteMode};

    fn context() -> Context {
        Context::new().unwrap()
    }

    #[test]
    fn test_add_saved_object_rules() {
        let mut ctx = context();
        let a = ctx.create_object(ClassId::OBJECT, "a");
        let b = ctx.create_object(ClassId::GROUP, "b");
        let mut writer = FileWriter::new();
        assert!(writer.add_saved_object(&ctx, b, 0));
        assert!(!writer.add_saved_object(&ctx, b, 0));
        assert!(!writer.add_saved_object(&ctx, ObjectId(42), 0));
        assert_eq!(writer.add_saved_objects(&ctx, &[a, b], 0), 1);
        assert_eq!(writer.objects().len(), 2);
        assert_eq!(writer.max_id, 2);

        writer.save_to_bytes(&mut ctx).unwrap();
        assert!(writer.is_done());
        assert!(!writer.add_saved_object(&ctx, a, 0));
        assert!(!writer.add_saved_file("x.bmp"));
        assert!(matches!(
            writer.save_to_bytes(&mut ctx),
            Err(CmoError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_empty_file_layout() {
        let mut ctx = context();
        let bytes = FileWriter::new().save_to_bytes(&mut ctx).unwrap();
        // dependency count and the included file placeholder
        assert_eq!(bytes.len(), RAW_HEADER_LEN + 4 + 8);

        let header = RawFileHeader::parse(&bytes).unwrap();
        assert_eq!(header.file_version, CURRENT_FILE_VERSION);
        assert_eq!(header.hdr1_pack_size, 12);
        assert_eq!(header.hdr1_unpack_size, 12);
        assert_eq!(header.data_pack_size, 0);
        assert_eq!(header.object_count, 0);
        let computed = compute_crc_chain(&[
            header.with_crc_cleared().to_bytes().as_slice(),
            &bytes[RAW_HEADER_LEN..],
            &[],
        ]);
        assert_eq!(header.crc, computed);
    }

    #[test]
    fn test_file_indices() {
        let mut ctx = context();
        let a = ctx.create_object(ClassId::OBJECT, "ab");
        let b = ctx.create_object(ClassId::OBJECT, "c");
        let mut writer = FileWriter::new();
        writer.add_saved_objects(&ctx, &[a, b], 0);
        writer.save_to_bytes(&mut ctx).unwrap();

        let objects = writer.objects();
        let hdr_len = (16 + 2) + (16 + 1) + 4 + 8;
        assert_eq!(objects[0].file_index as usize, RAW_HEADER_LEN + hdr_len);
        assert_eq!(
            objects[1].file_index,
            objects[0].file_index + objects[0].pack_size + 4
        );
        assert!(objects.iter().all(|object| object.chunk.is_some()));
    }

    #[test]
    fn test_compressed_sections() {
        let mut ctx = context().with_write_mode(WriteMode::WHOLECOMPRESSED);
        for i in 0..32 {
            ctx.create_object(ClassId::OBJECT, &format!("object {i}"));
        }
        let mut writer = FileWriter::new();
        let ids = ctx.object_ids();
        writer.add_saved_objects(&ctx, &ids, 0);
        let bytes = writer.save_to_bytes(&mut ctx).unwrap();
        let header = RawFileHeader::parse(&bytes).unwrap();
        assert_eq!(header.write_mode, WriteMode::WHOLECOMPRESSED.0);
        assert!(header.hdr1_pack_size < header.hdr1_unpack_size);
    }

    #[test]
    fn test_save_to_unwritable_path() {
        let mut ctx = context();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.cmo");
        assert!(matches!(
            FileWriter::new().save(&mut ctx, &path),
            Err(CmoError::CantWriteFile { .. })
        ));
    }

    #[test]
    fn test_unreadable_included_file_dropped() {
        let lines = Rc::new(std::cell::RefCell::new(Vec::<String>::new()));
        let sink = Rc::clone(&lines);
        let mut ctx = context().with_output(move |line| sink.borrow_mut().push(line.to_string()));
        let mut writer = FileWriter::new();
        assert!(writer.add_saved_file("/nonexistent/texture.bmp"));
        let bytes = writer.save_to_bytes(&mut ctx).unwrap();
        assert_eq!(bytes.len(), RAW_HEADER_LEN + 12);
        assert!(lines.borrow()[0].starts_with("Fail to open included file"));
    }
}
