//! Composition file reader.
//!
//! A load runs in two stages:
//!
//! 1. Header: raw header validation, checksum, optional header section
//!    inflation, object table, plugin dependencies, included file count.
//! 2. Data: optional data section inflation, manager chunks, object chunks,
//!    then embedded files which follow the data section.
//!
//! Failures in stage 1 abort the load. A record that fails to decode in
//! stage 2 is left without a chunk and reported through the context output.

use std::borrow::Cow;
use std::fs::{self, File};
use std::path::Path;
use std::rc::Rc;

use memmap2::Mmap;
use tracing::{debug, info_span, trace, warn};

use crate::chunk::StateChunk;
use crate::compression::{compute_crc, compute_crc_chain, unpack};
use crate::context::Context;
use crate::cursor::ByteCursor;
use crate::document::{FileDocument, FileObject, ManagerData, PluginDependency};
use crate::error::{CmoError, Result};
use crate::header::{FileInfo, RAW_HEADER_LEN, RawFileHeader};
use crate::types::{ClassId, Guid, ObjectId, PluginCategory};
use crate::visitor::FileVisitor;

/// Reads one composition file.
///
/// A reader performs a single load; later calls fail with
/// [`CmoError::Cancelled`].
#[derive(Debug, Default)]
pub struct FileReader {
    done: bool,
    deep: bool,
    document: FileDocument,
    visitor: Rc<FileVisitor>,
}

impl FileReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the file into raw chunks without creating objects.
    pub fn shallow_load(&mut self, ctx: &mut Context, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let _span = info_span!("shallow_load", path = %path.display()).entered();
        self.begin()?;
        let mapped = map_file(ctx, path)?;
        self.load_image(ctx, &mapped[..])
    }

    /// Decode the file and create one live object per record.
    pub fn deep_load(&mut self, ctx: &mut Context, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let _span = info_span!("deep_load", path = %path.display()).entered();
        self.begin()?;
        let mapped = map_file(ctx, path)?;
        self.load_image(ctx, &mapped[..])?;
        self.instantiate(ctx);
        Ok(())
    }

    /// Like [`shallow_load`](Self::shallow_load) over an in-memory image.
    pub fn shallow_load_bytes(&mut self, ctx: &mut Context, data: &[u8]) -> Result<()> {
        self.begin()?;
        self.load_image(ctx, data)
    }

    /// Like [`deep_load`](Self::deep_load) over an in-memory image.
    pub fn deep_load_bytes(&mut self, ctx: &mut Context, data: &[u8]) -> Result<()> {
        self.begin()?;
        self.load_image(ctx, data)?;
        self.instantiate(ctx);
        Ok(())
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether objects were instantiated.
    #[must_use]
    pub fn is_deep(&self) -> bool {
        self.deep
    }

    #[must_use]
    pub fn document(&self) -> &FileDocument {
        &self.document
    }

    #[must_use]
    pub fn into_document(self) -> FileDocument {
        self.document
    }

    #[must_use]
    pub fn file_info(&self) -> &FileInfo {
        &self.document.info
    }

    #[must_use]
    pub fn objects(&self) -> &[FileObject] {
        &self.document.objects
    }

    #[must_use]
    pub fn managers(&self) -> &[ManagerData] {
        &self.document.managers
    }

    #[must_use]
    pub fn dependencies(&self) -> &[PluginDependency] {
        &self.document.dependencies
    }

    #[must_use]
    pub fn included_files(&self) -> &[String] {
        &self.document.included_files
    }

    #[must_use]
    pub fn visitor(&self) -> &Rc<FileVisitor> {
        &self.visitor
    }

    fn begin(&mut self) -> Result<()> {
        if self.done {
            return Err(CmoError::cancelled("reader has already loaded a file"));
        }
        self.done = true;
        Ok(())
    }

    fn load_image(&mut self, ctx: &mut Context, data: &[u8]) -> Result<()> {
        let data_start = self.read_header(ctx, data)?;
        self.read_data(ctx, data, data_start)
    }

    /// Stage 1. Returns the offset of the data section.
    fn read_header(&mut self, ctx: &mut Context, data: &[u8]) -> Result<usize> {
        let raw = RawFileHeader::parse(data)?;
        raw.validate()?;
        let info = FileInfo::from_raw(&raw, data.len() as u64);
        debug!(
            file_version = info.file_version,
            write_mode = %info.write_mode,
            objects = info.object_count,
            managers = info.manager_count,
            "file header"
        );
        self.document.info = info;
        self.document.max_id_saved = info.max_id_saved;

        let mut cursor = if info.file_version >= 8 {
            let hdr_end = section_end(RAW_HEADER_LEN, info.hdr1_pack_size, data.len(), "header")?;
            let data_end = section_end(hdr_end, info.data_pack_size, data.len(), "data")?;
            let hdr_section = &data[RAW_HEADER_LEN..hdr_end];
            let data_section = &data[hdr_end..data_end];
            verify_crc(ctx, &raw, hdr_section, data_section)?;

            if info.hdr1_pack_size == info.hdr1_unpack_size {
                ByteCursor::borrowed(hdr_section)
            } else {
                match unpack(hdr_section, info.hdr1_unpack_size as usize) {
                    Ok(inflated) => ByteCursor::owned(inflated),
                    Err(err) => {
                        warn!(%err, "header section does not inflate, reading it as stored");
                        ByteCursor::borrowed(hdr_section)
                    }
                }
            }
        } else {
            let mut cursor = ByteCursor::borrowed(data);
            cursor.seek(RAW_HEADER_LEN)?;
            cursor
        };

        self.read_object_table(ctx, &mut cursor, info.object_count)?;

        if info.file_version >= 8 {
            self.read_dependencies(&mut cursor)?;
            self.read_included_placeholder(&mut cursor, data.len())?;
            Ok(RAW_HEADER_LEN + info.hdr1_pack_size as usize)
        } else {
            Ok(cursor.position())
        }
    }

    fn read_object_table(
        &mut self,
        ctx: &mut Context,
        cursor: &mut ByteCursor<'_>,
        count: u32,
    ) -> Result<()> {
        ensure_count(count, 16, cursor.remaining(), "object table")?;
        let mut objects = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let object_id = ObjectId(cursor.read_u32()?);
            let class_id = ClassId(cursor.read_i32()?);
            let file_index = cursor.read_u32()?;
            let name = read_name(ctx, cursor, "object")?;
            trace!(%object_id, %class_id, file_index, name, "object entry");
            objects.push(FileObject {
                file_index,
                ..FileObject::new(object_id, class_id, name)
            });
        }
        self.document.objects = objects;
        Ok(())
    }

    fn read_dependencies(&mut self, cursor: &mut ByteCursor<'_>) -> Result<()> {
        let count = cursor.read_u32()?;
        ensure_count(count, 8, cursor.remaining(), "dependency list")?;
        let mut dependencies = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let category = PluginCategory::from_raw(cursor.read_u32()?);
            let guid_count = cursor.read_u32()?;
            ensure_count(guid_count, 8, cursor.remaining(), "dependency guids")?;
            let guids = (0..guid_count)
                .map(|_| Ok(Guid::new(cursor.read_u32()?, cursor.read_u32()?)))
                .collect::<Result<Vec<_>>>()?;
            dependencies.push(PluginDependency { category, guids });
        }
        self.document.dependencies = dependencies;
        Ok(())
    }

    /// The placeholder is a signed byte count; when positive it starts with
    /// the number of embedded files and the rest is skipped.
    fn read_included_placeholder(
        &mut self,
        cursor: &mut ByteCursor<'_>,
        file_len: usize,
    ) -> Result<()> {
        let mut remaining = cursor.read_i32()?;
        if remaining > 0 {
            let count = cursor.read_u32()?;
            ensure_count(count, 8, file_len, "included files")?;
            self.document.included_files = vec![String::new(); count as usize];
            remaining -= 4;
        }
        if remaining > 0 {
            let skip = (remaining as usize).min(cursor.remaining());
            cursor.skip(skip)?;
        }
        Ok(())
    }

    /// Stage 2.
    fn read_data(&mut self, ctx: &mut Context, data: &[u8], data_start: usize) -> Result<()> {
        let info = self.document.info;
        // Before version 8 the data section runs to the end of the file.
        let data_end = if info.file_version >= 8 {
            section_end(data_start, info.data_pack_size, data.len(), "data")?
        } else {
            data.len()
        };
        let stored = data
            .get(data_start..data_end)
            .ok_or_else(|| CmoError::invalid_file("data section starts past the end of the file"))?;

        let body: Cow<'_, [u8]> = if info.write_mode.is_compressed() {
            match unpack(stored, info.data_unpack_size as usize) {
                Ok(inflated) => Cow::Owned(inflated),
                Err(err) => {
                    warn!(%err, "data section does not inflate, reading it as stored");
                    Cow::Borrowed(stored)
                }
            }
        } else {
            Cow::Borrowed(stored)
        };
        debug!(bytes = body.len(), "data section");
        let mut cursor = ByteCursor::borrowed(&body);

        if info.file_version < 8 {
            let computed = compute_crc(cursor.peek(), 0);
            if computed != info.crc {
                ctx.output("Virtools file CRC error.");
                return Err(CmoError::CrcMismatch {
                    stored: info.crc,
                    computed,
                });
            }
            self.document.max_id_saved = cursor.read_u32()?;
            let count = cursor.read_u32()?;
            self.document.info.object_count = count;
            if self.document.objects.is_empty() {
                ensure_count(count, 4, cursor.remaining(), "object table")?;
                self.document.objects = vec![FileObject::default(); count as usize];
            }
        }

        self.read_manager_records(ctx, &mut cursor, info.manager_count)?;
        self.read_object_records(ctx, &mut cursor);
        self.read_included_files(ctx, data, data_end);
        Ok(())
    }

    fn read_manager_records(
        &mut self,
        ctx: &mut Context,
        cursor: &mut ByteCursor<'_>,
        count: u32,
    ) -> Result<()> {
        ensure_count(count, 12, cursor.remaining(), "manager list")?;
        let mut managers = Vec::with_capacity(count as usize);
        for index in 0..count as usize {
            let mut record = ManagerData::default();
            match read_chunk_record(cursor, &self.visitor, true) {
                Ok((guid, _, chunk)) => {
                    record.guid = guid;
                    record.chunk = chunk;
                }
                Err(err) => report(ctx, &format!("Fail to read manager #{index}: {err}")),
            }
            managers.push(record);
        }
        self.document.managers = managers;
        Ok(())
    }

    fn read_object_records(&mut self, ctx: &mut Context, cursor: &mut ByteCursor<'_>) {
        for (index, object) in self.document.objects.iter_mut().enumerate() {
            match read_chunk_record(cursor, &self.visitor, false) {
                Ok((_, pack_size, chunk)) => {
                    object.pack_size = pack_size;
                    object.chunk = chunk;
                }
                Err(err) => {
                    object.chunk = None;
                    report(ctx, &format!("Fail to read object #{index} \"{}\": {err}", object.name));
                }
            }
        }
    }

    /// Embedded files follow the stored data section in the file image.
    fn read_included_files(&mut self, ctx: &mut Context, data: &[u8], start: usize) {
        if self.document.included_files.is_empty() {
            return;
        }
        let mut cursor = ByteCursor::borrowed(data);
        if cursor.seek(start).is_err() {
            report(ctx, "Included files lie beyond the end of file.");
            return;
        }
        for index in 0..self.document.included_files.len() {
            let (name, body) = match read_included_file(ctx, &mut cursor) {
                Ok(entry) => entry,
                Err(err) => {
                    report(ctx, &format!("Fail to read included file #{index}: {err}"));
                    return;
                }
            };
            let Some(file_name) = Path::new(&name).file_name() else {
                report(ctx, &format!("Invalid included file name: {name}"));
                continue;
            };
            let target = ctx
                .path_manager()
                .temp_file_path(&file_name.to_string_lossy());
            if let Err(err) = fs::write(&target, body) {
                report(
                    ctx,
                    &format!("Fail to open temp file: {} ({err})", target.display()),
                );
            }
            self.document.included_files[index] = name;
        }
    }

    /// Create live objects and feed each its chunk.
    fn instantiate(&mut self, ctx: &mut Context) {
        self.deep = true;
        for object in &mut self.document.objects {
            if object.chunk.is_some() {
                object.created_id = ctx.create_object(object.class_id, &object.name);
            }
        }
        self.visitor.set_created_ids(
            self.document
                .objects
                .iter()
                .map(|object| object.created_id)
                .collect(),
        );

        for record in &mut self.document.managers {
            let Some(chunk) = record.chunk.as_mut() else {
                continue;
            };
            let loaded = chunk.start_read().and_then(|()| {
                let result = ctx.load_manager(record.guid, chunk);
                chunk.stop_read();
                result
            });
            if let Err(err) = loaded {
                report(ctx, &format!("Fail to load manager {}: {err}", record.guid));
            }
        }

        let mut failed = 0usize;
        for (index, object) in self.document.objects.iter_mut().enumerate() {
            let Some(chunk) = object.chunk.as_mut() else {
                continue;
            };
            if object.created_id.is_null() {
                continue;
            }
            let loaded = chunk.start_read().and_then(|()| {
                let result = ctx.load_object(object.created_id, chunk);
                chunk.stop_read();
                result
            });
            match loaded {
                Ok(()) => object.chunk = None,
                Err(err) => {
                    failed += 1;
                    report(
                        ctx,
                        &format!("Fail to load object #{index} \"{}\": {err}", object.name),
                    );
                    ctx.destroy_object(object.created_id);
                    object.created_id = ObjectId::NULL;
                    self.visitor.set_created_id(index, ObjectId::NULL);
                }
            }
        }
        debug!(
            objects = self.document.objects.len(),
            failed, "objects instantiated"
        );
    }
}

fn map_file(ctx: &mut Context, path: &Path) -> Result<Mmap> {
    open_mapped(path).map_err(|err| {
        ctx.output(&format!(
            "Fail to create Memory File for \"{}\".",
            path.display()
        ));
        CmoError::invalid_file(format!("{}: {err}", path.display()))
    })
}

fn open_mapped(path: &Path) -> std::io::Result<Mmap> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(std::io::Error::other("file is empty"));
    }
    // Safety: the mapping is read-only and dropped before the load returns;
    // truncation by another process while loading is not handled.
    #[allow(unsafe_code)]
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

fn section_end(start: usize, size: u32, file_len: usize, what: &str) -> Result<usize> {
    match start.checked_add(size as usize) {
        Some(end) if end <= file_len => Ok(end),
        _ => Err(CmoError::invalid_file(format!(
            "{what} section of {size} bytes at offset {start} exceeds file of {file_len} bytes"
        ))),
    }
}

/// Reject counts whose smallest possible encoding cannot fit.
fn ensure_count(count: u32, min_record: usize, available: usize, what: &str) -> Result<()> {
    match (count as usize).checked_mul(min_record) {
        Some(needed) if needed <= available => Ok(()),
        _ => Err(CmoError::invalid_file(format!(
            "{what} declares {count} entries, only {available} bytes available"
        ))),
    }
}

/// Accept the stored checksum if either the full or the data-only
/// algorithm reproduces it.
fn verify_crc(
    ctx: &mut Context,
    raw: &RawFileHeader,
    hdr_section: &[u8],
    data_section: &[u8],
) -> Result<()> {
    let header = raw.with_crc_cleared().to_bytes();
    let computed = compute_crc_chain(&[header.as_slice(), hdr_section, data_section]);
    if computed == raw.crc {
        return Ok(());
    }
    if compute_crc(data_section, 0) == raw.crc {
        debug!("checksum matches the data-only algorithm");
        return Ok(());
    }
    ctx.output("Virtools file CRC error.");
    Err(CmoError::CrcMismatch {
        stored: raw.crc,
        computed,
    })
}

fn read_name(ctx: &mut Context, cursor: &mut ByteCursor<'_>, what: &str) -> Result<String> {
    let len = cursor.read_u32()? as usize;
    if len == 0 {
        return Ok(String::new());
    }
    let native = cursor.read_bytes(len)?;
    let (name, converted) = ctx.encodings().to_utf8_or_copy(native);
    if !converted {
        report(
            ctx,
            &format!("Fail to convert {what} name to UTF-8, bytes copied: {name}"),
        );
    }
    Ok(name)
}

/// One `{guid?, size, chunk}` record. The cursor always ends after the
/// record when its size word could be read.
fn read_chunk_record(
    cursor: &mut ByteCursor<'_>,
    visitor: &Rc<FileVisitor>,
    with_guid: bool,
) -> Result<(Guid, u32, Option<StateChunk>)> {
    let guid = if with_guid {
        Guid::new(cursor.read_u32()?, cursor.read_u32()?)
    } else {
        Guid::default()
    };
    let size = cursor.read_u32()?;
    if size == 0 {
        return Ok((guid, 0, None));
    }
    let bytes = cursor.read_bytes(size as usize)?;
    let chunk = StateChunk::from_bytes(bytes, Some(Rc::clone(visitor)))?;
    Ok((guid, size, Some(chunk)))
}

fn read_included_file<'a>(
    ctx: &mut Context,
    cursor: &'a mut ByteCursor<'_>,
) -> Result<(String, &'a [u8])> {
    let name = read_name(ctx, cursor, "included file")?;
    let len = cursor.read_u32()? as usize;
    let body = cursor.read_bytes(len)?;
    Ok((name, body))
}

fn report(ctx: &mut Context, message: &str) {
    warn!("{message}");
    ctx.output(message);
}
