//! Virtools composition file (`.cmo`, `.nmo`, `.vmo`) reader and writer.
//!
//! A composition file stores objects and engine managers as state chunks:
//! word aligned buffers with in-band identifiers plus side lists of object,
//! sub-chunk and manager references. This crate provides:
//!
//! - [`StateChunk`], the chunk codec with typed read and write primitives
//! - [`FileReader`], loading files shallowly (raw chunks) or deeply (live
//!   objects owned by a [`Context`])
//! - [`FileWriter`], saving live objects or re-emitting a shallow load
//! - zlib section compression and the adler32 based file checksum
//!
//! # Example
//!
//! ```no_run
//! use cmo_format::{Context, FileReader, FileWriter};
//!
//! let mut ctx = Context::new()?;
//! let mut reader = FileReader::new();
//! reader.shallow_load(&mut ctx, "level.nmo")?;
//! println!("{} objects", reader.objects().len());
//!
//! let mut writer = FileWriter::from_reader(&reader, &ctx);
//! writer.save(&mut ctx, "copy.nmo")?;
//! # Ok::<(), cmo_format::CmoError>(())
//! ```

pub mod chunk;
pub mod compression;
mod context;
pub mod cursor;
mod document;
pub mod encoding;
mod error;
pub mod header;
pub mod object;
mod path;
mod reader;
pub mod types;
mod visitor;
mod writer;

pub use chunk::{ChunkProfile, ChunkState, IdentifierProfile, StateChunk};
pub use context::{Context, ContextOptions, OutputSink};
pub use document::{
    FileDocument, FileObject, LoadOption, ManagerData, PluginDependency, STATESAVE_ALL,
};
pub use encoding::EncodingList;
pub use error::{ChunkError, ChunkResult, CmoError, Result};
pub use header::{FileInfo, RawFileHeader};
pub use object::{LiveManager, LiveObject, ObjectKind, ObjectModel, ObjectRegistry, Visibility};
pub use path::PathManager;
pub use reader::FileReader;
pub use types::{ClassId, Guid, ObjectId, PluginCategory, WriteMode};
pub use visitor::FileVisitor;
pub use writer::FileWriter;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
