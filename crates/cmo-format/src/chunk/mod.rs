//! State chunks: the versioned word-oriented record every object and manager
//! is serialized into.
//!
//! A chunk owns a payload of 32-bit words plus three auxiliary word lists
//! (object reference positions, nested chunk positions and manager reference
//! positions). Access goes through a cursor that is either idle, reading or
//! writing; read and write passes are bracketed by `start_*`/`stop_*`.
//!
//! # Identifier chain
//!
//! Named regions inside the payload are linked in place:
//!
//! | Word | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Tag                                                  |
//! | 1    | Word offset of the next record, `0` for the last one |
//! | 2..  | Region payload                                       |
//!
//! The chain always starts at word 0.

mod buffer;
mod read;
mod words;
mod write;

use std::rc::Rc;

pub use words::WordData;

use crate::error::ChunkError;
use crate::types::{ChunkVersion, ClassId, DataVersion};
use crate::visitor::FileVisitor;

/// Cursor state of a chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkState {
    #[default]
    Idle,
    Reading,
    Writing,
}

/// Summary of a chunk for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProfile {
    pub class_id: ClassId,
    pub data_version: DataVersion,
    pub chunk_version: ChunkVersion,
    pub object_list_len: usize,
    pub chunk_list_len: usize,
    pub manager_list_len: usize,
    pub data_words: usize,
    pub bound: bool,
}

/// One record of the identifier chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierProfile {
    pub tag: u32,
    /// Word offset of the region payload.
    pub offset: usize,
    /// Region payload size in bytes.
    pub size: usize,
}

/// Versioned binary record.
#[derive(Debug, Clone)]
pub struct StateChunk {
    class_id: ClassId,
    data_version: DataVersion,
    chunk_version: ChunkVersion,
    data: Vec<u32>,
    object_refs: Vec<u32>,
    chunk_refs: Vec<u32>,
    manager_refs: Vec<u32>,
    state: ChunkState,
    pos: usize,
    limit: usize,
    prev_identifier: Option<usize>,
    visitor: Option<Rc<FileVisitor>>,
}

impl Default for StateChunk {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StateChunk {
    /// Create an empty chunk, optionally bound to a file visitor.
    #[must_use]
    pub fn new(visitor: Option<Rc<FileVisitor>>) -> Self {
        Self {
            class_id: ClassId::OBJECT,
            data_version: DataVersion::CURRENT,
            chunk_version: ChunkVersion::CURRENT,
            data: Vec::new(),
            object_refs: Vec::new(),
            chunk_refs: Vec::new(),
            manager_refs: Vec::new(),
            state: ChunkState::Idle,
            pos: 0,
            limit: 0,
            prev_identifier: None,
            visitor,
        }
    }

    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn set_class_id(&mut self, class_id: ClassId) {
        self.class_id = class_id;
    }

    #[must_use]
    pub fn data_version(&self) -> DataVersion {
        self.data_version
    }

    pub fn set_data_version(&mut self, version: DataVersion) {
        self.data_version = version;
    }

    #[must_use]
    pub fn chunk_version(&self) -> ChunkVersion {
        self.chunk_version
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.data.len() * 4
    }

    #[must_use]
    pub fn data_words(&self) -> &[u32] {
        &self.data
    }

    #[must_use]
    pub fn object_refs(&self) -> &[u32] {
        &self.object_refs
    }

    #[must_use]
    pub fn chunk_refs(&self) -> &[u32] {
        &self.chunk_refs
    }

    #[must_use]
    pub fn manager_refs(&self) -> &[u32] {
        &self.manager_refs
    }

    #[must_use]
    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Current word offset of the cursor.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn visitor(&self) -> Option<&Rc<FileVisitor>> {
        self.visitor.as_ref()
    }

    /// Attach or detach the visitor used to translate object references.
    pub fn bind_visitor(&mut self, visitor: Option<Rc<FileVisitor>>) {
        self.visitor = visitor;
    }

    /// Reset to an empty idle chunk, keeping the visitor.
    pub fn clear(&mut self) {
        self.class_id = ClassId::OBJECT;
        self.data_version = DataVersion::CURRENT;
        self.chunk_version = ChunkVersion::CURRENT;
        self.data = Vec::new();
        self.object_refs = Vec::new();
        self.chunk_refs = Vec::new();
        self.manager_refs = Vec::new();
        self.state = ChunkState::Idle;
        self.pos = 0;
        self.limit = 0;
        self.prev_identifier = None;
    }

    #[must_use]
    pub fn profile(&self) -> ChunkProfile {
        ChunkProfile {
            class_id: self.class_id,
            data_version: self.data_version,
            chunk_version: self.chunk_version,
            object_list_len: self.object_refs.len(),
            chunk_list_len: self.chunk_refs.len(),
            manager_list_len: self.manager_refs.len(),
            data_words: self.data.len(),
            bound: self.visitor.is_some(),
        }
    }

    /// Begin a read pass from word 0.
    pub fn start_read(&mut self) -> Result<(), ChunkError> {
        self.expect_state(ChunkState::Idle, "idle")?;
        self.pos = 0;
        self.limit = self.data.len();
        self.prev_identifier = None;
        self.state = ChunkState::Reading;
        Ok(())
    }

    /// End a read pass. Calling it outside a read pass is a no-op.
    pub fn stop_read(&mut self) {
        if self.state != ChunkState::Reading {
            return;
        }
        self.reset_cursor();
    }

    /// Begin a write pass, discarding the payload and its auxiliary lists.
    pub fn start_write(&mut self) -> Result<(), ChunkError> {
        self.expect_state(ChunkState::Idle, "idle")?;
        self.data = Vec::new();
        self.object_refs.clear();
        self.chunk_refs.clear();
        self.manager_refs.clear();
        self.pos = 0;
        self.limit = 0;
        self.prev_identifier = None;
        self.chunk_version = ChunkVersion::CURRENT;
        self.state = ChunkState::Writing;
        Ok(())
    }

    /// End a write pass and shrink the payload to what was written.
    pub fn stop_write(&mut self) {
        if self.state != ChunkState::Writing {
            return;
        }
        self.data.truncate(self.pos);
        self.data.shrink_to_fit();
        self.object_refs.shrink_to_fit();
        self.chunk_refs.shrink_to_fit();
        self.manager_refs.shrink_to_fit();
        self.reset_cursor();
    }

    fn reset_cursor(&mut self) {
        self.pos = 0;
        self.limit = self.data.len();
        self.prev_identifier = None;
        self.state = ChunkState::Idle;
    }

    fn expect_state(&self, state: ChunkState, expected: &'static str) -> Result<(), ChunkError> {
        if self.state == state {
            Ok(())
        } else {
            Err(ChunkError::WrongState { expected })
        }
    }

    fn ensure_read_space(&self, words: usize) -> Result<(), ChunkError> {
        self.expect_state(ChunkState::Reading, "reading")?;
        match self.pos.checked_add(words) {
            Some(end) if end <= self.limit => Ok(()),
            _ => Err(ChunkError::out_of_bounds(self.pos, words, self.limit)),
        }
    }

    /// Grow the payload so `words` more words fit at the cursor.
    ///
    /// Growth is at least 512 words per reallocation.
    fn ensure_write_space(&mut self, words: usize) -> Result<(), ChunkError> {
        self.expect_state(ChunkState::Writing, "writing")?;
        let needed = self
            .pos
            .checked_add(words)
            .ok_or_else(|| ChunkError::out_of_bounds(self.pos, words, self.limit))?;
        if needed > self.data.len() {
            self.data.resize(self.pos + words.max(512), 0);
            self.limit = self.data.len();
        }
        Ok(())
    }

    /// Move the cursor forward by `words` in either pass.
    pub fn skip(&mut self, words: usize) -> Result<(), ChunkError> {
        match self.state {
            ChunkState::Reading => self.ensure_read_space(words)?,
            ChunkState::Writing => self.ensure_write_space(words)?,
            ChunkState::Idle => {
                return Err(ChunkError::WrongState {
                    expected: "reading or writing",
                });
            }
        }
        self.pos += words;
        Ok(())
    }

    /// Position the cursor on the payload of identifier `tag`.
    pub fn seek_identifier(&mut self, tag: u32) -> bool {
        self.seek_identifier_with_size(tag).is_some()
    }

    /// Like [`seek_identifier`](Self::seek_identifier), returning the region
    /// size in bytes.
    ///
    /// Fails outside a read pass, on payloads shorter than two words, and on
    /// any `next` offset that does not move strictly forward inside the
    /// payload.
    pub fn seek_identifier_with_size(&mut self, tag: u32) -> Option<usize> {
        if self.state != ChunkState::Reading || self.data.len() < 2 {
            return None;
        }
        let mut pos = 0usize;
        while self.data[pos] != tag {
            let next = self.data[pos + 1] as usize;
            if next == 0 || next <= pos || next + 1 >= self.data.len() {
                return None;
            }
            pos = next;
        }
        self.prev_identifier = Some(pos);
        self.pos = pos + 2;
        Some(self.region_size(pos) * 4)
    }

    fn region_size(&self, pos: usize) -> usize {
        let next = match self.data[pos + 1] as usize {
            0 => self.data.len(),
            next => next,
        };
        next.saturating_sub(pos + 2)
    }

    /// Walk the identifier chain without moving the cursor.
    #[must_use]
    pub fn identifiers_profile(&self) -> Vec<IdentifierProfile> {
        let mut collection = Vec::new();
        if self.data.len() < 2 {
            return collection;
        }
        let mut pos = 0usize;
        loop {
            collection.push(IdentifierProfile {
                tag: self.data[pos],
                offset: pos + 2,
                size: self.region_size(pos) * 4,
            });
            let next = self.data[pos + 1] as usize;
            if next == 0 || next <= pos || next + 1 >= self.data.len() {
                break;
            }
            pos = next;
        }
        collection
    }
}
