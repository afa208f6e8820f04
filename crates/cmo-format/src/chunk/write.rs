//! Write primitives. Every primitive requires an active write pass and
//! encodes in the current chunk layout.

use super::StateChunk;
use super::words::{WordData, bytes_to_words};
use crate::encoding::EncodingList;
use crate::error::ChunkError;
use crate::types::{Guid, ObjectId};

/// Stored in place of an object that is not part of the bound file.
const NO_OBJECT: u32 = 0xFFFF_FFFF;

impl StateChunk {
    /// Append words at the cursor.
    pub(crate) fn write_words(&mut self, words: &[u32]) -> Result<(), ChunkError> {
        self.ensure_write_space(words.len())?;
        self.data[self.pos..self.pos + words.len()].copy_from_slice(words);
        self.pos += words.len();
        Ok(())
    }

    /// Start a new identifier record and link the previous one to it.
    pub fn write_identifier(&mut self, tag: u32) -> Result<(), ChunkError> {
        self.ensure_write_space(2)?;
        if let Some(prev) = self.prev_identifier {
            self.data[prev + 1] = self.pos as u32;
        }
        self.prev_identifier = Some(self.pos);
        self.write_words(&[tag, 0])
    }

    /// Write a fixed-size value padded to whole words.
    pub fn write_struct<T: WordData>(&mut self, value: &T) -> Result<(), ChunkError> {
        let mut bytes = Vec::with_capacity(T::BYTES);
        value.encode(&mut bytes);
        self.write_words(&bytes_to_words(&bytes))
    }

    /// Write raw bytes padded to whole words, without a length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ChunkError> {
        self.write_words(&bytes_to_words(bytes))
    }

    /// Write a string as native bytes with a trailing NUL.
    pub fn write_string(&mut self, text: &str, encodings: &EncodingList) -> Result<(), ChunkError> {
        if text.is_empty() {
            return self.write_struct(&0u32);
        }
        let mut native = encodings.to_native(text).ok_or_else(|| ChunkError::Encoding {
            message: format!("cannot encode {text:?}"),
        })?;
        native.push(0);
        self.write_struct(&(native.len() as u32))?;
        self.write_bytes(&native)
    }

    /// Write an object reference.
    ///
    /// With a bound visitor the live identity is stored as its index in the
    /// saved object table. References are recorded in the object list.
    pub fn write_object_id(&mut self, id: ObjectId) -> Result<(), ChunkError> {
        let stored = self.stored_object_ref(id);
        let refers = match self.visitor {
            Some(_) => stored != NO_OBJECT,
            None => !id.is_null(),
        };
        if refers {
            self.object_refs.push(self.pos as u32);
        }
        self.write_struct(&stored)
    }

    fn stored_object_ref(&self, id: ObjectId) -> u32 {
        match &self.visitor {
            None => id.get(),
            Some(_) if id.is_null() => NO_OBJECT,
            Some(visitor) => visitor.index_of(id).unwrap_or(NO_OBJECT),
        }
    }

    /// Write a manager GUID followed by an integer.
    pub fn write_manager_int(&mut self, guid: Guid, value: i32) -> Result<(), ChunkError> {
        self.manager_refs.push(self.pos as u32);
        self.write_struct(&guid)?;
        self.write_struct(&value)
    }

    /// Write a byte-length-prefixed buffer.
    pub fn write_buffer(&mut self, bytes: &[u8]) -> Result<(), ChunkError> {
        self.write_struct(&(bytes.len() as u32))?;
        self.write_bytes(bytes)
    }

    /// Embed a nested chunk.
    pub fn write_sub_chunk(&mut self, sub: &StateChunk) -> Result<(), ChunkError> {
        let body = 7
            + sub.data.len()
            + sub.object_refs.len()
            + sub.chunk_refs.len()
            + sub.manager_refs.len();
        self.ensure_write_space(body + 1)?;
        self.chunk_refs.push(self.pos as u32);

        let version = (sub.data_version.0 & 0xFFFF) | ((sub.chunk_version.0 & 0xFFFF) << 16);
        let no_bind = u32::from(sub.visitor.is_none());
        self.write_words(&[
            body as u32,
            sub.class_id.0 as u32,
            version,
            sub.data.len() as u32,
            no_bind,
            sub.object_refs.len() as u32,
            sub.chunk_refs.len() as u32,
            sub.manager_refs.len() as u32,
        ])?;
        self.write_words(&sub.data)?;
        self.write_words(&sub.object_refs)?;
        self.write_words(&sub.chunk_refs)?;
        self.write_words(&sub.manager_refs)
    }

    /// Append another chunk's payload verbatim, rebasing its reference lists.
    ///
    /// Identifier offsets inside the payload are absolute, so this is only
    /// lossless at the start of a write pass.
    pub fn write_chunk_payload(&mut self, other: &StateChunk) -> Result<(), ChunkError> {
        let base = self.pos as u32;
        self.write_words(&other.data)?;
        self.object_refs
            .extend(other.object_refs.iter().map(|pos| pos + base));
        self.chunk_refs
            .extend(other.chunk_refs.iter().map(|pos| pos + base));
        self.manager_refs
            .extend(other.manager_refs.iter().map(|pos| pos + base));
        Ok(())
    }

    /// Write a count-prefixed sequence of object references.
    pub fn write_object_id_sequence(&mut self, ids: &[ObjectId]) -> Result<(), ChunkError> {
        self.write_struct(&(ids.len() as u32))?;
        ids.iter().try_for_each(|id| self.write_object_id(*id))
    }

    /// Write a count, a manager GUID and the integers.
    pub fn write_manager_int_sequence(
        &mut self,
        guid: Guid,
        values: &[i32],
    ) -> Result<(), ChunkError> {
        self.write_struct(&(values.len() as u32))?;
        self.manager_refs.push(self.pos as u32);
        self.write_struct(&guid)?;
        let words: Vec<u32> = values.iter().map(|value| *value as u32).collect();
        self.write_words(&words)
    }

    /// Write a count-prefixed sequence of nested chunks.
    pub fn write_sub_chunk_sequence(&mut self, subs: &[StateChunk]) -> Result<(), ChunkError> {
        self.write_struct(&(subs.len() as u32))?;
        subs.iter().try_for_each(|sub| self.write_sub_chunk(sub))
    }

    /// Write an object array (`XObjectArray`).
    pub fn write_object_array(&mut self, ids: &[ObjectId]) -> Result<(), ChunkError> {
        self.write_struct(&(ids.len() as u32))?;
        let words: Vec<u32> = ids.iter().map(|id| self.stored_object_ref(*id)).collect();
        self.write_words(&words)
    }
}
