//! Read primitives. Every primitive requires an active read pass.

use super::StateChunk;
use super::words::{WordData, word_count, words_to_bytes};
use crate::encoding::EncodingList;
use crate::error::ChunkError;
use crate::types::{ChunkVersion, ClassId, DataVersion, Guid, ObjectId};

/// High bit of a stored object reference marks "no object".
const NO_OBJECT_BIT: u32 = 0x8000_0000;

impl StateChunk {
    /// Copy `count` words at the cursor and advance.
    pub(crate) fn read_words(&mut self, count: usize) -> Result<Vec<u32>, ChunkError> {
        self.ensure_read_space(count)?;
        let words = self.data[self.pos..self.pos + count].to_vec();
        self.pos += count;
        Ok(words)
    }

    /// Read a fixed-size value, advancing by whole words.
    pub fn read_struct<T: WordData>(&mut self) -> Result<T, ChunkError> {
        let count = T::word_count();
        self.ensure_read_space(count)?;
        let bytes = words_to_bytes(&self.data[self.pos..self.pos + count]);
        self.pos += count;
        Ok(T::decode(&bytes))
    }

    /// Read `len` raw bytes, advancing by `ceil(len / 4)` words.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ChunkError> {
        let count = word_count(len);
        self.ensure_read_space(count)?;
        let mut bytes = words_to_bytes(&self.data[self.pos..self.pos + count]);
        bytes.truncate(len);
        self.pos += count;
        Ok(bytes)
    }

    /// Read a length-prefixed native string and convert it to UTF-8.
    ///
    /// The stored length includes a trailing NUL. A zero length is the empty
    /// string.
    pub fn read_string(&mut self, encodings: &EncodingList) -> Result<String, ChunkError> {
        let len = self.read_struct::<u32>()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(len)?;
        let native = &bytes[..len - 1];
        encodings.to_utf8(native).ok_or_else(|| ChunkError::Encoding {
            message: format!("{} native bytes at word {}", native.len(), self.pos),
        })
    }

    /// Read an object reference and resolve it to a live identity.
    ///
    /// With a bound visitor the stored word is an index into the file's
    /// object table; a set high bit means no object and reads as
    /// [`ObjectId::NULL`], the same word [`StateChunk::write_object_id`]
    /// stores for a null reference. Without a visitor the stored word is
    /// already a live identity.
    pub fn read_object_id(&mut self) -> Result<ObjectId, ChunkError> {
        let stored = self.read_struct::<u32>()?;
        if self.chunk_version >= ChunkVersion::V1 {
            let Some(visitor) = &self.visitor else {
                return Ok(ObjectId(stored));
            };
            if stored & NO_OBJECT_BIT != 0 {
                return Ok(ObjectId::NULL);
            }
            visitor
                .resolve(stored)
                .ok_or(ChunkError::Unresolved { index: stored })
        } else {
            // three word record: flag, two unused words, id
            if stored == 0 {
                return Ok(ObjectId::NULL);
            }
            self.skip(2)?;
            self.read_struct::<u32>().map(ObjectId)
        }
    }

    /// Read a manager GUID followed by an integer.
    pub fn read_manager_int(&mut self) -> Result<(Guid, i32), ChunkError> {
        let guid = self.read_struct::<Guid>()?;
        let value = self.read_struct::<i32>()?;
        Ok((guid, value))
    }

    /// Read a byte-length-prefixed buffer.
    pub fn read_buffer(&mut self) -> Result<Vec<u8>, ChunkError> {
        let len = self.read_struct::<u32>()? as usize;
        if len == 0 {
            return Ok(Vec::new());
        }
        self.read_bytes(len)
    }

    /// Decode a nested chunk.
    ///
    /// The nested layout depends on this chunk's version. Nothing partially
    /// decoded survives a failure.
    pub fn read_sub_chunk(&mut self) -> Result<StateChunk, ChunkError> {
        let size = self.read_struct::<u32>()? as usize;
        self.ensure_read_space(size)?;

        let mut sub = StateChunk::new(self.visitor.clone());
        sub.class_id = ClassId(self.read_struct::<i32>()?);

        if self.chunk_version >= ChunkVersion::V1 {
            let version = self.read_struct::<u32>()?;
            sub.data_version = DataVersion(version & 0xFFFF);
            sub.chunk_version = ChunkVersion((version >> 16) & 0xFFFF);

            let data_len = self.read_struct::<u32>()? as usize;
            if self.read_struct::<u32>()? == 1 {
                sub.visitor = None;
            }
            let object_len = self.read_struct::<u32>()? as usize;
            let chunk_len = self.read_struct::<u32>()? as usize;
            let manager_len = if self.chunk_version > ChunkVersion::V1 {
                self.read_struct::<u32>()? as usize
            } else {
                0
            };

            sub.data = self.read_words(data_len)?;
            sub.object_refs = self.read_words(object_len)?;
            sub.chunk_refs = self.read_words(chunk_len)?;
            sub.manager_refs = self.read_words(manager_len)?;
        } else {
            let data_len = self.read_struct::<u32>()? as usize;
            self.skip(1)?;
            sub.data = self.read_words(data_len)?;
        }

        sub.limit = sub.data.len();
        Ok(sub)
    }

    /// Read a count-prefixed sequence of object references.
    pub fn read_object_id_sequence(&mut self) -> Result<Vec<ObjectId>, ChunkError> {
        let count = self.read_struct::<u32>()? as usize;
        self.ensure_read_space(count)?;
        (0..count).map(|_| self.read_object_id()).collect()
    }

    /// Read a count, a manager GUID and that many integers.
    pub fn read_manager_int_sequence(&mut self) -> Result<(Guid, Vec<i32>), ChunkError> {
        let count = self.read_struct::<u32>()? as usize;
        let guid = self.read_struct::<Guid>()?;
        self.ensure_read_space(count)?;
        let values = self
            .read_words(count)?
            .into_iter()
            .map(|word| word as i32)
            .collect();
        Ok((guid, values))
    }

    /// Read a count-prefixed sequence of nested chunks.
    pub fn read_sub_chunk_sequence(&mut self) -> Result<Vec<StateChunk>, ChunkError> {
        let count = self.read_struct::<u32>()? as usize;
        self.ensure_read_space(count)?;
        (0..count).map(|_| self.read_sub_chunk()).collect()
    }

    /// Read an object array (`XObjectArray`).
    ///
    /// Chunks older than [`ChunkVersion::V1`] repeat the count after four
    /// unused words and store live identities directly.
    pub fn read_object_array(&mut self) -> Result<Vec<ObjectId>, ChunkError> {
        let mut count = self.read_struct::<u32>()? as usize;
        if count == 0 {
            return Ok(Vec::new());
        }
        let old_layout = self.chunk_version < ChunkVersion::V1;
        if old_layout {
            self.skip(4)?;
            count = self.read_struct::<u32>()? as usize;
        }

        let stored = self.read_words(count)?;
        let visitor = if old_layout { None } else { self.visitor.clone() };
        stored
            .into_iter()
            .map(|word| match &visitor {
                None => Ok(ObjectId(word)),
                Some(_) if (word as i32) < 0 => Ok(ObjectId::NULL),
                Some(visitor) => visitor
                    .resolve(word)
                    .ok_or(ChunkError::Unresolved { index: word }),
            })
            .collect()
    }
}
