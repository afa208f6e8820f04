//! Serialized chunk layout.
//!
//! Current layout (chunk versions 6 and 7):
//!
//! | Word | Content                                                    |
//! |------|------------------------------------------------------------|
//! | 0    | byte 0 data version, byte 1 class id, byte 2 chunk version, byte 3 options |
//! | 1    | Payload word count                                         |
//! | 2..  | Payload, then `{count, words}` for each list flagged in options, in the order objects, chunks, managers |
//!
//! Versions 4 and below keep the class id in word 1, the payload size in
//! word 2 and the object/chunk list sizes in words 4 and 5, payload from
//! word 6. Version 5 adds a manager list size in word 6, payload from word 7.
//! A chunk decoded from an old layout is written back in that layout, so its
//! payload keeps the meaning its version gives it.

use std::rc::Rc;

use super::StateChunk;
use super::words::{bytes_to_words, words_to_bytes};
use crate::error::ChunkError;
use crate::types::{ChunkOptions, ChunkVersion, ClassId, DataVersion};
use crate::visitor::FileVisitor;

/// Bounds-checked word reader over serialized bytes.
struct WordSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WordSource<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn word_len(&self) -> usize {
        self.bytes.len() / 4
    }

    fn word_at(&self, index: usize) -> Result<u32, ChunkError> {
        if index >= self.word_len() {
            return Err(ChunkError::malformed(format!(
                "header word {index} beyond {} words",
                self.word_len()
            )));
        }
        let at = index * 4;
        Ok(u32::from_le_bytes([
            self.bytes[at],
            self.bytes[at + 1],
            self.bytes[at + 2],
            self.bytes[at + 3],
        ]))
    }

    fn next(&mut self) -> Result<u32, ChunkError> {
        let word = self.word_at(self.pos)?;
        self.pos += 1;
        Ok(word)
    }

    fn take(&mut self, count: usize) -> Result<Vec<u32>, ChunkError> {
        match self.pos.checked_add(count) {
            Some(end) if end <= self.word_len() => {
                let words = bytes_to_words(&self.bytes[self.pos * 4..end * 4]);
                self.pos = end;
                Ok(words)
            }
            _ => Err(ChunkError::malformed(format!(
                "{count} words at {} exceed {} words",
                self.pos,
                self.word_len()
            ))),
        }
    }

    fn take_counted(&mut self) -> Result<Vec<u32>, ChunkError> {
        let count = self.next()? as usize;
        self.take(count)
    }
}

impl StateChunk {
    /// Decode a serialized chunk.
    ///
    /// `visitor` is kept only when the chunk declares itself file-bound.
    /// Chunk versions newer than the current one decode to an empty chunk.
    pub fn from_bytes(
        bytes: &[u8],
        visitor: Option<Rc<FileVisitor>>,
    ) -> Result<StateChunk, ChunkError> {
        let mut src = WordSource::new(bytes);
        let header = src.word_at(0)?;
        let mut chunk = StateChunk::new(None);
        chunk.data_version = DataVersion(header & 0xFF);
        chunk.chunk_version = ChunkVersion((header >> 16) & 0xFF);

        if chunk.chunk_version < ChunkVersion::V2 {
            chunk.class_id = ClassId(src.word_at(1)? as i32);
            let data_len = src.word_at(2)? as usize;
            let object_len = src.word_at(4)? as usize;
            let chunk_len = src.word_at(5)? as usize;
            src.pos = 6;
            chunk.data = src.take(data_len)?;
            chunk.object_refs = src.take(object_len)?;
            chunk.chunk_refs = src.take(chunk_len)?;
        } else if chunk.chunk_version == ChunkVersion::V2 {
            chunk.class_id = ClassId(src.word_at(1)? as i32);
            let data_len = src.word_at(2)? as usize;
            let object_len = src.word_at(4)? as usize;
            let chunk_len = src.word_at(5)? as usize;
            let manager_len = src.word_at(6)? as usize;
            src.pos = 7;
            chunk.data = src.take(data_len)?;
            chunk.object_refs = src.take(object_len)?;
            chunk.chunk_refs = src.take(chunk_len)?;
            chunk.manager_refs = src.take(manager_len)?;
        } else if chunk.chunk_version <= ChunkVersion::V4 {
            chunk.class_id = ClassId(((header >> 8) & 0xFF) as i32);
            let options = ChunkOptions((header >> 24) as u8);
            let data_len = src.word_at(1)? as usize;
            src.pos = 2;
            chunk.data = src.take(data_len)?;
            if options.contains(ChunkOptions::IDS) {
                chunk.object_refs = src.take_counted()?;
            }
            if options.contains(ChunkOptions::CHN) {
                chunk.chunk_refs = src.take_counted()?;
            }
            if options.contains(ChunkOptions::MAN) {
                chunk.manager_refs = src.take_counted()?;
            }
            if options.contains(ChunkOptions::FILE) {
                chunk.visitor = visitor;
            }
        } else {
            tracing::debug!(
                chunk_version = chunk.chunk_version.0,
                "chunk version newer than supported, payload ignored"
            );
        }

        chunk.limit = chunk.data.len();
        Ok(chunk)
    }

    /// Serialized size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let payload = self.data.len() * 4;
        if self.chunk_version < ChunkVersion::V2 {
            return 24 + payload + (self.object_refs.len() + self.chunk_refs.len()) * 4;
        }
        if self.chunk_version == ChunkVersion::V2 {
            let lists = self.object_refs.len() + self.chunk_refs.len() + self.manager_refs.len();
            return 28 + payload + lists * 4;
        }
        let lists = [&self.object_refs, &self.chunk_refs, &self.manager_refs]
            .iter()
            .filter(|list| !list.is_empty())
            .map(|list| 4 + list.len() * 4)
            .sum::<usize>();
        8 + payload + lists
    }

    /// Serialize in the layout of [`StateChunk::chunk_version`].
    ///
    /// Versions 4 and 5 keep their fixed header. Versions 4 and below have
    /// no manager list, so manager references are not written for them.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.chunk_version <= ChunkVersion::V2 {
            return self.to_old_layout_bytes();
        }

        let mut options = ChunkOptions::default();
        if !self.object_refs.is_empty() {
            options.insert(ChunkOptions::IDS);
        }
        if !self.chunk_refs.is_empty() {
            options.insert(ChunkOptions::CHN);
        }
        if !self.manager_refs.is_empty() {
            options.insert(ChunkOptions::MAN);
        }
        if self.visitor.is_some() {
            options.insert(ChunkOptions::FILE);
        }

        let header = (self.data_version.0 & 0xFF)
            | ((self.class_id.0 as u32 & 0xFF) << 8)
            | ((self.chunk_version.0 & 0xFF) << 16)
            | (u32::from(options.0) << 24);

        let mut words = Vec::with_capacity(self.encoded_len() / 4);
        words.push(header);
        words.push(self.data.len() as u32);
        words.extend_from_slice(&self.data);
        for list in [&self.object_refs, &self.chunk_refs, &self.manager_refs] {
            if !list.is_empty() {
                words.push(list.len() as u32);
                words.extend_from_slice(list);
            }
        }
        words_to_bytes(&words)
    }

    fn to_old_layout_bytes(&self) -> Vec<u8> {
        let with_managers = self.chunk_version == ChunkVersion::V2;
        let mut words = Vec::with_capacity(self.encoded_len() / 4);
        words.push((self.data_version.0 & 0xFF) | ((self.chunk_version.0 & 0xFF) << 16));
        words.push(self.class_id.0 as u32);
        words.push(self.data.len() as u32);
        // unused
        words.push(0);
        words.push(self.object_refs.len() as u32);
        words.push(self.chunk_refs.len() as u32);
        if with_managers {
            words.push(self.manager_refs.len() as u32);
        }
        words.extend_from_slice(&self.data);
        words.extend_from_slice(&self.object_refs);
        words.extend_from_slice(&self.chunk_refs);
        if with_managers {
            words.extend_from_slice(&self.manager_refs);
        }
        words_to_bytes(&words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Guid, ObjectId};

    fn le(words: &[u32]) -> Vec<u8> {
        words_to_bytes(words)
    }

    #[test]
    fn test_current_layout_bytes() {
        let mut chunk = StateChunk::default();
        chunk.set_class_id(ClassId::GROUP);
        chunk.start_write().unwrap();
        chunk.write_struct(&5u32).unwrap();
        chunk.stop_write();
        let bytes = chunk.to_bytes();
        assert_eq!(bytes.len(), chunk.encoded_len());
        assert_eq!(&bytes[..4], &[10, 23, 7, 0]);
        assert_eq!(bytes, le(&[0x0007_170A, 1, 5]));
    }

    #[test]
    fn test_lists_and_options() {
        let mut chunk = StateChunk::default();
        chunk.start_write().unwrap();
        chunk.write_object_id(ObjectId(3)).unwrap();
        chunk.write_manager_int(Guid::new(1, 2), 4).unwrap();
        chunk.stop_write();
        let bytes = chunk.to_bytes();
        // IDS | MAN
        assert_eq!(bytes[3], 0x03);
        assert_eq!(bytes.len(), 8 + 4 * 4 + 8 + 8);

        let decoded = StateChunk::from_bytes(&bytes, None).unwrap();
        assert_eq!(decoded.data_words(), chunk.data_words());
        assert_eq!(decoded.object_refs(), &[0]);
        assert_eq!(decoded.manager_refs(), &[1]);
        assert!(decoded.chunk_refs().is_empty());
    }

    #[test]
    fn test_file_flag_controls_binding() {
        let visitor = Rc::new(FileVisitor::default());
        let mut chunk = StateChunk::new(Some(Rc::clone(&visitor)));
        chunk.start_write().unwrap();
        chunk.write_struct(&1u32).unwrap();
        chunk.stop_write();
        let bound = chunk.to_bytes();
        assert_eq!(bound[3] & 0x08, 0x08);
        assert!(
            StateChunk::from_bytes(&bound, Some(Rc::clone(&visitor)))
                .unwrap()
                .visitor()
                .is_some()
        );

        chunk.bind_visitor(None);
        let unbound = chunk.to_bytes();
        assert!(
            StateChunk::from_bytes(&unbound, Some(visitor))
                .unwrap()
                .visitor()
                .is_none()
        );
    }

    #[test]
    fn test_decode_version1_layout() {
        // data ver 2, chunk ver 4 in byte 2
        let header = 2 | (4 << 16);
        let bytes = le(&[header, 30, 2, 0, 1, 0, 0xA, 0xB, 6]);
        let chunk = StateChunk::from_bytes(&bytes, None).unwrap();
        assert_eq!(chunk.class_id(), ClassId::MATERIAL);
        assert_eq!(chunk.data_version(), DataVersion(2));
        assert_eq!(chunk.chunk_version(), ChunkVersion::V1);
        assert_eq!(chunk.data_words(), &[0xA, 0xB]);
        assert_eq!(chunk.object_refs(), &[6]);
    }

    #[test]
    fn test_decode_version2_layout() {
        let header = 5 << 16;
        let bytes = le(&[header, 31, 1, 0, 0, 1, 2, 0xC, 7, 8, 9]);
        let chunk = StateChunk::from_bytes(&bytes, None).unwrap();
        assert_eq!(chunk.class_id(), ClassId::TEXTURE);
        assert_eq!(chunk.data_words(), &[0xC]);
        assert!(chunk.object_refs().is_empty());
        assert_eq!(chunk.chunk_refs(), &[7]);
        assert_eq!(chunk.manager_refs(), &[8, 9]);
    }

    #[test]
    fn test_old_layouts_keep_their_version() {
        let version1 = le(&[2 | (4 << 16), 30, 1, 0, 1, 0, 0xA, 6]);
        let chunk = StateChunk::from_bytes(&version1, None).unwrap();
        assert_eq!(chunk.encoded_len(), version1.len());
        assert_eq!(chunk.to_bytes(), version1);

        let version2 = le(&[5 << 16, 31, 1, 0, 0, 1, 2, 0xC, 7, 8, 9]);
        let chunk = StateChunk::from_bytes(&version2, None).unwrap();
        assert_eq!(chunk.encoded_len(), version2.len());
        assert_eq!(chunk.to_bytes(), version2);
    }

    #[test]
    fn test_base_version_object_id_survives_rewrite() {
        // flag, two unused words, then the live id
        let bytes = le(&[0, 33, 4, 0, 0, 0, 1, 0, 0, 42]);
        let chunk = StateChunk::from_bytes(&bytes, None).unwrap();
        assert_eq!(chunk.chunk_version(), ChunkVersion::BASE);

        let mut again = StateChunk::from_bytes(&chunk.to_bytes(), None).unwrap();
        assert_eq!(again.chunk_version(), ChunkVersion::BASE);
        again.start_read().unwrap();
        assert_eq!(again.read_object_id().unwrap(), ObjectId(42));
    }

    #[test]
    fn test_decode_too_new() {
        let bytes = le(&[9 << 16, 1000, 1, 2, 3]);
        let chunk = StateChunk::from_bytes(&bytes, None).unwrap();
        assert!(chunk.data_words().is_empty());
        assert_eq!(chunk.chunk_version(), ChunkVersion(9));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(StateChunk::from_bytes(&[], None).is_err());
        assert!(StateChunk::from_bytes(&[0, 0, 7], None).is_err());
        // declares 10 payload words, carries 1
        let bytes = le(&[7 << 16, 10, 1]);
        assert!(matches!(
            StateChunk::from_bytes(&bytes, None),
            Err(ChunkError::Malformed { .. })
        ));
        // object list flagged but missing
        let bytes = le(&[(7 << 16) | (1 << 24), 0]);
        assert!(StateChunk::from_bytes(&bytes, None).is_err());
    }
}
