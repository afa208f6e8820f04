//! Records populated by a load and consumed by a save.

use std::fmt;

use crate::chunk::StateChunk;
use crate::header::FileInfo;
use crate::types::{ClassId, Guid, ObjectId, PluginCategory};

/// Save every part of an object.
pub const STATESAVE_ALL: u32 = 0xFFFF_FFFF;

/// How a loaded object should be merged with existing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadOption {
    #[default]
    Default,
    Rename,
    Replace,
    DontLoad,
}

impl fmt::Display for LoadOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "CK_FO_DEFAULT",
            Self::Rename => "CK_FO_RENAMEOBJECT",
            Self::Replace => "CK_FO_REPLACEOBJECT",
            Self::DontLoad => "CK_FO_DONTLOADOBJECT",
        })
    }
}

/// One entry of the object table.
#[derive(Debug, Clone, Default)]
pub struct FileObject {
    /// Identity as stored in the file.
    pub object_id: ObjectId,
    /// Identity of the live object created by a deep load, null otherwise.
    pub created_id: ObjectId,
    pub class_id: ClassId,
    pub name: String,
    /// Serialized state, absent for records without payload.
    pub chunk: Option<StateChunk>,
    /// Absolute offset of the record in the uncompressed file image.
    pub file_index: u32,
    /// Serialized chunk size in bytes.
    pub pack_size: u32,
    pub save_flags: u32,
    pub options: LoadOption,
}

impl FileObject {
    #[must_use]
    pub fn new(object_id: ObjectId, class_id: ClassId, name: impl Into<String>) -> Self {
        Self {
            object_id,
            class_id,
            name: name.into(),
            save_flags: STATESAVE_ALL,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_chunk(mut self, chunk: StateChunk) -> Self {
        self.chunk = Some(chunk);
        self
    }
}

/// Global state saved by one manager.
#[derive(Debug, Clone, Default)]
pub struct ManagerData {
    pub guid: Guid,
    pub chunk: Option<StateChunk>,
}

/// Plugins of one category a file depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDependency {
    pub category: PluginCategory,
    pub guids: Vec<Guid>,
}

impl PluginDependency {
    /// Size of the record in the header section.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        8 + self.guids.len() * 8
    }
}

/// Everything a load produces.
#[derive(Debug, Clone, Default)]
pub struct FileDocument {
    pub info: FileInfo,
    pub max_id_saved: u32,
    pub objects: Vec<FileObject>,
    pub managers: Vec<ManagerData>,
    pub dependencies: Vec<PluginDependency>,
    /// Names of embedded files, extracted into the temp folder.
    pub included_files: Vec<String>,
}

impl FileDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices of objects whose name satisfies `matches`.
    pub fn find_objects<F>(&self, mut matches: F) -> Vec<usize>
    where
        F: FnMut(&str) -> bool,
    {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, obj)| matches(&obj.name))
            .map(|(index, _)| index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_object_defaults() {
        let obj = FileObject::new(ObjectId(3), ClassId::GROUP, "Root");
        assert_eq!(obj.created_id, ObjectId::NULL);
        assert_eq!(obj.save_flags, STATESAVE_ALL);
        assert_eq!(obj.options, LoadOption::Default);
        assert!(obj.chunk.is_none());
        assert!(obj.with_chunk(StateChunk::default()).chunk.is_some());
    }

    #[test]
    fn test_find_objects() {
        let mut doc = FileDocument::new();
        for name in ["Floor", "Wall", "Floor_Top"] {
            doc.objects
                .push(FileObject::new(ObjectId(1), ClassId::OBJECT, name));
        }
        assert_eq!(doc.find_objects(|name| name.starts_with("Floor")), vec![0, 2]);
        assert!(doc.find_objects(|name| name.is_empty()).is_empty());
    }

    #[test]
    fn test_dependency_len() {
        let dep = PluginDependency {
            category: PluginCategory::ManagerDll,
            guids: vec![Guid::new(1, 2), Guid::new(3, 4)],
        };
        assert_eq!(dep.encoded_len(), 24);
        assert_eq!(LoadOption::Replace.to_string(), "CK_FO_REPLACEOBJECT");
    }
}
