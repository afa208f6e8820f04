//! Live objects and managers built from, and saved into, state chunks.
//!
//! Only a small set of classes is understood field by field. Everything else
//! is kept as an opaque copy of its chunk and written back unchanged.

use std::collections::HashMap;
use std::fmt;

use crate::chunk::StateChunk;
use crate::encoding::EncodingList;
use crate::error::ChunkError;
use crate::types::{ClassId, Guid, ObjectId};

/// Identifier of the region marking an object hidden.
pub const OBJECT_HIDDEN: u32 = 0x0000_0004;
/// Identifier of the region marking an object hidden with its hierarchy.
pub const OBJECT_HIERARCHY_HIDDEN: u32 = 0x0000_0018;
/// Identifier of the region holding a group's members.
pub const GROUP_MEMBERS: u32 = 0x0000_0010;

/// Capability shared by everything that lives in a chunk.
pub trait ObjectModel {
    /// Restore state from a chunk in a read pass.
    fn load(&mut self, chunk: &mut StateChunk, encodings: &EncodingList) -> Result<(), ChunkError>;

    /// Serialize state into a chunk in a write pass.
    fn save(&self, chunk: &mut StateChunk, encodings: &EncodingList) -> Result<(), ChunkError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
    HierarchyHidden,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Visible => "Visible",
            Self::Hidden => "Hidden",
            Self::HierarchyHidden => "Hierarchy Hidden",
        })
    }
}

/// Class specific state.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// Visibility only.
    Plain,
    Group { members: Vec<ObjectId> },
    /// Unknown class, stored as the last loaded chunk.
    Opaque { chunk: Option<StateChunk> },
}

/// An object owned by a [`Context`](crate::Context).
#[derive(Debug, Clone)]
pub struct LiveObject {
    id: ObjectId,
    class_id: ClassId,
    name: String,
    pub visibility: Visibility,
    pub kind: ObjectKind,
}

impl LiveObject {
    #[must_use]
    pub fn new(id: ObjectId, class_id: ClassId, name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            id,
            class_id,
            name: name.into(),
            visibility: Visibility::Visible,
            kind,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Group members, empty for every other kind.
    #[must_use]
    pub fn members(&self) -> &[ObjectId] {
        match &self.kind {
            ObjectKind::Group { members } => members,
            _ => &[],
        }
    }

    fn load_visibility(&mut self, chunk: &mut StateChunk) {
        self.visibility = if chunk.seek_identifier(OBJECT_HIDDEN) {
            Visibility::Hidden
        } else if chunk.seek_identifier(OBJECT_HIERARCHY_HIDDEN) {
            Visibility::HierarchyHidden
        } else {
            Visibility::Visible
        };
    }

    fn save_visibility(&self, chunk: &mut StateChunk) -> Result<(), ChunkError> {
        match self.visibility {
            Visibility::Visible => Ok(()),
            Visibility::Hidden => chunk.write_identifier(OBJECT_HIDDEN),
            Visibility::HierarchyHidden => chunk.write_identifier(OBJECT_HIERARCHY_HIDDEN),
        }
    }
}

impl ObjectModel for LiveObject {
    fn load(&mut self, chunk: &mut StateChunk, _encodings: &EncodingList) -> Result<(), ChunkError> {
        self.load_visibility(chunk);
        let own_id = self.id;
        match &mut self.kind {
            ObjectKind::Plain => {}
            ObjectKind::Group { members } => {
                members.clear();
                if chunk.seek_identifier(GROUP_MEMBERS) {
                    for member in chunk.read_object_array()? {
                        if member.is_null() || member == own_id || members.contains(&member) {
                            continue;
                        }
                        members.push(member);
                    }
                }
            }
            ObjectKind::Opaque { chunk: kept } => {
                let mut copy = chunk.clone();
                copy.stop_read();
                *kept = Some(copy);
            }
        }
        Ok(())
    }

    fn save(&self, chunk: &mut StateChunk, _encodings: &EncodingList) -> Result<(), ChunkError> {
        chunk.set_class_id(self.class_id);
        if let ObjectKind::Opaque { chunk: kept } = &self.kind {
            return match kept {
                Some(kept) => {
                    chunk.set_data_version(kept.data_version());
                    chunk.write_chunk_payload(kept)
                }
                None => Ok(()),
            };
        }

        self.save_visibility(chunk)?;
        if let ObjectKind::Group { members } = &self.kind {
            chunk.write_identifier(GROUP_MEMBERS)?;
            chunk.write_object_array(members)?;
        }
        Ok(())
    }
}

/// Builds the class specific part of a new object.
pub type ObjectFactory = fn() -> ObjectKind;

/// Lookup table from class id to object kind.
#[derive(Debug, Clone)]
pub struct ObjectRegistry {
    factories: HashMap<ClassId, ObjectFactory>,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        for class_id in [ClassId::OBJECT, ClassId::SCENEOBJECT, ClassId::BEOBJECT] {
            registry.register(class_id, || ObjectKind::Plain);
        }
        registry.register(ClassId::GROUP, || ObjectKind::Group {
            members: Vec::new(),
        });
        registry
    }
}

impl ObjectRegistry {
    /// Replace the factory used for `class_id`.
    pub fn register(&mut self, class_id: ClassId, factory: ObjectFactory) {
        self.factories.insert(class_id, factory);
    }

    #[must_use]
    pub fn is_known(&self, class_id: ClassId) -> bool {
        self.factories.contains_key(&class_id)
    }

    /// Create an object, falling back to an opaque one for unknown classes.
    #[must_use]
    pub fn create(&self, id: ObjectId, class_id: ClassId, name: &str) -> LiveObject {
        let kind = self
            .factories
            .get(&class_id)
            .map_or(ObjectKind::Opaque { chunk: None }, |factory| factory());
        LiveObject::new(id, class_id, name, kind)
    }
}

/// Global state owned by the context and saved once per file.
#[derive(Debug, Clone)]
pub struct LiveManager {
    pub guid: Guid,
    pub name: String,
    /// Retained state, written back verbatim.
    pub chunk: Option<StateChunk>,
}

impl LiveManager {
    #[must_use]
    pub fn new(guid: Guid, name: impl Into<String>) -> Self {
        Self {
            guid,
            name: name.into(),
            chunk: None,
        }
    }
}

impl ObjectModel for LiveManager {
    fn load(&mut self, chunk: &mut StateChunk, _encodings: &EncodingList) -> Result<(), ChunkError> {
        let mut copy = chunk.clone();
        copy.stop_read();
        self.chunk = Some(copy);
        Ok(())
    }

    fn save(&self, chunk: &mut StateChunk, _encodings: &EncodingList) -> Result<(), ChunkError> {
        match &self.chunk {
            Some(kept) => {
                chunk.set_class_id(kept.class_id());
                chunk.set_data_version(kept.data_version());
                chunk.write_chunk_payload(kept)
            }
            None => Ok(()),
        }
    }
}
