//! Shared state of one load/save session.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

use crate::chunk::StateChunk;
use crate::compression::DEFAULT_COMPRESSION_LEVEL;
use crate::encoding::EncodingList;
use crate::error::{ChunkError, ChunkResult, CmoError, Result};
use crate::object::{LiveManager, LiveObject, ObjectModel, ObjectRegistry};
use crate::path::PathManager;
use crate::types::{ClassId, Guid, ObjectId, WriteMode};

/// Receives user-facing diagnostics.
pub type OutputSink = Box<dyn FnMut(&str)>;

/// Plain configuration mapped onto a [`Context`].
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Encoding labels tried in order for native strings.
    pub encodings: Vec<String>,
    /// Existing directory replacing the default temp folder.
    pub temp_folder: Option<PathBuf>,
    /// Extra directories searched for external files.
    pub extra_paths: Vec<PathBuf>,
    /// zlib level, 1 to 9.
    pub compression_level: u32,
    pub write_mode: WriteMode,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            encodings: Vec::new(),
            temp_folder: None,
            extra_paths: Vec::new(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            write_mode: WriteMode::UNCOMPRESSED,
        }
    }
}

/// Owns live objects and managers plus the settings every reader and writer
/// consults.
///
/// Object ids index the object table directly; id 0 is the null identity and
/// ids of destroyed objects are handed out again.
pub struct Context {
    objects: Vec<Option<LiveObject>>,
    returned_ids: VecDeque<ObjectId>,
    managers: Vec<LiveManager>,
    encodings: EncodingList,
    paths: PathManager,
    compression_level: u32,
    write_mode: WriteMode,
    registry: ObjectRegistry,
    output: OutputSink,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("objects", &self.object_count())
            .field("managers", &self.managers.len())
            .field("encodings", &self.encodings)
            .field("paths", &self.paths)
            .field("compression_level", &self.compression_level)
            .field("write_mode", &self.write_mode)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context with default settings.
    pub fn new() -> Result<Self> {
        Ok(Self {
            objects: vec![None],
            returned_ids: VecDeque::new(),
            managers: Vec::new(),
            encodings: EncodingList::default(),
            paths: PathManager::new()?,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            write_mode: WriteMode::UNCOMPRESSED,
            registry: ObjectRegistry::default(),
            output: Box::new(|_| {}),
        })
    }

    /// Create a context and apply `options`.
    pub fn with_options(options: &ContextOptions) -> Result<Self> {
        let mut ctx = Self::new()?;
        if !options.encodings.is_empty() {
            ctx.encodings = EncodingList::from_labels(&options.encodings)?;
        }
        if let Some(dir) = &options.temp_folder {
            ctx.paths.set_temp_folder(dir)?;
        }
        for dir in &options.extra_paths {
            ctx.paths.add_path(dir)?;
        }
        ctx.set_compression_level(options.compression_level)?;
        ctx.write_mode = options.write_mode;
        Ok(ctx)
    }

    /// Route diagnostics to `sink`.
    #[must_use]
    pub fn with_output(mut self, sink: impl FnMut(&str) + 'static) -> Self {
        self.output = Box::new(sink);
        self
    }

    #[must_use]
    pub fn with_encodings(mut self, encodings: EncodingList) -> Self {
        self.encodings = encodings;
        self
    }

    #[must_use]
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: ObjectRegistry) -> Self {
        self.registry = registry;
        self
    }

    // ========== settings ==========

    #[must_use]
    pub fn encodings(&self) -> &EncodingList {
        &self.encodings
    }

    pub fn set_encodings(&mut self, encodings: EncodingList) {
        self.encodings = encodings;
    }

    #[must_use]
    pub fn path_manager(&self) -> &PathManager {
        &self.paths
    }

    pub fn path_manager_mut(&mut self) -> &mut PathManager {
        &mut self.paths
    }

    #[must_use]
    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    /// Accepts levels 1 to 9.
    pub fn set_compression_level(&mut self, level: u32) -> Result<()> {
        if !(1..=9).contains(&level) {
            return Err(CmoError::invalid_parameter(format!(
                "compression level {level} is outside 1..=9"
            )));
        }
        self.compression_level = level;
        Ok(())
    }

    #[must_use]
    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    pub fn set_write_mode(&mut self, mode: WriteMode) {
        self.write_mode = mode;
    }

    #[must_use]
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn set_output(&mut self, sink: impl FnMut(&str) + 'static) {
        self.output = Box::new(sink);
    }

    /// Send one diagnostic line to the output sink.
    pub fn output(&mut self, message: &str) {
        (self.output)(message);
    }

    // ========== objects ==========

    /// Create an object of `class_id` and return its id.
    pub fn create_object(&mut self, class_id: ClassId, name: &str) -> ObjectId {
        let id = match self.returned_ids.pop_front() {
            Some(id) => id,
            None => {
                self.objects.push(None);
                ObjectId((self.objects.len() - 1) as u32)
            }
        };
        self.objects[id.get() as usize] = Some(self.registry.create(id, class_id, name));
        tracing::trace!(%id, %class_id, name, "object created");
        id
    }

    #[must_use]
    pub fn object(&self, id: ObjectId) -> Option<&LiveObject> {
        self.objects.get(id.get() as usize)?.as_ref()
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut LiveObject> {
        self.objects.get_mut(id.get() as usize)?.as_mut()
    }

    /// Destroy an object. Returns false when no such object exists.
    pub fn destroy_object(&mut self, id: ObjectId) -> bool {
        match self.objects.get_mut(id.get() as usize) {
            Some(slot) if slot.is_some() && !id.is_null() => {
                *slot = None;
                self.returned_ids.push_back(id);
                true
            }
            _ => false,
        }
    }

    /// Ids of every live object in ascending order.
    #[must_use]
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .flatten()
            .map(LiveObject::id)
            .collect()
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.iter().flatten().count()
    }

    /// Destroy every object and manager.
    pub fn clear_all(&mut self) {
        self.objects = vec![None];
        self.returned_ids.clear();
        self.managers.clear();
    }

    /// Feed a chunk in a read pass to a live object.
    pub fn load_object(&mut self, id: ObjectId, chunk: &mut StateChunk) -> ChunkResult<()> {
        let Self {
            objects, encodings, ..
        } = self;
        match objects.get_mut(id.get() as usize).and_then(Option::as_mut) {
            Some(object) => object.load(chunk, encodings),
            None => Err(ChunkError::malformed(format!("no live object {id}"))),
        }
    }

    /// Serialize a live object into a chunk in a write pass.
    pub fn save_object(&self, id: ObjectId, chunk: &mut StateChunk) -> ChunkResult<()> {
        match self.object(id) {
            Some(object) => object.save(chunk, &self.encodings),
            None => Err(ChunkError::malformed(format!("no live object {id}"))),
        }
    }

    // ========== managers ==========

    #[must_use]
    pub fn managers(&self) -> &[LiveManager] {
        &self.managers
    }

    pub fn add_manager(&mut self, manager: LiveManager) {
        self.managers.push(manager);
    }

    /// Feed a chunk in a read pass to the manager registered under `guid`,
    /// registering a new one when none matches.
    pub fn load_manager(&mut self, guid: Guid, chunk: &mut StateChunk) -> ChunkResult<()> {
        let index = match self.managers.iter().position(|manager| manager.guid == guid) {
            Some(index) => index,
            None => {
                self.managers.push(LiveManager::new(guid, ""));
                self.managers.len() - 1
            }
        };
        self.managers[index].load(chunk, &self.encodings)
    }

    /// Serialize manager `index` into a chunk in a write pass.
    pub fn save_manager(&self, index: usize, chunk: &mut StateChunk) -> ChunkResult<()> {
        match self.managers.get(index) {
            Some(manager) => manager.save(chunk, &self.encodings),
            None => Err(ChunkError::malformed(format!("no manager {index}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::object::{ObjectKind, Visibility};
    use crate::types::Guid;

    #[test]
    fn test_object_ids_are_reused() {
        let mut ctx = Context::new().unwrap();
        let a = ctx.create_object(ClassId::OBJECT, "a");
        let b = ctx.create_object(ClassId::GROUP, "b");
        assert_eq!((a, b), (ObjectId(1), ObjectId(2)));
        assert!(matches!(
            ctx.object(b).unwrap().kind,
            ObjectKind::Group { .. }
        ));

        assert!(ctx.destroy_object(a));
        assert!(!ctx.destroy_object(a));
        assert!(!ctx.destroy_object(ObjectId::NULL));
        assert!(ctx.object(a).is_none());
        assert_eq!(ctx.object_ids(), vec![b]);

        let c = ctx.create_object(ClassId::MESH, "c");
        assert_eq!(c, a);
        assert_eq!(ctx.object(c).unwrap().name(), "c");
        assert_eq!(ctx.object_count(), 2);

        ctx.clear_all();
        assert_eq!(ctx.object_count(), 0);
        assert_eq!(ctx.create_object(ClassId::OBJECT, "d"), ObjectId(1));
    }

    #[test]
    fn test_compression_level_bounds() {
        let mut ctx = Context::new().unwrap();
        assert_eq!(ctx.compression_level(), 5);
        assert!(matches!(
            ctx.set_compression_level(0),
            Err(CmoError::InvalidParameter { .. })
        ));
        assert!(ctx.set_compression_level(10).is_err());
        ctx.set_compression_level(9).unwrap();
        assert_eq!(ctx.compression_level(), 9);
    }

    #[test]
    fn test_with_options() {
        let dir = tempfile::tempdir().unwrap();
        let options = ContextOptions {
            encodings: vec!["windows-1252".to_string()],
            temp_folder: Some(dir.path().to_path_buf()),
            write_mode: WriteMode::WHOLECOMPRESSED,
            ..ContextOptions::default()
        };
        let ctx = Context::with_options(&options).unwrap();
        assert_eq!(ctx.encodings().names(), vec!["windows-1252"]);
        assert_eq!(ctx.path_manager().temp_folder(), dir.path());
        assert_eq!(ctx.write_mode(), WriteMode::WHOLECOMPRESSED);

        let bad = ContextOptions {
            compression_level: 0,
            ..ContextOptions::default()
        };
        assert!(Context::with_options(&bad).is_err());
    }

    #[test]
    fn test_output_sink() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&lines);
        let mut ctx = Context::new()
            .unwrap()
            .with_output(move |line| sink.borrow_mut().push(line.to_string()));
        ctx.output("first");
        ctx.output("second");
        assert_eq!(*lines.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_load_and_save_object() {
        let mut ctx = Context::new().unwrap();
        let id = ctx.create_object(ClassId::OBJECT, "a");
        ctx.object_mut(id).unwrap().visibility = Visibility::Hidden;

        let mut chunk = StateChunk::default();
        chunk.start_write().unwrap();
        ctx.save_object(id, &mut chunk).unwrap();
        chunk.stop_write();

        let other = ctx.create_object(ClassId::OBJECT, "b");
        chunk.start_read().unwrap();
        ctx.load_object(other, &mut chunk).unwrap();
        chunk.stop_read();
        assert_eq!(ctx.object(other).unwrap().visibility, Visibility::Hidden);
        assert!(ctx.load_object(ObjectId(99), &mut chunk).is_err());

        ctx.add_manager(LiveManager::new(Guid::new(1, 1), "m"));
        assert_eq!(ctx.managers().len(), 1);
        assert!(ctx.save_manager(3, &mut chunk).is_err());

        chunk.start_read().unwrap();
        ctx.load_manager(Guid::new(1, 1), &mut chunk).unwrap();
        chunk.stop_read();
        assert_eq!(ctx.managers().len(), 1);
        assert!(ctx.managers()[0].chunk.is_some());

        chunk.start_read().unwrap();
        ctx.load_manager(Guid::new(2, 2), &mut chunk).unwrap();
        chunk.stop_read();
        assert_eq!(ctx.managers().len(), 2);
        assert_eq!(ctx.managers()[1].guid, Guid::new(2, 2));
    }
}
