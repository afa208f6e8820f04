//! Identifier types, flag sets and format constants.

use std::fmt;

/// Engine version written into every saved file.
pub const CK_VERSION: u32 = 0x1302_2002;
/// Product version written into every saved file.
pub const PRODUCT_VERSION: u32 = 0x0201_0001;
/// Product build written into every saved file.
pub const PRODUCT_BUILD: u32 = 0;
/// Product build substituted when a file declares an unknown product.
pub const FALLBACK_PRODUCT_BUILD: u32 = 0x0101_0000;

/// File format version produced by the writer.
pub const CURRENT_FILE_VERSION: u32 = 8;
/// Oldest readable file format version.
pub const MIN_FILE_VERSION: u32 = 7;
/// Newest readable file format version.
pub const MAX_FILE_VERSION: u32 = 9;

/// Live identity of an object or the null identity `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub const NULL: Self = Self(0);

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Class identifier tagging which schema owns a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub i32);

impl ClassId {
    pub const OBJECT: Self = Self(1);
    pub const PARAMETERIN: Self = Self(2);
    pub const PARAMETEROUT: Self = Self(3);
    pub const PARAMETEROPERATION: Self = Self(4);
    pub const STATE: Self = Self(5);
    pub const BEHAVIORLINK: Self = Self(6);
    pub const BEHAVIOR: Self = Self(8);
    pub const BEHAVIORIO: Self = Self(9);
    pub const SCENE: Self = Self(10);
    pub const SCENEOBJECT: Self = Self(11);
    pub const RENDERCONTEXT: Self = Self(12);
    pub const KINEMATICCHAIN: Self = Self(13);
    pub const OBJECTANIMATION: Self = Self(15);
    pub const ANIMATION: Self = Self(16);
    pub const KEYEDANIMATION: Self = Self(18);
    pub const BEOBJECT: Self = Self(19);
    pub const SYNCHRO: Self = Self(20);
    pub const LEVEL: Self = Self(21);
    pub const PLACE: Self = Self(22);
    pub const GROUP: Self = Self(23);
    pub const SOUND: Self = Self(24);
    pub const WAVESOUND: Self = Self(25);
    pub const MIDISOUND: Self = Self(26);
    pub const ENTITY2D: Self = Self(27);
    pub const SPRITE: Self = Self(28);
    pub const SPRITETEXT: Self = Self(29);
    pub const MATERIAL: Self = Self(30);
    pub const TEXTURE: Self = Self(31);
    pub const MESH: Self = Self(32);
    pub const ENTITY3D: Self = Self(33);
    pub const CAMERA: Self = Self(34);
    pub const TARGETCAMERA: Self = Self(35);
    pub const CURVEPOINT: Self = Self(36);
    pub const SPRITE3D: Self = Self(37);
    pub const LIGHT: Self = Self(38);
    pub const TARGETLIGHT: Self = Self(39);
    pub const CHARACTER: Self = Self(40);
    pub const OBJECT3D: Self = Self(41);
    pub const BODYPART: Self = Self(42);
    pub const CURVE: Self = Self(43);
    pub const PARAMETERLOCAL: Self = Self(45);
    pub const PARAMETER: Self = Self(46);
    pub const RENDEROBJECT: Self = Self(47);
    pub const GRID: Self = Self(50);
    pub const LAYER: Self = Self(51);
    pub const DATAARRAY: Self = Self(52);
    pub const PATCHMESH: Self = Self(53);
    pub const PROGRESSIVEMESH: Self = Self(54);

    const NAMES: &'static [(i32, &'static str)] = &[
        (1, "CKCID_OBJECT"),
        (2, "CKCID_PARAMETERIN"),
        (3, "CKCID_PARAMETEROUT"),
        (4, "CKCID_PARAMETEROPERATION"),
        (5, "CKCID_STATE"),
        (6, "CKCID_BEHAVIORLINK"),
        (8, "CKCID_BEHAVIOR"),
        (9, "CKCID_BEHAVIORIO"),
        (10, "CKCID_SCENE"),
        (11, "CKCID_SCENEOBJECT"),
        (12, "CKCID_RENDERCONTEXT"),
        (13, "CKCID_KINEMATICCHAIN"),
        (15, "CKCID_OBJECTANIMATION"),
        (16, "CKCID_ANIMATION"),
        (18, "CKCID_KEYEDANIMATION"),
        (19, "CKCID_BEOBJECT"),
        (20, "CKCID_SYNCHRO"),
        (21, "CKCID_LEVEL"),
        (22, "CKCID_PLACE"),
        (23, "CKCID_GROUP"),
        (24, "CKCID_SOUND"),
        (25, "CKCID_WAVESOUND"),
        (26, "CKCID_MIDISOUND"),
        (27, "CKCID_2DENTITY"),
        (28, "CKCID_SPRITE"),
        (29, "CKCID_SPRITETEXT"),
        (30, "CKCID_MATERIAL"),
        (31, "CKCID_TEXTURE"),
        (32, "CKCID_MESH"),
        (33, "CKCID_3DENTITY"),
        (34, "CKCID_CAMERA"),
        (35, "CKCID_TARGETCAMERA"),
        (36, "CKCID_CURVEPOINT"),
        (37, "CKCID_SPRITE3D"),
        (38, "CKCID_LIGHT"),
        (39, "CKCID_TARGETLIGHT"),
        (40, "CKCID_CHARACTER"),
        (41, "CKCID_3DOBJECT"),
        (42, "CKCID_BODYPART"),
        (43, "CKCID_CURVE"),
        (45, "CKCID_PARAMETERLOCAL"),
        (46, "CKCID_PARAMETER"),
        (47, "CKCID_RENDEROBJECT"),
        (48, "CKCID_INTERFACEOBJECTMANAGER"),
        (49, "CKCID_CRITICALSECTION"),
        (50, "CKCID_GRID"),
        (51, "CKCID_LAYER"),
        (52, "CKCID_DATAARRAY"),
        (53, "CKCID_PATCHMESH"),
        (54, "CKCID_PROGRESSIVEMESH"),
    ];

    /// Symbolic engine name, if the id is a known class.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(raw, _)| *raw == self.0)
            .map(|(_, name)| *name)
    }
}

impl Default for ClassId {
    fn default() -> Self {
        Self::OBJECT
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "CKCID {}", self.0),
        }
    }
}

/// Two-word globally unique identifier of a manager or plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Guid {
    pub d1: u32,
    pub d2: u32,
}

impl Guid {
    #[must_use]
    pub const fn new(d1: u32, d2: u32) -> Self {
        Self { d1, d2 }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<0x{:08x}, 0x{:08x}>", self.d1, self.d2)
    }
}

/// Layout generation of a serialized chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkVersion(pub u32);

impl ChunkVersion {
    pub const BASE: Self = Self(0);
    /// Object ids stored as file table indices.
    pub const V1: Self = Self(4);
    /// Manager list added.
    pub const V2: Self = Self(5);
    /// Packed header with option flags.
    pub const V3: Self = Self(6);
    pub const V4: Self = Self(7);
    pub const CURRENT: Self = Self::V4;
}

impl fmt::Display for ChunkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "CHUNK_VERSIONBASE",
            4 => "CHUNK_VERSION1",
            5 => "CHUNK_VERSION2",
            6 => "CHUNK_VERSION3",
            7 => "CHUNK_VERSION4",
            _ => return write!(f, "{}", self.0),
        };
        write!(f, "{} ({name})", self.0)
    }
}

/// Payload semantics tag interpreted by the object model only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataVersion(pub u32);

impl DataVersion {
    pub const OLD: Self = Self(0);
    pub const BASE: Self = Self(1);
    pub const MAJOR_CHANGE: Self = Self(5);
    pub const DEV_2_1: Self = Self(10);
    pub const CURRENT: Self = Self::DEV_2_1;
}

impl fmt::Display for DataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Option bits stored in byte 3 of a serialized chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChunkOptions(pub u8);

impl ChunkOptions {
    pub const IDS: Self = Self(0x01);
    pub const MAN: Self = Self(0x02);
    pub const CHN: Self = Self(0x04);
    pub const FILE: Self = Self(0x08);
    pub const ALLOWDYN: Self = Self(0x10);
    pub const LISTBIG: Self = Self(0x20);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// Save flags of a composition file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WriteMode(pub u32);

impl WriteMode {
    pub const UNCOMPRESSED: Self = Self(0);
    pub const CHUNKCOMPRESSED_OLD: Self = Self(1);
    pub const EXTERNALTEXTURES_OLD: Self = Self(2);
    pub const FORVIEWER: Self = Self(4);
    pub const WHOLECOMPRESSED: Self = Self(8);

    const NAMES: [(u32, &'static str); 4] = [
        (1, "CKFILE_CHUNKCOMPRESSED_OLD"),
        (2, "CKFILE_EXTERNALTEXTURES_OLD"),
        (4, "CKFILE_FORVIEWER"),
        (8, "CKFILE_WHOLECOMPRESSED"),
    ];

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when the data section is stored as a zlib stream.
    #[must_use]
    pub const fn is_compressed(self) -> bool {
        self.0 & (Self::CHUNKCOMPRESSED_OLD.0 | Self::WHOLECOMPRESSED.0) != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("CKFILE_UNCOMPRESSED");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(", "))
    }
}

/// Plugin category named by a dependency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginCategory {
    BitmapReader,
    SoundReader,
    ModelReader,
    ManagerDll,
    BehaviorDll,
    RenderEngineDll,
    MovieReader,
    ExtensionDll,
    Unknown(u32),
}

impl PluginCategory {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::BitmapReader,
            1 => Self::SoundReader,
            2 => Self::ModelReader,
            3 => Self::ManagerDll,
            4 => Self::BehaviorDll,
            5 => Self::RenderEngineDll,
            6 => Self::MovieReader,
            7 => Self::ExtensionDll,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::BitmapReader => 0,
            Self::SoundReader => 1,
            Self::ModelReader => 2,
            Self::ManagerDll => 3,
            Self::BehaviorDll => 4,
            Self::RenderEngineDll => 5,
            Self::MovieReader => 6,
            Self::ExtensionDll => 7,
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BitmapReader => "CKPLUGIN_BITMAP_READER",
            Self::SoundReader => "CKPLUGIN_SOUND_READER",
            Self::ModelReader => "CKPLUGIN_MODEL_READER",
            Self::ManagerDll => "CKPLUGIN_MANAGER_DLL",
            Self::BehaviorDll => "CKPLUGIN_BEHAVIOR_DLL",
            Self::RenderEngineDll => "CKPLUGIN_RENDERENGINE_DLL",
            Self::MovieReader => "CKPLUGIN_MOVIE_READER",
            Self::ExtensionDll => "CKPLUGIN_EXTENSION_DLL",
            Self::Unknown(raw) => return write!(f, "CKPLUGIN {raw}"),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_mode_display() {
        assert_eq!(WriteMode::UNCOMPRESSED.to_string(), "CKFILE_UNCOMPRESSED");
        let mode = WriteMode::WHOLECOMPRESSED.union(WriteMode::FORVIEWER);
        assert_eq!(mode.to_string(), "CKFILE_FORVIEWER, CKFILE_WHOLECOMPRESSED");
        assert!(mode.is_compressed());
        assert!(!WriteMode::FORVIEWER.is_compressed());
        assert!(WriteMode::CHUNKCOMPRESSED_OLD.is_compressed());
    }

    #[test]
    fn test_class_id_names() {
        assert_eq!(ClassId::GROUP.to_string(), "CKCID_GROUP");
        assert_eq!(ClassId(999).to_string(), "CKCID 999");
        assert_eq!(ClassId::default(), ClassId::OBJECT);
    }

    #[test]
    fn test_plugin_category_raw() {
        for raw in 0..10 {
            assert_eq!(PluginCategory::from_raw(raw).raw(), raw);
        }
        assert_eq!(PluginCategory::from_raw(3), PluginCategory::ManagerDll);
    }

    #[test]
    fn test_chunk_version_order() {
        assert!(ChunkVersion::V1 < ChunkVersion::V2);
        assert!(ChunkVersion::BASE < ChunkVersion::V1);
        assert_eq!(ChunkVersion::CURRENT, ChunkVersion(7));
    }

    #[test]
    fn test_chunk_options() {
        let mut options = ChunkOptions::default();
        options.insert(ChunkOptions::IDS);
        options.insert(ChunkOptions::FILE);
        assert!(options.contains(ChunkOptions::IDS));
        assert!(!options.contains(ChunkOptions::MAN));
        assert_eq!(options.0, 0x09);
    }
}
