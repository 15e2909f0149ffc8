use winnow::binary::{le_u8, le_u16, le_u32};
use winnow::prelude::*;

use crate::structs::StringPool;

/// See: https://cs.android.com/android/platform/superproject/main/+/main:frameworks/base/libs/androidfw/include/androidfw/ResourceTypes.h;l=237
#[derive(Debug, Clone, Copy, PartialEq, Default, Eq, PartialOrd, Ord)]
pub(crate) enum ResourceType {
    #[default]
    Null,
    StringPool,
    Table,
    Xml,

    // Chunk types in XmlType
    XmlStartNamespace,
    XmlEndNamespace,
    XmlStartElement,
    XmlEndElement,
    XmlCdata,
    XmlLastChunk,
    XmlResourceMap,

    Unknown(u16),
}

impl ResourceType {
    pub(crate) fn id(&self) -> u16 {
        match self {
            ResourceType::Null => 0x0000,
            ResourceType::StringPool => 0x0001,
            ResourceType::Table => 0x0002,
            ResourceType::Xml => 0x0003,
            ResourceType::XmlStartNamespace => 0x0100,
            ResourceType::XmlEndNamespace => 0x0101,
            ResourceType::XmlStartElement => 0x0102,
            ResourceType::XmlEndElement => 0x0103,
            ResourceType::XmlCdata => 0x0104,
            ResourceType::XmlLastChunk => 0x017f,
            ResourceType::XmlResourceMap => 0x0180,
            ResourceType::Unknown(other) => *other,
        }
    }

    /// Node chunks live in `[XmlStartNamespace, XmlLastChunk]`
    #[inline]
    pub(crate) fn is_xml_node(&self) -> bool {
        (0x0100..=0x017f).contains(&self.id())
    }
}

impl From<u16> for ResourceType {
    fn from(value: u16) -> Self {
        match value {
            0x0000 => ResourceType::Null,
            0x0001 => ResourceType::StringPool,
            0x0002 => ResourceType::Table,
            0x0003 => ResourceType::Xml,
            0x0100 => ResourceType::XmlStartNamespace,
            0x0101 => ResourceType::XmlEndNamespace,
            0x0102 => ResourceType::XmlStartElement,
            0x0103 => ResourceType::XmlEndElement,
            0x0104 => ResourceType::XmlCdata,
            0x017f => ResourceType::XmlLastChunk,
            0x0180 => ResourceType::XmlResourceMap,
            other => ResourceType::Unknown(other),
        }
    }
}

/// Header that appears at the front of every data chunk in a resource
///
/// See: https://cs.android.com/android/platform/superproject/+/android-latest-release:frameworks/base/libs/androidfw/include/androidfw/ResourceTypes.h;l=220
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ResChunkHeader {
    /// Type identifier for this chunk. The meaning of this value depends on the containing chunk.
    pub(crate) type_: ResourceType,

    /// Size of the chunk header (in bytes).  Adding this value to
    /// the address of the chunk allows you to find its associated data
    /// (if any).
    pub(crate) header_size: u16,

    /// Total size of this chunk (in bytes).  This is the chunkSize plus
    /// the size of any data associated with the chunk.
    pub(crate) size: u32,
}

impl ResChunkHeader {
    #[inline]
    pub(crate) fn parse(input: &mut &[u8]) -> ModalResult<ResChunkHeader> {
        (le_u16, le_u16, le_u32)
            .map(|(type_, header_size, size)| ResChunkHeader {
                type_: ResourceType::from(type_),
                header_size,
                size,
            })
            .parse_next(input)
    }

    /// Get the size of the data without taking into account the size of the structure itself
    #[inline(always)]
    pub(crate) fn content_size(&self) -> u32 {
        self.size.saturating_sub(Self::size_of() as u32)
    }

    /// Get the size of this structure in bytes
    #[inline(always)]
    pub(crate) const fn size_of() -> usize {
        // 2 bytes - ResourceTypes
        // 2 bytes - header_size
        // 4 bytes - size
        2 + 2 + 4
    }
}

/// Type of the data value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceValueType {
    /// The `data` is either 0 or 1, specifying this resource is either undefined or empty, respectively.
    Null,

    /// The `data` holds a ResTable_ref — a reference to another resource table entry.
    Reference,

    /// The `data` holds an attribute resource identifier.
    Attribute,

    /// The `data` holds an index into the containing resource table's global value string pool.
    String,

    /// The `data` holds a single-precision floating point number.
    Float,

    /// The `data` is a raw integer value of the form n..n.
    Dec,

    /// The `data` is a raw integer value of the form 0xn..n.
    Hex,

    /// The `data` is either 0 or 1, for input "false" or "true" respectively.
    Boolean,

    /// One of the `#aarrggbb`, `#rrggbb`, `#argb`, `#rgb` forms
    Color,

    /// Anything else (dimensions, fractions, vendor types)
    Other(u8),
}

impl From<u8> for ResourceValueType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ResourceValueType::Null,
            0x01 => ResourceValueType::Reference,
            0x02 => ResourceValueType::Attribute,
            0x03 => ResourceValueType::String,
            0x04 => ResourceValueType::Float,
            0x10 => ResourceValueType::Dec,
            0x11 => ResourceValueType::Hex,
            0x12 => ResourceValueType::Boolean,
            0x1c..=0x1f => ResourceValueType::Color,
            v => ResourceValueType::Other(v),
        }
    }
}

/// Representation of a value in a resource, supplying type information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceValue {
    /// Type of the data value
    pub data_type: ResourceValueType,

    /// Data itself
    pub data: u32,
}

impl ResourceValue {
    #[inline]
    pub(crate) fn parse(input: &mut &[u8]) -> ModalResult<ResourceValue> {
        // size (u16) and res0 (u8) are not interesting
        (le_u16, le_u8, le_u8, le_u32)
            .map(|(_size, _res, data_type, data)| ResourceValue {
                data,
                data_type: ResourceValueType::from(data_type),
            })
            .parse_next(input)
    }

    /// Integer interpretation, only for `Dec` and `Hex` values
    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        match self.data_type {
            ResourceValueType::Dec | ResourceValueType::Hex => Some(self.data as i32),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self.data_type {
            ResourceValueType::Boolean => Some(self.data != 0),
            _ => None,
        }
    }

    pub(crate) fn to_string(&self, string_pool: &StringPool) -> String {
        match self.data_type {
            ResourceValueType::Reference => format!("@{:08x}", self.data),
            ResourceValueType::Attribute => format!("?{:08x}", self.data),
            ResourceValueType::String => string_pool.get(self.data).cloned().unwrap_or_default(),
            ResourceValueType::Float => f32::from_bits(self.data).to_string(),
            ResourceValueType::Dec => format!("{}", self.data as i32),
            ResourceValueType::Hex => format!("0x{:08x}", self.data),
            ResourceValueType::Boolean => (self.data != 0).to_string(),
            ResourceValueType::Color => format!("#{:08x}", self.data),
            _ => format!("<0x{:x}, type {:?}>", self.data, self.data_type),
        }
    }
}
