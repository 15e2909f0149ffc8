use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::Serialize;
use winnow::binary::{Endianness, u16 as ne_u16, u32 as ne_u32};
use winnow::combinator::repeat;
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::errors::{HeaderError, IdmapError};
use crate::header::{HeaderBuffer, IDMAP_HEADER_SIZE, IdmapHeader};

/// Marks a target entry without an overlay counterpart
pub const NO_ENTRY: u32 = 0xffffffff;

/// Mapping of one target resource type onto one overlay resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeBlock {
    pub target_type_id: u16,
    pub overlay_type_id: u16,

    /// Index of the target entry that `entries[0]` describes
    pub entry_offset: u16,

    /// Overlay entry ids, [`NO_ENTRY`] for holes
    pub entries: Vec<u32>,
}

impl TypeBlock {
    /// Four u16 fields in front of the entries
    const FIXED_SIZE: usize = 4 * size_of::<u16>();

    fn parse(input: &mut &[u8]) -> Result<TypeBlock, HeaderError> {
        let (target_type_id, overlay_type_id, entry_count, entry_offset) = (
            ne_u16::<_, ContextError>(Endianness::Native),
            ne_u16(Endianness::Native),
            ne_u16(Endianness::Native),
            ne_u16(Endianness::Native),
        )
            .parse_next(input)
            .map_err(|_| HeaderError::InvalidPayload("type block header is too small"))?;

        if !(1..=255).contains(&target_type_id) || !(1..=255).contains(&overlay_type_id) {
            return Err(HeaderError::InvalidPayload("invalid type map"));
        }

        let entries: Vec<u32> = repeat(
            entry_count as usize,
            ne_u32::<_, ContextError>(Endianness::Native),
        )
        .parse_next(input)
        .map_err(|_| HeaderError::InvalidPayload("too small for the number of entries"))?;

        Ok(TypeBlock {
            target_type_id,
            overlay_type_id,
            entry_offset,
            entries,
        })
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<(), HeaderError> {
        let entry_count = u16::try_from(self.entries.len())
            .map_err(|_| HeaderError::InvalidPayload("more than 65535 entries in a type block"))?;

        out.extend_from_slice(&self.target_type_id.to_ne_bytes());
        out.extend_from_slice(&self.overlay_type_id.to_ne_bytes());
        out.extend_from_slice(&entry_count.to_ne_bytes());
        out.extend_from_slice(&self.entry_offset.to_ne_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.to_ne_bytes());
        }
        Ok(())
    }

    /// Overlay entry id for a target entry id, if mapped
    pub fn lookup(&self, target_entry: u16) -> Option<u16> {
        let idx = target_entry.checked_sub(self.entry_offset)?;
        match self.entries.get(idx as usize) {
            Some(&NO_ENTRY) | None => None,
            Some(&entry) => Some(entry as u16),
        }
    }
}

/// Mapping section that follows the header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdmapPayload {
    pub target_package_id: u16,
    pub types: Vec<TypeBlock>,
}

impl IdmapPayload {
    pub fn parse(mut input: &[u8]) -> Result<IdmapPayload, HeaderError> {
        let (target_package_id, type_count) = (
            ne_u16::<_, ContextError>(Endianness::Native),
            ne_u16(Endianness::Native),
        )
            .parse_next(&mut input)
            .map_err(|_| HeaderError::InvalidPayload("too small to contain any mapping"))?;

        if target_package_id == 0 || target_package_id > 255 {
            return Err(HeaderError::InvalidPayload("target package id is invalid"));
        }

        if type_count == 0 {
            return Err(HeaderError::InvalidPayload("no mappings"));
        }

        if type_count > 255 {
            warn!("idmap: too many mappings, only 255 are possible but {type_count} are present");
        }

        let mut types = Vec::with_capacity(type_count.min(255) as usize);
        // trailing bytes shorter than a block header are ignored, like the runtime does
        while input.len() > TypeBlock::FIXED_SIZE {
            types.push(TypeBlock::parse(&mut input)?);
        }

        if types.len() != type_count as usize {
            debug!(
                "idmap: declares {type_count} type blocks, found {}",
                types.len()
            );
        }

        Ok(IdmapPayload {
            target_package_id,
            types,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<(), HeaderError> {
        let type_count = u16::try_from(self.types.len())
            .map_err(|_| HeaderError::InvalidPayload("more than 65535 type blocks"))?;

        out.extend_from_slice(&self.target_package_id.to_ne_bytes());
        out.extend_from_slice(&type_count.to_ne_bytes());
        for block in &self.types {
            block.write_to(out)?;
        }
        Ok(())
    }
}

/// Whole idmap file, header and mapping section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Idmap {
    pub header: IdmapHeader,
    pub payload: IdmapPayload,
}

impl Idmap {
    /// Decode a complete idmap, the buffer doesn't have to be aligned
    pub fn parse(input: &[u8]) -> Result<Idmap, HeaderError> {
        let header = HeaderBuffer::from_slice(input)?.parse()?;
        header.validate_version()?;

        let payload = IdmapPayload::parse(&input[IDMAP_HEADER_SIZE..])?;

        Ok(Idmap { header, payload })
    }

    /// Read and decode an idmap file
    pub fn read(path: &Path) -> Result<Idmap, IdmapError> {
        let input = fs::read(path)?;
        Ok(Idmap::parse(&input)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, HeaderError> {
        let mut out = self.header.to_bytes();
        self.payload.write_to(&mut out)?;
        Ok(out)
    }
}
