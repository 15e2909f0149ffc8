use bitflags::bitflags;
use log::warn;
use winnow::binary::{le_u8, le_u16, le_u32};
use winnow::combinator::repeat;
use winnow::error::{ErrMode, Needed};
use winnow::prelude::*;
use winnow::token::take;

use crate::structs::ResChunkHeader;

bitflags! {
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct StringType: u32 {
        const Sorted = 1 << 0;
        const Utf8 = 1 << 8;
    }
}

#[derive(Debug)]
pub(crate) struct ResStringPoolHeader {
    pub(crate) header: ResChunkHeader,
    pub(crate) string_count: u32,
    pub(crate) style_count: u32,
    pub(crate) flags: StringType,
    pub(crate) strings_start: u32,
}

impl ResStringPoolHeader {
    /// Chunk header + 5 u32 fields
    pub(crate) const SIZE: u32 = 28;

    pub(crate) fn parse(input: &mut &[u8]) -> ModalResult<ResStringPoolHeader> {
        let header = ResChunkHeader::parse(input)?;
        let (string_count, style_count, flags, strings_start, _styles_start) =
            (le_u32, le_u32, le_u32, le_u32, le_u32).parse_next(input)?;

        Ok(ResStringPoolHeader {
            header,
            string_count,
            style_count,
            flags: StringType::from_bits_truncate(flags),
            strings_start,
        })
    }

    #[inline]
    pub(crate) fn is_utf8(&self) -> bool {
        self.flags.contains(StringType::Utf8)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    pub(crate) fn parse(input: &mut &[u8]) -> ModalResult<StringPool> {
        let chunk_start = *input;
        let mut string_header = ResStringPoolHeader::parse(input)?;

        // work on the whole chunk, offsets are relative to its start
        let (chunk, rest) = chunk_start
            .split_at_checked(string_header.header.size as usize)
            .ok_or(ErrMode::Incomplete(Needed::Unknown))?;

        let header_size = (string_header.header.header_size as u32).max(ResStringPoolHeader::SIZE);
        let calculated_string_count = string_header
            .strings_start
            .saturating_sub(string_header.style_count.saturating_mul(4).saturating_add(header_size))
            / 4;

        // tampered pools declare more strings than there are offsets
        if calculated_string_count != string_header.string_count {
            warn!(
                "string pool declares {} strings, but has room for {} offsets",
                string_header.string_count, calculated_string_count
            );
            string_header.string_count = calculated_string_count;
        }

        let mut offsets_data = chunk
            .get(header_size as usize..)
            .ok_or(ErrMode::Incomplete(Needed::Unknown))?;
        let string_offsets: Vec<u32> =
            repeat(string_header.string_count as usize, le_u32).parse_next(&mut offsets_data)?;

        let strings_data = chunk
            .get(string_header.strings_start as usize..)
            .ok_or(ErrMode::Incomplete(Needed::Unknown))?;

        let is_utf8 = string_header.is_utf8();
        let strings = string_offsets
            .iter()
            .map(|&offset| {
                // keep indices stable, broken string becomes empty
                strings_data
                    .get(offset as usize..)
                    .and_then(|mut data| Self::parse_string(&mut data, is_utf8).ok())
                    .unwrap_or_default()
            })
            .collect();

        *input = rest;

        Ok(StringPool { strings })
    }

    fn parse_string(input: &mut &[u8], is_utf8: bool) -> ModalResult<String> {
        if is_utf8 {
            // utf-16 length goes first, then utf-8 length in bytes
            let _ = Self::parse_utf8_length(input)?;
            let byte_length = Self::parse_utf8_length(input)?;
            let content = take(byte_length).parse_next(input)?;

            Ok(String::from_utf8_lossy(content).to_string())
        } else {
            let u16len = le_u16(input)?;

            // check if regular utf-16 or with fixup
            let real_len = if u16len & 0x8000 != 0 {
                let u16len_fix = le_u16(input)?;
                ((((u16len & 0x7FFF) as u32) << 16) | u16len_fix as u32) as usize
            } else {
                u16len as usize
            };

            let content = take(real_len * 2).parse_next(input)?;

            Ok(Self::read_utf16(content))
        }
    }

    #[inline]
    fn parse_utf8_length(input: &mut &[u8]) -> ModalResult<usize> {
        let first = le_u8(input)?;
        if first & 0x80 != 0 {
            let second = le_u8(input)?;
            Ok((((first & 0x7F) as usize) << 8) | second as usize)
        } else {
            Ok(first as usize)
        }
    }

    fn read_utf16(slice: &[u8]) -> String {
        std::char::decode_utf16(
            slice
                .chunks_exact(2)
                .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]])),
        )
        .map(|c| c.unwrap_or(std::char::REPLACEMENT_CHARACTER))
        .collect()
    }

    #[inline]
    pub(crate) fn get(&self, idx: u32) -> Option<&String> {
        self.strings.get(idx as usize)
    }
}
