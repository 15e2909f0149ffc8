use memchr::memmem;
use winnow::{
    binary::{le_u16, le_u32},
    prelude::*,
    token::take,
};

/// End of central directory record
///
/// Only the fields needed to locate the central directory are kept around
#[derive(Debug)]
pub(crate) struct EndOfCentralDirectory {
    pub(crate) total_entries: u16,
    pub(crate) central_dir_size: u32,
    pub(crate) central_dir_offset: u32,
}

impl EndOfCentralDirectory {
    pub(crate) const MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

    #[inline(always)]
    const fn magic_u32() -> u32 {
        u32::from_le_bytes(Self::MAGIC)
    }

    pub(crate) fn parse(input: &mut &[u8]) -> ModalResult<EndOfCentralDirectory> {
        let (
            _,
            _disk_number,
            _central_dir_start_disk,
            _entries_on_this_disk,
            total_entries,
            central_dir_size,
            central_dir_offset,
            comment_length,
        ) = (
            le_u32.verify(|magic| *magic == Self::magic_u32()), // magic
            le_u16,                                             // disk_number
            le_u16,                                             // central_dir_start_disk
            le_u16,                                             // entries_on_this_disk
            le_u16,                                             // total_entries
            le_u32,                                             // central_dir_size
            le_u32,                                             // central_dir_offset
            le_u16,                                             // comment_length
        )
            .parse_next(input)?;

        // comment is not interesting, but must be present
        let _ = take(comment_length).parse_next(input)?;

        Ok(EndOfCentralDirectory {
            total_entries,
            central_dir_size,
            central_dir_offset,
        })
    }

    /// Searching magic from the end of the file
    pub(crate) fn find_eocd(input: &[u8], chunk_size: usize) -> Option<usize> {
        let mut end = input.len();

        while end > 0 {
            // overlap chunks, so magic split between two of them is still found
            let start = end.saturating_sub(chunk_size);
            let chunk = &input[start..end];

            if let Some(pos) = memmem::rfind(chunk, &Self::MAGIC) {
                return Some(start + pos);
            }

            if start == 0 {
                break;
            }
            end = start + Self::MAGIC.len() - 1;
        }

        None
    }
}
