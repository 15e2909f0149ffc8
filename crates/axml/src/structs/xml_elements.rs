use log::debug;
use winnow::binary::{le_u16, le_u32};
use winnow::combinator::repeat;
use winnow::prelude::*;
use winnow::token::take;

use crate::structs::{ResChunkHeader, ResourceValue};

#[derive(Debug, Default)]
pub(crate) struct XMLResourceMap {
    pub(crate) resource_ids: Vec<u32>,
}

impl XMLResourceMap {
    pub(crate) fn parse(input: &mut &[u8]) -> ModalResult<XMLResourceMap> {
        let header = ResChunkHeader::parse(input)?;
        let resource_ids = repeat(
            (header.size.saturating_sub(header.header_size as u32) / 4) as usize,
            le_u32,
        )
        .parse_next(input)?;

        Ok(XMLResourceMap { resource_ids })
    }
}

/// Basic XML tree node. A single item in the XML document.
#[derive(Debug, Default)]
pub(crate) struct XMLHeader {
    pub(crate) header: ResChunkHeader,

    /// Line number in original source file at which this element appeared
    pub(crate) line_number: u32,
}

impl XMLHeader {
    /// Size of the node header: chunk header + line number + comment
    pub(crate) const SIZE: u16 = 0x10;

    #[inline]
    pub(crate) fn parse(input: &mut &[u8], header: ResChunkHeader) -> ModalResult<XMLHeader> {
        // comment index is never used
        let (line_number, _comment) = (le_u32, le_u32).parse_next(input)?;

        Ok(XMLHeader {
            header,
            line_number,
        })
    }

    /// Get the size of the data without taking into account the size of the structure itself
    #[inline(always)]
    pub(crate) fn content_size(&self) -> u32 {
        // u32 (line_number) + u32 (comment)
        self.header.content_size().saturating_sub(4 + 4)
    }
}

pub(crate) trait XmlParse {
    fn parse(input: &mut &[u8], header: XMLHeader) -> ModalResult<Self>
    where
        Self: Sized;
}

#[derive(Debug)]
pub(crate) struct XmlAttributeElement {
    /// Name of this attribute
    pub(crate) name: u32,

    /// The original raw string value of this attribute, `u32::MAX` if none
    pub(crate) value: u32,

    /// Processed typed value of this attribute
    pub(crate) typed_value: ResourceValue,
}

impl XmlAttributeElement {
    pub(crate) const DEFAULT_ATTRIBUTE_SIZE: u16 = 0x14;

    pub(crate) fn parse(
        attribute_size: u16,
    ) -> impl FnMut(&mut &[u8]) -> ModalResult<XmlAttributeElement> {
        move |input: &mut &[u8]| {
            let (_namespace_uri, name, value, typed_value) =
                (le_u32, le_u32, le_u32, ResourceValue::parse).parse_next(input)?;

            // sometimes attribute size != 20, need to scroll through the data
            if let Some(extra) = attribute_size.checked_sub(Self::DEFAULT_ATTRIBUTE_SIZE)
                && extra > 0
            {
                let _ = take(extra).parse_next(input)?;
            }

            Ok(XmlAttributeElement {
                name,
                value,
                typed_value,
            })
        }
    }
}

#[derive(Debug)]
pub(crate) struct XmlStartElement {
    pub(crate) header: XMLHeader,

    /// String name of this node
    pub(crate) name: u32,

    /// List of associated attributes
    pub(crate) attributes: Vec<XmlAttributeElement>,
}

impl XmlParse for XmlStartElement {
    fn parse(input: &mut &[u8], header: XMLHeader) -> ModalResult<Self>
    where
        Self: Sized,
    {
        let start = input.len();

        let (
            _namespace_uri,
            name,
            attribute_start,
            attribute_size,
            attribute_count,
            _id_index,
            _class_index,
            _style_index,
        ) = (
            le_u32, // namespace_uri
            le_u32, // name
            le_u16, // attribute_start
            le_u16, // attribute_size
            le_u16, // attribute_count
            le_u16, // id_index
            le_u16, // class_index
            le_u16, // style_index
        )
            .parse_next(input)?;

        // attributes normally follow right after the fixed part (0x14 bytes)
        let gap = attribute_start.saturating_sub(XmlAttributeElement::DEFAULT_ATTRIBUTE_SIZE);
        if gap != 0 {
            debug!("skip {gap} bytes before attributes");
            let _ = take(gap).parse_next(input)?;
        }

        let attributes = repeat(
            attribute_count as usize,
            XmlAttributeElement::parse(attribute_size),
        )
        .parse_next(input)?;

        let read_bytes = start - input.len();

        // consume garbage data after read chunk
        let trailing = header.content_size().saturating_sub(read_bytes as u32);
        if trailing != 0 {
            debug!("skip garbage bytes in chunk: {trailing}");
            let _ = take(trailing).parse_next(input)?;
        }

        Ok(XmlStartElement {
            header,
            name,
            attributes,
        })
    }
}

#[derive(Debug)]
pub(crate) struct XmlEndElement {
    pub(crate) name: u32,
}

impl XmlParse for XmlEndElement {
    #[inline]
    fn parse(input: &mut &[u8], header: XMLHeader) -> ModalResult<Self>
    where
        Self: Sized,
    {
        let (_namespace_uri, name) = (le_u32, le_u32).parse_next(input)?;

        // end nodes carry no extra data, but tolerate padding
        let trailing = header.content_size().saturating_sub(8);
        if trailing != 0 {
            let _ = take(trailing).parse_next(input)?;
        }

        Ok(XmlEndElement { name })
    }
}

/// Extended XML tree node for CDATA tags - includes the CDATA string.
#[derive(Debug)]
pub(crate) struct XmlCData {
    /// The raw CDATA character data
    pub(crate) data: u32,
}

impl XmlParse for XmlCData {
    #[inline]
    fn parse(input: &mut &[u8], header: XMLHeader) -> ModalResult<Self>
    where
        Self: Sized,
    {
        let data = le_u32(input)?;
        let _typed_data = ResourceValue::parse(input)?;

        let trailing = header.content_size().saturating_sub(4 + 8);
        if trailing != 0 {
            let _ = take(trailing).parse_next(input)?;
        }

        Ok(XmlCData { data })
    }
}
