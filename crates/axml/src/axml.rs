use log::warn;
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take;

use crate::errors::AXMLError;
use crate::structs::{
    ResChunkHeader, ResourceType, ResourceValue, ResourceValueType, StringPool, XMLHeader,
    XMLResourceMap, XmlCData, XmlEndElement, XmlParse, XmlStartElement,
};

/// Attribute of a start tag with names and string values already resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: String,

    /// Original string value, if aapt kept one
    pub raw_value: Option<String>,

    /// Typed value as compiled by aapt
    pub value: ResourceValue,

    resolved: Option<String>,
    display: String,
}

impl XmlAttribute {
    /// String content: typed string first, raw value otherwise
    pub fn as_str(&self) -> Option<&str> {
        self.resolved.as_deref().or(self.raw_value.as_deref())
    }

    /// Integer content, falls back to parsing the raw value
    pub fn as_int(&self) -> Option<i32> {
        self.value
            .as_int()
            .or_else(|| self.raw_value.as_deref()?.trim().parse().ok())
    }

    /// Boolean content, falls back to parsing the raw value
    pub fn as_bool(&self) -> Option<bool> {
        self.value
            .as_bool()
            .or_else(|| self.raw_value.as_deref()?.trim().parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub line: u32,
    pub attributes: Vec<XmlAttribute>,
}

impl StartTag {
    pub fn attr(&self, name: &str) -> Option<&XmlAttribute> {
        self.attributes.iter().find(|x| x.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartElement(StartTag),
    EndElement(String),
    Text(String),
}

/// Streaming reader over compiled xml
///
/// Only the document header, the string pool and the resource map are decoded
/// upfront, nodes are decoded one by one on request.
pub struct AxmlParser<'a> {
    input: &'a [u8],
    string_pool: StringPool,
    resource_map: XMLResourceMap,
    pub is_tampered: bool,
}

impl<'a> AxmlParser<'a> {
    pub fn new(data: &'a [u8]) -> Result<AxmlParser<'a>, AXMLError> {
        // basic sanity check
        if data.len() < ResChunkHeader::size_of() {
            return Err(AXMLError::TooSmallError);
        }

        let mut input = data;
        let header = ResChunkHeader::parse(&mut input).map_err(|_| AXMLError::HeaderError)?;

        // some malware tamper this parameter
        let is_tampered = header.type_ != ResourceType::Xml;
        if is_tampered {
            warn!("unexpected document chunk type: {:?}", header.type_);
        }

        // header size must be 8 bytes, otherwise is non valid axml
        if header.header_size != ResChunkHeader::size_of() as u16 {
            return Err(AXMLError::HeaderSizeError(header.header_size));
        }

        if Self::peek_type(input) != Some(ResourceType::StringPool) {
            return Err(AXMLError::StringPoolError);
        }
        let string_pool = StringPool::parse(&mut input).map_err(|_| AXMLError::StringPoolError)?;

        // resource map is optional
        let resource_map = if Self::peek_type(input) == Some(ResourceType::XmlResourceMap) {
            XMLResourceMap::parse(&mut input).map_err(|_| AXMLError::ResourceMapError)?
        } else {
            XMLResourceMap::default()
        };

        Ok(AxmlParser {
            input,
            string_pool,
            resource_map,
            is_tampered,
        })
    }

    #[inline]
    fn peek_type(input: &[u8]) -> Option<ResourceType> {
        ResChunkHeader::parse(&mut &input[..])
            .ok()
            .map(|header| header.type_)
    }

    /// Decode the next node, `None` at the end of the document
    pub fn next_event(&mut self) -> Result<Option<XmlEvent>, AXMLError> {
        loop {
            // not enough data for another chunk - treat as end of document
            if self.input.len() < ResChunkHeader::size_of() {
                return Ok(None);
            }

            let chunk_header =
                ResChunkHeader::parse(&mut self.input).map_err(|_| AXMLError::XmlTreeError)?;

            if chunk_header.size < ResChunkHeader::size_of() as u32 {
                return Err(AXMLError::XmlTreeError);
            }

            // skip non xml chunks and junk headers
            if !chunk_header.type_.is_xml_node() || chunk_header.header_size != XMLHeader::SIZE {
                warn!("skip unexpected chunk in xml tree: {chunk_header:?}");
                self.skip(chunk_header.content_size())?;
                continue;
            }

            let node = XMLHeader::parse(&mut self.input, chunk_header)
                .map_err(|_| AXMLError::XmlTreeError)?;

            match node.header.type_ {
                ResourceType::XmlStartElement => {
                    let element = XmlStartElement::parse(&mut self.input, node)
                        .map_err(|_| AXMLError::XmlTreeError)?;
                    return Ok(Some(XmlEvent::StartElement(self.start_tag(element))));
                }
                ResourceType::XmlEndElement => {
                    let element = XmlEndElement::parse(&mut self.input, node)
                        .map_err(|_| AXMLError::XmlTreeError)?;
                    let name = self.string(element.name).unwrap_or_default();
                    return Ok(Some(XmlEvent::EndElement(name)));
                }
                ResourceType::XmlCdata => {
                    let cdata = XmlCData::parse(&mut self.input, node)
                        .map_err(|_| AXMLError::XmlTreeError)?;
                    let text = self.string(cdata.data).unwrap_or_default();
                    return Ok(Some(XmlEvent::Text(text)));
                }
                // namespaces are not interesting for the callers
                _ => self.skip(node.content_size())?,
            }
        }
    }

    /// Walk the document until the first start tag with the given name
    pub fn find_start_tag(&mut self, name: &str) -> Result<Option<StartTag>, AXMLError> {
        while let Some(event) = self.next_event()? {
            if let XmlEvent::StartElement(tag) = event
                && tag.name == name
            {
                return Ok(Some(tag));
            }
        }

        Ok(None)
    }

    fn skip(&mut self, count: u32) -> Result<(), AXMLError> {
        take::<u32, &[u8], ContextError>(count)
            .parse_next(&mut self.input)
            .map(|_| ())
            .map_err(|_| AXMLError::XmlTreeError)
    }

    #[inline]
    fn string(&self, idx: u32) -> Option<String> {
        self.string_pool.get(idx).cloned()
    }

    fn start_tag(&self, element: XmlStartElement) -> StartTag {
        let attributes = element
            .attributes
            .iter()
            .filter_map(|attribute| {
                let name = match self.string_pool.get(attribute.name) {
                    Some(name) if !name.is_empty() => name.clone(),
                    // stripped name, keep the attribute resource id instead
                    _ => format!(
                        "0x{:08x}",
                        self.resource_map.resource_ids.get(attribute.name as usize)?
                    ),
                };

                let resolved = match attribute.typed_value.data_type {
                    ResourceValueType::String => self.string(attribute.typed_value.data),
                    _ => None,
                };

                Some(XmlAttribute {
                    name,
                    raw_value: self.string(attribute.value),
                    value: attribute.typed_value,
                    resolved,
                    display: attribute.typed_value.to_string(&self.string_pool),
                })
            })
            .collect();

        StartTag {
            name: self.string(element.name).unwrap_or_default(),
            line: element.header.line_number,
            attributes,
        }
    }
}

impl std::fmt::Display for XmlAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=\"{}\"", self.name, self.display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{AxmlBuilder, BuilderValue};

    fn overlay_manifest() -> Vec<u8> {
        AxmlBuilder::new()
            .start(
                "manifest",
                &[("package", BuilderValue::String("com.example.overlay"))],
            )
            .start(
                "overlay",
                &[
                    ("targetPackage", BuilderValue::String("com.example.target")),
                    ("priority", BuilderValue::Int(42)),
                    ("isStatic", BuilderValue::Bool(true)),
                ],
            )
            .end("overlay")
            .end("manifest")
            .finish()
    }

    #[test]
    fn find_overlay_tag() {
        let data = overlay_manifest();
        let mut parser = AxmlParser::new(&data).expect("valid document");

        let tag = parser.find_start_tag("overlay").unwrap().expect("overlay tag");
        assert_eq!(tag.name, "overlay");
        assert_eq!(
            tag.attr("targetPackage").and_then(XmlAttribute::as_str),
            Some("com.example.target")
        );
        assert_eq!(tag.attr("priority").and_then(XmlAttribute::as_int), Some(42));
        assert_eq!(tag.attr("isStatic").and_then(XmlAttribute::as_bool), Some(true));
        assert!(tag.attr("requiredSystemPropertyName").is_none());
    }

    #[test]
    fn events_in_document_order() {
        let data = overlay_manifest();
        let mut parser = AxmlParser::new(&data).unwrap();

        let mut names = Vec::new();
        while let Some(event) = parser.next_event().unwrap() {
            match event {
                XmlEvent::StartElement(tag) => names.push(format!("+{}", tag.name)),
                XmlEvent::EndElement(name) => names.push(format!("-{name}")),
                XmlEvent::Text(_) => {}
            }
        }

        assert_eq!(names, ["+manifest", "+overlay", "-overlay", "-manifest"]);
    }

    #[test]
    fn missing_tag_reaches_end_of_document() {
        let data = AxmlBuilder::new()
            .start("manifest", &[])
            .start("application", &[])
            .end("application")
            .end("manifest")
            .finish();
        let mut parser = AxmlParser::new(&data).unwrap();

        assert_eq!(parser.find_start_tag("overlay").unwrap(), None);
        // exhausted parser stays exhausted
        assert_eq!(parser.next_event().unwrap(), None);
    }

    #[test]
    fn skips_unknown_chunks() {
        let data = AxmlBuilder::new()
            .start("manifest", &[])
            .unknown_chunk(0x0777, &[0xAA; 12])
            .start("overlay", &[("priority", BuilderValue::Int(3))])
            .end("overlay")
            .end("manifest")
            .finish();
        let mut parser = AxmlParser::new(&data).unwrap();

        let tag = parser.find_start_tag("overlay").unwrap().unwrap();
        assert_eq!(tag.attr("priority").and_then(XmlAttribute::as_int), Some(3));
    }

    #[test]
    fn negative_int_and_false_bool() {
        let data = AxmlBuilder::new()
            .start(
                "overlay",
                &[
                    ("priority", BuilderValue::Int(-5)),
                    ("isStatic", BuilderValue::Bool(false)),
                ],
            )
            .end("overlay")
            .finish();
        let mut parser = AxmlParser::new(&data).unwrap();

        let tag = parser.find_start_tag("overlay").unwrap().unwrap();
        assert_eq!(tag.attr("priority").and_then(XmlAttribute::as_int), Some(-5));
        assert_eq!(tag.attr("isStatic").and_then(XmlAttribute::as_bool), Some(false));
        assert_eq!(tag.attr("priority").unwrap().to_string(), "priority=\"-5\"");
    }

    #[test]
    fn truncated_document() {
        let data = overlay_manifest();

        assert!(matches!(
            AxmlParser::new(&data[..4]),
            Err(AXMLError::TooSmallError)
        ));

        // cut in the middle of the string pool
        assert!(matches!(
            AxmlParser::new(&data[..20]),
            Err(AXMLError::StringPoolError)
        ));

        // cut in the middle of the <overlay> node
        let cut = data.len() - 24 * 3 - 10;
        let mut parser = AxmlParser::new(&data[..cut]).unwrap();
        assert!(parser.find_start_tag("overlay").is_err());
    }

    #[test]
    fn not_a_compiled_xml() {
        let data = b"<?xml version=\"1.0\"?><manifest/>";
        assert!(AxmlParser::new(data).is_err());
    }
}
