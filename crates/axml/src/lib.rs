pub mod axml;
pub mod errors;

#[cfg(any(test, feature = "builder"))]
pub mod builder;

pub(crate) mod structs;

pub use axml::{AxmlParser, StartTag, XmlAttribute, XmlEvent};
#[cfg(any(test, feature = "builder"))]
pub use builder::{AxmlBuilder, BuilderValue};
pub use errors::AXMLError;
pub use structs::common::{ResourceValue, ResourceValueType};
