pub(crate) mod common;
pub(crate) mod res_string_pool;
pub(crate) mod xml_elements;

pub(crate) use common::*;
pub(crate) use res_string_pool::*;
pub(crate) use xml_elements::*;
