//! Writer for small compiled xml documents, used to generate manifest fixtures.

/// Attribute value as aapt would compile it
#[derive(Debug, Clone, Copy)]
pub enum BuilderValue<'a> {
    String(&'a str),
    Int(i32),
    Bool(bool),
}

#[derive(Default)]
pub struct AxmlBuilder {
    strings: Vec<String>,
    nodes: Vec<u8>,
    line: u32,
}

impl AxmlBuilder {
    const NO_INDEX: u32 = u32::MAX;

    pub fn new() -> AxmlBuilder {
        let mut builder = AxmlBuilder::default();
        let prefix = builder.intern("android");
        let uri = builder.intern("http://schemas.android.com/apk/res/android");
        builder.namespace(0x0100, prefix, uri);
        builder
    }

    pub fn start(mut self, name: &str, attributes: &[(&str, BuilderValue<'_>)]) -> AxmlBuilder {
        let name = self.intern(name);
        let attributes: Vec<(u32, u32, u8, u32)> = attributes
            .iter()
            .map(|(attr_name, value)| {
                let attr_name = self.intern(attr_name);
                match value {
                    BuilderValue::String(v) => {
                        let idx = self.intern(v);
                        (attr_name, idx, 0x03, idx)
                    }
                    BuilderValue::Int(v) => (attr_name, Self::NO_INDEX, 0x10, *v as u32),
                    BuilderValue::Bool(v) => {
                        (attr_name, Self::NO_INDEX, 0x12, if *v { u32::MAX } else { 0 })
                    }
                }
            })
            .collect();

        self.node_header(0x0102, 0x24 + 0x14 * attributes.len() as u32);
        self.push_u32(Self::NO_INDEX); // namespace
        self.push_u32(name);
        self.push_u16(0x14); // attribute start
        self.push_u16(0x14); // attribute size
        self.push_u16(attributes.len() as u16);
        self.push_u16(0); // id index
        self.push_u16(0); // class index
        self.push_u16(0); // style index

        for (attr_name, raw, data_type, data) in attributes {
            self.push_u32(Self::NO_INDEX); // namespace
            self.push_u32(attr_name);
            self.push_u32(raw);
            self.push_u16(8); // value size
            self.nodes.push(0); // res0
            self.nodes.push(data_type);
            self.push_u32(data);
        }

        self
    }

    pub fn end(mut self, name: &str) -> AxmlBuilder {
        let name = self.intern(name);
        self.node_header(0x0103, 0x18);
        self.push_u32(Self::NO_INDEX);
        self.push_u32(name);
        self
    }

    /// Chunk the parser is expected to skip over
    pub fn unknown_chunk(mut self, type_id: u16, payload: &[u8]) -> AxmlBuilder {
        self.push_u16(type_id);
        self.push_u16(8);
        self.push_u32(8 + payload.len() as u32);
        self.nodes.extend_from_slice(payload);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        let prefix = self.intern("android");
        let uri = self.intern("http://schemas.android.com/apk/res/android");
        self.namespace(0x0101, prefix, uri);

        let string_pool = self.string_pool();

        let mut out = Vec::new();
        let total = 8 + string_pool.len() + 8 + self.nodes.len();
        out.extend_from_slice(&0x0003u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&string_pool);

        // empty resource map
        out.extend_from_slice(&0x0180u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&8u32.to_le_bytes());

        out.extend_from_slice(&self.nodes);
        out
    }

    fn intern(&mut self, value: &str) -> u32 {
        if let Some(idx) = self.strings.iter().position(|s| s == value) {
            return idx as u32;
        }
        self.strings.push(value.to_owned());
        (self.strings.len() - 1) as u32
    }

    fn namespace(&mut self, type_id: u16, prefix: u32, uri: u32) {
        self.node_header(type_id, 0x18);
        self.push_u32(prefix);
        self.push_u32(uri);
    }

    fn node_header(&mut self, type_id: u16, size: u32) {
        self.line += 1;
        self.push_u16(type_id);
        self.push_u16(0x10);
        self.push_u32(size);
        self.push_u32(self.line);
        self.push_u32(Self::NO_INDEX); // comment
    }

    fn string_pool(&self) -> Vec<u8> {
        let mut offsets = Vec::with_capacity(self.strings.len());
        let mut data = Vec::new();

        for string in &self.strings {
            offsets.push(data.len() as u32);
            Self::push_length(&mut data, string.encode_utf16().count());
            Self::push_length(&mut data, string.len());
            data.extend_from_slice(string.as_bytes());
            data.push(0);
        }
        while data.len() % 4 != 0 {
            data.push(0);
        }

        let strings_start = 28 + 4 * offsets.len() as u32;
        let size = strings_start + data.len() as u32;

        let mut out = Vec::with_capacity(size as usize);
        out.extend_from_slice(&0x0001u16.to_le_bytes());
        out.extend_from_slice(&28u16.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&(offsets.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // style count
        out.extend_from_slice(&(1u32 << 8).to_le_bytes()); // utf-8
        out.extend_from_slice(&strings_start.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // styles start
        for offset in offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out.extend_from_slice(&data);
        out
    }

    fn push_length(out: &mut Vec<u8>, length: usize) {
        if length > 0x7f {
            out.push(0x80 | ((length >> 8) & 0x7f) as u8);
        }
        out.push((length & 0xff) as u8);
    }

    #[inline]
    fn push_u16(&mut self, value: u16) {
        self.nodes.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    fn push_u32(&mut self, value: u32) {
        self.nodes.extend_from_slice(&value.to_le_bytes());
    }
}
