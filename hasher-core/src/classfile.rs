use thiserror::Error;

use crate::graph::{ClassFacts, MemberFacts};

#[derive(Debug, Error)]
pub enum ClassParseError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header")]
    InvalidMagic,
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("invalid UTF-8 string in constant pool: {0}")]
    Utf8Decode(#[from] std::str::Utf8Error),
}

const VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
const INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";

/// Decodes the structural facts of a class file: names, access flags,
/// supertypes, members and annotation types. Code and every other attribute
/// is skipped without being decoded.
pub fn parse_class(bytes: &[u8]) -> Result<ClassFacts, ClassParseError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let _minor_version = reader.read_u2()?;
    let _major_version = reader.read_u2()?;
    let constant_pool = ConstantPool::parse(&mut reader)?;

    let access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;

    let mut facts = ClassFacts::new(constant_pool.class_name(this_class)?, access_flags);
    if super_class != 0 {
        facts.super_name = Some(constant_pool.class_name(super_class)?);
    }

    let interfaces_count = reader.read_u2()?;
    for _ in 0..interfaces_count {
        let index = reader.read_u2()?;
        facts.interfaces.push(constant_pool.class_name(index)?);
    }

    let fields_count = reader.read_u2()?;
    for _ in 0..fields_count {
        facts.fields.push(read_member(&mut reader, &constant_pool)?);
    }

    let methods_count = reader.read_u2()?;
    for _ in 0..methods_count {
        facts.methods.push(read_member(&mut reader, &constant_pool)?);
    }

    let attributes_count = reader.read_u2()?;
    facts.annotations = read_annotated_attributes(&mut reader, &constant_pool, attributes_count)?;

    Ok(facts)
}

fn read_member(reader: &mut ClassReader<'_>, pool: &ConstantPool<'_>) -> Result<MemberFacts, ClassParseError> {
    let access_flags = reader.read_u2()?;
    let name_index = reader.read_u2()?;
    let descriptor_index = reader.read_u2()?;
    let attributes_count = reader.read_u2()?;

    let mut member = MemberFacts::new(pool.utf8(name_index)?, pool.utf8(descriptor_index)?, access_flags);
    member.annotations = read_annotated_attributes(reader, pool, attributes_count)?;
    Ok(member)
}

/// Walks an attribute table, collecting annotation type names and skipping
/// everything else.
fn read_annotated_attributes(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool<'_>,
    count: u16,
) -> Result<Vec<String>, ClassParseError> {
    let mut annotations = Vec::new();
    for _ in 0..count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let name = pool.utf8(name_index)?;

        if name == VISIBLE_ANNOTATIONS || name == INVISIBLE_ANNOTATIONS {
            let mut sub_reader = ClassReader::new(reader.read_slice(length)?);
            let num_annotations = sub_reader.read_u2()?;
            for _ in 0..num_annotations {
                annotations.push(read_annotation(&mut sub_reader, pool)?);
            }
        } else {
            reader.skip(length)?;
        }
    }
    Ok(annotations)
}

/// Reads one annotation and returns its type as an internal name.
fn read_annotation(reader: &mut ClassReader<'_>, pool: &ConstantPool<'_>) -> Result<String, ClassParseError> {
    let type_index = reader.read_u2()?;
    let descriptor = pool.utf8(type_index)?;

    let pairs = reader.read_u2()?;
    for _ in 0..pairs {
        reader.read_u2()?; // element_name_index
        skip_element_value(reader)?;
    }

    let name = descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .unwrap_or(descriptor);
    Ok(name.to_string())
}

fn skip_element_value(reader: &mut ClassReader<'_>) -> Result<(), ClassParseError> {
    match reader.read_u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            reader.read_u2()?;
        }
        b'e' => {
            reader.read_u2()?; // type_name_index
            reader.read_u2()?; // const_name_index
        }
        b'@' => {
            reader.read_u2()?; // type_index
            let pairs = reader.read_u2()?;
            for _ in 0..pairs {
                reader.read_u2()?;
                skip_element_value(reader)?;
            }
        }
        b'[' => {
            let values = reader.read_u2()?;
            for _ in 0..values {
                skip_element_value(reader)?;
            }
        }
        tag => return Err(ClassParseError::UnsupportedConstant { tag }),
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Constant<'a> {
    /// Raw modified UTF-8; only decoded when a name is actually needed, since
    /// string literals may hold sequences plain UTF-8 rejects.
    Utf8(&'a [u8]),
    Class { name_index: u16 },
    Other,
    Unusable,
}

struct ConstantPool<'a> {
    entries: Vec<Constant<'a>>,
}

impl<'a> ConstantPool<'a> {
    fn parse(reader: &mut ClassReader<'a>) -> Result<Self, ClassParseError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    Constant::Utf8(reader.read_slice(length)?)
                }
                3 | 4 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    // Longs and doubles take two slots.
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    index += 1;
                    Constant::Unusable
                }
                7 => {
                    let name_index = reader.read_u2()?;
                    Constant::Class { name_index }
                }
                8 | 16 | 19 | 20 => {
                    reader.read_u2()?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                other => return Err(ClassParseError::UnsupportedConstant { tag: other }),
            };

            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant<'a>, ClassParseError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassParseError::InvalidConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<&'a str, ClassParseError> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(std::str::from_utf8(*bytes)?),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn class_name(&self, index: u16) -> Result<String, ClassParseError> {
        match self.get(index)? {
            Constant::Class { name_index } => Ok(self.utf8(*name_index)?.to_string()),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn expect_magic(&mut self) -> Result<(), ClassParseError> {
        const MAGIC: u32 = 0xCAFEBABE;
        if self.read_u4()? != MAGIC {
            return Err(ClassParseError::InvalidMagic);
        }
        Ok(())
    }

    fn read_u1(&mut self) -> Result<u8, ClassParseError> {
        Ok(self.read_slice(1)?[0])
    }

    fn read_u2(&mut self) -> Result<u16, ClassParseError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u4(&mut self) -> Result<u32, ClassParseError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassParseError> {
        if self.pos + len > self.data.len() {
            return Err(ClassParseError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassParseError> {
        self.read_slice(len).map(|_| ())
    }
}

/// Minimal class file writer used to feed the reader and the archive loader
/// in tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use crate::graph::{ClassFacts, MemberFacts};

    #[derive(Default)]
    struct PoolWriter {
        bytes: Vec<u8>,
        count: u16,
        utf8: HashMap<String, u16>,
        classes: HashMap<String, u16>,
    }

    impl PoolWriter {
        fn next(&mut self, slots: u16) -> u16 {
            let index = self.count + 1;
            self.count += slots;
            index
        }

        fn utf8(&mut self, value: &str) -> u16 {
            if let Some(&index) = self.utf8.get(value) {
                return index;
            }
            let index = self.next(1);
            self.bytes.push(1);
            self.bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
            self.bytes.extend_from_slice(value.as_bytes());
            self.utf8.insert(value.to_string(), index);
            index
        }

        fn class(&mut self, name: &str) -> u16 {
            if let Some(&index) = self.classes.get(name) {
                return index;
            }
            let name_index = self.utf8(name);
            let index = self.next(1);
            self.bytes.push(7);
            self.bytes.extend_from_slice(&name_index.to_be_bytes());
            self.classes.insert(name.to_string(), index);
            index
        }

        fn long(&mut self, value: i64) -> u16 {
            let index = self.next(2);
            self.bytes.push(5);
            self.bytes.extend_from_slice(&value.to_be_bytes());
            index
        }
    }

    fn u2(out: &mut Vec<u8>, value: u16) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    fn attribute(out: &mut Vec<u8>, pool: &mut PoolWriter, name: &str, body: &[u8]) {
        u2(out, pool.utf8(name));
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
    }

    /// Annotations carry a `value` array holding a string and an enum
    /// constant, so the reader has element values to skip.
    fn annotations(pool: &mut PoolWriter, names: &[String]) -> Vec<u8> {
        let mut body = Vec::new();
        u2(&mut body, names.len() as u16);
        for name in names {
            u2(&mut body, pool.utf8(&format!("L{name};")));
            u2(&mut body, 1);
            u2(&mut body, pool.utf8("value"));
            body.push(b'[');
            u2(&mut body, 2);
            body.push(b's');
            u2(&mut body, pool.utf8("text"));
            body.push(b'e');
            u2(&mut body, pool.utf8("Lkeep/Mode;"));
            u2(&mut body, pool.utf8("ALL"));
        }
        body
    }

    fn member(out: &mut Vec<u8>, pool: &mut PoolWriter, member: &MemberFacts, code: bool) {
        u2(out, member.access);
        u2(out, pool.utf8(&member.name));
        u2(out, pool.utf8(&member.descriptor));

        let mut count = 0u16;
        let mut attributes = Vec::new();
        if code {
            attribute(&mut attributes, pool, "Code", &[0, 1, 0, 1, 0, 0, 0, 1, 0xb1, 0, 0, 0, 0]);
            count += 1;
        }
        if !member.annotations.is_empty() {
            let body = annotations(pool, &member.annotations);
            attribute(&mut attributes, pool, "RuntimeInvisibleAnnotations", &body);
            count += 1;
        }
        u2(out, count);
        out.extend_from_slice(&attributes);
    }

    /// Encodes `facts` as a class file. Methods get a trivial `Code`
    /// attribute and the pool holds a long constant to exercise the
    /// two-slot rule.
    pub(crate) fn class_bytes(facts: &ClassFacts) -> Vec<u8> {
        let mut pool = PoolWriter::default();
        pool.long(0x0123_4567_89ab_cdef);

        let mut body = Vec::new();
        u2(&mut body, facts.access);
        u2(&mut body, pool.class(&facts.name));
        let super_index = facts.super_name.as_deref().map_or(0, |name| pool.class(name));
        u2(&mut body, super_index);

        u2(&mut body, facts.interfaces.len() as u16);
        for interface in &facts.interfaces {
            u2(&mut body, pool.class(interface));
        }

        u2(&mut body, facts.fields.len() as u16);
        for field in &facts.fields {
            member(&mut body, &mut pool, field, false);
        }

        u2(&mut body, facts.methods.len() as u16);
        for method in &facts.methods {
            member(&mut body, &mut pool, method, true);
        }

        let mut attributes = Vec::new();
        let source = pool.utf8("Source.java").to_be_bytes();
        attribute(&mut attributes, &mut pool, "SourceFile", &source);
        let mut count = 1u16;
        if !facts.annotations.is_empty() {
            let annotation_body = annotations(&mut pool, &facts.annotations);
            attribute(&mut attributes, &mut pool, "RuntimeVisibleAnnotations", &annotation_body);
            count += 1;
        }
        u2(&mut body, count);
        body.extend_from_slice(&attributes);

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        u2(&mut out, 0);
        u2(&mut out, 52);
        u2(&mut out, pool.count + 1);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}
