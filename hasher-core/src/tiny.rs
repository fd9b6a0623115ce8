use std::io::{self, Write};

use crate::assembler::HashedMapping;

pub const HEADER: &str = "tiny\t2\t0\tofficial\thashed";

/// Writes `mapping` in tiny v2 format. Classes come out sorted by obfuscated
/// name, members by obfuscated name then descriptor, fields before methods.
pub fn write_tiny<W: Write>(mapping: &HashedMapping, out: &mut W) -> io::Result<()> {
    writeln!(out, "{HEADER}")?;

    for class in mapping.classes() {
        writeln!(out, "c\t{}\t{}", class.obfuscated, mapping.resolve_class(&class.obfuscated))?;
        for (key, hashed) in &class.fields {
            writeln!(out, "\tf\t{}\t{}\t{}", key.descriptor, key.name, hashed)?;
        }
        for (key, hashed) in &class.methods {
            writeln!(out, "\tm\t{}\t{}\t{}", key.descriptor, key.name, hashed)?;
        }
    }

    Ok(())
}

pub fn to_tiny_string(mapping: &HashedMapping) -> io::Result<String> {
    let mut buf = Vec::new();
    write_tiny(mapping, &mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
