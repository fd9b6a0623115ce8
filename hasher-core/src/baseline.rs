use log::info;
use proguard::{ProguardMapping, ProguardRecord};
use std::collections::HashMap;

use crate::{HasherError, Result};

/// Human-readable name of a method or field, with its descriptor spelled in
/// human class names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanMember {
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanClass {
    /// Fully qualified internal name, e.g. `net/example/Outer$Inner`.
    pub name: String,
    methods: HashMap<String, HumanMember>,
    fields: HashMap<String, HumanMember>,
}

impl HumanClass {
    fn new(name: String) -> Self {
        Self {
            name,
            methods: HashMap::new(),
            fields: HashMap::new(),
        }
    }

    /// Registers a method keyed by its obfuscated name and descriptor.
    pub fn insert_method(
        &mut self,
        name: &str,
        descriptor: &str,
        human_name: &str,
        human_descriptor: &str,
    ) -> &mut Self {
        self.methods.insert(
            member_key(name, descriptor),
            HumanMember {
                name: human_name.to_string(),
                descriptor: human_descriptor.to_string(),
            },
        );
        self
    }

    /// Registers a field keyed by its obfuscated name and type descriptor.
    pub fn insert_field(
        &mut self,
        name: &str,
        descriptor: &str,
        human_name: &str,
        human_descriptor: &str,
    ) -> &mut Self {
        self.fields.insert(
            member_key(name, descriptor),
            HumanMember {
                name: human_name.to_string(),
                descriptor: human_descriptor.to_string(),
            },
        );
        self
    }
}

fn member_key(name: &str, descriptor: &str) -> String {
    format!("{name}:{descriptor}")
}

/// Release-specific association from obfuscated identities to human names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineMapping {
    classes: HashMap<String, HumanClass>,
}

impl BaselineMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a class and returns it for member registration.
    pub fn insert_class(&mut self, obfuscated: &str, human: &str) -> &mut HumanClass {
        let entry = self
            .classes
            .entry(obfuscated.to_string())
            .or_insert_with(|| HumanClass::new(human.to_string()));
        entry.name = human.to_string();
        entry
    }

    pub fn class(&self, obfuscated: &str) -> Result<&HumanClass> {
        self.classes.get(obfuscated).ok_or_else(|| HasherError::MissingMapping {
            kind: "class",
            name: obfuscated.to_string(),
        })
    }

    pub fn method(&self, owner: &str, name: &str, descriptor: &str) -> Result<&HumanMember> {
        self.class(owner)?
            .methods
            .get(&member_key(name, descriptor))
            .ok_or_else(|| HasherError::MissingMapping {
                kind: "method",
                name: format!("{owner}.{name}{descriptor}"),
            })
    }

    pub fn field(&self, owner: &str, name: &str, descriptor: &str) -> Result<&HumanMember> {
        self.class(owner)?
            .fields
            .get(&member_key(name, descriptor))
            .ok_or_else(|| HasherError::MissingMapping {
                kind: "field",
                name: format!("{owner}.{name}:{descriptor}"),
            })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Reads a ProGuard mapping (`human -> obfuscated`) and turns it around
    /// into an obfuscated-keyed baseline.
    ///
    /// Member descriptors in ProGuard files are written with human class
    /// names; the obfuscated descriptor used as lookup key is derived by
    /// substituting every mapped class with its obfuscated name.
    pub fn from_proguard(source: &str) -> Result<Self> {
        let mapping = ProguardMapping::new(source.as_bytes());

        let mut records = Vec::new();
        for record in mapping.iter() {
            let record = record.map_err(|err| HasherError::Baseline(format!("{err:?}")))?;
            records.push(record);
        }

        // First pass: class names, needed to rewrite member descriptors.
        let mut class_names: HashMap<String, String> = HashMap::new();
        for record in &records {
            if let ProguardRecord::Class { original, obfuscated, .. } = record {
                class_names.insert(internal_name(original), internal_name(obfuscated));
            }
        }

        let mut baseline = BaselineMapping::new();
        let mut current: Option<String> = None;
        let mut members = 0usize;

        for record in &records {
            match record {
                ProguardRecord::Class { original, obfuscated, .. } => {
                    let obfuscated = internal_name(obfuscated);
                    baseline.insert_class(&obfuscated, &internal_name(original));
                    current = Some(obfuscated);
                }
                ProguardRecord::Field {
                    ty,
                    original,
                    obfuscated,
                    ..
                } => {
                    let owner = current.as_deref().ok_or_else(|| {
                        HasherError::Baseline(format!("field {original} appears before any class"))
                    })?;
                    let human_descriptor = type_descriptor(ty);
                    let descriptor = remap_descriptor(&human_descriptor, &class_names);
                    if let Some(class) = baseline.classes.get_mut(owner) {
                        class.insert_field(obfuscated, &descriptor, original, &human_descriptor);
                        members += 1;
                    }
                }
                ProguardRecord::Method {
                    ty,
                    original,
                    obfuscated,
                    arguments,
                    original_class,
                    ..
                } => {
                    // Frames inlined from another class describe that class, not this one.
                    if original_class.is_some() {
                        continue;
                    }
                    let owner = current.as_deref().ok_or_else(|| {
                        HasherError::Baseline(format!("method {original} appears before any class"))
                    })?;
                    let human_descriptor = method_descriptor(arguments, ty);
                    let descriptor = remap_descriptor(&human_descriptor, &class_names);
                    if let Some(class) = baseline.classes.get_mut(owner) {
                        class.insert_method(obfuscated, &descriptor, original, &human_descriptor);
                        members += 1;
                    }
                }
                _ => {}
            }
        }

        info!(
            "baseline mapping: {} classes, {} member records",
            baseline.len(),
            members
        );
        Ok(baseline)
    }
}

fn internal_name(java_name: &str) -> String {
    java_name.replace('.', "/")
}

/// Converts a Java source type (`int`, `java.lang.String[]`) into a JVM descriptor.
pub fn type_descriptor(java_type: &str) -> String {
    let mut base = java_type.trim();
    let mut dimensions = 0;
    while let Some(stripped) = base.strip_suffix("[]") {
        dimensions += 1;
        base = stripped;
    }

    let mut out = "[".repeat(dimensions);
    match base {
        "void" => out.push('V'),
        "boolean" => out.push('Z'),
        "byte" => out.push('B'),
        "char" => out.push('C'),
        "short" => out.push('S'),
        "int" => out.push('I'),
        "long" => out.push('J'),
        "float" => out.push('F'),
        "double" => out.push('D'),
        other => {
            out.push('L');
            out.push_str(&internal_name(other));
            out.push(';');
        }
    }
    out
}

/// Builds a method descriptor from a comma separated argument list and a return type.
pub fn method_descriptor(arguments: &str, return_type: &str) -> String {
    let mut out = String::from("(");
    for argument in arguments.split(',').map(str::trim).filter(|arg| !arg.is_empty()) {
        out.push_str(&type_descriptor(argument));
    }
    out.push(')');
    out.push_str(&type_descriptor(return_type));
    out
}

/// Rewrites every `L...;` class reference through `class_names`, leaving
/// unmapped classes untouched.
pub fn remap_descriptor(descriptor: &str, class_names: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(descriptor.len());
    let mut rest = descriptor;

    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        match tail.find(';') {
            Some(end) => {
                let name = &tail[..end];
                out.push('L');
                out.push_str(class_names.get(name).map_or(name, String::as_str));
                out.push(';');
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# {\"id\":\"com.android.tools.r8.mapping\",\"version\":\"1.0\"}
net.example.Widget -> a:
    int size -> a
    net.example.Widget parent -> b
    1:1:void <init>() -> <init>
    5:7:int size() -> c
    8:9:void resize(int,net.example.Widget[]) -> a
    10:12:void resize(int,net.example.Widget[]) -> a
net.example.Widget$Part -> a$a:
    java.lang.String label -> a
    3:4:net.example.Widget owner() -> a
";

    #[test]
    fn java_types_become_descriptors() {
        assert_eq!(type_descriptor("int"), "I");
        assert_eq!(type_descriptor("void"), "V");
        assert_eq!(type_descriptor("java.lang.String"), "Ljava/lang/String;");
        assert_eq!(type_descriptor("long[][]"), "[[J");
        assert_eq!(method_descriptor("", "boolean"), "()Z");
        assert_eq!(method_descriptor("int,java.util.List", "void"), "(ILjava/util/List;)V");
    }

    #[test]
    fn descriptors_are_remapped_through_class_names() {
        let mut names = HashMap::new();
        names.insert("net/example/Widget".to_string(), "a".to_string());
        assert_eq!(
            remap_descriptor("(ILnet/example/Widget;[Lnet/example/Widget;)Ljava/lang/Object;", &names),
            "(ILa;[La;)Ljava/lang/Object;"
        );
        assert_eq!(remap_descriptor("()V", &names), "()V");
    }

    #[test]
    fn reads_proguard_mapping() {
        let baseline = BaselineMapping::from_proguard(SAMPLE).unwrap();
        assert_eq!(baseline.len(), 2);

        let widget = baseline.class("a").unwrap();
        assert_eq!(widget.name, "net/example/Widget");
        assert_eq!(widget.fields.len(), 2);
        // Two line ranges of the same method collapse into one entry.
        assert_eq!(widget.methods.len(), 3);

        let resize = baseline.method("a", "a", "(I[La;)V").unwrap();
        assert_eq!(resize.name, "resize");
        assert_eq!(resize.descriptor, "(I[Lnet/example/Widget;)V");

        let parent = baseline.field("a", "b", "La;").unwrap();
        assert_eq!(parent.name, "parent");
        assert_eq!(parent.descriptor, "Lnet/example/Widget;");

        assert_eq!(baseline.class("a$a").unwrap().name, "net/example/Widget$Part");
        assert_eq!(baseline.method("a$a", "a", "()La;").unwrap().name, "owner");
    }

    #[test]
    fn missing_entries_are_reported() {
        let baseline = BaselineMapping::from_proguard(SAMPLE).unwrap();
        assert!(matches!(
            baseline.class("zz"),
            Err(HasherError::MissingMapping { kind: "class", .. })
        ));
        assert!(matches!(
            baseline.method("a", "zz", "()V"),
            Err(HasherError::MissingMapping { kind: "method", .. })
        ));
        assert!(matches!(
            baseline.field("a", "a", "J"),
            Err(HasherError::MissingMapping { kind: "field", .. })
        ));
    }

    #[test]
    fn programmatic_registration() {
        let mut baseline = BaselineMapping::new();
        baseline
            .insert_class("b", "net/example/Other")
            .insert_method("a", "()V", "run", "()V")
            .insert_field("a", "I", "count", "I");

        assert_eq!(baseline.method("b", "a", "()V").unwrap().name, "run");
        assert_eq!(baseline.field("b", "a", "I").unwrap().name, "count");
    }
}
