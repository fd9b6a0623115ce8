use std::collections::HashMap;

use crate::baseline::BaselineMapping;
use crate::graph::{ClassGraph, ClassId, FieldId, MethodId};
use crate::obfuscation::Obfuscation;
use crate::Result;

/// Part of a fully qualified internal name after the last package separator,
/// e.g. `net/example/Outer$Inner` -> `Outer$Inner`.
pub fn simple_name(full: &str) -> &str {
    full.rfind('/').map_or(full, |idx| &full[idx + 1..])
}

/// Builds the plain-text raw names that get hashed.
///
/// Class raw names use the baseline simple name when it is unique across all
/// primary classes and the full name otherwise. Method and field raw names
/// are `m;<class>.<name>;<descriptor>` and `f;<class>.<name>;<type>`, where
/// the descriptor is only spelled out when another member of the same class
/// shares the human name. `.` and `;` cannot appear in JVM identifiers, so
/// the tags keep the three name spaces apart.
pub struct RawNames<'a> {
    graph: &'a ClassGraph,
    baseline: &'a BaselineMapping,
    obfuscation: &'a Obfuscation,
    simple_names: HashMap<String, usize>,
    method_names: HashMap<ClassId, HashMap<String, usize>>,
    field_names: HashMap<ClassId, HashMap<String, usize>>,
}

impl<'a> RawNames<'a> {
    pub fn new(
        graph: &'a ClassGraph,
        baseline: &'a BaselineMapping,
        obfuscation: &'a Obfuscation,
    ) -> Result<Self> {
        let mut simple_names: HashMap<String, usize> = HashMap::new();
        let mut method_names = HashMap::new();
        let mut field_names = HashMap::new();

        for &class_id in graph.primary_classes() {
            let class = graph.class(class_id);
            let human = baseline.class(&class.name)?;
            *simple_names.entry(simple_name(&human.name).to_string()).or_default() += 1;

            let mut methods: HashMap<String, usize> = HashMap::new();
            for &method_id in &class.methods {
                let method = graph.method(method_id);
                if method.is_initializer() {
                    continue;
                }
                let human = baseline.method(&class.name, &method.name, &method.descriptor)?;
                *methods.entry(human.name.clone()).or_default() += 1;
            }
            method_names.insert(class_id, methods);

            let mut fields: HashMap<String, usize> = HashMap::new();
            for &field_id in &class.fields {
                let field = graph.field(field_id);
                let human = baseline.field(&class.name, &field.name, &field.descriptor)?;
                *fields.entry(human.name.clone()).or_default() += 1;
            }
            field_names.insert(class_id, fields);
        }

        Ok(Self {
            graph,
            baseline,
            obfuscation,
            simple_names,
            method_names,
            field_names,
        })
    }

    pub fn class(&self, id: ClassId) -> Result<String> {
        let class = self.graph.class(id);
        if !self.obfuscation.class(id) {
            return Ok(class.name.clone());
        }

        let human = self.baseline.class(&class.name)?;
        let simple = simple_name(&human.name);
        if self.simple_names.get(simple).copied() == Some(1) {
            Ok(simple.to_string())
        } else {
            Ok(human.name.clone())
        }
    }

    pub fn method(&self, id: MethodId) -> Result<String> {
        let method = self.graph.method(id);
        if !self.obfuscation.method(id) {
            return Ok(method.name.clone());
        }

        let owner = self.graph.class(method.owner);
        let human = self.baseline.method(&owner.name, &method.name, &method.descriptor)?;
        let overloaded = shared(&self.method_names, method.owner, &human.name);
        let descriptor = if overloaded { human.descriptor.as_str() } else { "" };

        Ok(format!("m;{}.{};{}", self.class(method.owner)?, human.name, descriptor))
    }

    pub fn field(&self, id: FieldId) -> Result<String> {
        let field = self.graph.field(id);
        if !self.obfuscation.field(id) {
            return Ok(field.name.clone());
        }

        let owner = self.graph.class(field.owner);
        let human = self.baseline.field(&owner.name, &field.name, &field.descriptor)?;
        let overloaded = shared(&self.field_names, field.owner, &human.name);
        let descriptor = if overloaded { human.descriptor.as_str() } else { "" };

        Ok(format!("f;{}.{};{}", self.class(field.owner)?, human.name, descriptor))
    }
}

fn shared(counts: &HashMap<ClassId, HashMap<String, usize>>, owner: ClassId, name: &str) -> bool {
    counts
        .get(&owner)
        .and_then(|names| names.get(name))
        .map_or(false, |&count| count > 1)
}
