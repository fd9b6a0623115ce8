use log::{debug, info};
use std::collections::BTreeMap;

use crate::equivalence::EquivalenceClasses;
use crate::graph::{ClassGraph, MethodId};
use crate::hasher::NameHasher;
use crate::obfuscation::Obfuscation;
use crate::raw_names::RawNames;
use crate::Result;

/// Obfuscated name and descriptor of a member, ordered name first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberKey {
    pub name: String,
    pub descriptor: String,
}

impl MemberKey {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
    pub obfuscated: String,
    /// Full hashed name, `None` when the class keeps its obfuscated name.
    pub hashed: Option<String>,
    pub fields: BTreeMap<MemberKey, String>,
    pub methods: BTreeMap<MemberKey, String>,
}

impl ClassMapping {
    fn new(obfuscated: &str, hashed: Option<String>) -> Self {
        Self {
            obfuscated: obfuscated.to_string(),
            hashed,
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.hashed.is_none() && self.fields.is_empty() && self.methods.is_empty()
    }
}

/// The obfuscated-to-hashed association. Anything absent keeps its
/// obfuscated name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashedMapping {
    classes: BTreeMap<String, ClassMapping>,
}

impl HashedMapping {
    pub fn classes(&self) -> impl Iterator<Item = &ClassMapping> {
        self.classes.values()
    }

    pub fn class(&self, obfuscated: &str) -> Option<&ClassMapping> {
        self.classes.get(obfuscated)
    }

    pub fn class_name(&self, obfuscated: &str) -> Option<&str> {
        self.classes.get(obfuscated)?.hashed.as_deref()
    }

    pub fn method_name(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        let class = self.classes.get(owner)?;
        class.methods.get(&MemberKey::new(name, descriptor)).map(String::as_str)
    }

    pub fn field_name(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        let class = self.classes.get(owner)?;
        class.fields.get(&MemberKey::new(name, descriptor)).map(String::as_str)
    }

    /// Name of a class in the hashed namespace, including classes that keep
    /// their own name but are nested in a renamed one.
    pub fn resolve_class(&self, obfuscated: &str) -> String {
        let lookup = |name: &str| self.class_name(name).map(str::to_string);
        resolve_class_path(obfuscated, &lookup)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Resolves `name` through `renamed`, rebuilding unrenamed inner classes
/// from their resolved parent.
pub(crate) fn resolve_class_path<F>(name: &str, renamed: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(hashed) = renamed(name) {
        return hashed;
    }
    match name.rfind('$') {
        Some(idx) => format!("{}${}", resolve_class_path(&name[..idx], renamed), &name[idx + 1..]),
        None => name.to_string(),
    }
}

/// Computes the full hashed name of every renamed primary class.
///
/// Top-level classes land in `default_package`; inner classes keep their
/// nesting and only replace their own segment.
pub fn class_names(
    graph: &ClassGraph,
    obfuscation: &Obfuscation,
    raw: &RawNames<'_>,
    hasher: &NameHasher,
    default_package: &str,
) -> Result<BTreeMap<String, String>> {
    let mut names: BTreeMap<String, String> = BTreeMap::new();

    // Primary classes are sorted by name, so a parent is always named before
    // its inner classes.
    for &class_id in graph.primary_classes() {
        if !obfuscation.class(class_id) {
            continue;
        }
        let class = graph.class(class_id);
        let local = format!("C_{}", hasher.hash(&raw.class(class_id)?));

        let hashed = match class.name.rfind('$') {
            Some(idx) => {
                let lookup = |name: &str| names.get(name).cloned();
                format!("{}${}", resolve_class_path(&class.name[..idx], &lookup), local)
            }
            None if default_package.is_empty() => local,
            None => format!("{default_package}/{local}"),
        };
        names.insert(class.name.clone(), hashed);
    }

    Ok(names)
}

/// Walks the graph once and emits a generated name for every obfuscated
/// class, field and canonical method.
pub struct Assembler<'a> {
    graph: &'a ClassGraph,
    obfuscation: &'a Obfuscation,
    equivalence: &'a EquivalenceClasses,
    raw: &'a RawNames<'a>,
    hasher: &'a NameHasher,
}

impl<'a> Assembler<'a> {
    pub fn new(
        graph: &'a ClassGraph,
        obfuscation: &'a Obfuscation,
        equivalence: &'a EquivalenceClasses,
        raw: &'a RawNames<'a>,
        hasher: &'a NameHasher,
    ) -> Self {
        Self {
            graph,
            obfuscation,
            equivalence,
            raw,
            hasher,
        }
    }

    pub fn assemble(&self, default_package: &str) -> Result<HashedMapping> {
        let renamed = class_names(self.graph, self.obfuscation, self.raw, self.hasher, default_package)?;
        let mut classes: BTreeMap<String, ClassMapping> = BTreeMap::new();

        for &class_id in self.graph.primary_classes() {
            let class = self.graph.class(class_id);
            let mut mapping = ClassMapping::new(&class.name, renamed.get(&class.name).cloned());

            for &field_id in &class.fields {
                if !self.obfuscation.field(field_id) {
                    continue;
                }
                let field = self.graph.field(field_id);
                let hashed = format!("f_{}", self.hasher.hash(&self.raw.field(field_id)?));
                mapping.fields.insert(MemberKey::new(&field.name, &field.descriptor), hashed);
            }

            classes.insert(class.name.clone(), mapping);
        }

        let mut methods = 0usize;
        for group in self.equivalence.ids() {
            let Some((canonical, raw)) = self.canonical(self.equivalence.members(group))? else {
                continue;
            };
            let method = self.graph.method(canonical);
            let owner = &self.graph.class(method.owner).name;
            let hashed = format!("m_{}", self.hasher.hash(&raw));
            debug!("{}.{}{} -> {}", owner, method.name, method.descriptor, hashed);

            if let Some(mapping) = classes.get_mut(owner) {
                mapping
                    .methods
                    .insert(MemberKey::new(&method.name, &method.descriptor), hashed);
                methods += 1;
            }
        }

        classes.retain(|_, mapping| !mapping.is_empty());
        info!(
            "hashed mapping: {} class entries, {} renamed classes, {} canonical methods",
            classes.len(),
            renamed.len(),
            methods
        );
        Ok(HashedMapping { classes })
    }

    /// Picks the member whose raw name is hashed for a group, or `None` when
    /// the group keeps its names. A single unobfuscated member keeps the
    /// whole group; library methods are never obfuscated.
    fn canonical(&self, members: &[MethodId]) -> Result<Option<(MethodId, String)>> {
        let mut best: Option<(String, &str, &str, &str, MethodId)> = None;

        for &method_id in members {
            let method = self.graph.method(method_id);
            if method.is_initializer() || !self.obfuscation.method(method_id) {
                return Ok(None);
            }

            let raw = self.raw.method(method_id)?;
            let owner = self.graph.class(method.owner).name.as_str();
            let candidate = (raw, owner, method.name.as_str(), method.descriptor.as_str(), method_id);
            let better = match &best {
                Some(current) => {
                    (&candidate.0, candidate.1, candidate.2, candidate.3)
                        > (&current.0, current.1, current.2, current.3)
                }
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }

        Ok(best.map(|(raw, _, _, _, method_id)| (method_id, raw)))
    }
}
