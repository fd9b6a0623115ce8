use log::info;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{HasherError, Result};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_INTERFACE: u16 = 0x0200;

/// Where a class came from. Only primary classes are ever renamed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Origin {
    Primary,
    Library,
}

/// Structural facts of one class, as decoded from a class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFacts {
    pub name: String,
    pub access: u16,
    /// `None` only for the root of the type hierarchy.
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberFacts>,
    pub methods: Vec<MemberFacts>,
    pub annotations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberFacts {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub annotations: Vec<String>,
}

impl ClassFacts {
    pub fn new(name: impl Into<String>, access: u16) -> Self {
        Self {
            name: name.into(),
            access,
            super_name: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn extends(mut self, super_name: impl Into<String>) -> Self {
        self.super_name = Some(super_name.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str, access: u16) -> Self {
        self.methods.push(MemberFacts::new(name, descriptor, access));
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str, access: u16) -> Self {
        self.fields.push(MemberFacts::new(name, descriptor, access));
        self
    }

    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }
}

impl MemberFacts {
    pub fn new(name: &str, descriptor: &str, access: u16) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
            annotations: Vec::new(),
        }
    }
}

/// Decoded class facts, split into the classes being renamed and the
/// reference-only classes they may extend.
#[derive(Debug, Default)]
pub struct ClassPool {
    primary: HashMap<String, ClassFacts>,
    library: HashMap<String, ClassFacts>,
}

impl ClassPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class. The first class registered under a name in a given role
    /// wins; returns `false` when the name was already taken.
    pub fn add(&mut self, facts: ClassFacts, origin: Origin) -> bool {
        let table = match origin {
            Origin::Primary => &mut self.primary,
            Origin::Library => &mut self.library,
        };
        if table.contains_key(&facts.name) {
            return false;
        }
        table.insert(facts.name.clone(), facts);
        true
    }

    pub fn primary_len(&self) -> usize {
        self.primary.len()
    }

    pub fn library_len(&self) -> usize {
        self.library.len()
    }

    fn lookup(&self, name: &str) -> Option<(&ClassFacts, Origin)> {
        self.primary
            .get(name)
            .map(|facts| (facts, Origin::Primary))
            .or_else(|| self.library.get(name).map(|facts| (facts, Origin::Library)))
    }

    fn primary_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.primary.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ClassId(usize);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct MethodId(usize);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FieldId(usize);

impl ClassId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl MethodId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl FieldId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct ClassNode {
    pub name: String,
    pub access: u16,
    pub origin: Origin,
    /// Direct superclass and directly implemented interfaces.
    pub supers: Vec<ClassId>,
    pub methods: Vec<MethodId>,
    pub fields: Vec<FieldId>,
    pub annotations: BTreeSet<String>,
    signatures: HashMap<String, MethodId>,
}

impl ClassNode {
    pub fn package(&self) -> &str {
        self.name.rfind('/').map_or("", |idx| &self.name[..idx])
    }

    pub fn is_primary(&self) -> bool {
        self.origin == Origin::Primary
    }

    /// Looks up a declared method by name and descriptor.
    pub fn method_by_signature(&self, name: &str, descriptor: &str) -> Option<MethodId> {
        self.signatures.get(&signature_key(name, descriptor)).copied()
    }
}

#[derive(Debug, Clone)]
pub struct MethodNode {
    pub owner: ClassId,
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub annotations: BTreeSet<String>,
}

impl MethodNode {
    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    pub fn is_private(&self) -> bool {
        self.access & ACC_PRIVATE != 0
    }

    pub fn is_public(&self) -> bool {
        self.access & ACC_PUBLIC != 0
    }

    pub fn is_protected(&self) -> bool {
        self.access & ACC_PROTECTED != 0
    }

    /// `<init>` and `<clinit>` keep their names and never take part in overriding.
    pub fn is_initializer(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }
}

#[derive(Debug, Clone)]
pub struct FieldNode {
    pub owner: ClassId,
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub annotations: BTreeSet<String>,
}

fn signature_key(name: &str, descriptor: &str) -> String {
    let mut key = String::with_capacity(name.len() + descriptor.len());
    key.push_str(name);
    key.push_str(descriptor);
    key
}

/// Arena of class, method and field nodes addressed by stable ids.
///
/// Classes are stored in topological order: every class is pushed only after
/// all of its supertypes, so iterating `class_ids()` visits supertypes first.
#[derive(Debug, Default)]
pub struct ClassGraph {
    classes: Vec<ClassNode>,
    methods: Vec<MethodNode>,
    fields: Vec<FieldNode>,
    by_name: HashMap<String, ClassId>,
    primary: Vec<ClassId>,
}

impl ClassGraph {
    /// Materialises every primary class of the pool together with all of its
    /// (transitive) supertypes. Supertypes are resolved eagerly, primary
    /// before library, so the graph is complete when this returns.
    pub fn build(pool: &ClassPool) -> Result<Self> {
        let mut builder = GraphBuilder {
            pool,
            graph: ClassGraph::default(),
            in_progress: HashSet::new(),
        };

        for name in pool.primary_names() {
            let id = builder.node(name)?;
            builder.graph.primary.push(id);
        }

        let graph = builder.graph;
        info!(
            "class graph: {} classes ({} primary), {} methods, {} fields",
            graph.classes.len(),
            graph.primary.len(),
            graph.methods.len(),
            graph.fields.len()
        );
        Ok(graph)
    }

    pub fn class(&self, id: ClassId) -> &ClassNode {
        &self.classes[id.0]
    }

    pub fn method(&self, id: MethodId) -> &MethodNode {
        &self.methods[id.0]
    }

    pub fn field(&self, id: FieldId) -> &FieldNode {
        &self.fields[id.0]
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Class ids in supertype-before-subtype order.
    pub fn class_ids(&self) -> impl Iterator<Item = ClassId> {
        (0..self.classes.len()).map(ClassId)
    }

    pub fn method_ids(&self) -> impl Iterator<Item = MethodId> {
        (0..self.methods.len()).map(MethodId)
    }

    /// Primary classes sorted by name.
    pub fn primary_classes(&self) -> &[ClassId] {
        &self.primary
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn push_class(&mut self, facts: &ClassFacts, origin: Origin, supers: Vec<ClassId>) -> ClassId {
        let id = ClassId(self.classes.len());

        let mut methods = Vec::with_capacity(facts.methods.len());
        let mut signatures = HashMap::with_capacity(facts.methods.len());
        for member in &facts.methods {
            let method_id = MethodId(self.methods.len());
            self.methods.push(MethodNode {
                owner: id,
                name: member.name.clone(),
                descriptor: member.descriptor.clone(),
                access: member.access,
                annotations: member.annotations.iter().cloned().collect(),
            });
            signatures
                .entry(signature_key(&member.name, &member.descriptor))
                .or_insert(method_id);
            methods.push(method_id);
        }

        let mut fields = Vec::with_capacity(facts.fields.len());
        for member in &facts.fields {
            let field_id = FieldId(self.fields.len());
            self.fields.push(FieldNode {
                owner: id,
                name: member.name.clone(),
                descriptor: member.descriptor.clone(),
                access: member.access,
                annotations: member.annotations.iter().cloned().collect(),
            });
            fields.push(field_id);
        }

        self.classes.push(ClassNode {
            name: facts.name.clone(),
            access: facts.access,
            origin,
            supers,
            methods,
            fields,
            annotations: facts.annotations.iter().cloned().collect(),
            signatures,
        });
        self.by_name.insert(facts.name.clone(), id);
        id
    }
}

struct GraphBuilder<'a> {
    pool: &'a ClassPool,
    graph: ClassGraph,
    in_progress: HashSet<String>,
}

impl<'a> GraphBuilder<'a> {
    fn node(&mut self, name: &str) -> Result<ClassId> {
        if let Some(id) = self.graph.lookup(name) {
            return Ok(id);
        }

        let pool = self.pool;
        let (facts, origin) = pool
            .lookup(name)
            .ok_or_else(|| HasherError::ClassNotFound(name.to_string()))?;

        if !self.in_progress.insert(name.to_string()) {
            return Err(HasherError::HierarchyCycle(name.to_string()));
        }

        let mut supers = Vec::with_capacity(facts.interfaces.len() + 1);
        for super_name in facts.super_name.iter().chain(facts.interfaces.iter()) {
            let super_id = self.node(super_name)?;
            if !supers.contains(&super_id) {
                supers.push(super_id);
            }
        }

        self.in_progress.remove(name);
        Ok(self.graph.push_class(facts, origin, supers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> ClassFacts {
        ClassFacts::new("java/lang/Object", ACC_PUBLIC).method("toString", "()Ljava/lang/String;", ACC_PUBLIC)
    }

    #[test]
    fn supertypes_are_built_before_subtypes() {
        let mut pool = ClassPool::new();
        pool.add(object(), Origin::Library);
        pool.add(ClassFacts::new("a", ACC_PUBLIC).extends("b"), Origin::Primary);
        pool.add(
            ClassFacts::new("b", ACC_PUBLIC).extends("java/lang/Object").implements("c"),
            Origin::Primary,
        );
        pool.add(
            ClassFacts::new("c", ACC_PUBLIC | ACC_INTERFACE).extends("java/lang/Object"),
            Origin::Primary,
        );

        let graph = ClassGraph::build(&pool).unwrap();
        assert_eq!(graph.class_count(), 4);
        assert_eq!(graph.primary_classes().len(), 3);

        for id in graph.class_ids() {
            for &super_id in &graph.class(id).supers {
                assert!(super_id < id, "{} built before its supertype", graph.class(id).name);
            }
        }

        let a = graph.lookup("a").unwrap();
        let b = graph.lookup("b").unwrap();
        assert_eq!(graph.class(a).supers, vec![b]);
        assert_eq!(graph.class(b).supers.len(), 2);
        assert!(!graph.class(graph.lookup("java/lang/Object").unwrap()).is_primary());
    }

    #[test]
    fn primary_shadows_library() {
        let mut pool = ClassPool::new();
        pool.add(object(), Origin::Library);
        pool.add(ClassFacts::new("x", ACC_PUBLIC).extends("java/lang/Object"), Origin::Library);
        pool.add(
            ClassFacts::new("x", ACC_PUBLIC)
                .extends("java/lang/Object")
                .method("a", "()V", ACC_PUBLIC),
            Origin::Primary,
        );

        let graph = ClassGraph::build(&pool).unwrap();
        let x = graph.class(graph.lookup("x").unwrap());
        assert!(x.is_primary());
        assert!(x.method_by_signature("a", "()V").is_some());
    }

    #[test]
    fn first_registration_wins() {
        let mut pool = ClassPool::new();
        assert!(pool.add(ClassFacts::new("a", 0), Origin::Primary));
        assert!(!pool.add(ClassFacts::new("a", ACC_PUBLIC), Origin::Primary));
        assert_eq!(pool.primary_len(), 1);
        assert_eq!(pool.library_len(), 0);
    }

    #[test]
    fn missing_supertype_is_fatal() {
        let mut pool = ClassPool::new();
        pool.add(ClassFacts::new("a", ACC_PUBLIC).extends("gone"), Origin::Primary);

        let err = ClassGraph::build(&pool).unwrap_err();
        assert!(matches!(err, HasherError::ClassNotFound(ref name) if name == "gone"));
    }

    #[test]
    fn cyclic_hierarchy_is_rejected() {
        let mut pool = ClassPool::new();
        pool.add(ClassFacts::new("a", ACC_PUBLIC).extends("b"), Origin::Primary);
        pool.add(ClassFacts::new("b", ACC_PUBLIC).extends("a"), Origin::Primary);

        let err = ClassGraph::build(&pool).unwrap_err();
        assert!(matches!(err, HasherError::HierarchyCycle(_)));
    }

    #[test]
    fn package_is_derived_from_internal_name() {
        let mut pool = ClassPool::new();
        pool.add(ClassFacts::new("net/example/Foo", ACC_PUBLIC), Origin::Primary);
        pool.add(ClassFacts::new("Bar", ACC_PUBLIC), Origin::Primary);

        let graph = ClassGraph::build(&pool).unwrap();
        assert_eq!(graph.class(graph.lookup("net/example/Foo").unwrap()).package(), "net/example");
        assert_eq!(graph.class(graph.lookup("Bar").unwrap()).package(), "");
    }
}
