use log::{debug, info};
use std::collections::BTreeSet;

use crate::baseline::BaselineMapping;
use crate::graph::{ClassGraph, ClassId, FieldId, MethodId};
use crate::Result;

/// A name counts as obfuscated unless the baseline keeps it verbatim. Single
/// character names are always treated as obfuscated, even when kept.
pub fn is_obfuscated_name(obfuscated: &str, human: &str) -> bool {
    human.len() == 1 || human != obfuscated
}

/// Final per-entity decision whether a class, method or field gets a
/// generated name.
///
/// Built in two explicit phases: the baseline pass, then one annotation
/// propagation pass. Nothing else changes the flags afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obfuscation {
    classes: Vec<bool>,
    methods: Vec<bool>,
    fields: Vec<bool>,
}

impl Obfuscation {
    /// Decides obfuscation from the baseline alone. Library entities are
    /// never obfuscated and are never looked up; every primary entity other
    /// than an initializer must have a baseline entry.
    pub fn from_baseline(graph: &ClassGraph, baseline: &BaselineMapping) -> Result<Self> {
        let mut classes = vec![false; graph.class_count()];
        let mut methods = vec![false; graph.method_count()];
        let mut fields = vec![false; graph.field_count()];

        for &class_id in graph.primary_classes() {
            let class = graph.class(class_id);
            let human = baseline.class(&class.name)?;
            classes[class_id.index()] = is_obfuscated_name(&class.name, &human.name);

            for &method_id in &class.methods {
                let method = graph.method(method_id);
                if method.is_initializer() {
                    continue;
                }
                let human = baseline.method(&class.name, &method.name, &method.descriptor)?;
                methods[method_id.index()] = is_obfuscated_name(&method.name, &human.name);
            }

            for &field_id in &class.fields {
                let field = graph.field(field_id);
                let human = baseline.field(&class.name, &field.name, &field.descriptor)?;
                fields[field_id.index()] = is_obfuscated_name(&field.name, &human.name);
            }
        }

        Ok(Self {
            classes,
            methods,
            fields,
        })
    }

    /// Applies the "do not obfuscate" markers.
    ///
    /// A marked class keeps its own name and those of all its members. A
    /// marked method or field keeps its name and also pins its owning class.
    pub fn with_annotations(mut self, graph: &ClassGraph, markers: &BTreeSet<String>) -> Self {
        if markers.is_empty() {
            return self;
        }

        let marked = |annotations: &BTreeSet<String>| annotations.iter().any(|a| markers.contains(a));
        let mut pinned = 0usize;

        for &class_id in graph.primary_classes() {
            let class = graph.class(class_id);

            if marked(&class.annotations) {
                debug!("{} is marked do-not-obfuscate", class.name);
                self.classes[class_id.index()] = false;
                for &method_id in &class.methods {
                    self.methods[method_id.index()] = false;
                }
                for &field_id in &class.fields {
                    self.fields[field_id.index()] = false;
                }
                pinned += 1;
            }

            for &method_id in &class.methods {
                if marked(&graph.method(method_id).annotations) {
                    self.methods[method_id.index()] = false;
                    self.classes[class_id.index()] = false;
                    pinned += 1;
                }
            }

            for &field_id in &class.fields {
                if marked(&graph.field(field_id).annotations) {
                    self.fields[field_id.index()] = false;
                    self.classes[class_id.index()] = false;
                    pinned += 1;
                }
            }
        }

        info!("do-not-obfuscate markers pinned {} entities", pinned);
        self
    }

    pub fn class(&self, id: ClassId) -> bool {
        self.classes[id.index()]
    }

    pub fn method(&self, id: MethodId) -> bool {
        self.methods[id.index()]
    }

    pub fn field(&self, id: FieldId) -> bool {
        self.fields[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ClassFacts, ClassPool, MemberFacts, Origin, ACC_PUBLIC};
    use crate::HasherError;

    fn setup() -> (ClassGraph, BaselineMapping) {
        let mut pool = ClassPool::new();
        pool.add(ClassFacts::new("java/lang/Object", ACC_PUBLIC), Origin::Library);

        let mut marked = MemberFacts::new("b", "()V", ACC_PUBLIC);
        marked.annotations.push("keep/Keep".to_string());
        let mut a = ClassFacts::new("a", ACC_PUBLIC)
            .extends("java/lang/Object")
            .method("<init>", "()V", ACC_PUBLIC)
            .method("a", "()V", ACC_PUBLIC)
            .method("main", "([Ljava/lang/String;)V", ACC_PUBLIC)
            .field("a", "I", 0);
        a.methods.push(marked);
        pool.add(a, Origin::Primary);
        pool.add(
            ClassFacts::new("c", ACC_PUBLIC)
                .extends("java/lang/Object")
                .annotated("keep/Keep")
                .method("a", "()V", ACC_PUBLIC)
                .field("a", "J", 0),
            Origin::Primary,
        );
        pool.add(ClassFacts::new("Main", ACC_PUBLIC).extends("java/lang/Object"), Origin::Primary);

        let mut baseline = BaselineMapping::new();
        baseline
            .insert_class("a", "net/example/Alpha")
            .insert_method("a", "()V", "tick", "()V")
            .insert_method("b", "()V", "render", "()V")
            .insert_method("main", "([Ljava/lang/String;)V", "main", "([Ljava/lang/String;)V")
            .insert_field("a", "I", "count", "I");
        baseline
            .insert_class("c", "net/example/Gamma")
            .insert_method("a", "()V", "run", "()V")
            .insert_field("a", "J", "time", "J");
        baseline.insert_class("Main", "Main");

        (ClassGraph::build(&pool).unwrap(), baseline)
    }

    fn method(graph: &ClassGraph, owner: &str, name: &str) -> MethodId {
        let class = graph.class(graph.lookup(owner).unwrap());
        class.methods.iter().copied().find(|&id| graph.method(id).name == name).unwrap()
    }

    #[test]
    fn identity_rule() {
        assert!(is_obfuscated_name("a", "net/example/Alpha"));
        assert!(!is_obfuscated_name("Main", "Main"));
        // One-character names are always considered obfuscated.
        assert!(is_obfuscated_name("x", "x"));
    }

    #[test]
    fn baseline_decisions() {
        let (graph, baseline) = setup();
        let obfuscation = Obfuscation::from_baseline(&graph, &baseline).unwrap();

        assert!(obfuscation.class(graph.lookup("a").unwrap()));
        assert!(!obfuscation.class(graph.lookup("Main").unwrap()));
        assert!(!obfuscation.class(graph.lookup("java/lang/Object").unwrap()));
        assert!(obfuscation.method(method(&graph, "a", "a")));
        assert!(!obfuscation.method(method(&graph, "a", "main")));
        assert!(!obfuscation.method(method(&graph, "a", "<init>")));
    }

    #[test]
    fn annotations_propagate() {
        let (graph, baseline) = setup();
        let markers: BTreeSet<String> = ["keep/Keep".to_string()].into_iter().collect();
        let obfuscation = Obfuscation::from_baseline(&graph, &baseline)
            .unwrap()
            .with_annotations(&graph, &markers);

        // Marked method pins itself and its owner, siblings stay obfuscated.
        let a = graph.lookup("a").unwrap();
        assert!(!obfuscation.class(a));
        assert!(!obfuscation.method(method(&graph, "a", "b")));
        assert!(obfuscation.method(method(&graph, "a", "a")));
        assert!(obfuscation.field(graph.class(a).fields[0]));

        // Marked class pins every member.
        let c = graph.lookup("c").unwrap();
        assert!(!obfuscation.class(c));
        assert!(!obfuscation.method(method(&graph, "c", "a")));
        assert!(!obfuscation.field(graph.class(c).fields[0]));
    }

    #[test]
    fn missing_member_mapping_is_fatal() {
        let (graph, _) = setup();
        let mut stripped = BaselineMapping::new();
        stripped.insert_class("a", "net/example/Alpha");
        let err = Obfuscation::from_baseline(&graph, &stripped).unwrap_err();
        assert!(matches!(err, HasherError::MissingMapping { .. }));
    }
}
