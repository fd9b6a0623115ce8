use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod assembler;
pub mod baseline;
pub mod classfile;
pub mod equivalence;
pub mod graph;
pub mod hasher;
pub mod jar;
pub mod obfuscation;
pub mod overrides;
pub mod raw_names;
pub mod tiny;

pub use assembler::{ClassMapping, HashedMapping, MemberKey};
pub use baseline::BaselineMapping;
pub use graph::{ClassFacts, ClassPool, MemberFacts, Origin};
pub use hasher::{Alphabet, NameHasher};

use assembler::{class_names, resolve_class_path, Assembler};
use equivalence::EquivalenceClasses;
use graph::ClassGraph;
use obfuscation::Obfuscation;
use overrides::Overrides;
use raw_names::RawNames;

pub const DEFAULT_PACKAGE: &str = "net/minecraft/unmapped";

#[derive(Debug, Error)]
pub enum HasherError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read archive {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("failed to parse class file {path}: {source}")]
    ClassFile {
        path: PathBuf,
        #[source]
        source: classfile::ClassParseError,
    },
    #[error("invalid baseline mapping: {0}")]
    Baseline(String),
    #[error("baseline mapping has no entry for {kind} {name}")]
    MissingMapping { kind: &'static str, name: String },
    #[error("class not found: {0}")]
    ClassNotFound(String),
    #[error("class hierarchy loops back to {0}")]
    HierarchyCycle(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, HasherError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherSettings {
    pub input_jar: PathBuf,
    pub mappings_path: PathBuf,
    pub libraries: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub default_package: String,
    /// Annotation types, by obfuscated internal name, that keep whatever
    /// carries them unrenamed.
    pub dont_obfuscate_annotations: Vec<String>,
    /// Same, but given by hashed class name so the list survives releases.
    pub hashed_dont_obfuscate_annotations: Vec<String>,
    pub alphabet: Alphabet,
    pub digits: usize,
    pub debug: bool,
}

impl Default for HasherSettings {
    fn default() -> Self {
        Self {
            input_jar: PathBuf::new(),
            mappings_path: PathBuf::new(),
            libraries: Vec::new(),
            output_path: PathBuf::new(),
            default_package: DEFAULT_PACKAGE.to_string(),
            dont_obfuscate_annotations: Vec::new(),
            hashed_dont_obfuscate_annotations: Vec::new(),
            alphabet: Alphabet::default(),
            digits: 8,
            debug: false,
        }
    }
}

impl HasherSettings {
    /// Reads settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Turns a class pool plus a baseline mapping into the hashed mapping.
#[derive(Debug, Clone)]
pub struct MappingHasher {
    default_package: String,
    hasher: NameHasher,
    dont_obfuscate: BTreeSet<String>,
    hashed_dont_obfuscate: BTreeSet<String>,
}

impl MappingHasher {
    pub fn new(default_package: impl Into<String>) -> Self {
        Self {
            default_package: default_package.into(),
            hasher: NameHasher::default(),
            dont_obfuscate: BTreeSet::new(),
            hashed_dont_obfuscate: BTreeSet::new(),
        }
    }

    pub fn with_hasher(mut self, hasher: NameHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Registers a "do not obfuscate" annotation type. With `hashed` set the
    /// name is a hashed class name, resolved against the primary classes
    /// when generating.
    pub fn dont_obfuscate(mut self, annotation: impl Into<String>, hashed: bool) -> Self {
        if hashed {
            self.hashed_dont_obfuscate.insert(annotation.into());
        } else {
            self.dont_obfuscate.insert(annotation.into());
        }
        self
    }

    pub fn from_settings(settings: &HasherSettings) -> Result<Self> {
        if settings.digits == 0 {
            return Err(HasherError::Config("digits must be at least 1".to_string()));
        }

        let mut hasher = MappingHasher::new(settings.default_package.trim_end_matches('/'))
            .with_hasher(NameHasher::new(settings.alphabet, settings.digits));
        for annotation in &settings.dont_obfuscate_annotations {
            hasher = hasher.dont_obfuscate(annotation.as_str(), false);
        }
        for annotation in &settings.hashed_dont_obfuscate_annotations {
            hasher = hasher.dont_obfuscate(annotation.as_str(), true);
        }
        Ok(hasher)
    }

    pub fn generate(&self, pool: &ClassPool, baseline: &BaselineMapping) -> Result<HashedMapping> {
        let graph = ClassGraph::build(pool)?;
        let overrides = Overrides::resolve(&graph);

        let baseline_only = Obfuscation::from_baseline(&graph, baseline)?;
        let markers = self.resolve_markers(&graph, baseline, &baseline_only)?;
        let obfuscation = baseline_only.with_annotations(&graph, &markers);

        let equivalence = EquivalenceClasses::build(&graph, &overrides);
        let raw = RawNames::new(&graph, baseline, &obfuscation)?;
        Assembler::new(&graph, &obfuscation, &equivalence, &raw, &self.hasher).assemble(&self.default_package)
    }

    /// Collects the annotation types that pin names: the plain ones as given,
    /// plus every primary class whose baseline-only hashed name is listed.
    /// Inner classes match on either their full hashed path or their last
    /// `C_` segment.
    fn resolve_markers(
        &self,
        graph: &ClassGraph,
        baseline: &BaselineMapping,
        baseline_only: &Obfuscation,
    ) -> Result<BTreeSet<String>> {
        let mut markers = self.dont_obfuscate.clone();
        if self.hashed_dont_obfuscate.is_empty() {
            return Ok(markers);
        }

        let raw = RawNames::new(graph, baseline, baseline_only)?;
        let names = class_names(graph, baseline_only, &raw, &self.hasher, &self.default_package)?;
        let lookup = |name: &str| names.get(name).cloned();

        for &class_id in graph.primary_classes() {
            let obfuscated = &graph.class(class_id).name;
            let hashed = resolve_class_path(obfuscated, &lookup);
            // Inner classes may also be listed by their own `C_` segment.
            let segment = obfuscated
                .contains('$')
                .then(|| hashed.rsplit('$').next())
                .flatten();
            let listed = self.hashed_dont_obfuscate.contains(&hashed)
                || segment.map_or(false, |local| self.hashed_dont_obfuscate.contains(local));
            if listed {
                debug!("annotation {} resolved to {}", hashed, obfuscated);
                markers.insert(obfuscated.clone());
            }
        }
        Ok(markers)
    }
}

/// Runs the whole tool: reads the baseline and archives named in `settings`
/// and writes the tiny file. Nothing is written unless every step succeeds.
pub fn run(settings: HasherSettings) -> Result<()> {
    for (what, path) in [("Input jar", &settings.input_jar), ("Mappings file", &settings.mappings_path)] {
        if !path.exists() {
            return Err(HasherError::Config(format!("{what} does not exist: {}", path.display())));
        }
    }
    if settings.output_path.as_os_str().is_empty() {
        return Err(HasherError::Config("no output path given".to_string()));
    }

    let hasher = MappingHasher::from_settings(&settings)?;

    info!("Loading baseline mapping {}", settings.mappings_path.display());
    let baseline = BaselineMapping::from_proguard(&fs::read_to_string(&settings.mappings_path)?)?;

    let mut pool = ClassPool::new();
    for library in &settings.libraries {
        jar::load_path(&mut pool, library, Origin::Library)?;
    }
    jar::load_path(&mut pool, &settings.input_jar, Origin::Primary)?;
    info!(
        "Loaded {} primary and {} library classes",
        pool.primary_len(),
        pool.library_len()
    );

    let mapping = hasher.generate(&pool, &baseline)?;

    if let Some(parent) = settings.output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut out = BufWriter::new(File::create(&settings.output_path)?);
    tiny::write_tiny(&mapping, &mut out)?;
    out.flush()?;

    info!("Wrote {} class entries to {}", mapping.len(), settings.output_path.display());
    Ok(())
}
