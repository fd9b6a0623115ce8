use log::{debug, info, warn};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::classfile::parse_class;
use crate::graph::{ClassPool, Origin};
use crate::{HasherError, Result};

/// Loads classes from a jar, a `.jmod`, a single `.class` file or a
/// directory. Directories are walked in file name order; nested archives are
/// opened and loose class files read directly.
///
/// Returns the number of classes newly added to the pool.
pub fn load_path(pool: &mut ClassPool, path: &Path, origin: Origin) -> Result<usize> {
    if path.is_dir() {
        return load_directory(pool, path, origin);
    }
    if is_archive(path) {
        return load_archive(pool, path, origin);
    }
    if has_extension(path, "class") {
        let bytes = fs::read(path)?;
        return Ok(usize::from(register(pool, &bytes, origin, path.to_path_buf())?));
    }

    Err(HasherError::Config(format!(
        "not a jar, jmod, class file or directory: {}",
        path.display()
    )))
}

fn load_directory(pool: &mut ClassPool, root: &Path, origin: Origin) -> Result<usize> {
    let mut added = 0;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if is_archive(path) {
            added += load_archive(pool, path, origin)?;
        } else if has_extension(path, "class") && !is_module_info(path.to_string_lossy().as_ref()) {
            let bytes = fs::read(path)?;
            added += usize::from(register(pool, &bytes, origin, path.to_path_buf())?);
        }
    }

    debug!("{}: {} classes from directory", root.display(), added);
    Ok(added)
}

/// Loads every class entry of a zip-based archive. `.jmod` files keep their
/// classes under `classes/`; multi-release overlays and module descriptors
/// are ignored.
pub fn load_archive(pool: &mut ClassPool, path: &Path, origin: Origin) -> Result<usize> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|source| HasherError::Zip {
        path: path.to_path_buf(),
        source,
    })?;
    let jmod = has_extension(path, "jmod");

    let mut added = 0;
    let mut skipped = 0;
    let mut buffer = Vec::new();

    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx).map_err(|source| HasherError::Zip {
            path: path.to_path_buf(),
            source,
        })?;
        if !entry.is_file() {
            continue;
        }

        let raw_name = entry.name().to_string();
        let name = if jmod {
            match raw_name.strip_prefix("classes/") {
                Some(stripped) => stripped,
                None => continue,
            }
        } else {
            raw_name.as_str()
        };
        if !name.ends_with(".class") || should_skip_entry(name) {
            continue;
        }

        buffer.clear();
        entry.read_to_end(&mut buffer)?;
        if register(pool, &buffer, origin, archive_entry_path(path, &raw_name))? {
            added += 1;
        } else {
            skipped += 1;
        }
    }

    info!(
        "{}: {} {} classes loaded, {} skipped",
        path.display(),
        added,
        match origin {
            Origin::Primary => "primary",
            Origin::Library => "library",
        },
        skipped
    );
    Ok(added)
}

/// Parses one class and adds it to the pool. Library classes that fail to
/// parse are skipped with a warning; primary classes must parse.
fn register(pool: &mut ClassPool, bytes: &[u8], origin: Origin, virtual_path: PathBuf) -> Result<bool> {
    match parse_class(bytes) {
        Ok(facts) => Ok(pool.add(facts, origin)),
        Err(source) if origin == Origin::Library => {
            warn!("skipping unreadable library class {}: {}", virtual_path.display(), source);
            Ok(false)
        }
        Err(source) => Err(HasherError::ClassFile {
            path: virtual_path,
            source,
        }),
    }
}

fn should_skip_entry(name: &str) -> bool {
    name.starts_with("META-INF/versions/") || is_module_info(name)
}

fn is_module_info(name: &str) -> bool {
    name == "module-info.class" || name.ends_with("/module-info.class")
}

fn is_archive(path: &Path) -> bool {
    has_extension(path, "jar") || has_extension(path, "jmod")
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

fn archive_entry_path(archive: &Path, entry: &str) -> PathBuf {
    let mut display = archive.display().to_string();
    display.push_str("!/");
    display.push_str(entry);
    PathBuf::from(display)
}
