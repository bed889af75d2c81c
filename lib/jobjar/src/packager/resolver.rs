//! Flattens a resolved library graph into the ordered list the packager
//! embeds. Resolution itself belongs to the external dependency tool; this
//! only reads its lock file.

use crate::constants::SUPPORT_LIBRARY_NAME;
use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLibrary {
    pub name: String,
    pub version: String,
    pub root: PathBuf,
}

impl ResolvedLibrary {
    pub fn new(name: impl Into<String>, version: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), version: version.into(), root: root.into() }
    }

    /// `<name>-<version>`; also the directory name inside the artifact.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LockEntry {
    pub name: String,
    pub version: String,
    pub root: PathBuf,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LockFile {
    #[serde(default, rename = "library")]
    pub libraries: Vec<LockEntry>,
}

impl LockFile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing lock file")
    }
}

/// Reads a lock file; relative roots are taken relative to the lock file.
pub fn load_lock(path: &Path) -> Result<Vec<ResolvedLibrary>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading lock file {}", path.display()))?;
    let mut lock = LockFile::parse(&text).with_context(|| format!("in {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for entry in &mut lock.libraries {
        if entry.root.is_relative() {
            entry.root = base.join(&entry.root);
        }
    }
    flatten(&lock)
}

/// Dependencies come before their dependents; otherwise lock file order is
/// kept. Each identity appears once and the support library never appears.
pub fn flatten(lock: &LockFile) -> Result<Vec<ResolvedLibrary>> {
    let by_name: IndexMap<&str, &LockEntry> = lock.libraries.iter().map(|e| (e.name.as_str(), e)).collect();
    let mut out: IndexMap<String, ResolvedLibrary> = IndexMap::new();
    let mut visiting: HashSet<&str> = HashSet::new();
    for entry in &lock.libraries {
        visit(entry, &by_name, &mut visiting, &mut out)?;
    }
    Ok(out.into_values().collect())
}

fn visit<'a>(
    entry: &'a LockEntry,
    by_name: &IndexMap<&'a str, &'a LockEntry>,
    visiting: &mut HashSet<&'a str>,
    out: &mut IndexMap<String, ResolvedLibrary>,
) -> Result<()> {
    let lib = ResolvedLibrary::new(&entry.name, &entry.version, &entry.root);
    if out.contains_key(&lib.identity()) || !visiting.insert(entry.name.as_str()) {
        return Ok(());
    }
    for dep in &entry.dependencies {
        match by_name.get(dep.as_str()) {
            Some(dep_entry) => visit(dep_entry, by_name, visiting, out)?,
            None => bail!("{} depends on {}, which is not in the lock file", lib.identity(), dep),
        }
    }
    visiting.remove(entry.name.as_str());
    if entry.name != SUPPORT_LIBRARY_NAME {
        out.insert(lib.identity(), lib);
    }
    Ok(())
}
