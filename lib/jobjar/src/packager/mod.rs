//! Builds the self-contained job artifact: project files, embedded libraries,
//! the runtime distribution, extra archives, the bootstrap script, the
//! entry-point runner and a manifest, in one zip file.
//!
//! Everything is validated before the first byte is written, and the archive
//! is assembled in a temporary file that is only renamed into place once it
//! is complete.

pub mod archive;
pub mod bundling;
pub mod manifest;
pub mod resolver;

pub use archive::ArchiveWriter;
pub use bundling::{BundlingEntry, NativeBundlingTable, RuntimeVersion};
pub use manifest::{ArtifactManifest, SupportDescriptor};
pub use resolver::{flatten, load_lock, LockFile, ResolvedLibrary};

use crate::bootstrap::BootstrapScript;
use crate::constants::{
    ARCHIVE_DIR, BOOTSTRAP_PATH, ENTRY_POINT_PATH, LIBRARY_ROOT, MANIFEST_PATH, SUPPORT_DESCRIPTOR,
    SUPPORT_LIBRARY_NAME, SUPPORT_LIBRARY_VERSION,
};
use crate::error::JobjarError;
use crate::io::ensure_dir;
use anyhow::{Context, Result};
use archive::slash_path;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};
use walkdir::WalkDir;

const DEFAULT_EXCLUDES: &[&str] = &["build/**", "target/**"];

/// The embedded runtime distribution archive.
#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeDistribution {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

impl RuntimeDistribution {
    pub fn archive_entry(&self) -> String {
        format!("{}/{}-{}.jar", ARCHIVE_DIR, self.name, self.version)
    }
}

#[derive(Clone, Debug)]
pub struct PackageConfig {
    pub project_name: String,
    pub project_root: PathBuf,
    pub build_dir: PathBuf,
    /// Globs over project-relative paths; empty means every file.
    pub include: Vec<String>,
    /// Applied after `include`, on top of the default excludes.
    pub exclude: Vec<String>,
    pub libraries: Vec<ResolvedLibrary>,
    /// Support library tree to embed; a generated descriptor is embedded
    /// when none is given.
    pub support_root: Option<PathBuf>,
    pub runtime: RuntimeDistribution,
    pub extra_archives: Vec<PathBuf>,
    pub entry_point: PathBuf,
    pub bundling: NativeBundlingTable,
    pub artifact_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectFile {
    project: ProjectSection,
    runtime: RuntimeDistribution,
    #[serde(default)]
    support: Option<SupportSection>,
    #[serde(default)]
    bundling: Option<Vec<BundlingEntry>>,
}

#[derive(Debug, Deserialize)]
struct ProjectSection {
    name: String,
    #[serde(default)]
    root: Option<PathBuf>,
    #[serde(default)]
    build_dir: Option<PathBuf>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    extra_archives: Vec<PathBuf>,
    #[serde(default)]
    entry_point: Option<PathBuf>,
    #[serde(default)]
    lock: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SupportSection {
    root: PathBuf,
}

impl PackageConfig {
    /// Reads a `jobjar.toml` project file. Relative paths in it are taken
    /// relative to the file; `lock` and `entry_point` override what it says.
    pub fn from_project_file(path: &Path, lock: Option<&Path>, entry_point: Option<&Path>) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading project file {}", path.display()))?;
        let file: ProjectFile = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let at = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { base.join(p) };

        let project = file.project;
        let project_root = project.root.as_deref().map(at).unwrap_or_else(|| base.clone());
        let lock_path = match lock {
            Some(l) => Some(l.to_path_buf()),
            None => project.lock.as_deref().map(at).or_else(|| {
                let default = base.join("jobjar.lock");
                default.is_file().then_some(default)
            }),
        };
        let libraries = match lock_path {
            Some(l) => load_lock(&l)?,
            None => Vec::new(),
        };
        let entry_point = match entry_point {
            Some(e) => e.to_path_buf(),
            // An unset entry point fails validation as a missing one.
            None => project.entry_point.as_deref().map(at).unwrap_or_default(),
        };
        let bundling = match &file.bundling {
            Some(entries) => NativeBundlingTable::from_entries(entries)?,
            None => NativeBundlingTable::default(),
        };
        let mut runtime = file.runtime;
        runtime.path = at(&runtime.path);

        Ok(Self {
            project_name: project.name,
            build_dir: project.build_dir.as_deref().map(at).unwrap_or_else(|| project_root.join("build")),
            project_root,
            include: project.include,
            exclude: project.exclude,
            libraries,
            support_root: file.support.map(|s| at(&s.root)),
            runtime,
            extra_archives: project.extra_archives.iter().map(|p| at(p)).collect(),
            entry_point,
            bundling,
            artifact_name: None,
        })
    }

    pub fn artifact_path(&self) -> PathBuf {
        let name = match &self.artifact_name {
            Some(n) => n.clone(),
            None => format!("{}-{}.jar", self.project_name, chrono::Local::now().format("%Y%m%d")),
        };
        self.build_dir.join(name)
    }
}

#[derive(Debug)]
pub struct PackagedArtifact {
    pub path: PathBuf,
    pub manifest: ArtifactManifest,
    pub entries: Vec<String>,
}

pub struct Packager {
    config: PackageConfig,
}

impl Packager {
    pub fn new(config: PackageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    /// Libraries that will be embedded, in load order, after dropping the
    /// ones the runtime already ships.
    pub fn embedded_libraries(&self) -> Result<Vec<&ResolvedLibrary>> {
        let runtime = RuntimeVersion::parse(&self.config.runtime.version)?;
        Ok(self
            .config
            .libraries
            .iter()
            .filter(|lib| {
                let bundled = self.config.bundling.is_natively_bundled(&lib.name, &runtime);
                if bundled {
                    info!(library = %lib.identity(), runtime = %runtime, "skipping natively bundled library");
                }
                !bundled
            })
            .collect())
    }

    fn validate(&self, libraries: &[&ResolvedLibrary]) -> Result<()> {
        let c = &self.config;
        if !c.project_root.is_dir() {
            return Err(JobjarError::MissingProjectRoot(c.project_root.clone()).into());
        }
        let support = c.support_root.as_ref().map(|root| (SUPPORT_LIBRARY_NAME, root));
        for (name, root) in libraries.iter().map(|l| (l.name.as_str(), &l.root)).chain(support) {
            for dir in [root.clone(), root.join("lib")] {
                if !dir.is_dir() {
                    return Err(JobjarError::MissingLibraryRoot { name: name.to_string(), path: dir }.into());
                }
            }
        }
        if !c.runtime.path.is_file() {
            return Err(JobjarError::MissingRuntime(c.runtime.path.clone()).into());
        }
        for archive in &c.extra_archives {
            if !archive.is_file() {
                return Err(JobjarError::MissingArchive(archive.clone()).into());
            }
        }
        if !c.entry_point.is_file() {
            return Err(JobjarError::MissingEntryPoint(c.entry_point.clone()).into());
        }
        Ok(())
    }

    /// Project-relative paths of every file that goes into the artifact.
    pub fn project_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let c = &self.config;
        let includes = compile(&c.include)?;
        let mut excludes = compile(&c.exclude)?;
        excludes.extend(compile(DEFAULT_EXCLUDES)?);
        let build_dir = c.build_dir.strip_prefix(&c.project_root).ok().map(slash_path);

        let walker = WalkDir::new(&c.project_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        let mut files = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = slash_path(entry.path().strip_prefix(&c.project_root)?);
            if let Some(build) = &build_dir {
                if !build.is_empty() && rel.starts_with(&format!("{}/", build)) {
                    continue;
                }
            }
            let included = includes.is_empty() || includes.iter().any(|p| p.matches(&rel));
            if !included || excludes.iter().any(|p| p.matches(&rel)) {
                debug!(file = %rel, "excluded from artifact");
                continue;
            }
            files.push((rel, entry.path().to_path_buf()));
        }
        Ok(files)
    }

    pub fn package(&self) -> Result<PackagedArtifact> {
        let start = Instant::now();
        let c = &self.config;
        let libraries = self.embedded_libraries()?;
        self.validate(&libraries)?;
        let project_files = self.project_files()?;

        ensure_dir(&c.build_dir)?;
        let out_path = c.artifact_path();
        let tmp = tempfile::NamedTempFile::new_in(&c.build_dir)
            .with_context(|| format!("creating temporary artifact in {}", c.build_dir.display()))?;

        let runtime_entry = c.runtime.archive_entry();
        let mut manifest = ArtifactManifest::new(&c.project_name, &c.runtime.version, &runtime_entry);
        let mut bootstrap = BootstrapScript::new();
        let (entries, bytes_in) = {
            let mut w = ArchiveWriter::new(tmp.as_file());

            for (rel, path) in &project_files {
                w.add_file(rel, path, false)?;
            }

            let support_id = format!("{}-{}", SUPPORT_LIBRARY_NAME, SUPPORT_LIBRARY_VERSION);
            let support_prefix = format!("{}/{}", LIBRARY_ROOT, support_id);
            match &c.support_root {
                Some(root) => {
                    w.add_tree(&support_prefix, root)?;
                }
                None => {
                    let descriptor = SupportDescriptor::current();
                    w.add_bytes(&format!("{}/lib/{}", support_prefix, SUPPORT_DESCRIPTOR), descriptor.to_toml()?.as_bytes())?;
                }
            }
            bootstrap.push(format!("{}/lib", support_prefix));
            manifest.add_library(&support_id);

            for lib in &libraries {
                let prefix = format!("{}/{}", LIBRARY_ROOT, lib.identity());
                let n = w.add_tree(&prefix, &lib.root).with_context(|| format!("embedding {}", lib.identity()))?;
                debug!(library = %lib.identity(), files = n, "embedded library");
                bootstrap.push(format!("{}/lib", prefix));
                manifest.add_library(lib.identity());
            }

            w.add_file(&runtime_entry, &c.runtime.path, false)?;
            for archive in &c.extra_archives {
                let file_name = archive
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| JobjarError::MissingArchive(archive.clone()))?;
                w.add_file(&format!("{}/{}", ARCHIVE_DIR, file_name), archive, false)?;
                manifest.add_extra_archive(file_name);
            }

            w.add_bytes(BOOTSTRAP_PATH, bootstrap.render().as_bytes())?;
            w.add_file(ENTRY_POINT_PATH, &c.entry_point, true)?;
            if !w.contains(&manifest.entry_point) {
                return Err(JobjarError::MissingEntryPoint(PathBuf::from(&manifest.entry_point)).into());
            }
            w.add_bytes(MANIFEST_PATH, &manifest.to_json()?)?;
            let bytes_in = w.bytes_in();
            let (_, entries) = w.finish()?;
            (entries, bytes_in)
        };

        tmp.persist(&out_path)
            .with_context(|| format!("moving artifact into place at {}", out_path.display()))?;
        info!(
            phase = "package",
            project = %c.project_name,
            artifact = %out_path.display(),
            project_files = project_files.len(),
            libraries = manifest.libraries.len(),
            entries = entries.len(),
            bytes_in,
            wall_ms = start.elapsed().as_millis() as u64,
            "Packaging complete"
        );
        Ok(PackagedArtifact { path: out_path, manifest, entries })
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| glob::Pattern::new(p.as_ref()).with_context(|| format!("bad glob pattern {:?}", p.as_ref())))
        .collect()
}

/// Removes previously built artifacts from `build_dir`. Returns how many
/// were removed.
pub fn clean(build_dir: &Path) -> Result<usize> {
    if !build_dir.is_dir() {
        return Ok(0);
    }
    let pattern = format!("{}/*.jar", glob::Pattern::escape(&build_dir.to_string_lossy()));
    let mut removed = 0;
    for path in glob::glob(&pattern)?.flatten() {
        fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        info!(artifact = %path.display(), "removed artifact");
        removed += 1;
    }
    Ok(removed)
}
