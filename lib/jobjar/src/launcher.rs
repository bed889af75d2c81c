//! Submits a packaged artifact on this machine: unpack it, then start the
//! entry point it declares with the job arguments.

use crate::constants::{ENV_ARTIFACT_ROOT, MANIFEST_PATH};
use crate::error::JobjarError;
use crate::io::ensure_dir;
use crate::packager::ArtifactManifest;
use anyhow::{anyhow, Context, Result};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use tracing::{debug, info};
use zip::ZipArchive;

fn open(artifact: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(artifact).with_context(|| format!("open {}", artifact.display()))?;
    ZipArchive::new(file).with_context(|| format!("{} is not a readable archive", artifact.display()))
}

/// Entry names in archive order.
pub fn list_entries(artifact: &Path) -> Result<Vec<String>> {
    let zip = open(artifact)?;
    Ok(zip.file_names().map(str::to_string).collect())
}

pub fn read_manifest(artifact: &Path) -> Result<ArtifactManifest> {
    let mut zip = open(artifact)?;
    let mut entry = zip.by_name(MANIFEST_PATH).with_context(|| format!("{} has no manifest", artifact.display()))?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    ArtifactManifest::from_json(&bytes).context("parsing manifest")
}

/// Unpacks `artifact` into `dest`, restoring unix modes, and checks that the
/// manifest's entry point was unpacked.
pub fn extract(artifact: &Path, dest: &Path) -> Result<ArtifactManifest> {
    let mut zip = open(artifact)?;
    ensure_dir(dest)?;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let rel = entry
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| anyhow!("refusing to extract entry {:?}", entry.name()))?;
        let out = dest.join(rel);
        if entry.is_dir() {
            ensure_dir(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            ensure_dir(parent)?;
        }
        let mut file = File::create(&out).with_context(|| format!("create {}", out.display()))?;
        io::copy(&mut entry, &mut file).with_context(|| format!("extracting {}", entry.name()))?;
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }
    let manifest_path = dest.join(MANIFEST_PATH);
    let bytes = fs::read(&manifest_path).with_context(|| format!("reading {}", manifest_path.display()))?;
    let manifest = ArtifactManifest::from_json(&bytes).context("parsing manifest")?;
    let entry_point = dest.join(&manifest.entry_point);
    if !entry_point.is_file() {
        return Err(JobjarError::MissingEntryPoint(entry_point).into());
    }
    debug!(artifact = %artifact.display(), dest = %dest.display(), entries = zip.len(), "artifact extracted");
    Ok(manifest)
}

/// Unpacks into a temporary directory and runs the entry point with `args`
/// from the current directory. `JOBJAR_ARTIFACT_ROOT` tells the runner where
/// the artifact was unpacked. The directory is removed when the process exits.
pub fn launch<I, S>(artifact: &Path, args: I, envs: &[(String, String)]) -> Result<ExitStatus>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let dir = tempfile::Builder::new().prefix("jobjar-").tempdir().context("creating extraction directory")?;
    let manifest = extract(artifact, dir.path())?;
    let entry_point: PathBuf = dir.path().join(&manifest.entry_point);
    info!(project = %manifest.project, entry_point = %manifest.entry_point, "Launching artifact");
    let status = Command::new(&entry_point)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .env(ENV_ARTIFACT_ROOT, dir.path())
        .status()
        .with_context(|| format!("starting {}", entry_point.display()))?;
    info!(status = %status, "Artifact process exited");
    Ok(status)
}
