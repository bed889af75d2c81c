use anyhow::{bail, Context, Result};
use indexmap::IndexSet;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip writer that remembers every entry it wrote, in write order, and
/// refuses duplicates.
pub struct ArchiveWriter<W: Write + io::Seek> {
    zip: ZipWriter<W>,
    entries: IndexSet<String>,
    bytes_in: u64,
}

impl<W: Write + io::Seek> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { zip: ZipWriter::new(inner), entries: IndexSet::new(), bytes_in: 0 }
    }

    fn options(mode: u32) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode)
    }

    fn start(&mut self, name: &str, mode: u32) -> Result<()> {
        if !self.entries.insert(name.to_string()) {
            bail!("duplicate archive entry {}", name);
        }
        self.zip.start_file(name, Self::options(mode)).with_context(|| format!("starting entry {}", name))
    }

    pub fn add_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.start(name, 0o644)?;
        self.zip.write_all(bytes)?;
        self.bytes_in += bytes.len() as u64;
        Ok(())
    }

    pub fn add_file(&mut self, name: &str, src: &Path, executable: bool) -> Result<()> {
        let mut file = File::open(src).with_context(|| format!("open {}", src.display()))?;
        self.start(name, if executable { 0o755 } else { 0o644 })?;
        self.bytes_in += io::copy(&mut file, &mut self.zip).with_context(|| format!("copying {}", src.display()))?;
        Ok(())
    }

    /// Adds every file below `root` under `prefix`, in file name order.
    /// Returns the number of files written.
    pub fn add_tree(&mut self, prefix: &str, root: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(root)?;
            let name = format!("{}/{}", prefix, slash_path(rel));
            self.add_file(&name, entry.path(), is_executable(entry.path()))?;
            count += 1;
        }
        Ok(count)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn finish(self) -> Result<(W, Vec<String>)> {
        let inner = self.zip.finish().context("finishing archive")?;
        Ok((inner, self.entries.into_iter().collect()))
    }
}

/// Archive entry names always use `/`.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().map(|m| m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}
