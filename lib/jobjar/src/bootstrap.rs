//! The bootstrap script: an ordered list of load-path directives written at
//! packaging time and read exactly once when the runner starts.
//!
//! ```text
//! # generated by jobjar 0.3.0
//! load_path gems/jobjar-0.3.0/lib
//! load_path gems/paint-2.0.1/lib
//! ```
//!
//! After startup the directives live in an immutable [`LoadPath`] that is
//! handed to every task; nothing reads or mutates search-path state later.

use crate::constants::{BOOTSTRAP_PATH, SUPPORT_LIBRARY_VERSION};
use crate::error::JobjarError;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const DIRECTIVE: &str = "load_path";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootstrapScript {
    entries: Vec<String>,
}

impl BootstrapScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a directive. Order is preserved; duplicates are ignored so
    /// every directory appears exactly once.
    pub fn push(&mut self, dir: impl Into<String>) {
        let dir = dir.into();
        if !self.entries.contains(&dir) {
            self.entries.push(dir);
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn render(&self) -> String {
        let mut out = format!("# generated by jobjar {}\n", SUPPORT_LIBRARY_VERSION);
        for e in &self.entries {
            out.push_str(DIRECTIVE);
            out.push(' ');
            out.push_str(e);
            out.push('\n');
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut script = BootstrapScript::new();
        for (_, dir) in directives(text)? {
            script.push(dir);
        }
        Ok(script)
    }
}

/// Directives with their 1-based line numbers in `text`. Comments and blank
/// lines are skipped but still counted.
fn directives(text: &str) -> Result<Vec<(usize, String)>> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let dir = line
            .strip_prefix(DIRECTIVE)
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .ok_or_else(|| JobjarError::MalformedBootstrap { line: idx + 1, text: raw.to_string() })?;
        out.push((idx + 1, dir.to_string()));
    }
    Ok(out)
}

/// Library directories made available to job logic, in directive order.
#[derive(Clone, Debug, Default)]
pub struct LoadPath {
    dirs: Vec<PathBuf>,
}

impl LoadPath {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads the bootstrap script under `root` and checks that every
    /// directory it names was actually embedded.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(BOOTSTRAP_PATH);
        let text = fs::read_to_string(&path).with_context(|| format!("reading bootstrap script {}", path.display()))?;
        let mut dirs: Vec<PathBuf> = Vec::new();
        for (line, entry) in directives(&text)? {
            let dir = root.join(&entry);
            if !dir.is_dir() {
                return Err(JobjarError::Bootstrap { line, path: entry }.into());
            }
            if dirs.contains(&dir) {
                continue;
            }
            debug!(dir = %dir.display(), "load path entry");
            dirs.push(dir);
        }
        Ok(Self { dirs })
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First file named `relative` in any load-path directory.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Option<PathBuf> {
        self.dirs.iter().map(|d| d.join(relative.as_ref())).find(|p| p.is_file())
    }
}
