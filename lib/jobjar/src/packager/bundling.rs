//! Which libraries a given runtime version already ships natively. Those are
//! left out of the artifact so two copies never end up on the load path.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A dotted numeric version such as `1.7.5` or `9.4.5.0`. Missing trailing
/// components compare as zero, so `1.7` equals `1.7.0`.
#[derive(Clone, Debug)]
pub struct RuntimeVersion {
    parts: Vec<u64>,
}

impl RuntimeVersion {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            bail!("empty runtime version");
        }
        let parts = text
            .split('.')
            .map(|p| p.parse::<u64>().with_context(|| format!("runtime version {:?}: {:?} is not numeric", text, p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { parts })
    }

    fn component(&self, idx: usize) -> u64 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl Ord for RuntimeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let n = self.parts.len().max(other.parts.len());
        (0..n)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for RuntimeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RuntimeVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RuntimeVersion {}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

/// One row of the table, as written in the project file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BundlingEntry {
    pub library: String,
    pub bundled_since: String,
}

#[derive(Clone, Debug)]
pub struct NativeBundlingTable {
    entries: Vec<(String, RuntimeVersion)>,
}

impl Default for NativeBundlingTable {
    fn default() -> Self {
        let since = RuntimeVersion { parts: vec![1, 7, 5] };
        Self {
            entries: vec![("json".to_string(), since.clone()), ("jruby-openssl".to_string(), since)],
        }
    }
}

impl NativeBundlingTable {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn from_entries(entries: &[BundlingEntry]) -> Result<Self> {
        let entries = entries
            .iter()
            .map(|e| {
                let since = RuntimeVersion::parse(&e.bundled_since)
                    .with_context(|| format!("bundling entry for {}", e.library))?;
                Ok((e.library.clone(), since))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Only exact names in the table count; anything else is embedded.
    pub fn is_natively_bundled(&self, library: &str, runtime: &RuntimeVersion) -> bool {
        self.entries
            .iter()
            .any(|(name, since)| name == library && runtime >= since)
    }
}
