use crate::constants::{BOOTSTRAP_PATH, ENTRY_POINT_PATH, SUPPORT_LIBRARY_NAME, SUPPORT_LIBRARY_VERSION};
use serde::{Deserialize, Serialize};

/// Describes a packaged artifact. Collected while the archive is written and
/// serialised once at the end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub entry_point: String,
    pub project: String,
    pub created_by: String,
    pub runtime_version: String,
    pub runtime_archive: String,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub extra_archives: Vec<String>,
    pub bootstrap: String,
}

impl ArtifactManifest {
    pub fn new(project: impl Into<String>, runtime_version: impl Into<String>, runtime_archive: impl Into<String>) -> Self {
        Self {
            entry_point: ENTRY_POINT_PATH.to_string(),
            project: project.into(),
            created_by: format!("{} {}", SUPPORT_LIBRARY_NAME, SUPPORT_LIBRARY_VERSION),
            runtime_version: runtime_version.into(),
            runtime_archive: runtime_archive.into(),
            libraries: Vec::new(),
            extra_archives: Vec::new(),
            bootstrap: BOOTSTRAP_PATH.to_string(),
        }
    }

    pub fn add_library(&mut self, identity: impl Into<String>) {
        self.libraries.push(identity.into());
    }

    pub fn add_extra_archive(&mut self, file_name: impl Into<String>) {
        self.extra_archives.push(file_name.into());
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Identifies the support runtime an artifact was built against. The runner
/// compares it with its own version at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportDescriptor {
    pub name: String,
    pub version: String,
    pub entry_point: String,
}

impl SupportDescriptor {
    pub fn current() -> Self {
        Self {
            name: SUPPORT_LIBRARY_NAME.to_string(),
            version: SUPPORT_LIBRARY_VERSION.to_string(),
            entry_point: ENTRY_POINT_PATH.to_string(),
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
