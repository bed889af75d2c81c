//! Job descriptions: which registered classes make up each job and where it
//! reads and writes. Read from TOML before any job runs.
//!
//! ```toml
//! [[job]]
//! name = "word_count"
//! mapper = "word_count.mapper"
//! reducer = "word_count.reducer"
//! combiner = "word_count.reducer"
//! input = "alice"
//!
//! [job.config]
//! min_length = "1"
//! ```

use crate::registry::JobRegistry;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub name: String,
    pub mapper: String,
    pub reducer: String,
    #[serde(default)]
    pub combiner: Option<String>,
    #[serde(default)]
    pub partitioner: Option<String>,
    #[serde(default)]
    pub grouping_comparator: Option<String>,
    #[serde(default)]
    pub sort_comparator: Option<String>,
    /// Relative to the runner's input path; the whole input path if unset.
    #[serde(default)]
    pub input: Option<PathBuf>,
    /// Relative to the runner's output path; the job name if unset.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub num_reducers: Option<usize>,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl JobSpec {
    pub fn input_path(&self, input: &Path) -> PathBuf {
        match &self.input {
            Some(p) => input.join(p),
            None => input.to_path_buf(),
        }
    }

    pub fn output_path(&self, output: &Path) -> PathBuf {
        match &self.output {
            Some(p) => output.join(p),
            None => output.join(&self.name),
        }
    }

    /// Fails on the first class name the registry does not know.
    pub fn validate(&self, registry: &JobRegistry) -> Result<()> {
        registry.mapper(&self.mapper)?;
        registry.reducer(&self.reducer)?;
        if let Some(c) = &self.combiner {
            registry.reducer(c)?;
        }
        if let Some(p) = &self.partitioner {
            registry.partitioner(p)?;
        }
        for c in [&self.grouping_comparator, &self.sort_comparator].into_iter().flatten() {
            registry.comparator(c)?;
        }
        if self.num_reducers == Some(0) {
            bail!("job {} asks for zero reducers", self.name);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct JobDescription {
    #[serde(rename = "job")]
    pub jobs: Vec<JobSpec>,
}

impl JobDescription {
    pub fn parse(text: &str) -> Result<Self> {
        let desc: JobDescription = toml::from_str(text).context("parsing job description")?;
        if desc.jobs.is_empty() {
            bail!("job description defines no jobs");
        }
        let mut seen = HashSet::new();
        for job in &desc.jobs {
            if !seen.insert(job.name.as_str()) {
                bail!("job name {} is used twice", job.name);
            }
        }
        Ok(desc)
    }

    /// Loads `<reference>.toml` under `root`, or `reference` itself when it
    /// already names a file.
    pub fn load(root: &Path, reference: &str) -> Result<Self> {
        let direct = root.join(reference);
        let path = if direct.is_file() { direct } else { root.join(format!("{}.toml", reference)) };
        let text = fs::read_to_string(&path).with_context(|| format!("reading job description {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self, registry: &JobRegistry) -> Result<()> {
        for job in &self.jobs {
            job.validate(registry).with_context(|| format!("job {}", job.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = r#"
        [[job]]
        name = "word_count"
        mapper = "wc.mapper"
        reducer = "wc.reducer"
        combiner = "wc.reducer"

        [job.config]
        lowercase = "true"

        [[job]]
        name = "uniques"
        mapper = "u.mapper"
        reducer = "u.reducer"
        partitioner = "u.partitioner"
        grouping_comparator = "u.grouping"
        input = "words"
        output = "distinct"
        num_reducers = 2
    "#;

    #[test]
    fn parses_jobs_in_order_and_resolves_paths() {
        let desc = JobDescription::parse(TEXT).unwrap();
        assert_eq!(desc.jobs.len(), 2);
        let wc = &desc.jobs[0];
        assert_eq!(wc.config.get("lowercase").map(String::as_str), Some("true"));
        assert_eq!(wc.input_path(Path::new("in")), PathBuf::from("in"));
        assert_eq!(wc.output_path(Path::new("out")), PathBuf::from("out/word_count"));
        let u = &desc.jobs[1];
        assert_eq!(u.input_path(Path::new("in")), PathBuf::from("in/words"));
        assert_eq!(u.output_path(Path::new("out")), PathBuf::from("out/distinct"));
        assert_eq!(u.num_reducers, Some(2));
    }

    #[test]
    fn rejects_empty_duplicate_and_unknown_fields() {
        assert!(JobDescription::parse("").is_err());
        assert!(JobDescription::parse("[[job]]\nname='a'\nmapper='m'\nreducer='r'\n[[job]]\nname='a'\nmapper='m'\nreducer='r'\n").is_err());
        assert!(JobDescription::parse("[[job]]\nname='a'\nmapper='m'\nreducer='r'\nreduser='x'\n").is_err());
    }

    #[test]
    fn load_accepts_a_bare_reference_or_a_file_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test_project.toml"), TEXT).unwrap();
        assert_eq!(JobDescription::load(dir.path(), "test_project").unwrap().jobs.len(), 2);
        assert_eq!(JobDescription::load(dir.path(), "test_project.toml").unwrap().jobs.len(), 2);
        assert!(JobDescription::load(dir.path(), "missing").is_err());
    }
}
