//! Entry point that the packaged artifact starts. A project binary registers
//! its job logic and hands over to [`main`]:
//!
//! ```no_run
//! use jobjar::{runner, JobRegistry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut registry = JobRegistry::new();
//!     // registry.register_mapper("word_count.mapper", WordCountMapper::default); ...
//!     runner::main(registry)
//! }
//! ```

use crate::bootstrap::LoadPath;
use crate::constants::{ENV_ARTIFACT_ROOT, SUPPORT_DESCRIPTOR, SUPPORT_LIBRARY_VERSION};
use crate::job::{JobDescription, JobSpec};
use crate::packager::SupportDescriptor;
use crate::registry::JobRegistry;
use crate::runtime::{JobSubmission, LocalCluster};
use crate::stats::JobReport;
use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Runs the jobs of a job description over an input path")]
struct Args {
    /// Job description, `<name>` or `<name>.toml` at the artifact root
    reference: String,
    /// Input path
    input: PathBuf,
    /// Output path; each job writes below it
    output: PathBuf,
}

pub struct JobRunner {
    registry: JobRegistry,
    root: PathBuf,
    max_attempts: Option<usize>,
    threads: Option<usize>,
}

impl JobRunner {
    /// The artifact root comes from `JOBJAR_ARTIFACT_ROOT`, or the current
    /// directory.
    pub fn new(registry: JobRegistry) -> Self {
        let root = std::env::var_os(ENV_ARTIFACT_ROOT).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        Self { registry, root, max_attempts: None, threads: None }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = Some(n);
        self
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.threads = Some(n);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bootstraps the load path, checks every class the description names,
    /// then runs the jobs in order. A failing job stops the run.
    pub fn run(&self, reference: &str, input: &Path, output: &Path) -> Result<Vec<JobReport>> {
        let load_path = Arc::new(LoadPath::load(&self.root).context("bootstrapping load path")?);
        check_support_version(&load_path);
        let description = JobDescription::load(&self.root, reference)?;
        description.validate(&self.registry)?;

        let mut cluster = LocalCluster::new(load_path);
        if let Some(n) = self.max_attempts {
            cluster = cluster.with_max_attempts(n);
        }
        if let Some(n) = self.threads {
            cluster = cluster.with_threads(n);
        }

        let mut reports = Vec::with_capacity(description.jobs.len());
        for spec in &description.jobs {
            let submission = self.submission(spec, input, output)?;
            info!(job = %spec.name, input = %submission.inputs[0].display(), output = %submission.output.display(), "Submitting job");
            let report = cluster.submit(submission).with_context(|| format!("job {} failed", spec.name))?;
            report.log_counters();
            reports.push(report);
        }
        Ok(reports)
    }

    fn submission(&self, spec: &JobSpec, input: &Path, output: &Path) -> Result<JobSubmission> {
        let r = &self.registry;
        let mut sub = JobSubmission::new(&spec.name, r.mapper(&spec.mapper)?, r.reducer(&spec.reducer)?)
            .add_input(spec.input_path(input))
            .with_output(spec.output_path(output));
        sub.num_reducers = spec.num_reducers;
        sub.combiner = spec.combiner.as_deref().map(|c| r.reducer(c)).transpose()?;
        sub.partitioner = spec.partitioner.as_deref().map(|p| r.partitioner(p)).transpose()?;
        sub.sort_comparator = spec.sort_comparator.as_deref().map(|c| r.comparator(c)).transpose()?;
        sub.grouping_comparator = spec.grouping_comparator.as_deref().map(|c| r.comparator(c)).transpose()?;
        sub.config = Arc::new(spec.config.clone());
        Ok(sub)
    }
}

fn check_support_version(load_path: &LoadPath) {
    let Some(path) = load_path.resolve(SUPPORT_DESCRIPTOR) else {
        debug!("no support descriptor on the load path");
        return;
    };
    match fs::read_to_string(&path).map_err(anyhow::Error::from).and_then(|t| Ok(SupportDescriptor::from_toml(&t)?)) {
        Ok(d) if d.version != SUPPORT_LIBRARY_VERSION => {
            warn!(packaged = %d.version, running = SUPPORT_LIBRARY_VERSION, "artifact was packaged for a different jobjar version")
        }
        Ok(_) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "unreadable support descriptor"),
    }
}

/// Process entry for project binaries: `<job-description> <input> <output>`.
pub fn main(registry: JobRegistry) -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
    let args = Args::parse();
    let reports = JobRunner::new(registry).run(&args.reference, &args.input, &args.output)?;
    info!(jobs = reports.len(), "All jobs complete");
    Ok(())
}
