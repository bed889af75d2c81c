use crate::bootstrap::LoadPath;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TaskKind {
    Map,
    Reduce,
}

/// Identifies one scheduled execution of a task.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TaskAttemptId {
    pub job_id: String,
    pub kind: TaskKind,
    pub task: usize,
    pub attempt: usize,
}

impl TaskAttemptId {
    pub fn new(job_id: impl Into<String>, kind: TaskKind, task: usize, attempt: usize) -> Self {
        Self { job_id: job_id.into(), kind, task, attempt }
    }

    /// Task identity without the attempt number.
    pub fn task_name(&self) -> String {
        format!("task_{}_{}_{:06}", self.job_id, self.kind_letter(), self.task)
    }

    fn kind_letter(&self) -> char {
        match self.kind {
            TaskKind::Map => 'm',
            TaskKind::Reduce => 'r',
        }
    }
}

impl fmt::Display for TaskAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt_{}_{}_{:06}_{}", self.job_id, self.kind_letter(), self.task, self.attempt)
    }
}

/// Named counters, grouped. Merged across successful task attempts.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Counters {
    groups: BTreeMap<String, BTreeMap<String, u64>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, group: &str, name: &str, amount: u64) {
        *self
            .groups
            .entry(group.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert(0) += amount;
    }

    pub fn get(&self, group: &str, name: &str) -> u64 {
        self.groups.get(group).and_then(|g| g.get(name)).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &Counters) {
        for (group, names) in &other.groups {
            for (name, value) in names {
                self.increment(group, name, *value);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, u64)> {
        self.groups
            .iter()
            .flat_map(|(g, names)| names.iter().map(move |(n, v)| (g.as_str(), n.as_str(), *v)))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Everything a hook can see about the attempt it runs in.
pub struct TaskContext {
    attempt: TaskAttemptId,
    config: Arc<BTreeMap<String, String>>,
    load_path: Arc<LoadPath>,
    counters: Counters,
}

impl TaskContext {
    pub fn new(attempt: TaskAttemptId, config: Arc<BTreeMap<String, String>>, load_path: Arc<LoadPath>) -> Self {
        Self { attempt, config, load_path, counters: Counters::new() }
    }

    pub fn attempt(&self) -> &TaskAttemptId {
        &self.attempt
    }

    /// Job-level parameter from the job description's `config` table.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    pub fn load_path(&self) -> &LoadPath {
        &self.load_path
    }

    pub fn increment_counter(&mut self, group: &str, name: &str, amount: u64) {
        self.counters.increment(group, name, amount);
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn into_counters(self) -> Counters {
        self.counters
    }
}
