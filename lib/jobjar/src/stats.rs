use crate::context::Counters;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// What one task reported back after its successful attempt.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TaskStats {
    pub task: usize,
    pub attempts: usize,
    pub records_in: u64,
    pub records_out: u64,
    pub bytes_out: u64,
    pub flushes: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct PhaseStats {
    pub tasks: usize,
    pub attempts: usize,
    pub total_records_in: u64,
    pub total_records_out: u64,
    pub total_bytes_out: u64,
    pub total_flushes: u64,
    pub min_task_ms: u64,
    pub max_task_ms: u64,
    pub wall_ms: u64,
}

impl PhaseStats {
    pub fn from_tasks(per_task: &[TaskStats], wall_ms: u64) -> Self {
        Self {
            tasks: per_task.len(),
            attempts: per_task.iter().map(|t| t.attempts).sum(),
            total_records_in: per_task.iter().map(|t| t.records_in).sum(),
            total_records_out: per_task.iter().map(|t| t.records_out).sum(),
            total_bytes_out: per_task.iter().map(|t| t.bytes_out).sum(),
            total_flushes: per_task.iter().map(|t| t.flushes).sum(),
            min_task_ms: per_task.iter().map(|t| t.wall_ms).min().unwrap_or(0),
            max_task_ms: per_task.iter().map(|t| t.wall_ms).max().unwrap_or(0),
            wall_ms,
        }
    }

    pub fn log(&self, phase: &'static str) {
        info!(
            phase,
            tasks = self.tasks,
            attempts = self.attempts,
            total_records_in = self.total_records_in,
            total_records_out = self.total_records_out,
            total_bytes_out = self.total_bytes_out,
            total_flushes = self.total_flushes,
            min_task_ms = self.min_task_ms,
            max_task_ms = self.max_task_ms,
            wall_ms = self.wall_ms,
            "{} phase complete",
            phase
        );
    }
}

/// Result of one submitted job.
#[derive(Clone, Debug, Serialize)]
pub struct JobReport {
    pub job_name: String,
    pub job_id: String,
    pub output: PathBuf,
    pub counters: Counters,
    pub map: PhaseStats,
    pub reduce: PhaseStats,
    pub wall_ms: u64,
}

impl JobReport {
    pub fn counter(&self, group: &str, name: &str) -> u64 {
        self.counters.get(group, name)
    }

    /// One `<group>.<name>=<value>` line per counter.
    pub fn counter_lines(&self) -> Vec<String> {
        self.counters.iter().map(|(g, n, v)| format!("{}.{}={}", g, n, v)).collect()
    }

    pub fn log_counters(&self) {
        for line in self.counter_lines() {
            info!(job = %self.job_name, "{}", line);
        }
    }
}
