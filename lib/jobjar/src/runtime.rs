//! Local host engine. Runs a submitted job on one machine with the same
//! contract a cluster gives the proxies: one fresh mapper/reducer/combiner
//! per task attempt, records sorted and grouped between map and reduce, and
//! failed attempts retried from scratch.
//!
//! Layout under the job's output directory while it runs:
//!
//! ```text
//! <output>/_temporary/map_out/map-00000-part-00000.bin   spills, one per (map task, partition)
//! <output>/_temporary/attempt_<job>_r_000000_0/           reduce attempt scratch
//! <output>/part-r-00000                                  committed reduce output
//! <output>/_SUCCESS
//! ```

use crate::bootstrap::LoadPath;
use crate::constants::{
    DEFAULT_FLUSH_BYTES, DEFAULT_MAX_ATTEMPTS, DEFAULT_NUM_REDUCERS, DEFAULT_WRITER_QUEUE_CAP, ENV_FLUSH_BYTES,
    ENV_KEEP_INTERMEDIATES, ENV_MAX_ATTEMPTS, ENV_NUM_REDUCERS, ENV_WRITER_QUEUE_CAP, FRAMEWORK_COUNTER_GROUP,
    SUCCESS_MARKER, TEMPORARY_DIR,
};
use crate::container::Role;
use crate::context::{Counters, TaskAttemptId, TaskContext, TaskKind};
use crate::error::JobjarError;
use crate::host::{HashPartitioner, KeyComparator, Mapper, NaturalComparator, OutputCollector, Partitioner, Reducer};
use crate::io::{ensure_dir, list_files_recursive, open_writer, read_bin_file, write_bin, write_text_line, TextRecords};
use crate::proxy::{CombinerProxy, ComparatorProxy, MapperProxy, PartitionerProxy, ReducerProxy};
use crate::registry::{CompareFactory, MapFactory, PartitionFactory, ReduceFactory};
use crate::sort::{group_sorted, sort_by_key, sort_map_output};
use crate::stats::{JobReport, PhaseStats, TaskStats};
use crate::utils::{env_usize, env_var_truthy, local_job_id, local_threads};
use crate::writable::Writable;
use crate::writer::{spill_glob, WriterPool};
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const LOCAL_BATCH_BYTES: usize = 256 * 1024;

type Partitioned = (usize, Writable, Writable);

/// Everything the engine needs to run one job.
#[derive(Clone)]
pub struct JobSubmission {
    pub name: String,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub num_reducers: Option<usize>,
    pub mapper: MapFactory,
    pub reducer: ReduceFactory,
    pub combiner: Option<ReduceFactory>,
    pub partitioner: Option<PartitionFactory>,
    pub sort_comparator: Option<CompareFactory>,
    pub grouping_comparator: Option<CompareFactory>,
    pub config: Arc<BTreeMap<String, String>>,
}

impl JobSubmission {
    pub fn new(name: impl Into<String>, mapper: MapFactory, reducer: ReduceFactory) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            output: PathBuf::new(),
            num_reducers: None,
            mapper,
            reducer,
            combiner: None,
            partitioner: None,
            sort_comparator: None,
            grouping_comparator: None,
            config: Arc::new(BTreeMap::new()),
        }
    }

    pub fn add_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }
}

/// Single-machine host. Tuning comes from the environment unless set
/// explicitly.
pub struct LocalCluster {
    load_path: Arc<LoadPath>,
    max_attempts: usize,
    threads: usize,
    default_reducers: usize,
    flush_bytes: usize,
    queue_cap: usize,
    keep_intermediates: bool,
}

impl LocalCluster {
    pub fn new(load_path: Arc<LoadPath>) -> Self {
        Self {
            load_path,
            max_attempts: env_usize(ENV_MAX_ATTEMPTS).unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
            threads: local_threads(),
            default_reducers: env_usize(ENV_NUM_REDUCERS).unwrap_or(DEFAULT_NUM_REDUCERS).max(1),
            flush_bytes: env_usize(ENV_FLUSH_BYTES).unwrap_or(DEFAULT_FLUSH_BYTES).max(1),
            queue_cap: env_usize(ENV_WRITER_QUEUE_CAP).unwrap_or(DEFAULT_WRITER_QUEUE_CAP).max(1),
            keep_intermediates: env_var_truthy(ENV_KEEP_INTERMEDIATES),
        }
    }

    pub fn with_max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.threads = n.max(1);
        self
    }

    pub fn with_keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    pub fn submit(&self, job: JobSubmission) -> Result<JobReport> {
        let start = Instant::now();
        let job_id = local_job_id();
        let num_reducers = job.num_reducers.unwrap_or(self.default_reducers).max(1);
        let output = job.output.clone();
        if output.as_os_str().is_empty() {
            return Err(anyhow!("job {} has no output path", job.name));
        }

        let mut files = Vec::new();
        for input in &job.inputs {
            if input.is_file() {
                files.push(input.clone());
            } else if input.is_dir() {
                files.extend(list_files_recursive(input)?);
            } else {
                return Err(anyhow!("input path {} does not exist", input.display()));
            }
        }

        if output.exists() {
            fs::remove_dir_all(&output).with_context(|| format!("clearing output {}", output.display()))?;
        }
        let temp = output.join(TEMPORARY_DIR);
        let spill_dir = temp.join("map_out");
        ensure_dir(&spill_dir)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .context("building task thread pool")?;
        info!(
            job = %job.name,
            job_id = %job_id,
            map_tasks = files.len(),
            num_reducers,
            threads = self.threads,
            max_attempts = self.max_attempts,
            "Starting map phase"
        );

        // Map phase
        let map_start = Instant::now();
        let (writer_pool, mut writer_joiner) = WriterPool::new(&spill_dir, num_reducers, self.flush_bytes, self.queue_cap)?;
        let map_results: Vec<Result<(TaskStats, Counters)>> = pool.install(|| {
            files
                .par_iter()
                .enumerate()
                .map(|(task, file)| self.run_map_task(&job, &job_id, task, file, num_reducers, &writer_pool))
                .collect()
        });
        writer_pool.close_all();
        let joined = writer_joiner.join_all();
        writer_pool.log_metrics();
        let mut counters = Counters::new();
        let mut map_stats = Vec::with_capacity(map_results.len());
        for res in map_results {
            let (stats, task_counters) = res?;
            counters.merge(&task_counters);
            map_stats.push(stats);
        }
        joined?;
        let map = PhaseStats::from_tasks(&map_stats, map_start.elapsed().as_millis() as u64);
        map.log("map");

        // Reduce phase
        let reduce_start = Instant::now();
        let reduce_results: Vec<Result<(TaskStats, Counters)>> = pool.install(|| {
            (0..num_reducers)
                .into_par_iter()
                .map(|r| self.run_reduce_task(&job, &job_id, r, &spill_dir, &temp, &output))
                .collect()
        });
        let mut reduce_stats = Vec::with_capacity(num_reducers);
        for res in reduce_results {
            let (stats, task_counters) = res?;
            counters.merge(&task_counters);
            reduce_stats.push(stats);
        }
        let reduce = PhaseStats::from_tasks(&reduce_stats, reduce_start.elapsed().as_millis() as u64);
        reduce.log("reduce");

        File::create(output.join(SUCCESS_MARKER)).context("writing success marker")?;
        if !self.keep_intermediates {
            fs::remove_dir_all(&temp).with_context(|| format!("removing {}", temp.display()))?;
        }

        let report = JobReport {
            job_name: job.name.clone(),
            job_id,
            output,
            counters,
            map,
            reduce,
            wall_ms: start.elapsed().as_millis() as u64,
        };
        info!(job = %report.job_name, wall_ms = report.wall_ms, "Job complete");
        Ok(report)
    }

    /// Runs `attempt` until it succeeds or the attempts are used up. Every
    /// call gets a new attempt id, so nothing carries over between attempts.
    fn with_retries<T>(
        &self,
        job_id: &str,
        kind: TaskKind,
        task: usize,
        mut attempt: impl FnMut(TaskAttemptId) -> Result<T>,
    ) -> Result<(T, usize)> {
        let mut last = None;
        for n in 0..self.max_attempts {
            let id = TaskAttemptId::new(job_id, kind, task, n);
            match attempt(id.clone()) {
                Ok(v) => return Ok((v, n + 1)),
                Err(e) => {
                    warn!(attempt = %id, error = %format!("{:#}", e), "task attempt failed");
                    last = Some(e);
                }
            }
        }
        let id = TaskAttemptId::new(job_id, kind, task, 0);
        Err(JobjarError::TaskFailed {
            task: id.task_name(),
            attempts: self.max_attempts,
            source: last.unwrap_or_else(|| anyhow!("no attempt was made")),
        }
        .into())
    }

    fn context(&self, job: &JobSubmission, id: TaskAttemptId) -> TaskContext {
        TaskContext::new(id, Arc::clone(&job.config), Arc::clone(&self.load_path))
    }

    fn run_map_task(
        &self,
        job: &JobSubmission,
        job_id: &str,
        task: usize,
        file: &Path,
        num_reducers: usize,
        writer_pool: &WriterPool,
    ) -> Result<(TaskStats, Counters)> {
        let task_start = Instant::now();
        debug!(task, file = %file.display(), "map task starting");
        let ((items, counters, records_in), attempts) =
            self.with_retries(job_id, TaskKind::Map, task, |id| self.map_attempt(job, id, file, num_reducers))?;

        // Only the successful attempt's output reaches the spill files.
        let mut writer = writer_pool.make_thread_writer(task, LOCAL_BATCH_BYTES);
        for (partition, key, value) in &items {
            write_bin(writer.buffer(*partition), key, value)?;
            writer.maybe_flush(*partition)?;
        }
        writer.flush_all()?;
        let (flushes, bytes_out) = writer.stats();
        Ok((
            TaskStats {
                task,
                attempts,
                records_in,
                records_out: items.len() as u64,
                bytes_out,
                flushes,
                wall_ms: task_start.elapsed().as_millis() as u64,
            },
            counters,
        ))
    }

    fn map_attempt(
        &self,
        job: &JobSubmission,
        id: TaskAttemptId,
        file: &Path,
        num_reducers: usize,
    ) -> Result<(Vec<Partitioned>, Counters, u64)> {
        let mut ctx = self.context(job, id);
        let mut mapper = MapperProxy::new(Arc::clone(&job.mapper));
        let mut collected: Vec<(Writable, Writable)> = Vec::new();
        let mut records_in = 0u64;
        {
            let mut input = TextRecords::open(file)?.inspect(|_| records_in += 1);
            mapper.run(&mut input, &mut collected, &mut ctx)?;
        }
        ctx.increment_counter(FRAMEWORK_COUNTER_GROUP, "MAP_INPUT_RECORDS", records_in);
        ctx.increment_counter(FRAMEWORK_COUNTER_GROUP, "MAP_OUTPUT_RECORDS", collected.len() as u64);

        let mut partitioner: Box<dyn Partitioner> = match &job.partitioner {
            Some(f) => Box::new(PartitionerProxy::new(Arc::clone(f))),
            None => Box::new(HashPartitioner),
        };
        let mut items = Vec::with_capacity(collected.len());
        for (key, value) in collected {
            let partition = partitioner.partition(&key, &value, num_reducers)?;
            items.push((partition, key, value));
        }
        let sort_cmp = comparator(Role::SortComparator, job.sort_comparator.as_ref())?;
        sort_map_output(&mut items, sort_cmp.as_ref())?;

        if let Some(combiner) = &job.combiner {
            if !items.is_empty() {
                items = self.combine(combiner, items, sort_cmp.as_ref(), &mut ctx)?;
            }
        }
        Ok((items, ctx.into_counters(), records_in))
    }

    /// Runs the combiner once over the whole sorted map output. Each group is
    /// consecutive keys of one partition that sort equal, and whatever the
    /// combiner emits stays in that partition.
    fn combine(
        &self,
        factory: &ReduceFactory,
        items: Vec<Partitioned>,
        cmp: &dyn KeyComparator,
        ctx: &mut TaskContext,
    ) -> Result<Vec<Partitioned>> {
        let combine_in = items.len() as u64;
        let mut groups: Vec<(usize, Writable, Vec<Writable>)> = Vec::new();
        for (partition, key, value) in items {
            match groups.last_mut() {
                Some((p, current, values)) if *p == partition && cmp.compare(current, &key)?.is_eq() => values.push(value),
                _ => groups.push((partition, key, vec![value])),
            }
        }

        let current = Cell::new(0usize);
        let mut out = TaggedCollector { partition: &current, records: Vec::new() };
        let mut input = groups.into_iter().map(|(p, key, values)| {
            current.set(p);
            (key, values)
        });
        let mut combiner = CombinerProxy::new(Arc::clone(factory));
        combiner.run(&mut input, &mut out, ctx)?;

        let mut combined = out.records;
        ctx.increment_counter(FRAMEWORK_COUNTER_GROUP, "COMBINE_INPUT_RECORDS", combine_in);
        ctx.increment_counter(FRAMEWORK_COUNTER_GROUP, "COMBINE_OUTPUT_RECORDS", combined.len() as u64);
        sort_map_output(&mut combined, cmp)?;
        Ok(combined)
    }

    fn run_reduce_task(
        &self,
        job: &JobSubmission,
        job_id: &str,
        partition: usize,
        spill_dir: &Path,
        temp: &Path,
        output: &Path,
    ) -> Result<(TaskStats, Counters)> {
        let task_start = Instant::now();
        let mut spills: Vec<PathBuf> = glob::glob(&spill_glob(spill_dir, partition))?.flatten().collect();
        spills.sort();
        debug!(partition, spills = spills.len(), "reduce task starting");

        let ((records_in, records_out, counters), attempts) =
            self.with_retries(job_id, TaskKind::Reduce, partition, |id| {
                let scratch = temp.join(id.to_string());
                let res = self.reduce_attempt(job, id, &spills, &scratch, partition, output);
                if res.is_err() {
                    let _ = fs::remove_dir_all(&scratch);
                }
                res
            })?;
        Ok((
            TaskStats {
                task: partition,
                attempts,
                records_in,
                records_out,
                wall_ms: task_start.elapsed().as_millis() as u64,
                ..Default::default()
            },
            counters,
        ))
    }

    fn reduce_attempt(
        &self,
        job: &JobSubmission,
        id: TaskAttemptId,
        spills: &[PathBuf],
        scratch: &Path,
        partition: usize,
        output: &Path,
    ) -> Result<(u64, u64, Counters)> {
        let mut records = Vec::new();
        for spill in spills {
            records.extend(read_bin_file(spill)?);
        }
        let records_in = records.len() as u64;

        let sort_cmp = comparator(Role::SortComparator, job.sort_comparator.as_ref())?;
        sort_by_key(&mut records, |r| &r.0, sort_cmp.as_ref())?;
        let groups = match &job.grouping_comparator {
            Some(f) => group_sorted(records, &ComparatorProxy::new(Role::GroupingComparator, f)?)?,
            None => group_sorted(records, sort_cmp.as_ref())?,
        };

        let mut ctx = self.context(job, id);
        ctx.increment_counter(FRAMEWORK_COUNTER_GROUP, "REDUCE_INPUT_GROUPS", groups.len() as u64);
        ctx.increment_counter(FRAMEWORK_COUNTER_GROUP, "REDUCE_INPUT_RECORDS", records_in);

        let part_name = format!("part-r-{:05}", partition);
        let scratch_file = scratch.join(&part_name);
        let mut out = TextOutput { writer: open_writer(&scratch_file)?, records: 0 };
        let mut reducer = ReducerProxy::new(Arc::clone(&job.reducer));
        reducer.run(&mut groups.into_iter(), &mut out, &mut ctx)?;
        out.writer.flush().with_context(|| format!("flushing {}", scratch_file.display()))?;
        drop(out.writer);

        let final_path = output.join(&part_name);
        fs::rename(&scratch_file, &final_path)
            .with_context(|| format!("committing {} to {}", scratch_file.display(), final_path.display()))?;
        ctx.increment_counter(FRAMEWORK_COUNTER_GROUP, "REDUCE_OUTPUT_RECORDS", out.records);
        Ok((records_in, out.records, ctx.into_counters()))
    }
}

fn comparator(role: Role, factory: Option<&CompareFactory>) -> Result<Box<dyn KeyComparator>> {
    Ok(match factory {
        Some(f) => Box::new(ComparatorProxy::new(role, f)?),
        None => Box::new(NaturalComparator),
    })
}

struct TaggedCollector<'a> {
    partition: &'a Cell<usize>,
    records: Vec<Partitioned>,
}

impl OutputCollector for TaggedCollector<'_> {
    fn collect(&mut self, key: Writable, value: Writable) -> Result<()> {
        self.records.push((self.partition.get(), key, value));
        Ok(())
    }
}

struct TextOutput {
    writer: BufWriter<File>,
    records: u64,
}

impl OutputCollector for TextOutput {
    fn collect(&mut self, key: Writable, value: Writable) -> Result<()> {
        write_text_line(&mut self.writer, &key, &value)?;
        self.records += 1;
        Ok(())
    }
}
