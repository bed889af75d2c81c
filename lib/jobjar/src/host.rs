//! Interfaces the host execution engine drives. Their shape is fixed: the
//! engine instantiates one mapper/reducer/combiner per task attempt and calls
//! `run`, which owns the setup, process, cleanup ordering.

use crate::context::TaskContext;
use crate::writable::Writable;
use anyhow::Result;
use std::cmp::Ordering;
use tracing::error;

pub type Record = (Writable, Writable);

pub trait OutputCollector {
    fn collect(&mut self, key: Writable, value: Writable) -> Result<()>;
}

impl OutputCollector for Vec<Record> {
    fn collect(&mut self, key: Writable, value: Writable) -> Result<()> {
        self.push((key, value));
        Ok(())
    }
}

pub trait Mapper: Send {
    fn setup(&mut self, ctx: &mut TaskContext) -> Result<()>;
    fn map(&mut self, key: Writable, value: Writable, out: &mut dyn OutputCollector, ctx: &mut TaskContext) -> Result<()>;
    fn cleanup(&mut self, ctx: &mut TaskContext) -> Result<()>;

    /// Setup once, every record in order, then cleanup even when a record or
    /// the input itself failed. The first error wins.
    fn run(
        &mut self,
        input: &mut dyn Iterator<Item = Result<Record>>,
        out: &mut dyn OutputCollector,
        ctx: &mut TaskContext,
    ) -> Result<()> {
        self.setup(ctx)?;
        let mut outcome = Ok(());
        for record in input {
            let step = record.and_then(|(k, v)| self.map(k, v, out, ctx));
            if let Err(e) = step {
                outcome = Err(e);
                break;
            }
        }
        finish(outcome, self.cleanup(ctx))
    }
}

pub trait Reducer: Send {
    fn setup(&mut self, ctx: &mut TaskContext) -> Result<()>;
    fn reduce(&mut self, key: Writable, values: Vec<Writable>, out: &mut dyn OutputCollector, ctx: &mut TaskContext) -> Result<()>;
    fn cleanup(&mut self, ctx: &mut TaskContext) -> Result<()>;

    fn run(
        &mut self,
        groups: &mut dyn Iterator<Item = (Writable, Vec<Writable>)>,
        out: &mut dyn OutputCollector,
        ctx: &mut TaskContext,
    ) -> Result<()> {
        self.setup(ctx)?;
        let mut outcome = Ok(());
        for (key, values) in groups {
            if let Err(e) = self.reduce(key, values, out, ctx) {
                outcome = Err(e);
                break;
            }
        }
        finish(outcome, self.cleanup(ctx))
    }
}

pub trait Partitioner: Send {
    fn partition(&mut self, key: &Writable, value: &Writable, num_partitions: usize) -> Result<usize>;
}

pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &Writable, b: &Writable) -> Result<Ordering>;
}

fn finish(outcome: Result<()>, cleanup: Result<()>) -> Result<()> {
    match (outcome, cleanup) {
        (Ok(()), cleanup) => cleanup,
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_err)) => {
            error!("cleanup after failed task also failed: {:#}", cleanup_err);
            Err(e)
        }
    }
}

/// Default partitioner: stable hash of the whole key.
#[derive(Default)]
pub struct HashPartitioner;

impl Partitioner for HashPartitioner {
    fn partition(&mut self, key: &Writable, _value: &Writable, num_partitions: usize) -> Result<usize> {
        let mut hasher = fnv::FnvHasher::default();
        std::hash::Hasher::write(&mut hasher, &bincode::serialize(key)?);
        let hash = std::hash::Hasher::finish(&hasher) & 0x7fff_ffff;
        Ok(hash as usize % num_partitions.max(1))
    }
}

/// Default sort and grouping order: the natural order of the key.
#[derive(Default, Clone, Copy)]
pub struct NaturalComparator;

impl KeyComparator for NaturalComparator {
    fn compare(&self, a: &Writable, b: &Writable) -> Result<Ordering> {
        Ok(a.cmp(b))
    }
}
