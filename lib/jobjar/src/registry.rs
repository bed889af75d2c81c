//! Named job-logic classes.
//!
//! A job description refers to its mapper, reducer and friends by name. A
//! project binary registers every class it provides before handing control
//! to the runner, and the runner resolves names through this registry.

use crate::api::{CompareLogic, MapLogic, PartitionLogic, ReduceLogic};
use crate::error::JobjarError;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type MapFactory = Arc<dyn Fn() -> Result<Box<dyn MapLogic>> + Send + Sync>;
pub type ReduceFactory = Arc<dyn Fn() -> Result<Box<dyn ReduceLogic>> + Send + Sync>;
pub type PartitionFactory = Arc<dyn Fn() -> Result<Box<dyn PartitionLogic>> + Send + Sync>;
pub type CompareFactory = Arc<dyn Fn() -> Result<Box<dyn CompareLogic>> + Send + Sync>;

#[derive(Default, Clone)]
pub struct JobRegistry {
    mappers: BTreeMap<String, MapFactory>,
    reducers: BTreeMap<String, ReduceFactory>,
    partitioners: BTreeMap<String, PartitionFactory>,
    comparators: BTreeMap<String, CompareFactory>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_mapper<L, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        L: MapLogic + 'static,
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.mappers
            .insert(name.to_string(), Arc::new(move || Ok::<Box<dyn MapLogic>, anyhow::Error>(Box::new(factory()))));
        self
    }

    /// Registers a reducer. The same class can serve as a combiner.
    pub fn register_reducer<L, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        L: ReduceLogic + 'static,
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.reducers
            .insert(name.to_string(), Arc::new(move || Ok::<Box<dyn ReduceLogic>, anyhow::Error>(Box::new(factory()))));
        self
    }

    pub fn register_partitioner<L, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        L: PartitionLogic + 'static,
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.partitioners
            .insert(name.to_string(), Arc::new(move || Ok::<Box<dyn PartitionLogic>, anyhow::Error>(Box::new(factory()))));
        self
    }

    pub fn register_comparator<L, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        L: CompareLogic + 'static,
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.comparators
            .insert(name.to_string(), Arc::new(move || Ok::<Box<dyn CompareLogic>, anyhow::Error>(Box::new(factory()))));
        self
    }

    /// Registers a fallible mapper factory, for logic whose construction can fail.
    pub fn register_mapper_factory(&mut self, name: &str, factory: MapFactory) -> &mut Self {
        self.mappers.insert(name.to_string(), factory);
        self
    }

    pub fn register_reducer_factory(&mut self, name: &str, factory: ReduceFactory) -> &mut Self {
        self.reducers.insert(name.to_string(), factory);
        self
    }

    pub fn mapper(&self, name: &str) -> Result<MapFactory> {
        lookup(&self.mappers, "mapper", name)
    }

    pub fn reducer(&self, name: &str) -> Result<ReduceFactory> {
        lookup(&self.reducers, "reducer", name)
    }

    pub fn partitioner(&self, name: &str) -> Result<PartitionFactory> {
        lookup(&self.partitioners, "partitioner", name)
    }

    pub fn comparator(&self, name: &str) -> Result<CompareFactory> {
        lookup(&self.comparators, "comparator", name)
    }
}

fn lookup<F: Clone>(map: &BTreeMap<String, F>, kind: &'static str, name: &str) -> Result<F> {
    map.get(name)
        .cloned()
        .ok_or_else(|| JobjarError::UnknownClass { kind, name: name.to_string() }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Emitter, ProjectionComparator};
    use crate::context::TaskContext;
    use crate::value::Value;

    struct Nop;
    impl MapLogic for Nop {
        fn map(&mut self, _k: Value, _v: Value, _out: &mut dyn Emitter, _ctx: &mut TaskContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn resolves_registered_names_only() {
        let mut registry = JobRegistry::new();
        registry
            .register_mapper("nop", || Nop)
            .register_comparator("first", || ProjectionComparator::new(1));
        assert!(registry.mapper("nop").is_ok());
        assert!(registry.comparator("first").is_ok());

        let err = registry.reducer("nop").err().unwrap();
        assert!(matches!(
            err.downcast_ref::<JobjarError>(),
            Some(JobjarError::UnknownClass { kind: "reducer", .. })
        ));
    }
}
