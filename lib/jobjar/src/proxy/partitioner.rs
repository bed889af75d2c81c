use super::hook_error;
use crate::codec;
use crate::container::{InstanceContainer, Role};
use crate::error::JobjarError;
use crate::host::Partitioner;
use crate::registry::PartitionFactory;
use crate::writable::Writable;
use anyhow::{Context, Result};

/// Delegates partitioning to job logic. Whatever the logic returns is
/// checked against `[0, num_partitions)` before the host sees it.
pub struct PartitionerProxy {
    factory: PartitionFactory,
    container: InstanceContainer,
}

impl PartitionerProxy {
    pub fn new(factory: PartitionFactory) -> Self {
        Self { factory, container: InstanceContainer::new() }
    }
}

impl Partitioner for PartitionerProxy {
    fn partition(&mut self, key: &Writable, value: &Writable, num_partitions: usize) -> Result<usize> {
        let key = codec::value_of(key).context("converting partitioner key")?;
        let value = codec::value_of(value).context("converting partitioner value")?;
        let factory = &self.factory;
        let logic = self
            .container
            .get(Role::Partitioner, || factory())
            .context("instantiating partitioner")?;
        let partition = logic
            .partition(&key, &value, num_partitions)
            .map_err(|e| hook_error(Role::Partitioner, "partition", e))?;
        if partition < 0 || partition as usize >= num_partitions {
            return Err(JobjarError::PartitionOutOfRange { partition, num_partitions }.into());
        }
        Ok(partition as usize)
    }
}
