//! Adapters from the host task interfaces to job logic.
//!
//! Each proxy is created by the host for one task attempt, owns the
//! [`InstanceContainer`](crate::container::InstanceContainer) for that
//! attempt, and translates records through the codec in both directions.

mod comparator;
mod mapper;
mod partitioner;
mod reducer;

pub use comparator::ComparatorProxy;
pub use mapper::MapperProxy;
pub use partitioner::PartitionerProxy;
pub use reducer::{CombinerProxy, ReducerProxy};

use crate::api::Emitter;
use crate::codec;
use crate::container::Role;
use crate::error::JobjarError;
use crate::host::OutputCollector;
use crate::value::Value;
use anyhow::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    SetupCalled,
    Processing,
    CleanupCalled,
    Terminal,
}

impl LifecycleState {
    fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "CREATED",
            LifecycleState::SetupCalled => "SETUP_CALLED",
            LifecycleState::Processing => "PROCESS_CALLED",
            LifecycleState::CleanupCalled => "CLEANUP_CALLED",
            LifecycleState::Terminal => "TERMINAL",
        }
    }
}

/// Guards the hook order of one proxy: setup once, any number of process
/// calls, cleanup once.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    role: Role,
    state: LifecycleState,
}

impl Lifecycle {
    pub(crate) fn new(role: Role) -> Self {
        Self { role, state: LifecycleState::Created }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn enter_setup(&mut self) -> Result<()> {
        self.transition(&[LifecycleState::Created], LifecycleState::SetupCalled)
    }

    pub(crate) fn enter_process(&mut self) -> Result<()> {
        self.transition(
            &[LifecycleState::SetupCalled, LifecycleState::Processing],
            LifecycleState::Processing,
        )
    }

    pub(crate) fn enter_cleanup(&mut self) -> Result<()> {
        self.transition(
            &[LifecycleState::SetupCalled, LifecycleState::Processing],
            LifecycleState::CleanupCalled,
        )
    }

    pub(crate) fn finish(&mut self) {
        self.state = LifecycleState::Terminal;
    }

    fn transition(&mut self, allowed: &[LifecycleState], to: LifecycleState) -> Result<()> {
        if !allowed.contains(&self.state) {
            return Err(JobjarError::IllegalState { role: self.role, from: self.state.as_str(), to: to.as_str() }.into());
        }
        self.state = to;
        Ok(())
    }
}

pub(crate) fn hook_error(role: Role, hook: &'static str, source: anyhow::Error) -> anyhow::Error {
    JobjarError::Lifecycle { role, hook, source }.into()
}

/// Hands values emitted by job logic to the host collector.
pub(crate) struct CollectorEmitter<'a> {
    out: &'a mut dyn OutputCollector,
}

impl<'a> CollectorEmitter<'a> {
    pub(crate) fn new(out: &'a mut dyn OutputCollector) -> Self {
        Self { out }
    }
}

impl Emitter for CollectorEmitter<'_> {
    fn emit(&mut self, key: Value, value: Value) -> Result<()> {
        let key = codec::to_writable(key)?;
        let value = codec::to_writable(value)?;
        self.out.collect(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_accepts_the_normal_order() {
        let mut lc = Lifecycle::new(Role::Mapper);
        lc.enter_setup().unwrap();
        lc.enter_process().unwrap();
        lc.enter_process().unwrap();
        lc.enter_cleanup().unwrap();
        lc.finish();
        assert_eq!(lc.state(), LifecycleState::Terminal);
    }

    #[test]
    fn lifecycle_allows_cleanup_without_records() {
        let mut lc = Lifecycle::new(Role::Reducer);
        lc.enter_setup().unwrap();
        lc.enter_cleanup().unwrap();
    }

    #[test]
    fn lifecycle_rejects_out_of_order_calls() {
        let mut lc = Lifecycle::new(Role::Combiner);
        let err = lc.enter_process().unwrap_err();
        assert_eq!(err.to_string(), "combiner cannot move from CREATED to PROCESS_CALLED");

        lc.enter_setup().unwrap();
        assert!(lc.enter_setup().is_err());
        lc.enter_cleanup().unwrap();
        lc.finish();
        assert!(lc.enter_cleanup().is_err());
        assert!(lc.enter_process().is_err());
    }
}
