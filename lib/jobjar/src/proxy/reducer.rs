use super::{hook_error, CollectorEmitter, Lifecycle, LifecycleState};
use crate::api::{ReduceLogic, Values};
use crate::codec;
use crate::container::{InstanceContainer, Role};
use crate::context::TaskContext;
use crate::host::{OutputCollector, Reducer};
use crate::registry::ReduceFactory;
use crate::writable::Writable;
use anyhow::{Context, Result};

/// Serves the reduce role, and through [`CombinerProxy`] the combine role.
pub struct ReducerProxy {
    role: Role,
    factory: ReduceFactory,
    container: InstanceContainer,
    lifecycle: Lifecycle,
}

impl ReducerProxy {
    pub fn new(factory: ReduceFactory) -> Self {
        Self::with_role(Role::Reducer, factory)
    }

    fn with_role(role: Role, factory: ReduceFactory) -> Self {
        Self { role, factory, container: InstanceContainer::new(), lifecycle: Lifecycle::new(role) }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn logic(&mut self) -> Result<&mut Box<dyn ReduceLogic>> {
        let factory = &self.factory;
        self.container.get(self.role, || factory())
    }
}

impl Reducer for ReducerProxy {
    fn setup(&mut self, ctx: &mut TaskContext) -> Result<()> {
        self.lifecycle.enter_setup()?;
        let role = self.role;
        let logic = self.logic().with_context(|| format!("instantiating {}", role))?;
        logic.setup(ctx).map_err(|e| hook_error(role, "setup", e))
    }

    fn reduce(&mut self, key: Writable, values: Vec<Writable>, out: &mut dyn OutputCollector, ctx: &mut TaskContext) -> Result<()> {
        self.lifecycle.enter_process()?;
        let role = self.role;
        let key = codec::to_value(key).with_context(|| format!("converting {} input key", role))?;
        let values = values
            .into_iter()
            .map(codec::to_value)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("converting {} input values", role))?;
        let mut emitter = CollectorEmitter::new(out);
        self.logic()?
            .reduce(key, Values::new(values), &mut emitter, ctx)
            .map_err(|e| hook_error(role, "reduce", e))
    }

    fn cleanup(&mut self, ctx: &mut TaskContext) -> Result<()> {
        self.lifecycle.enter_cleanup()?;
        let role = self.role;
        let result = match self.logic() {
            Ok(logic) => logic.cleanup(ctx).map_err(|e| hook_error(role, "cleanup", e)),
            Err(e) => Err(e),
        };
        self.lifecycle.finish();
        result
    }
}

/// A reducer proxy running in the combine phase. Behaves exactly like
/// [`ReducerProxy`] but caches its instance under the combiner role.
pub struct CombinerProxy(ReducerProxy);

impl CombinerProxy {
    pub fn new(factory: ReduceFactory) -> Self {
        CombinerProxy(ReducerProxy::with_role(Role::Combiner, factory))
    }

    pub fn state(&self) -> LifecycleState {
        self.0.state()
    }
}

impl Reducer for CombinerProxy {
    fn setup(&mut self, ctx: &mut TaskContext) -> Result<()> {
        self.0.setup(ctx)
    }

    fn reduce(&mut self, key: Writable, values: Vec<Writable>, out: &mut dyn OutputCollector, ctx: &mut TaskContext) -> Result<()> {
        self.0.reduce(key, values, out, ctx)
    }

    fn cleanup(&mut self, ctx: &mut TaskContext) -> Result<()> {
        self.0.cleanup(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Emitter;
    use crate::bootstrap::LoadPath;
    use crate::context::{TaskAttemptId, TaskKind};
    use crate::error::JobjarError;
    use crate::host::Record;
    use crate::value::Value;
    use std::sync::Arc;

    #[derive(Default)]
    struct Sum {
        groups: u64,
    }

    impl ReduceLogic for Sum {
        fn setup(&mut self, ctx: &mut TaskContext) -> Result<()> {
            ctx.increment_counter("test", "SETUP", 1);
            Ok(())
        }

        fn reduce(&mut self, key: Value, values: Values, out: &mut dyn Emitter, _ctx: &mut TaskContext) -> Result<()> {
            self.groups += 1;
            let mut total = 0;
            for v in values {
                total += v.as_int().ok_or_else(|| anyhow::anyhow!("not a count: {}", v))?;
            }
            out.emit(key, Value::Int(total))
        }

        fn cleanup(&mut self, ctx: &mut TaskContext) -> Result<()> {
            ctx.increment_counter("test", "GROUPS", self.groups);
            Ok(())
        }
    }

    fn factory() -> ReduceFactory {
        Arc::new(|| Ok::<Box<dyn ReduceLogic>, anyhow::Error>(Box::new(Sum::default())))
    }

    fn ctx() -> TaskContext {
        TaskContext::new(
            TaskAttemptId::new("test", TaskKind::Reduce, 0, 0),
            Arc::new(Default::default()),
            Arc::new(LoadPath::empty()),
        )
    }

    #[test]
    fn sums_each_group_and_runs_hooks_once() {
        let mut reducer = ReducerProxy::new(factory());
        let mut ctx = ctx();
        let mut out: Vec<Record> = Vec::new();
        let mut groups = vec![
            (Writable::text("alice"), vec![Writable::Long(2), Writable::Int(3)]),
            (Writable::text("anything"), vec![Writable::Long(21)]),
        ]
        .into_iter();

        reducer.run(&mut groups, &mut out, &mut ctx).unwrap();

        assert_eq!(
            out,
            vec![
                (Writable::text("alice"), Writable::Long(5)),
                (Writable::text("anything"), Writable::Long(21)),
            ]
        );
        assert_eq!(ctx.counters().get("test", "SETUP"), 1);
        assert_eq!(ctx.counters().get("test", "GROUPS"), 2);
        assert_eq!(reducer.state(), LifecycleState::Terminal);
    }

    #[test]
    fn combiner_failures_name_the_combiner_role() {
        let mut combiner = CombinerProxy::new(factory());
        let mut out: Vec<Record> = Vec::new();
        let mut groups = vec![(Writable::text("x"), vec![Writable::text("oops")])].into_iter();

        let err = combiner.run(&mut groups, &mut out, &mut ctx()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<JobjarError>(),
            Some(JobjarError::Lifecycle { role: Role::Combiner, hook: "reduce", .. })
        ));
        assert_eq!(combiner.state(), LifecycleState::Terminal);
        assert!(out.is_empty());
    }

    #[test]
    fn factory_failure_fails_setup() {
        let failing: ReduceFactory = Arc::new(|| Err::<Box<dyn ReduceLogic>, _>(anyhow::anyhow!("no such class")));
        let mut reducer = ReducerProxy::new(failing);
        let err = reducer.setup(&mut ctx()).unwrap_err();
        assert_eq!(format!("{:#}", err), "instantiating reducer: no such class");
    }
}
