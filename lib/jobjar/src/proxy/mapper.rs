use super::{hook_error, CollectorEmitter, Lifecycle, LifecycleState};
use crate::api::MapLogic;
use crate::codec;
use crate::container::{InstanceContainer, Role};
use crate::context::TaskContext;
use crate::host::{Mapper, OutputCollector};
use crate::registry::MapFactory;
use crate::writable::Writable;
use anyhow::{Context, Result};

pub struct MapperProxy {
    factory: MapFactory,
    container: InstanceContainer,
    lifecycle: Lifecycle,
}

impl MapperProxy {
    pub fn new(factory: MapFactory) -> Self {
        Self { factory, container: InstanceContainer::new(), lifecycle: Lifecycle::new(Role::Mapper) }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn logic(&mut self) -> Result<&mut Box<dyn MapLogic>> {
        let factory = &self.factory;
        self.container.get(Role::Mapper, || factory())
    }
}

impl Mapper for MapperProxy {
    fn setup(&mut self, ctx: &mut TaskContext) -> Result<()> {
        self.lifecycle.enter_setup()?;
        let logic = self.logic().context("instantiating mapper")?;
        logic.setup(ctx).map_err(|e| hook_error(Role::Mapper, "setup", e))
    }

    fn map(&mut self, key: Writable, value: Writable, out: &mut dyn OutputCollector, ctx: &mut TaskContext) -> Result<()> {
        self.lifecycle.enter_process()?;
        let key = codec::to_value(key).context("converting map input key")?;
        let value = codec::to_value(value).context("converting map input value")?;
        let mut emitter = CollectorEmitter::new(out);
        self.logic()?
            .map(key, value, &mut emitter, ctx)
            .map_err(|e| hook_error(Role::Mapper, "map", e))
    }

    fn cleanup(&mut self, ctx: &mut TaskContext) -> Result<()> {
        self.lifecycle.enter_cleanup()?;
        let result = match self.logic() {
            Ok(logic) => logic.cleanup(ctx).map_err(|e| hook_error(Role::Mapper, "cleanup", e)),
            Err(e) => Err(e),
        };
        self.lifecycle.finish();
        result
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
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    impl Journal {
        fn push(&self, s: impl Into<String>) {
            self.0.lock().unwrap().push(s.into());
        }
        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct Splitter {
        journal: Arc<Journal>,
        fail_on: Option<String>,
    }

    impl MapLogic for Splitter {
        fn setup(&mut self, ctx: &mut TaskContext) -> Result<()> {
            self.journal.push("setup");
            ctx.increment_counter("test", "MAPPER_SETUP_COUNT", 1);
            Ok(())
        }

        fn map(&mut self, _key: Value, value: Value, out: &mut dyn Emitter, _ctx: &mut TaskContext) -> Result<()> {
            let line = value.as_str().unwrap_or_default().to_string();
            self.journal.push(format!("map {}", line));
            if self.fail_on.as_deref() == Some(line.as_str()) {
                anyhow::bail!("cannot map {:?}", line);
            }
            for word in line.split_whitespace() {
                out.emit(Value::from(word), Value::Int(1))?;
            }
            Ok(())
        }

        fn cleanup(&mut self, _ctx: &mut TaskContext) -> Result<()> {
            self.journal.push("cleanup");
            Ok(())
        }
    }

    fn ctx() -> TaskContext {
        TaskContext::new(
            TaskAttemptId::new("test", TaskKind::Map, 0, 0),
            Arc::new(Default::default()),
            Arc::new(LoadPath::empty()),
        )
    }

    fn proxy(journal: &Arc<Journal>, fail_on: Option<&str>, built: &Arc<AtomicUsize>) -> MapperProxy {
        let journal = journal.clone();
        let fail_on = fail_on.map(str::to_string);
        let built = built.clone();
        MapperProxy::new(Arc::new(move || {
            built.fetch_add(1, Ordering::SeqCst);
            Ok::<Box<dyn MapLogic>, anyhow::Error>(Box::new(Splitter { journal: journal.clone(), fail_on: fail_on.clone() }))
        }))
    }

    fn lines(lines: &[&str]) -> Vec<Result<Record>> {
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| Ok((Writable::Long(i as i64), Writable::text(*l))))
            .collect()
    }

    #[test]
    fn runs_hooks_in_order_and_converts_emissions() {
        let journal = Arc::new(Journal::default());
        let built = Arc::new(AtomicUsize::new(0));
        let mut mapper = proxy(&journal, None, &built);
        let mut out: Vec<Record> = Vec::new();
        let mut ctx = ctx();

        mapper.run(&mut lines(&["a b", "", "c"]).into_iter(), &mut out, &mut ctx).unwrap();

        assert_eq!(journal.entries(), vec!["setup", "map a b", "map ", "map c", "cleanup"]);
        assert_eq!(
            out,
            vec![
                (Writable::text("a"), Writable::Long(1)),
                (Writable::text("b"), Writable::Long(1)),
                (Writable::text("c"), Writable::Long(1)),
            ]
        );
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.counters().get("test", "MAPPER_SETUP_COUNT"), 1);
        assert_eq!(mapper.state(), LifecycleState::Terminal);
    }

    #[test]
    fn cleanup_still_runs_after_a_failing_record() {
        let journal = Arc::new(Journal::default());
        let built = Arc::new(AtomicUsize::new(0));
        let mut mapper = proxy(&journal, Some("bad"), &built);
        let mut out: Vec<Record> = Vec::new();

        let err = mapper
            .run(&mut lines(&["ok", "bad", "never"]).into_iter(), &mut out, &mut ctx())
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<JobjarError>(),
            Some(JobjarError::Lifecycle { role: Role::Mapper, hook: "map", .. })
        ));
        assert_eq!(journal.entries(), vec!["setup", "map ok", "map bad", "cleanup"]);
        assert_eq!(mapper.state(), LifecycleState::Terminal);
    }

    #[test]
    fn unconvertible_input_fails_the_record() {
        let journal = Arc::new(Journal::default());
        let built = Arc::new(AtomicUsize::new(0));
        let mut mapper = proxy(&journal, None, &built);
        let mut out: Vec<Record> = Vec::new();
        let mut input = vec![Ok::<Record, anyhow::Error>((Writable::Long(0), Writable::Bytes(vec![1])))].into_iter();

        let err = mapper.run(&mut input, &mut out, &mut ctx()).unwrap_err();
        assert!(format!("{:#}", err).contains("BytesWritable"));
        assert_eq!(journal.entries(), vec!["setup", "cleanup"]);
    }

    #[test]
    fn map_before_setup_is_rejected() {
        let journal = Arc::new(Journal::default());
        let built = Arc::new(AtomicUsize::new(0));
        let mut mapper = proxy(&journal, None, &built);
        let mut out: Vec<Record> = Vec::new();
        let err = mapper
            .map(Writable::Long(0), Writable::text("x"), &mut out, &mut ctx())
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<JobjarError>(), Some(JobjarError::IllegalState { .. })));
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }
}
