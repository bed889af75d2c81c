//! Word count. The reducer also runs as the combiner; every hook bumps a
//! counter so a run shows how often each one was called.

use anyhow::{anyhow, Context, Result};
use jobjar::{Emitter, JobRegistry, MapLogic, ReduceLogic, TaskContext, Value, Values};
use regex::Regex;
use std::collections::HashSet;
use std::fs;

pub const COUNTER_GROUP: &str = "word_count";

#[derive(Default)]
pub struct WordCountMapper {
    word_re: Option<Regex>,
    stopwords: HashSet<String>,
}

impl MapLogic for WordCountMapper {
    fn setup(&mut self, ctx: &mut TaskContext) -> Result<()> {
        ctx.increment_counter(COUNTER_GROUP, "MAPPER_SETUP_COUNT", 1);
        self.word_re = Some(Regex::new(r"[A-Za-z0-9_']+")?);
        if ctx.get("skip_stopwords") == Some("true") {
            let path = ctx
                .load_path()
                .resolve("stopwords.txt")
                .ok_or_else(|| anyhow!("stopwords.txt is not on the load path"))?;
            let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            self.stopwords = text.lines().map(|l| l.trim().to_lowercase()).filter(|l| !l.is_empty()).collect();
        }
        Ok(())
    }

    fn map(&mut self, _key: Value, value: Value, out: &mut dyn Emitter, _ctx: &mut TaskContext) -> Result<()> {
        let line = value.as_str().ok_or_else(|| anyhow!("expected a text line, got {}", value.type_name()))?;
        let word_re = self.word_re.as_ref().ok_or_else(|| anyhow!("map called before setup"))?;
        for m in word_re.find_iter(line) {
            let word = m.as_str().to_lowercase();
            if !self.stopwords.contains(&word) {
                out.emit(Value::Text(word), Value::Int(1))?;
            }
        }
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut TaskContext) -> Result<()> {
        ctx.increment_counter(COUNTER_GROUP, "MAPPER_CLEANUP_COUNT", 1);
        Ok(())
    }
}

/// Sums counts. `role` prefixes the hook counters, so the same logic can be
/// registered as reducer and as combiner.
pub struct WordCountReducer {
    role: &'static str,
}

impl WordCountReducer {
    pub fn new(role: &'static str) -> Self {
        Self { role }
    }
}

impl ReduceLogic for WordCountReducer {
    fn setup(&mut self, ctx: &mut TaskContext) -> Result<()> {
        ctx.increment_counter(COUNTER_GROUP, &format!("{}_SETUP_COUNT", self.role), 1);
        Ok(())
    }

    fn reduce(&mut self, key: Value, values: Values, out: &mut dyn Emitter, _ctx: &mut TaskContext) -> Result<()> {
        let mut sum = 0i64;
        for v in values {
            sum += v.as_int().ok_or_else(|| anyhow!("count for {} is a {}", key, v.type_name()))?;
        }
        out.emit(key, Value::Int(sum))
    }

    fn cleanup(&mut self, ctx: &mut TaskContext) -> Result<()> {
        ctx.increment_counter(COUNTER_GROUP, &format!("{}_CLEANUP_COUNT", self.role), 1);
        Ok(())
    }
}

pub fn register(registry: &mut JobRegistry) {
    registry
        .register_mapper("word_count.mapper", WordCountMapper::default)
        .register_reducer("word_count.reducer", || WordCountReducer::new("REDUCER"))
        .register_reducer("word_count.combiner", || WordCountReducer::new("COMBINER"));
}
