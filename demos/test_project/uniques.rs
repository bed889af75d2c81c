//! Distinct words per initial letter, by secondary sort: keys are
//! `[letter, word]`, partitioned and grouped by the letter alone, so each
//! reduce call sees one letter's words already in order.

use anyhow::{anyhow, Result};
use jobjar::{Emitter, JobRegistry, MapLogic, ProjectionComparator, ProjectionPartitioner, ReduceLogic, TaskContext, Value, Values};
use regex::Regex;

#[derive(Default)]
pub struct UniquesMapper {
    word_re: Option<Regex>,
}

impl MapLogic for UniquesMapper {
    fn setup(&mut self, _ctx: &mut TaskContext) -> Result<()> {
        self.word_re = Some(Regex::new(r"[A-Za-z0-9_']+")?);
        Ok(())
    }

    fn map(&mut self, _key: Value, value: Value, out: &mut dyn Emitter, _ctx: &mut TaskContext) -> Result<()> {
        let line = value.as_str().ok_or_else(|| anyhow!("expected a text line, got {}", value.type_name()))?;
        let word_re = self.word_re.as_ref().ok_or_else(|| anyhow!("map called before setup"))?;
        for m in word_re.find_iter(line) {
            let word = m.as_str().to_lowercase();
            let Some(first) = word.chars().next() else { continue };
            let key = Value::List(vec![Value::Text(first.to_string()), Value::Text(word.clone())]);
            out.emit(key, Value::Text(word))?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct UniquesReducer;

impl ReduceLogic for UniquesReducer {
    fn reduce(&mut self, key: Value, values: Values, out: &mut dyn Emitter, _ctx: &mut TaskContext) -> Result<()> {
        let letter = key
            .as_list()
            .and_then(|k| k.first())
            .cloned()
            .ok_or_else(|| anyhow!("expected a [letter, word] key, got {}", key))?;
        let mut distinct = 0i64;
        let mut previous: Option<Value> = None;
        for word in values {
            if previous.as_ref() != Some(&word) {
                distinct += 1;
                previous = Some(word);
            }
        }
        out.emit(letter, Value::Int(distinct))
    }
}

pub fn register(registry: &mut JobRegistry) {
    registry
        .register_mapper("uniques.mapper", UniquesMapper::default)
        .register_reducer("uniques.reducer", UniquesReducer::default)
        .register_partitioner("uniques.partitioner", || ProjectionPartitioner::new(1))
        .register_comparator("uniques.grouping", || ProjectionComparator::new(1));
}
