use crate::context::TaskContext;
use crate::value::Value;
use anyhow::Result;
use std::cmp::Ordering;

// ========== Job-logic traits ==========
//
// Job logic is written against dynamically typed values. Setup and cleanup
// hooks are optional; the defaults do nothing.

/// Receives key/value pairs emitted by a hook.
pub trait Emitter {
    fn emit(&mut self, key: Value, value: Value) -> Result<()>;
}

pub trait MapLogic: Send {
    fn setup(&mut self, _ctx: &mut TaskContext) -> Result<()> {
        Ok(())
    }

    fn map(&mut self, key: Value, value: Value, out: &mut dyn Emitter, ctx: &mut TaskContext) -> Result<()>;

    fn cleanup(&mut self, _ctx: &mut TaskContext) -> Result<()> {
        Ok(())
    }
}

/// Used for both the reduce and the combine role.
pub trait ReduceLogic: Send {
    fn setup(&mut self, _ctx: &mut TaskContext) -> Result<()> {
        Ok(())
    }

    /// Called once per group. `key` is the first key of the group.
    fn reduce(&mut self, key: Value, values: Values, out: &mut dyn Emitter, ctx: &mut TaskContext) -> Result<()>;

    fn cleanup(&mut self, _ctx: &mut TaskContext) -> Result<()> {
        Ok(())
    }
}

pub trait PartitionLogic: Send {
    /// The part of the key that decides the partition. Defaults to the key itself.
    fn partition_key(&self, key: &Value) -> Result<Value> {
        Ok(key.clone())
    }

    fn partition(&mut self, key: &Value, _value: &Value, num_partitions: usize) -> Result<i64> {
        let projected = self.partition_key(key)?;
        Ok((projected.stable_hash() as usize % num_partitions.max(1)) as i64)
    }
}

/// A total order over keys, used for sorting or for deciding reduce group
/// boundaries.
pub trait CompareLogic: Send + Sync {
    fn compare(&self, a: &Value, b: &Value) -> Result<Ordering>;
}

/// The values of one reduce group, in host sort order.
pub struct Values {
    inner: std::vec::IntoIter<Value>,
}

impl Values {
    pub fn new(values: Vec<Value>) -> Self {
        Self { inner: values.into_iter() }
    }
}

impl Iterator for Values {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Values {}

// ========== Ready-made logic ==========

/// Compares keys by a prefix of their list form; keys that are not lists
/// compare as a whole. With `len = 1` over `[group, detail]` keys this is the
/// grouping comparator for a secondary sort.
#[derive(Clone, Debug)]
pub struct ProjectionComparator {
    pub len: usize,
}

impl ProjectionComparator {
    pub fn new(len: usize) -> Self {
        Self { len }
    }

    fn project<'a>(&self, v: &'a Value) -> &'a [Value] {
        match v {
            Value::List(items) => &items[..self.len.min(items.len())],
            other => std::slice::from_ref(other),
        }
    }
}

impl CompareLogic for ProjectionComparator {
    fn compare(&self, a: &Value, b: &Value) -> Result<Ordering> {
        Ok(self.project(a).cmp(self.project(b)))
    }
}

/// Partitions by the same list prefix a [`ProjectionComparator`] groups by.
#[derive(Clone, Debug)]
pub struct ProjectionPartitioner {
    pub len: usize,
}

impl ProjectionPartitioner {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl PartitionLogic for ProjectionPartitioner {
    fn partition_key(&self, key: &Value) -> Result<Value> {
        Ok(match key {
            Value::List(items) => Value::List(items.iter().take(self.len).cloned().collect()),
            other => Value::List(vec![other.clone()]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Identity;
    impl PartitionLogic for Identity {}

    #[test]
    fn default_partition_stays_in_range_and_is_stable() {
        let mut p = Identity;
        for n in [1usize, 2, 7, 64] {
            for word in ["alice", "anything", "", "queen"] {
                let key = Value::from(word);
                let first = p.partition(&key, &Value::Null, n).unwrap();
                assert!((0..n as i64).contains(&first));
                assert_eq!(first, p.partition(&key, &Value::Null, n).unwrap());
            }
        }
    }

    #[test]
    fn projection_groups_on_prefix() {
        let cmp = ProjectionComparator::new(1);
        let a1 = Value::from(vec!["a", "apple"]);
        let a2 = Value::from(vec!["a", "avocado"]);
        let b = Value::from(vec!["b", "apple"]);
        assert_eq!(cmp.compare(&a1, &a2).unwrap(), Ordering::Equal);
        assert_eq!(cmp.compare(&a1, &b).unwrap(), Ordering::Less);
        assert_eq!(cmp.compare(&b, &a2).unwrap(), Ordering::Greater);
        assert_eq!(cmp.compare(&Value::from("x"), &Value::from("x")).unwrap(), Ordering::Equal);
    }

    #[test]
    fn projection_partitioner_agrees_with_projection_comparator() {
        let mut p = ProjectionPartitioner::new(1);
        let a1 = Value::from(vec!["e", "eagle"]);
        let a2 = Value::from(vec!["e", "egret"]);
        for n in [2usize, 3, 16] {
            assert_eq!(p.partition(&a1, &Value::Null, n).unwrap(), p.partition(&a2, &Value::Null, n).unwrap());
        }
    }
}
