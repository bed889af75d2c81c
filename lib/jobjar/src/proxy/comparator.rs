use super::hook_error;
use crate::api::CompareLogic;
use crate::codec;
use crate::container::Role;
use crate::host::KeyComparator;
use crate::registry::CompareFactory;
use crate::writable::Writable;
use anyhow::{Context, Result};
use std::cmp::Ordering;

/// Delegates key comparison to job logic, for either the sort or the
/// grouping role. Comparators hold no per-record state, so the instance is
/// built up front and shared by reference for the attempt.
pub struct ComparatorProxy {
    role: Role,
    logic: Box<dyn CompareLogic>,
}

impl ComparatorProxy {
    pub fn new(role: Role, factory: &CompareFactory) -> Result<Self> {
        let logic = factory().with_context(|| format!("instantiating {}", role))?;
        Ok(Self { role, logic })
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl KeyComparator for ComparatorProxy {
    fn compare(&self, a: &Writable, b: &Writable) -> Result<Ordering> {
        let a = codec::value_of(a).with_context(|| format!("converting {} key", self.role))?;
        let b = codec::value_of(b).with_context(|| format!("converting {} key", self.role))?;
        self.logic.compare(&a, &b).map_err(|e| hook_error(self.role, "compare", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ProjectionComparator;
    use std::sync::Arc;

    fn grouping() -> ComparatorProxy {
        let factory: CompareFactory =
            Arc::new(|| Ok::<Box<dyn CompareLogic>, anyhow::Error>(Box::new(ProjectionComparator::new(1))));
        ComparatorProxy::new(Role::GroupingComparator, &factory).unwrap()
    }

    fn key(group: &str, detail: &str) -> Writable {
        Writable::Array(vec![Writable::text(group), Writable::text(detail)])
    }

    fn sample() -> Vec<Writable> {
        vec![
            key("a", "apple"),
            key("a", "avocado"),
            key("b", "apple"),
            key("e", "eagle"),
            key("e", "egret"),
            Writable::text("e"),
        ]
    }

    #[test]
    fn reflexive() {
        let cmp = grouping();
        for k in sample() {
            assert_eq!(cmp.compare(&k, &k).unwrap(), Ordering::Equal);
        }
    }

    #[test]
    fn antisymmetric_and_transitive_on_samples() {
        let cmp = grouping();
        let keys = sample();
        for a in &keys {
            for b in &keys {
                let ab = cmp.compare(a, b).unwrap();
                assert_eq!(ab, cmp.compare(b, a).unwrap().reverse());
                for c in &keys {
                    let bc = cmp.compare(b, c).unwrap();
                    if ab != Ordering::Greater && bc != Ordering::Greater {
                        assert_ne!(cmp.compare(a, c).unwrap(), Ordering::Greater);
                    }
                }
            }
        }
    }

    #[test]
    fn distinct_records_with_a_shared_group_key_are_equal() {
        let cmp = grouping();
        assert_eq!(cmp.compare(&key("e", "eagle"), &key("e", "egret")).unwrap(), Ordering::Equal);
        assert_eq!(cmp.compare(&key("a", "zebra"), &key("b", "apple")).unwrap(), Ordering::Less);
    }

    #[test]
    fn unconvertible_keys_fail() {
        let cmp = grouping();
        assert!(cmp.compare(&Writable::Bytes(vec![]), &Writable::text("a")).is_err());
    }
}
