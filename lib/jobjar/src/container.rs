//! Per-attempt cache of job-logic instances.
//!
//! One container belongs to exactly one task attempt. It is created with the
//! attempt's proxy and dropped with it, so an instance never outlives the
//! attempt and is never seen by another attempt or role.

use crate::error::JobjarError;
use anyhow::Result;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Mapper,
    Reducer,
    Combiner,
    Partitioner,
    SortComparator,
    GroupingComparator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Mapper => "mapper",
            Role::Reducer => "reducer",
            Role::Combiner => "combiner",
            Role::Partitioner => "partitioner",
            Role::SortComparator => "sort comparator",
            Role::GroupingComparator => "grouping comparator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
pub struct InstanceContainer {
    slots: HashMap<Role, Box<dyn Any + Send>>,
}

impl InstanceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live instance for `role`, built by `factory` on first access.
    /// A failing factory leaves the slot empty and its error propagates.
    pub fn get<T, F>(&mut self, role: Role, factory: F) -> Result<&mut T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T>,
    {
        if !self.slots.contains_key(&role) {
            let instance = factory()?;
            self.slots.insert(role, Box::new(instance));
        }
        self.slots
            .get_mut(&role)
            .and_then(|slot| slot.downcast_mut::<T>())
            .ok_or_else(|| JobjarError::RoleMismatch { role }.into())
    }

    pub fn contains(&self, role: Role) -> bool {
        self.slots.contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Counter {
        calls: u32,
    }

    #[test]
    fn builds_once_and_returns_the_same_instance() {
        let built = Cell::new(0);
        let factory = || {
            built.set(built.get() + 1);
            Ok(Counter { calls: 0 })
        };
        let mut container = InstanceContainer::new();

        let first = container.get(Role::Mapper, factory).unwrap();
        first.calls += 1;
        let first_addr = first as *const Counter;

        let second = container.get(Role::Mapper, factory).unwrap();
        second.calls += 1;
        assert_eq!(second as *const Counter, first_addr);
        assert_eq!(second.calls, 2);
        assert_eq!(built.get(), 1);
    }

    #[test]
    fn roles_get_their_own_instances() {
        let mut container = InstanceContainer::new();
        container.get(Role::Reducer, || Ok(Counter { calls: 1 })).unwrap();
        let combiner = container.get(Role::Combiner, || Ok(Counter { calls: 10 })).unwrap();
        assert_eq!(combiner.calls, 10);
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn factory_errors_propagate_and_leave_the_slot_empty() {
        let mut container = InstanceContainer::new();
        let err = container
            .get::<Counter, _>(Role::Mapper, || Err(anyhow::anyhow!("boom")))
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(!container.contains(Role::Mapper));

        let ok = container.get(Role::Mapper, || Ok(Counter { calls: 5 })).unwrap();
        assert_eq!(ok.calls, 5);
    }

    #[test]
    fn wrong_type_for_a_role_is_reported() {
        let mut container = InstanceContainer::new();
        container.get(Role::Mapper, || Ok(Counter { calls: 0 })).unwrap();
        let err = container.get(Role::Mapper, || Ok(String::new())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JobjarError>(),
            Some(JobjarError::RoleMismatch { role: Role::Mapper })
        ));
    }
}
