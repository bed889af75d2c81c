use crate::host::{KeyComparator, Record};
use crate::writable::Writable;
use anyhow::Result;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard};

/// Stable parallel sort driven by a fallible comparator. A sort closure
/// cannot return an error, so the first failure is parked and everything
/// after it compares equal; the error is returned once the sort is done.
pub fn sort_by_key<T, F>(items: &mut [T], key: F, cmp: &dyn KeyComparator) -> Result<()>
where
    T: Send,
    F: Fn(&T) -> &Writable + Sync,
{
    let failure: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    items.par_sort_by(|a, b| compare_or_park(cmp, key(a), key(b), &failure));
    park_result(failure)
}

/// Map output order: partition first, then key.
pub fn sort_map_output(items: &mut [(usize, Writable, Writable)], cmp: &dyn KeyComparator) -> Result<()> {
    let failure: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    items.par_sort_by(|a, b| a.0.cmp(&b.0).then_with(|| compare_or_park(cmp, &a.1, &b.1, &failure)));
    park_result(failure)
}

fn compare_or_park(cmp: &dyn KeyComparator, a: &Writable, b: &Writable, failure: &Mutex<Option<anyhow::Error>>) -> Ordering {
    if lock(failure).is_some() {
        return Ordering::Equal;
    }
    match cmp.compare(a, b) {
        Ok(o) => o,
        Err(e) => {
            lock(failure).get_or_insert(e);
            Ordering::Equal
        }
    }
}

fn lock(failure: &Mutex<Option<anyhow::Error>>) -> MutexGuard<'_, Option<anyhow::Error>> {
    failure.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn park_result(failure: Mutex<Option<anyhow::Error>>) -> Result<()> {
    match failure.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Groups consecutive sorted records whose keys compare equal to the first
/// key of the group. That first key is the group's key.
pub fn group_sorted(records: Vec<Record>, cmp: &dyn KeyComparator) -> Result<Vec<(Writable, Vec<Writable>)>> {
    let mut groups: Vec<(Writable, Vec<Writable>)> = Vec::new();
    for (key, value) in records {
        match groups.last_mut() {
            Some((current, values)) if cmp.compare(current, &key)? == Ordering::Equal => values.push(value),
            _ => groups.push((key, vec![value])),
        }
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NaturalComparator;

    struct FirstElement;
    impl KeyComparator for FirstElement {
        fn compare(&self, a: &Writable, b: &Writable) -> Result<Ordering> {
            match (a, b) {
                (Writable::Array(x), Writable::Array(y)) => Ok(x.first().cmp(&y.first())),
                _ => anyhow::bail!("not an array"),
            }
        }
    }

    fn key(group: &str, detail: &str) -> Writable {
        Writable::Array(vec![Writable::text(group), Writable::text(detail)])
    }

    #[test]
    fn sort_is_stable_and_groups_use_the_first_key() {
        let mut records = vec![
            (key("b", "1"), Writable::Long(1)),
            (key("a", "2"), Writable::Long(2)),
            (key("b", "0"), Writable::Long(3)),
            (key("a", "1"), Writable::Long(4)),
        ];
        sort_by_key(&mut records, |r| &r.0, &FirstElement).unwrap();
        let values: Vec<_> = records.iter().map(|r| r.1.clone()).collect();
        assert_eq!(values, vec![Writable::Long(2), Writable::Long(4), Writable::Long(1), Writable::Long(3)]);

        let groups = group_sorted(records, &FirstElement).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, key("a", "2"));
        assert_eq!(groups[1].1, vec![Writable::Long(1), Writable::Long(3)]);
    }

    #[test]
    fn comparator_failures_surface_after_the_sort() {
        let mut records = vec![(Writable::text("x"), Writable::Null), (key("a", "b"), Writable::Null)];
        assert!(sort_by_key(&mut records, |r| &r.0, &FirstElement).is_err());
        assert!(group_sorted(records, &FirstElement).is_err());
    }

    #[test]
    fn map_output_orders_by_partition_then_key() {
        let mut items = vec![
            (1, Writable::text("a"), Writable::Null),
            (0, Writable::text("z"), Writable::Null),
            (0, Writable::text("b"), Writable::Null),
        ];
        sort_map_output(&mut items, &NaturalComparator).unwrap();
        let order: Vec<_> = items.iter().map(|i| (i.0, i.1.to_string())).collect();
        assert_eq!(order, vec![(0, "b".to_string()), (0, "z".to_string()), (1, "a".to_string())]);
    }
}
