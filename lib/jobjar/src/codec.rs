//! Conversion between host records and job-side values.
//!
//! The set of supported kinds is closed. Anything without an exact
//! counterpart on the other side is a conversion error; nothing is coerced.

use crate::error::JobjarError;
use crate::value::Value;
use crate::writable::Writable;
use anyhow::Result;
use std::collections::BTreeMap;

pub fn to_value(w: Writable) -> Result<Value> {
    Ok(match w {
        Writable::Null => Value::Null,
        Writable::Boolean(b) => Value::Bool(b),
        Writable::Int(i) => Value::Int(i as i64),
        Writable::Long(l) => Value::Int(l),
        Writable::Double(d) => Value::Float(d),
        Writable::Text(s) => Value::Text(s),
        Writable::Bytes(b) => {
            return Err(JobjarError::conversion(format!(
                "BytesWritable ({} bytes) has no value representation",
                b.len()
            ))
            .into())
        }
        Writable::Array(items) => Value::List(items.into_iter().map(to_value).collect::<Result<_>>()?),
        Writable::Map(entries) => {
            let mut map = BTreeMap::new();
            for (k, v) in entries {
                let key = match k {
                    Writable::Text(s) => s,
                    other => {
                        return Err(JobjarError::conversion(format!(
                            "MapWritable key must be Text, got {}",
                            other.type_name()
                        ))
                        .into())
                    }
                };
                if map.insert(key.clone(), to_value(v)?).is_some() {
                    return Err(JobjarError::conversion(format!("duplicate MapWritable key {:?}", key)).into());
                }
            }
            Value::Map(map)
        }
    })
}

pub fn to_writable(v: Value) -> Result<Writable> {
    Ok(match v {
        Value::Null => Writable::Null,
        Value::Bool(b) => Writable::Boolean(b),
        Value::Int(i) => Writable::Long(i),
        Value::Float(f) => Writable::Double(f),
        Value::Text(s) => Writable::Text(s),
        Value::List(items) => Writable::Array(items.into_iter().map(to_writable).collect::<Result<_>>()?),
        Value::Map(entries) => Writable::Map(
            entries
                .into_iter()
                .map(|(k, v)| Ok((Writable::Text(k), to_writable(v)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

/// Borrowing variant for call sites that must keep the host record, such as
/// comparators and partitioners.
pub fn value_of(w: &Writable) -> Result<Value> {
    to_value(w.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_cross_without_loss() {
        assert_eq!(to_value(Writable::Int(i32::MIN)).unwrap(), Value::Int(i32::MIN as i64));
        assert_eq!(to_value(Writable::Long(i64::MAX)).unwrap(), Value::Int(i64::MAX));
        assert_eq!(to_writable(Value::Int(i64::MIN)).unwrap(), Writable::Long(i64::MIN));
        let tiny = 5e-324_f64;
        assert_eq!(to_writable(Value::Float(tiny)).unwrap(), Writable::Double(tiny));
        assert_eq!(to_value(Writable::text("naïve")).unwrap(), Value::from("naïve"));
    }

    #[test]
    fn nested_structures_keep_their_shape() {
        let mut inner = BTreeMap::new();
        inner.insert("n".to_string(), Value::Int(3));
        let v = Value::List(vec![Value::from("a"), Value::Map(inner), Value::Null]);
        let w = to_writable(v.clone()).unwrap();
        assert_eq!(
            w,
            Writable::Array(vec![
                Writable::text("a"),
                Writable::Map(vec![(Writable::text("n"), Writable::Long(3))]),
                Writable::Null,
            ])
        );
        assert_eq!(to_value(w).unwrap(), v);
    }

    #[test]
    fn bytes_are_rejected() {
        let err = to_value(Writable::Bytes(vec![1, 2, 3])).unwrap_err();
        assert!(matches!(err.downcast_ref::<JobjarError>(), Some(JobjarError::Conversion(_))));
    }

    #[test]
    fn non_text_map_keys_are_rejected() {
        let w = Writable::Map(vec![(Writable::Long(1), Writable::Null)]);
        let err = to_value(w).unwrap_err();
        assert!(err.to_string().contains("must be Text"));
    }
}
