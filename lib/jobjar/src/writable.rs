//! Record types at the host-framework boundary.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A host-side record field. The engine sorts, partitions, spills and
/// writes these; job logic only ever sees them after the codec has turned
/// them into [`crate::Value`]s.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Writable {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Writable>),
    Map(Vec<(Writable, Writable)>),
}

impl Writable {
    fn rank(&self) -> u8 {
        match self {
            Writable::Null => 0,
            Writable::Boolean(_) => 1,
            Writable::Int(_) => 2,
            Writable::Long(_) => 3,
            Writable::Double(_) => 4,
            Writable::Text(_) => 5,
            Writable::Bytes(_) => 6,
            Writable::Array(_) => 7,
            Writable::Map(_) => 8,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Writable::Null => "NullWritable",
            Writable::Boolean(_) => "BooleanWritable",
            Writable::Int(_) => "IntWritable",
            Writable::Long(_) => "LongWritable",
            Writable::Double(_) => "DoubleWritable",
            Writable::Text(_) => "Text",
            Writable::Bytes(_) => "BytesWritable",
            Writable::Array(_) => "ArrayWritable",
            Writable::Map(_) => "MapWritable",
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Writable::Text(s.into())
    }
}

impl Ord for Writable {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Writable::Null, Writable::Null) => Ordering::Equal,
            (Writable::Boolean(a), Writable::Boolean(b)) => a.cmp(b),
            (Writable::Int(a), Writable::Int(b)) => a.cmp(b),
            (Writable::Long(a), Writable::Long(b)) => a.cmp(b),
            (Writable::Double(a), Writable::Double(b)) => a.total_cmp(b),
            (Writable::Text(a), Writable::Text(b)) => a.cmp(b),
            (Writable::Bytes(a), Writable::Bytes(b)) => a.cmp(b),
            (Writable::Array(a), Writable::Array(b)) => a.cmp(b),
            (Writable::Map(a), Writable::Map(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Writable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Writable {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Writable {}

/// Text output rendering: text raw, numbers plain, containers bracketed.
impl fmt::Display for Writable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Writable::Null => Ok(()),
            Writable::Boolean(b) => write!(f, "{}", b),
            Writable::Int(i) => write!(f, "{}", i),
            Writable::Long(l) => write!(f, "{}", l),
            Writable::Double(d) => write!(f, "{}", d),
            Writable::Text(s) => f.write_str(s),
            Writable::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Writable::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Writable::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_output_rendering() {
        assert_eq!(Writable::text("anything").to_string(), "anything");
        assert_eq!(Writable::Long(21).to_string(), "21");
        assert_eq!(
            Writable::Array(vec![Writable::text("a"), Writable::Long(2)]).to_string(),
            "[a,2]"
        );
        assert_eq!(Writable::Bytes(vec![0, 255]).to_string(), "00ff");
    }

    #[test]
    fn longs_sort_numerically() {
        let mut keys = vec![Writable::Long(10), Writable::Long(-2), Writable::Long(3)];
        keys.sort();
        assert_eq!(keys, vec![Writable::Long(-2), Writable::Long(3), Writable::Long(10)]);
    }
}
