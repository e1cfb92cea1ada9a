//! Value kind enumeration

use std::fmt;

/// Kind of a [`crate::Value`] node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Absent value
    Null,
    /// Boolean value
    Bool,
    /// Signed integer value
    Int,
    /// Floating point value
    Float,
    /// UTF-8 string value
    Str,
    /// Raw byte string
    Bytes,
    /// Ordered sequence
    Seq,
    /// String-keyed mapping
    Map,
    /// Named record
    Record,
}

impl ValueKind {
    /// Lowercase name used in error messages
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::Seq => "seq",
            ValueKind::Map => "map",
            ValueKind::Record => "record",
        }
    }

    /// Whether the kind is a leaf
    pub fn is_scalar(self) -> bool {
        !matches!(self, ValueKind::Seq | ValueKind::Map | ValueKind::Record)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let cases = vec![
            (ValueKind::Null, "null"),
            (ValueKind::Int, "int"),
            (ValueKind::Bytes, "bytes"),
            (ValueKind::Record, "record"),
        ];

        for (kind, expected) in cases {
            assert_eq!(kind.to_string(), expected);
        }
    }

    #[test]
    fn test_kind_scalar() {
        assert!(ValueKind::Float.is_scalar());
        assert!(!ValueKind::Seq.is_scalar());
        assert!(!ValueKind::Record.is_scalar());
    }
}
