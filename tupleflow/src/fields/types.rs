//! Field value types used by casts and typed aggregators.

use crate::errors::InvalidOptionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The value type a field is relabeled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    String,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Long => write!(f, "long"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::Bool => write!(f, "bool"),
            Self::String => write!(f, "string"),
        }
    }
}

impl FromStr for FieldType {
    type Err = InvalidOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(Self::Int),
            "long" => Ok(Self::Long),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "bool" | "boolean" => Ok(Self::Bool),
            "string" => Ok(Self::String),
            other => Err(InvalidOptionError::new(format!("unknown field type '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_round_trip_names() {
        for ty in [FieldType::Int, FieldType::Long, FieldType::Double, FieldType::String] {
            assert_eq!(ty.to_string().parse::<FieldType>().unwrap(), ty);
        }
        assert_eq!("boolean".parse::<FieldType>().unwrap(), FieldType::Bool);
        assert!("decimal".parse::<FieldType>().is_err());
    }
}
