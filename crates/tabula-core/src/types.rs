//! Declared column types.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Size marker for unbounded text and binary columns.
pub const SIZE_MAX: i32 = -1;

/// The declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// 64-bit integer; identity columns always use this.
    BigInt,
    /// 32-bit integer.
    Int,
    /// Unicode text, bounded by the field size.
    NVarChar,
    /// Binary data, bounded by the field size.
    Binary,
    /// Bit.
    Bool,
    /// Double precision float.
    Double,
    /// Fixed-point number with size as precision and scale.
    Decimal,
}

impl FieldType {
    /// SQL Server type name for DDL.
    pub fn sql_name(self, size: i32, scale: i32) -> String {
        let bounded = |name: &str| {
            if size == SIZE_MAX {
                format!("{name}(MAX)")
            } else {
                format!("{name}({size})")
            }
        };
        match self {
            FieldType::BigInt => "BIGINT".to_string(),
            FieldType::Int => "INT".to_string(),
            FieldType::NVarChar => bounded("NVARCHAR"),
            FieldType::Binary => bounded("VARBINARY"),
            FieldType::Bool => "BIT".to_string(),
            FieldType::Double => "FLOAT".to_string(),
            FieldType::Decimal => format!("DECIMAL({size}, {scale})"),
        }
    }

    /// Whether a value may be stored in a field of this type.
    ///
    /// NULL is accepted here; nullability is checked separately.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (FieldType::BigInt, Value::BigInt(_) | Value::Int(_))
                | (FieldType::Int, Value::Int(_))
                | (FieldType::NVarChar, Value::Text(_))
                | (FieldType::Binary, Value::Bytes(_))
                | (FieldType::Bool, Value::Bool(_))
                | (FieldType::Double, Value::Double(_) | Value::Int(_) | Value::BigInt(_))
                | (FieldType::Decimal, Value::Decimal(_) | Value::Int(_) | Value::BigInt(_))
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            FieldType::BigInt => "BIGINT",
            FieldType::Int => "INT",
            FieldType::NVarChar => "NVARCHAR",
            FieldType::Binary => "BINARY",
            FieldType::Bool => "BOOL",
            FieldType::Double => "DOUBLE",
            FieldType::Decimal => "DECIMAL",
        }
    }
}
