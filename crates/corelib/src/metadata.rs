//! Already-decoded system table rows.
//!
//! Topology refresh reads `system.local` / `system.peers` and hands each row
//! to [`Host::set`](crate::host::Host::set). Decoding happens elsewhere; the
//! core only needs named field access through [`Row`].

use crate::address::Address;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// A decoded column value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Uuid(u128),
    /// Raw inet bytes (4 or 16 long when well-formed).
    Inet(Vec<u8>),
    List(Vec<Value>),
    Set(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Value::List(_) | Value::Set(_))
    }

    /// Elements of a collection value; `None` for scalars.
    pub fn iter(&self) -> Option<impl Iterator<Item = &Value>> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items.iter()),
            _ => None,
        }
    }

    /// Decode an inet value, attaching `port`.
    pub fn as_inet(&self, port: u16) -> Result<Address> {
        match self {
            Value::Inet(bytes) => Address::from_inet_bytes(bytes, port),
            _ => Err(Error::UnexpectedType { expected: "inet" }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uuid(u) => write!(f, "{u:032x}"),
            Value::Inet(bytes) => match Address::from_inet_bytes(bytes, 0) {
                Ok(addr) => write!(f, "{}", addr.ip()),
                Err(_) => write!(f, "{bytes:?}"),
            },
            Value::List(items) | Value::Set(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Named access to the columns of one row.
pub trait Row {
    fn get_by_name(&self, name: &str) -> Option<&Value>;

    /// String form of a non-null column.
    fn get_string_by_name(&self, name: &str) -> Option<String> {
        self.get_by_name(name)
            .filter(|v| !v.is_null())
            .map(Value::to_string)
    }
}

/// In-memory row, handy for tests and tooling.
#[derive(Clone, Debug, Default)]
pub struct MapRow {
    columns: HashMap<String, Value>,
}

impl MapRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.columns.insert(name.into(), value);
        self
    }

    pub fn with_text(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.with(name, Value::Text(text.into()))
    }
}

impl Row for MapRow {
    fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }
}
