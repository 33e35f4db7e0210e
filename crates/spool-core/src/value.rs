//! Values passed between units of work.

use std::any::Any;
use std::fmt;

use crate::scheduler::TaskId;

/// A value handed to a unit when it is resumed, or produced by it.
///
/// Units exchange these through delegation: a child's completion value
/// becomes its parent's next input. `Boxed` carries anything else (sockets,
/// application structs) and is recovered with [`Value::downcast`].
#[derive(Default)]
pub enum Value {
    /// No value; the input of a freshly started unit
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Handle of a task spawned from inside a unit
    Task(TaskId),
    Boxed(Box<dyn Any>),
}

impl Value {
    /// Wrap an arbitrary value.
    pub fn boxed<T: Any>(value: T) -> Self {
        Value::Boxed(Box::new(value))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Take the boxed payload out if it has type `T`; otherwise give the
    /// value back unchanged.
    pub fn downcast<T: Any>(self) -> Result<T, Value> {
        match self {
            Value::Boxed(inner) => inner.downcast::<T>().map(|b| *b).map_err(Value::Boxed),
            other => Err(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Task(id) => write!(f, "Task({})", id.as_u64()),
            Value::Boxed(_) => write!(f, "Boxed(..)"),
        }
    }
}

// Boxed payloads never compare equal; everything else compares structurally.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Task(a), Value::Task(b)) => a == b,
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<TaskId> for Value {
    fn from(id: TaskId) -> Self {
        Value::Task(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_roundtrip() {
        let v = Value::boxed((1u8, "x"));
        assert_eq!(v.downcast::<(u8, &str)>().ok(), Some((1, "x")));

        let v = Value::boxed(5u32);
        let back = v.downcast::<String>().unwrap_err();
        assert!(matches!(back, Value::Boxed(_)));

        assert!(Value::Int(1).downcast::<i64>().is_err());
    }

    #[test]
    fn test_equality_ignores_boxed() {
        assert_eq!(Value::from("a"), Value::Str("a".into()));
        assert_eq!(Value::List(vec![1i64.into()]), Value::List(vec![Value::Int(1)]));
        assert_ne!(Value::boxed(1), Value::boxed(1));
    }

    #[test]
    fn test_default_is_nil() {
        assert!(Value::default().is_nil());
    }
}
