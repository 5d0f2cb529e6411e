//! The SpellScript value model.
//!
//! Values are dynamically typed: a tagged union over six variants.
//! Collections are reference-semantic: summoning a collection under a
//! second name aliases the same storage, so indexed writes are visible
//! through every alias. Every other variant behaves as a copy on
//! assignment.

use crate::error::SpellError;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// A single SpellScript value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Arbitrary-precision integer.
    Integer(BigInt),
    /// IEEE 754 double.
    Floating(f64),
    /// Immutable UTF-8 text.
    Text(String),
    /// Boolean truth value.
    Truth(bool),
    /// Ordered mutable sequence, shared between aliases.
    List(Rc<RefCell<Vec<Value>>>),
    /// The uninitialized value.
    Absent,
}

impl Value {
    /// Wrap a machine integer.
    pub fn integer(n: i64) -> Self {
        Value::Integer(BigInt::from(n))
    }

    /// Build a fresh collection from its elements.
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Human-readable kind name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) | Value::Floating(_) => "number",
            Value::Text(_) => "text",
            Value::Truth(_) => "truth",
            Value::List(_) => "collection",
            Value::Absent => "absence",
        }
    }

    /// Standard truthiness: non-zero, non-empty, non-absent.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Integer(n) => !n.is_zero(),
            Value::Floating(x) => *x != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Truth(b) => *b,
            Value::List(items) => !items.borrow().is_empty(),
            Value::Absent => false,
        }
    }

    /// Numeric view of this value, when it has one. Truth values are not
    /// numbers here: arithmetic rejects them.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => n.to_f64(),
            Value::Floating(x) => Some(*x),
            _ => None,
        }
    }

    /// Numeric view for comparisons, where truth counts as 1 or 0.
    fn comparable(&self) -> Option<f64> {
        match self {
            Value::Truth(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_float(),
        }
    }

    /// Loose equality in the surface language's sense: numeric kinds
    /// compare by value, text with text, collections element-wise, and
    /// absence only equals absence.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Absent, Value::Absent) => true,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loosely_equals(y))
            }
            _ => match (self.comparable(), other.comparable()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Ordering for `greater than` and `less than`. Numbers and truth
    /// values order numerically, text orders lexicographically; any other
    /// pairing is a type error.
    pub fn compare(&self, other: &Value) -> Result<Ordering, SpellError> {
        let incomparable =
            || SpellError::Type(format!("cannot compare {} with {}", self.kind(), other.kind()));
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            _ => match (self.comparable(), other.comparable()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(incomparable),
                _ => Err(incomparable()),
            },
        }
    }
}

/// The default text form: what Inscribe prints and `bound with` joins.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Floating(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Truth(true) => write!(f, "True"),
            Value::Truth(false) => write!(f, "False"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Absent => write!(f, "None"),
        }
    }
}
