// ABOUTME: Runtime value types produced and consumed by the evaluator

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

pub type RecordData = Rc<RefCell<HashMap<String, Value>>>;
pub type ArrayData = Rc<RefCell<ArrayValue>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub dims: Vec<(i64, i64)>,
    pub elems: Vec<Value>,
}

impl ArrayValue {
    /// Row-major linear index: `idx = sum_i (x_i - l_i) * prod_{j>i}(h_j - l_j + 1)`.
    pub fn linear_index(&self, indices: &[i64]) -> Option<usize> {
        if indices.len() != self.dims.len() {
            return None;
        }
        let mut idx: i64 = 0;
        for (i, &(lo, hi)) in self.dims.iter().enumerate() {
            let x = indices[i];
            if x < lo || x > hi {
                return None;
            }
            let mut stride = 1i64;
            for &(lo2, hi2) in &self.dims[i + 1..] {
                stride *= hi2 - lo2 + 1;
            }
            idx += (x - lo) * stride;
        }
        usize::try_from(idx).ok()
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Bool(bool),
    Str(String),
    /// Heap address; `None` is Pascal `nil`.
    Pointer(Option<usize>),
    Set(BTreeSet<i64>),
    Record(RecordData),
    Array(ArrayData),
    Nil,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => (a - b).abs() < 1e-4,
            (Value::Integer(a), Value::Real(b)) | (Value::Real(b), Value::Integer(a)) => {
                (*a as f64 - b).abs() < 1e-4
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

impl Value {
    pub fn default_for_type(type_name: &str) -> Value {
        match type_name.to_ascii_lowercase().as_str() {
            "integer" => Value::Integer(0),
            "real" => Value::Real(0.0),
            "boolean" => Value::Bool(false),
            "char" => Value::Str(String::new()),
            "string" => Value::Str(String::new()),
            _ => Value::Nil,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) => Some(*r as i64),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::Pointer(p) => p.is_some(),
            Value::Nil => false,
            Value::Str(_) | Value::Set(_) | Value::Record(_) | Value::Array(_) => true,
        }
    }

    /// Pascal records and arrays are value types: a plain `Clone` of
    /// `Value::Record`/`Value::Array` would alias the same `Rc`, which is
    /// correct for `var` parameters but wrong for by-value assignment,
    /// by-value parameter binding, and variable initialization.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Record(fields) => {
                let copied: HashMap<String, Value> = fields
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect();
                Value::Record(Rc::new(RefCell::new(copied)))
            }
            Value::Array(arr) => {
                let arr = arr.borrow();
                let copied = ArrayValue {
                    dims: arr.dims.clone(),
                    elems: arr.elems.iter().map(|v| v.deep_clone()).collect(),
                };
                Value::Array(Rc::new(RefCell::new(copied)))
            }
            other => other.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Pointer(_) => "pointer",
            Value::Set(_) => "set",
            Value::Record(_) => "record",
            Value::Array(_) => "array",
            Value::Nil => "nil",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Str(s) => write!(f, "{}", s),
            Value::Pointer(None) => write!(f, "nil"),
            Value::Pointer(Some(addr)) => write!(f, "^{}", addr),
            Value::Set(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "(")?;
                let fields = fields.borrow();
                let mut entries: Vec<_> = fields.iter().collect();
                entries.sort_by_key(|(k, _)| (*k).clone());
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, ")")
            }
            Value::Array(arr) => {
                write!(f, "[")?;
                let arr = arr.borrow();
                for (i, v) in arr.elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Nil => write!(f, "nil"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_display_has_no_decimal() {
        assert_eq!(format!("{}", Value::Integer(42)), "42");
    }

    #[test]
    fn bool_display_is_pascal_cased() {
        assert_eq!(format!("{}", Value::Bool(true)), "True");
        assert_eq!(format!("{}", Value::Bool(false)), "False");
    }

    #[test]
    fn truthy_coerces_nonzero_numerics_and_nonnil_composites() {
        assert!(Value::Integer(5).truthy());
        assert!(!Value::Integer(0).truthy());
        assert!(Value::Real(0.1).truthy());
        assert!(!Value::Real(0.0).truthy());
        assert!(!Value::Nil.truthy());
        assert!(!Value::Pointer(None).truthy());
        assert!(Value::Pointer(Some(0)).truthy());
        assert!(Value::Str("x".to_string()).truthy());
    }

    #[test]
    fn real_equality_has_tolerance() {
        assert_eq!(Value::Real(1.00001), Value::Real(1.00002));
        assert_ne!(Value::Real(1.0), Value::Real(1.1));
    }

    #[test]
    fn array_linear_index_is_row_major() {
        let arr = ArrayValue {
            dims: vec![(1, 2), (1, 3)],
            elems: (0..6).map(Value::Integer).collect(),
        };
        assert_eq!(arr.linear_index(&[1, 1]), Some(0));
        assert_eq!(arr.linear_index(&[1, 3]), Some(2));
        assert_eq!(arr.linear_index(&[2, 1]), Some(3));
        assert_eq!(arr.linear_index(&[2, 3]), Some(5));
        assert_eq!(arr.linear_index(&[3, 1]), None);
    }

    #[test]
    fn record_display_is_sorted_by_field_name() {
        let mut fields = HashMap::new();
        fields.insert("b".to_string(), Value::Integer(2));
        fields.insert("a".to_string(), Value::Integer(1));
        let rec = Value::Record(Rc::new(RefCell::new(fields)));
        assert_eq!(format!("{}", rec), "(a: 1; b: 2)");
    }
}
