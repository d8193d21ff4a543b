// Oryx Runtime Values
// Strings are immediate; everything else is an id into one of the VM arenas
// (or a shared array), so values are cheap to clone and never own a cycle.

use super::class::ClassId;
use super::method::MethodId;
use super::object::ObjectId;
use super::vm::PackageId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub type ArrayRef = Arc<Mutex<Vec<Value>>>;

/// Runtime value types
#[derive(Clone)]
pub enum Value {
    /// The nil object
    Nil,
    String(Arc<str>),
    Array(ArrayRef),
    /// Instance of a class (plain objects, directories, stems, messages)
    Object(ObjectId),
    Class(ClassId),
    Method(MethodId),
    Package(PackageId),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(Mutex::new(items)))
    }

    /// Rexx boolean: "1" or "0"
    pub fn boolean(b: bool) -> Self {
        Value::string(if b { "1" } else { "0" })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Class(_) => "Class",
            Value::Method(_) => "Method",
            Value::Package(_) => "Package",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Value::Class(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<MethodId> {
        match self {
            Value::Method(id) => Some(*id),
            _ => None,
        }
    }

    /// A whole, non-negative number in Rexx string form ("12", " 3 ", "4.0")
    pub fn as_whole_number(&self) -> Option<usize> {
        let text = self.as_str()?.trim();
        if let Ok(n) = text.parse::<usize>() {
            return Some(n);
        }
        let f: f64 = text.parse().ok()?;
        if f >= 0.0 && f.fract() == 0.0 && f <= usize::MAX as f64 {
            Some(f as usize)
        } else {
            None
        }
    }

    /// Identity comparison (`==` on references, content on strings)
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Method(a), Value::Method(b)) => a == b,
            (Value::Package(a), Value::Package(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.identical(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(arr) => write!(f, "Array({:?})", arr.lock()),
            Value::Object(id) => write!(f, "Object({:?})", id),
            Value::Class(id) => write!(f, "Class({:?})", id),
            Value::Method(id) => write!(f, "Method({:?})", id),
            Value::Package(id) => write!(f, "Package({:?})", id),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::String(Arc::from(n.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_number() {
        assert_eq!(Value::from("12").as_whole_number(), Some(12));
        assert_eq!(Value::from(" 3 ").as_whole_number(), Some(3));
        assert_eq!(Value::from("4.0").as_whole_number(), Some(4));
        assert_eq!(Value::from("4.5").as_whole_number(), None);
        assert_eq!(Value::from("-1").as_whole_number(), None);
        assert_eq!(Value::from("abc").as_whole_number(), None);
        assert_eq!(Value::Nil.as_whole_number(), None);
    }

    #[test]
    fn test_identity() {
        let arr = Value::array(vec![]);
        assert_eq!(arr, arr.clone());
        assert_ne!(arr, Value::array(vec![]));
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_ne!(Value::from("a"), Value::Nil);
    }
}
