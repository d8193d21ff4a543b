// Oryx Stems
// A stem is the storage behind a stem variable: a default value plus a
// tree of tails. Reads of unset tails resolve to the default or, when the
// stem has been dropped, to the compound variable's own name.

use super::compound::{CompoundElement, CompoundTable, CompoundTail};
use super::gc::{Marker, Trace};
use super::value::Value;
use crate::error::{ErrorKind, OryxError, OryxResult};
use std::sync::Arc;

/// Outcome of reading a compound variable
#[derive(Debug, Clone)]
pub enum CompoundRead {
    Value(Value),
    /// No value: the caller raises NOVALUE (or uses `default`, the
    /// synthesized name, when nobody intercepts it)
    NoValue {
        name: String,
        default: Value,
        element: Option<Arc<CompoundElement>>,
    },
}

/// Elements selected for a numeric-range sort, with their current values
#[derive(Debug)]
pub struct SortRange {
    pub elements: Vec<Arc<CompoundElement>>,
    pub values: Vec<Value>,
}

impl SortRange {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Store `values` back into the same elements, in order
    pub fn write_back(&self, values: Vec<Value>) {
        for (element, value) in self.elements.iter().zip(values) {
            element.set(value);
        }
    }
}

pub struct Stem {
    name: Arc<str>,
    value: Value,
    /// true until a default value is assigned to the bare stem
    dropped: bool,
    tails: CompoundTable,
}

impl Stem {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name: Arc<str> = name.into();
        Self {
            value: Value::String(name.clone()),
            name,
            dropped: true,
            tails: CompoundTable::new(),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// The default value (the stem name while dropped)
    pub fn value(&self) -> Value {
        self.value.clone()
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    /// Assign the bare stem: new default, every tail cleared
    pub fn set_value(&mut self, value: Value) {
        self.tails.clear();
        self.value = value;
        self.dropped = false;
    }

    /// Forget the default value; tails are kept
    pub fn drop_value(&mut self) {
        self.value = Value::String(self.name.clone());
        self.dropped = true;
    }

    /// Existing element for a tail, de-aliased
    pub fn find(&self, tail: &CompoundTail) -> Option<Arc<CompoundElement>> {
        self.tails.find(tail.as_str()).map(|e| e.real_variable())
    }

    /// Element for a tail, created when missing
    pub fn element(&mut self, tail: &CompoundTail) -> Arc<CompoundElement> {
        self.tails.find_or_insert(tail.as_str()).0.real_variable()
    }

    /// Element handed to another frame by EXPOSE. A new element starts
    /// with the stem default (when there is one); an existing element is
    /// returned as is, dropped or not.
    pub fn expose(&mut self, tail: &CompoundTail) -> Arc<CompoundElement> {
        let (element, created) = self.tails.find_or_insert(tail.as_str());
        if created && !self.dropped {
            element.set(self.value.clone());
        }
        element.real_variable()
    }

    /// Make `tail` of this stem an alias for `target`
    pub fn alias(&mut self, tail: &CompoundTail, target: &Arc<CompoundElement>) -> Arc<CompoundElement> {
        let (element, _) = self.tails.find_or_insert(tail.as_str());
        element.expose(target);
        element.real_variable()
    }

    pub fn set(&mut self, tail: &CompoundTail, value: Value) {
        self.element(tail).set(value);
    }

    /// Drop one compound variable; the element itself stays in the tree
    pub fn drop_element(&mut self, tail: &CompoundTail) -> Option<Value> {
        self.find(tail).and_then(|e| e.drop_value())
    }

    /// Read `tail`, reached through the variable `variable_name`
    pub fn evaluate(&self, tail: &CompoundTail, variable_name: &str) -> CompoundRead {
        match self.tails.find(tail.as_str()) {
            None => {
                if !self.dropped {
                    return CompoundRead::Value(self.value.clone());
                }
                let name = tail.compound_name(variable_name);
                CompoundRead::NoValue {
                    default: Value::string(&name),
                    name,
                    element: None,
                }
            }
            Some(element) => match element.value() {
                Some(value) => CompoundRead::Value(value),
                None => {
                    let name = tail.compound_name(&self.name);
                    CompoundRead::NoValue {
                        default: Value::string(&name),
                        name,
                        element: Some(element.real_variable()),
                    }
                }
            },
        }
    }

    /// Value of a tail for collection-style access (AT, []): the stem
    /// default when unset, never NOVALUE
    pub fn get(&self, tail: &CompoundTail) -> Value {
        match self.find(tail).and_then(|e| e.value()) {
            Some(value) => value,
            None => self.value.clone(),
        }
    }

    pub fn has_index(&self, tail: &CompoundTail) -> bool {
        self.find(tail).map(|e| e.has_value()).unwrap_or(false)
    }

    /// Drop a tail, returning the removed value
    pub fn remove(&mut self, tail: &CompoundTail) -> Option<Value> {
        self.drop_element(tail)
    }

    /// (tail, value) for every tail holding a value, in tail order
    pub fn entries(&self) -> Vec<(Arc<str>, Value)> {
        self.tails
            .iter()
            .filter_map(|e| e.value().map(|v| (e.tail().clone(), v)))
            .collect()
    }

    pub fn items(&self) -> usize {
        self.tails.iter().filter(|e| e.has_value()).count()
    }

    pub fn all_indexes(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(tail, _)| Value::String(tail)).collect()
    }

    pub fn all_items(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// First tail holding `target`
    pub fn index_of(&self, target: &Value) -> Option<Arc<str>> {
        self.entries()
            .into_iter()
            .find(|(_, value)| value.identical(target))
            .map(|(tail, _)| tail)
    }

    /// Clear every tail; the default value is kept
    pub fn empty(&mut self) {
        self.tails.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items() == 0
    }

    /// Independent copy: same default, fresh elements holding the same values
    pub fn copy(&self) -> Stem {
        let mut copy = Stem::new(self.name.clone());
        copy.value = self.value.clone();
        copy.dropped = self.dropped;
        for (tail, value) in self.entries() {
            copy.set(&CompoundTail::resolved(tail.to_string()), value);
        }
        copy
    }

    /// Select `prefix.first` .. `prefix.last` for sorting. `prefix.0` must
    /// hold the element count and every index in the range must be set.
    pub fn sort_range(&self, prefix: &str, first: usize, last: Option<usize>) -> OryxResult<SortRange> {
        let size_tail = CompoundTail::indexed(prefix, 0);
        let size = self
            .find(&size_tail)
            .and_then(|e| e.value())
            .ok_or_else(|| {
                OryxError::new(
                    ErrorKind::SortMissingSize,
                    format!("No size indicator \"{}\" for sort", size_tail.compound_name(&self.name)),
                )
            })?;
        let count = size.as_whole_number().ok_or_else(|| {
            OryxError::new(
                ErrorKind::SortNonNumericSize,
                format!(
                    "Size indicator \"{}\" is not a whole number: {:?}",
                    size_tail.compound_name(&self.name),
                    size
                ),
            )
        })?;

        let empty = SortRange {
            elements: Vec::new(),
            values: Vec::new(),
        };
        if count == 0 && first == 1 && last.is_none() {
            return Ok(empty);
        }

        let last = last.unwrap_or(count);
        if first == 0 || first > count || last > count || last < first {
            return Err(OryxError::new(
                ErrorKind::SortBounds,
                format!("Sort range {}..{} is outside 1..{}", first, last, count),
            ));
        }

        let mut range = SortRange {
            elements: Vec::with_capacity(last - first + 1),
            values: Vec::with_capacity(last - first + 1),
        };
        for index in first..=last {
            let tail = CompoundTail::indexed(prefix, index);
            let element = self.find(&tail);
            match element.as_ref().and_then(|e| e.value()) {
                Some(value) => {
                    range.values.push(value);
                    if let Some(element) = element {
                        range.elements.push(element);
                    }
                }
                None => {
                    return Err(OryxError::new(
                        ErrorKind::SortSparse,
                        format!("Element \"{}\" is missing; cannot sort a sparse array", tail.compound_name(&self.name)),
                    ))
                }
            }
        }
        Ok(range)
    }
}

impl Trace for Stem {
    fn mark_reachable(&self, marker: &mut Marker) {
        marker.mark_value(&self.value);
        self.tails.mark_reachable(marker);
    }
}
