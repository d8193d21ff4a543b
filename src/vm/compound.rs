// Oryx Compound Variables
// Tail resolution, compound table elements and the balanced tail tree of a stem.

use super::activity::Activity;
use super::gc::{Marker, Trace};
use super::value::Value;
use super::variables::{Variable, Watchable};
use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

/// Separator placed between tail components
pub const TAIL_SEPARATOR: char = '.';

/// A resolved compound tail ("A.B" for `stem.a.b` with A='A', B='B')
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompoundTail {
    tail: String,
}

impl CompoundTail {
    /// Join already-evaluated components with the tail separator
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Self {
        let mut tail = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                tail.push(TAIL_SEPARATOR);
            }
            tail.push_str(part.as_ref());
        }
        Self { tail }
    }

    pub fn resolved(tail: impl Into<String>) -> Self {
        Self { tail: tail.into() }
    }

    /// `prefix` followed by a decimal index (sort uses `prefix.0`..`prefix.N`)
    pub fn indexed(prefix: &str, index: usize) -> Self {
        Self {
            tail: format!("{}{}", prefix, index),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.tail
    }

    /// Fully qualified name used for NOVALUE and tracing
    pub fn compound_name(&self, stem_name: &str) -> String {
        let mut name = String::with_capacity(stem_name.len() + self.tail.len());
        name.push_str(stem_name);
        name.push_str(&self.tail);
        name
    }
}

/// One tail of a stem.
///
/// An element can be an alias for an element of another stem (created by
/// PROCEDURE EXPOSE of a compound variable). The alias target is fixed once
/// set and is always a real element, so reads and writes are one hop away.
pub struct CompoundElement {
    variable: Variable,
    real: OnceLock<Arc<CompoundElement>>,
}

impl CompoundElement {
    pub fn new(tail: Arc<str>) -> Arc<Self> {
        Arc::new(Self {
            variable: Variable::new(tail),
            real: OnceLock::new(),
        })
    }

    pub fn tail(&self) -> &Arc<str> {
        self.variable.name()
    }

    pub fn is_alias(&self) -> bool {
        self.real.get().is_some()
    }

    /// The element that actually holds the value
    pub fn real_variable(self: &Arc<Self>) -> Arc<CompoundElement> {
        match self.real.get() {
            Some(real) => real.clone(),
            None => self.clone(),
        }
    }

    /// Turn this element into an alias for `target`; the first call wins
    pub fn expose(&self, target: &Arc<CompoundElement>) -> bool {
        let real = target.real_variable();
        if std::ptr::eq(Arc::as_ptr(&real), self) {
            return false;
        }
        self.real.set(real).is_ok()
    }

    fn cell(&self) -> &Variable {
        match self.real.get() {
            Some(real) => &real.variable,
            None => &self.variable,
        }
    }

    pub fn value(&self) -> Option<Value> {
        self.cell().value()
    }

    pub fn has_value(&self) -> bool {
        self.cell().has_value()
    }

    pub fn set(&self, value: Value) {
        self.cell().set(value);
    }

    pub fn drop_value(&self) -> Option<Value> {
        self.cell().drop_value()
    }

    pub fn dependents(&self) -> usize {
        self.cell().dependents()
    }
}

impl std::fmt::Debug for CompoundElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompoundElement({}, alias: {})", self.tail(), self.is_alias())
    }
}

impl Watchable for CompoundElement {
    fn set_guard(&self, activity: &Arc<Activity>) {
        self.cell().set_guard(activity);
    }

    fn clear_guard(&self, activity: &Arc<Activity>) {
        self.cell().clear_guard(activity);
    }
}

impl Trace for CompoundElement {
    fn mark_reachable(&self, marker: &mut Marker) {
        self.cell().mark_reachable(marker);
    }
}

type NodeIndex = u32;

struct TreeNode {
    element: Arc<CompoundElement>,
    left: Option<NodeIndex>,
    right: Option<NodeIndex>,
    parent: Option<NodeIndex>,
    left_depth: u16,
    right_depth: u16,
}

impl TreeNode {
    fn height(&self) -> u16 {
        1 + self.left_depth.max(self.right_depth)
    }
}

/// Height-balanced tree of a stem's tails, ordered by tail string.
///
/// Nodes are only ever added; dropping a tail clears its value and keeps the
/// node so guard dependents and aliases stay attached. `clear` resets the
/// whole tree (bare stem assignment).
#[derive(Default)]
pub struct CompoundTable {
    nodes: Vec<TreeNode>,
    root: Option<NodeIndex>,
}

impl CompoundTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    fn node(&self, index: NodeIndex) -> &TreeNode {
        &self.nodes[index as usize]
    }

    fn node_mut(&mut self, index: NodeIndex) -> &mut TreeNode {
        &mut self.nodes[index as usize]
    }

    /// The element stored for `tail` (possibly an alias)
    pub fn find(&self, tail: &str) -> Option<&Arc<CompoundElement>> {
        let mut cursor = self.root;
        while let Some(index) = cursor {
            let node = self.node(index);
            cursor = match tail.cmp(&**node.element.tail()) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(&node.element),
            };
        }
        None
    }

    /// Find `tail`, inserting a fresh element when missing.
    /// Returns the stored element and whether it was created.
    pub fn find_or_insert(&mut self, tail: &str) -> (Arc<CompoundElement>, bool) {
        let mut parent = None;
        let mut went_left = false;
        let mut cursor = self.root;
        while let Some(index) = cursor {
            let node = self.node(index);
            match tail.cmp(&**node.element.tail()) {
                Ordering::Less => {
                    parent = Some(index);
                    went_left = true;
                    cursor = node.left;
                }
                Ordering::Greater => {
                    parent = Some(index);
                    went_left = false;
                    cursor = node.right;
                }
                Ordering::Equal => return (node.element.clone(), false),
            }
        }

        let element = CompoundElement::new(Arc::from(tail));
        let index = self.nodes.len() as NodeIndex;
        self.nodes.push(TreeNode {
            element: element.clone(),
            left: None,
            right: None,
            parent,
            left_depth: 0,
            right_depth: 0,
        });

        match parent {
            None => self.root = Some(index),
            Some(p) => {
                if went_left {
                    self.node_mut(p).left = Some(index);
                } else {
                    self.node_mut(p).right = Some(index);
                }
                self.rebalance_from(Some(p));
            }
        }
        (element, true)
    }

    fn subtree_height(&self, index: Option<NodeIndex>) -> u16 {
        index.map(|i| self.node(i).height()).unwrap_or(0)
    }

    fn update_depths(&mut self, index: NodeIndex) {
        let left = self.subtree_height(self.node(index).left);
        let right = self.subtree_height(self.node(index).right);
        let node = self.node_mut(index);
        node.left_depth = left;
        node.right_depth = right;
    }

    fn rebalance_from(&mut self, mut cursor: Option<NodeIndex>) {
        while let Some(index) = cursor {
            self.update_depths(index);
            let (left_depth, right_depth) = {
                let node = self.node(index);
                (node.left_depth, node.right_depth)
            };

            let subtree_root = if left_depth > right_depth + 1 {
                if let Some(left) = self.node(index).left {
                    let l = self.node(left);
                    if l.right_depth > l.left_depth {
                        self.rotate_left(left);
                    }
                }
                self.rotate_right(index)
            } else if right_depth > left_depth + 1 {
                if let Some(right) = self.node(index).right {
                    let r = self.node(right);
                    if r.left_depth > r.right_depth {
                        self.rotate_right(right);
                    }
                }
                self.rotate_left(index)
            } else {
                index
            };
            cursor = self.node(subtree_root).parent;
        }
    }

    /// Point whatever referenced `old` as a child at `new`
    fn replace_child(&mut self, parent: Option<NodeIndex>, old: NodeIndex, new: NodeIndex) {
        match parent {
            None => self.root = Some(new),
            Some(p) => {
                if self.node(p).left == Some(old) {
                    self.node_mut(p).left = Some(new);
                } else {
                    self.node_mut(p).right = Some(new);
                }
            }
        }
    }

    fn rotate_right(&mut self, index: NodeIndex) -> NodeIndex {
        let Some(pivot) = self.node(index).left else {
            return index;
        };
        let parent = self.node(index).parent;
        let moved = self.node(pivot).right;

        self.node_mut(index).left = moved;
        if let Some(m) = moved {
            self.node_mut(m).parent = Some(index);
        }
        self.node_mut(pivot).right = Some(index);
        self.node_mut(pivot).parent = parent;
        self.node_mut(index).parent = Some(pivot);
        self.replace_child(parent, index, pivot);

        self.update_depths(index);
        self.update_depths(pivot);
        pivot
    }

    fn rotate_left(&mut self, index: NodeIndex) -> NodeIndex {
        let Some(pivot) = self.node(index).right else {
            return index;
        };
        let parent = self.node(index).parent;
        let moved = self.node(pivot).left;

        self.node_mut(index).right = moved;
        if let Some(m) = moved {
            self.node_mut(m).parent = Some(index);
        }
        self.node_mut(pivot).left = Some(index);
        self.node_mut(pivot).parent = parent;
        self.node_mut(index).parent = Some(pivot);
        self.replace_child(parent, index, pivot);

        self.update_depths(index);
        self.update_depths(pivot);
        pivot
    }

    fn leftmost(&self, mut index: NodeIndex) -> NodeIndex {
        while let Some(left) = self.node(index).left {
            index = left;
        }
        index
    }

    fn first(&self) -> Option<NodeIndex> {
        self.root.map(|r| self.leftmost(r))
    }

    /// In-order successor, walking parent links
    fn next(&self, index: NodeIndex) -> Option<NodeIndex> {
        if let Some(right) = self.node(index).right {
            return Some(self.leftmost(right));
        }
        let mut child = index;
        let mut parent = self.node(index).parent;
        while let Some(p) = parent {
            if self.node(p).left == Some(child) {
                return Some(p);
            }
            child = p;
            parent = self.node(p).parent;
        }
        None
    }

    /// Elements in tail order
    pub fn iter(&self) -> CompoundIter<'_> {
        CompoundIter {
            table: self,
            cursor: self.first(),
        }
    }

    /// Depth of the tree (0 when empty)
    pub fn depth(&self) -> u16 {
        self.subtree_height(self.root)
    }
}

pub struct CompoundIter<'a> {
    table: &'a CompoundTable,
    cursor: Option<NodeIndex>,
}

impl<'a> Iterator for CompoundIter<'a> {
    type Item = &'a Arc<CompoundElement>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        self.cursor = self.table.next(index);
        Some(&self.table.node(index).element)
    }
}

impl Trace for CompoundTable {
    fn mark_reachable(&self, marker: &mut Marker) {
        for element in self.iter() {
            element.mark_reachable(marker);
        }
    }
}
