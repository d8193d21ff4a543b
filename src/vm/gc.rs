// Oryx Garbage Collector
// Mark-and-sweep over the VM arenas
//
// Design:
// - Objects and methods live in arenas and refer to each other by id, so
//   nothing is freed until a collection sweeps it
// - Every entity that holds references reports them through Trace
// - Classes and packages are permanent roots; callers pass the rest
// - Unreachable objects that define UNINIT get it run once and survive
//   until the next collection

use super::caller::Activation;
use super::activity::Activity;
use super::method::MethodId;
use super::object::ObjectId;
use super::value::Value;
use super::vm::VM;
use log::{debug, warn};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Liveness marking hook
pub trait Trace {
    fn mark_reachable(&self, marker: &mut Marker);
}

/// Collects everything reachable from the roots
#[derive(Default)]
pub struct Marker {
    objects: FxHashSet<ObjectId>,
    methods: FxHashSet<MethodId>,
    arrays: FxHashSet<usize>,
    pending_objects: Vec<ObjectId>,
    pending_methods: Vec<MethodId>,
}

impl Marker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_value(&mut self, value: &Value) {
        match value {
            Value::Object(id) => self.mark_object(*id),
            Value::Method(id) => self.mark_method(*id),
            Value::Array(items) => {
                let key = Arc::as_ptr(items) as *const () as usize;
                if self.arrays.insert(key) {
                    // copy out so an array holding itself does not relock
                    let items = items.lock().clone();
                    for item in &items {
                        self.mark_value(item);
                    }
                }
            }
            Value::Nil | Value::String(_) | Value::Class(_) | Value::Package(_) => {}
        }
    }

    pub fn mark_object(&mut self, id: ObjectId) {
        if self.objects.insert(id) {
            self.pending_objects.push(id);
        }
    }

    pub fn mark_method(&mut self, id: MethodId) {
        if self.methods.insert(id) {
            self.pending_methods.push(id);
        }
    }

    pub fn is_object_marked(&self, id: ObjectId) -> bool {
        self.objects.contains(&id)
    }

    pub fn is_method_marked(&self, id: MethodId) -> bool {
        self.methods.contains(&id)
    }
}

/// GC statistics for one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub objects_before: usize,
    pub objects_freed: usize,
    pub methods_freed: usize,
    pub uninits_run: usize,
}

/// Collector bookkeeping kept by the VM
#[derive(Debug, Clone)]
pub struct GcState {
    pub threshold: usize,
    pub collections: usize,
}

impl GcState {
    pub fn new(initial_threshold: usize) -> Self {
        Self {
            threshold: initial_threshold,
            collections: 0,
        }
    }
}

impl VM {
    /// Has the object arena grown past the collection threshold?
    pub fn should_collect(&self) -> bool {
        self.objects.read().len() >= self.gc.lock().threshold
    }

    /// Mark from `roots` (plus every class), run pending UNINIT methods and
    /// sweep what is left unreachable.
    pub fn collect(&self, roots: &[Value]) -> GcStats {
        let mut stats = GcStats {
            objects_before: self.objects.read().len(),
            ..GcStats::default()
        };

        let mut marker = Marker::new();
        for root in roots {
            marker.mark_value(root);
        }
        {
            let classes = self.classes.read();
            for (_, class) in classes.iter() {
                class.mark_reachable(&mut marker);
            }
        }
        self.trace_pending(&mut marker);

        // finalize: UNINIT runs once, the object survives this cycle
        let finalizable: Vec<ObjectId> = self
            .objects
            .read()
            .iter()
            .filter(|(id, object)| !marker.is_object_marked(*id) && object.has_uninit())
            .map(|(id, _)| id)
            .collect();
        if !finalizable.is_empty() {
            let activation = Activation::root(Activity::new("uninit"));
            for id in &finalizable {
                if let Some(object) = self.objects.read().get(*id).cloned() {
                    object.set_has_uninit(false);
                }
                stats.uninits_run += 1;
                if let Err(err) = self.send_message(&activation, &Value::Object(*id), "UNINIT", &[]) {
                    warn!("UNINIT of {:?} failed: {}", id, err);
                }
                marker.mark_object(*id);
            }
            self.trace_pending(&mut marker);
        }

        let dead_objects: Vec<ObjectId> = self
            .objects
            .read()
            .ids()
            .into_iter()
            .filter(|id| !marker.is_object_marked(*id))
            .collect();
        {
            let mut objects = self.objects.write();
            for id in &dead_objects {
                objects.remove(*id);
            }
        }
        stats.objects_freed = dead_objects.len();

        let dead_methods: Vec<MethodId> = self
            .methods
            .read()
            .ids()
            .into_iter()
            .filter(|id| !marker.is_method_marked(*id))
            .collect();
        {
            let mut methods = self.methods.write();
            for id in &dead_methods {
                methods.remove(*id);
            }
        }
        stats.methods_freed = dead_methods.len();

        let live = self.objects.read().len();
        {
            let mut gc = self.gc.lock();
            gc.collections += 1;
            let grown = (live as f64 * self.config.gc_grow_factor) as usize;
            gc.threshold = grown.max(self.config.gc_initial_threshold);
        }
        debug!(
            "gc: {} objects before, {} freed, {} methods freed, {} UNINIT run",
            stats.objects_before, stats.objects_freed, stats.methods_freed, stats.uninits_run
        );
        stats
    }

    /// Number of collections run so far
    pub fn collections(&self) -> usize {
        self.gc.lock().collections
    }

    fn trace_pending(&self, marker: &mut Marker) {
        loop {
            if let Some(id) = marker.pending_objects.pop() {
                let object = self.objects.read().get(id).cloned();
                if let Some(object) = object {
                    object.mark_reachable(marker);
                }
                continue;
            }
            if let Some(id) = marker.pending_methods.pop() {
                let method = self.methods.read().get(id).cloned();
                if let Some(method) = method {
                    method.mark_reachable(marker);
                }
                continue;
            }
            break;
        }
    }
}
