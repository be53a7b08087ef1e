#![forbid(unsafe_code)]

//! Merge-on-write reactive documents.
//!
//! A [`DeepSignal`] wraps a `serde_json::Value` document. Unlike
//! [`Signal<T>`](crate::Signal), which replaces its value on write, a deep
//! signal **merges** writes into the existing target: objects are merged key
//! by key, arrays index by index, and anything else is replaced.
//!
//! Reactivity is per path. [`DeepSignal::at`] returns the node for a
//! dot-separated path (`"user.tags.0"`), allocating its trackable source the
//! first time that path is requested. Nodes form an explicit tree mirroring
//! the document shape; there is no interception of property access.
//!
//! # Notification
//!
//! A write at path `P` compares, for every allocated node on `P`, above it,
//! or below it, the value before and after the write. Only nodes whose
//! observed value changed notify their subscribers.
//!
//! # Invariants
//!
//! 1. The first access to a path allocates exactly one node; later accesses
//!    reuse it.
//! 2. Reading a missing path yields `Value::Null` and still subscribes, so
//!    the reader wakes when the path appears.
//! 3. A merge never removes object keys; use [`DeepSignal::replace`].
//! 4. A node that no handle references and no effect observes is released
//!    on the next write.
//! 5. A write that indexes an array more than [`MAX_ARRAY_PADDING`] slots
//!    past its end is ignored.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::runtime::{Runtime, WeakRuntime};
use crate::signal::Source;

type Path = SmallVec<[String; 4]>;

/// Largest number of `Null` slots one write may append to an array.
pub const MAX_ARRAY_PADDING: usize = 1024;

struct DeepTree {
    runtime: WeakRuntime,
    value: RefCell<Value>,
    nodes: RefCell<IndexMap<Path, Source, ahash::RandomState>>,
}

impl DeepTree {
    fn node(&self, path: &Path) -> Source {
        if let Some(source) = self.nodes.borrow().get(path) {
            return source.clone();
        }
        let source = Source::from_weak(self.runtime.clone());
        self.nodes.borrow_mut().insert(path.clone(), source.clone());
        source
    }

    fn related(&self, path: &Path) -> Vec<(Path, Source)> {
        self.nodes
            .borrow()
            .iter()
            .filter(|(node, _)| node.starts_with(path) || path.starts_with(node))
            .map(|(node, source)| (node.clone(), source.clone()))
            .collect()
    }

    fn prune(&self) {
        let mut nodes = self.nodes.borrow_mut();
        let before = nodes.len();
        nodes.retain(|_, source| !source.is_orphan());
        if nodes.len() < before {
            trace!(released = before - nodes.len(), "deep nodes released");
        }
    }

    fn write(&self, path: &Path, mutate: impl FnOnce(&mut Value)) {
        self.prune();
        let related = self.related(path);
        let before: Vec<Value> = {
            let root = self.value.borrow();
            related
                .iter()
                .map(|(node, _)| lookup(&root, node).cloned().unwrap_or(Value::Null))
                .collect()
        };
        {
            let mut root = self.value.borrow_mut();
            let Some(target) = slot_mut(&mut root, path) else {
                warn!(path = %path.join("."), "array index out of reach; write ignored");
                return;
            };
            mutate(target);
        }
        let changed: Vec<Source> = {
            let root = self.value.borrow();
            related
                .into_iter()
                .zip(before)
                .filter(|((node, _), old)| lookup(&root, node).unwrap_or(&Value::Null) != old)
                .map(|((_, source), _)| source)
                .collect()
        };
        for source in changed {
            source.notify();
        }
    }
}

/// A node of a merge-on-write reactive document.
///
/// Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct DeepSignal {
    tree: Rc<DeepTree>,
    path: Path,
    source: Source,
}

impl DeepSignal {
    /// Create a document rooted at `initial`.
    pub fn new(runtime: &Runtime, initial: Value) -> Self {
        let tree = Rc::new(DeepTree {
            runtime: runtime.downgrade(),
            value: RefCell::new(initial),
            nodes: RefCell::new(IndexMap::with_hasher(ahash::RandomState::new())),
        });
        let path = Path::new();
        let source = tree.node(&path);
        Self { tree, path, source }
    }

    /// Node for a dot-separated path relative to this node.
    ///
    /// An empty path returns this node.
    #[must_use]
    pub fn at(&self, path: &str) -> Self {
        let mut full = self.path.clone();
        full.extend(
            path.split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned),
        );
        self.node_at(full)
    }

    /// Node for a single child key or index.
    #[must_use]
    pub fn key(&self, segment: impl Into<String>) -> Self {
        let mut full = self.path.clone();
        full.push(segment.into());
        self.node_at(full)
    }

    fn node_at(&self, path: Path) -> Self {
        let source = self.tree.node(&path);
        Self {
            tree: Rc::clone(&self.tree),
            path,
            source,
        }
    }

    /// Path segments of this node from the document root.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Current value at this path (`Null` when absent); subscribes the
    /// running effect.
    #[must_use]
    pub fn get(&self) -> Value {
        self.source.track();
        self.get_untracked()
    }

    /// Current value at this path without subscribing.
    #[must_use]
    pub fn get_untracked(&self) -> Value {
        lookup(&self.tree.value.borrow(), &self.path)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Borrow the value at this path; subscribes the running effect.
    pub fn with<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        self.source.track();
        f(lookup(&self.tree.value.borrow(), &self.path))
    }

    /// Structurally merge `value` into this path.
    pub fn set(&self, value: Value) {
        self.tree.write(&self.path, |target| merge(target, value));
    }

    /// Replace the value at this path without merging.
    pub fn replace(&self, value: Value) {
        self.tree.write(&self.path, |target| *target = value);
    }

    /// Mutate the value at this path in place.
    pub fn update(&self, f: impl FnOnce(&mut Value)) {
        self.tree.write(&self.path, f);
    }

    /// Number of path nodes allocated in this document.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.tree.nodes.borrow().len()
    }

    /// Number of effects subscribed to this node.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.source.subscriber_count()
    }
}

impl fmt::Debug for DeepSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepSignal")
            .field("path", &self.path.join("."))
            .field("value", &self.get_untracked())
            .finish()
    }
}

impl Runtime {
    /// Create a merge-on-write document signal.
    pub fn deep_signal(&self, initial: Value) -> DeepSignal {
        DeepSignal::new(self, initial)
    }
}

fn lookup<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Walk to `path`, creating intermediate containers as needed.
///
/// A numeric segment on an array indexes it (padding with `Null`); any
/// other mismatch turns the slot into an object. Returns `None`, before
/// touching the document, when an index lies beyond the padding limit.
fn slot_mut<'a>(root: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path {
        let index = match current {
            Value::Array(_) => segment.parse::<usize>().ok(),
            _ => None,
        };
        current = match (current, index) {
            (Value::Array(items), Some(i)) => {
                if i >= items.len() {
                    if i - items.len() >= MAX_ARRAY_PADDING {
                        return None;
                    }
                    items.resize(i + 1, Value::Null);
                }
                items.get_mut(i)?
            }
            (Value::Object(map), _) => map.entry(segment.clone()).or_insert(Value::Null),
            (slot, _) => {
                let mut map = serde_json::Map::new();
                map.insert(segment.clone(), Value::Null);
                *slot = Value::Object(map);
                &mut slot[segment.as_str()]
            }
        };
    }
    Some(current)
}

fn merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(source)) => {
            for (i, value) in source.into_iter().enumerate() {
                match target.get_mut(i) {
                    Some(existing) => merge(existing, value),
                    None => target.push(value),
                }
            }
        }
        (target, source) => *target = source,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::frame::ManualFrameHost;

    fn client() -> (Runtime, Rc<ManualFrameHost>) {
        let host = ManualFrameHost::new();
        (Runtime::new(host.clone()), host)
    }

    fn watch(rt: &Runtime, node: &DeepSignal) -> (Rc<Cell<usize>>, crate::Effect) {
        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        let n = node.clone();
        let effect = rt.create_effect(move || {
            let _ = n.get();
            r.set(r.get() + 1);
        });
        (runs, effect)
    }

    #[test]
    fn set_merges_instead_of_replacing() {
        let (rt, _host) = client();
        let state = rt.deep_signal(json!({ "user": { "name": "ana", "age": 30 } }));
        state.set(json!({ "user": { "age": 31 } }));
        assert_eq!(
            state.get_untracked(),
            json!({ "user": { "name": "ana", "age": 31 } })
        );
    }

    #[test]
    fn replace_drops_missing_keys() {
        let (rt, _host) = client();
        let state = rt.deep_signal(json!({ "a": 1, "b": 2 }));
        state.replace(json!({ "a": 5 }));
        assert_eq!(state.get_untracked(), json!({ "a": 5 }));
    }

    #[test]
    fn nodes_are_allocated_lazily_once() {
        let (rt, _host) = client();
        let state = rt.deep_signal(json!({ "a": { "b": 1 } }));
        assert_eq!(state.node_count(), 1);
        let b = state.at("a.b");
        assert_eq!(state.node_count(), 2);
        let again = state.at("a").key("b");
        assert_eq!(state.node_count(), 3, "`a` is allocated on the way");
        assert_eq!(b.path(), again.path());
        assert_eq!(state.at("a.b").get_untracked(), json!(1));
        assert_eq!(state.node_count(), 3);
    }

    #[test]
    fn only_changed_paths_notify() {
        let (rt, host) = client();
        let state = rt.deep_signal(json!({ "user": { "name": "ana", "age": 30 } }));
        let name = state.at("user.name");
        let age = state.at("user.age");
        let (name_runs, _n) = watch(&rt, &name);
        let (age_runs, _a) = watch(&rt, &age);
        let (root_runs, _r) = watch(&rt, &state);

        state.at("user").set(json!({ "age": 31 }));
        host.advance_frame();

        assert_eq!(name_runs.get(), 1, "name did not change");
        assert_eq!(age_runs.get(), 2);
        assert_eq!(root_runs.get(), 2, "ancestors observe the change");
    }

    #[test]
    fn equal_merge_notifies_nobody() {
        let (rt, _host) = client();
        let state = rt.deep_signal(json!({ "count": 1 }));
        let (_runs, _effect) = watch(&rt, &state.at("count"));
        state.set(json!({ "count": 1 }));
        assert_eq!(rt.pending_count(), 0);
    }

    #[test]
    fn missing_path_reads_null_and_wakes_on_creation() {
        let (rt, host) = client();
        let state = rt.deep_signal(json!({}));
        let theme = state.at("settings.theme");
        assert_eq!(theme.get_untracked(), Value::Null);
        let (runs, _effect) = watch(&rt, &theme);

        theme.set(json!("dark"));
        host.advance_frame();
        assert_eq!(runs.get(), 2);
        assert_eq!(state.get_untracked(), json!({ "settings": { "theme": "dark" } }));
    }

    #[test]
    fn arrays_merge_by_index() {
        let (rt, _host) = client();
        let state = rt.deep_signal(json!({ "items": [{ "id": 1, "done": false }, { "id": 2 }] }));
        state.set(json!({ "items": [{ "done": true }] }));
        assert_eq!(
            state.at("items").get_untracked(),
            json!([{ "id": 1, "done": true }, { "id": 2 }])
        );
        state.at("items.3").set(json!("x"));
        assert_eq!(state.at("items").get_untracked().as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn update_mutates_in_place() {
        let (rt, _host) = client();
        let state = rt.deep_signal(json!({ "n": 1 }));
        state.at("n").update(|v| *v = json!(v.as_i64().unwrap_or(0) + 1));
        assert_eq!(state.at("n").get_untracked(), json!(2));
    }

    #[test]
    fn far_array_index_is_ignored() {
        let (rt, host) = client();
        let state = rt.deep_signal(json!({ "items": [1] }));
        let (runs, _effect) = watch(&rt, &state.at("items"));

        state.at("items.18446744073709551615").set(json!("x"));
        state.at(&format!("items.{}", 1 + MAX_ARRAY_PADDING)).set(json!("x"));
        host.advance_frame();
        assert_eq!(state.get_untracked(), json!({ "items": [1] }));
        assert_eq!(runs.get(), 1);

        state.at(&format!("items.{MAX_ARRAY_PADDING}")).set(json!("y"));
        let len = state.at("items").get_untracked().as_array().map(Vec::len);
        assert_eq!(len, Some(MAX_ARRAY_PADDING + 1));
    }

    #[test]
    fn unobserved_nodes_are_released_on_write() {
        let (rt, _host) = client();
        let state = rt.deep_signal(json!({ "a": 1, "b": 2 }));
        let kept = state.at("a");
        let (_runs, _effect) = watch(&rt, &state.at("b"));
        let _ = state.at("c").get_untracked();
        assert_eq!(state.node_count(), 4);

        state.set(json!({ "a": 3 }));
        assert_eq!(state.node_count(), 3, "`c` had no handle and no subscriber");
        assert_eq!(kept.get_untracked(), json!(3));
    }

    #[test]
    fn document_does_not_keep_its_runtime_alive() {
        let (rt, _host) = client();
        let weak = rt.downgrade();
        let released = Rc::new(Cell::new(false));
        let state = rt.deep_signal(json!({ "n": 1 }));
        let s = state.clone();
        let flag = Rc::clone(&released);
        rt.create_effect(move || {
            let _ = s.get();
            let flag = Rc::clone(&flag);
            crate::Cleanup::new(move || flag.set(true))
        })
        .detach();

        drop(state);
        drop(rt);
        assert!(weak.upgrade().is_none());
        assert!(released.get(), "teardown ran the effect cleanup");
    }

    #[test]
    fn debug_shows_path() {
        let (rt, _host) = client();
        let state = rt.deep_signal(json!({ "a": { "b": true } }));
        let debug = format!("{:?}", state.at("a.b"));
        assert!(debug.contains("a.b"));
    }
}
