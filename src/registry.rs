//! Handler registry (spec.md §4.2).
use crate::*;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};

/// The kind-key used internally for a catch-all handler bucket.
const ANY_KIND: &str = "*";

/// One resolved, routable handler: enough to find it again during dispatch
/// without re-walking the whole tree.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Entry {
    pub(crate) component: ComponentId,
    pub(crate) handler_index: usize,
    pub(crate) priority: Priority,
    seq: u64,
}

type BucketKey = (String, String);

/// Per-manager index from `(channel, event-kind)` to the ordered list of
/// handlers that should run, including the three wildcard buckets
/// (`(channel, *)`, `(*, kind)`, `(*, *)`).
#[derive(Default)]
pub struct HandlerRegistry {
    buckets: HashMap<BucketKey, Vec<Entry>>,
    /// Tracks exactly which buckets each component contributed to, so
    /// removal is `O(h)` in that component's own handler count rather than
    /// a scan of the whole registry.
    by_component: HashMap<ComponentId, Vec<BucketKey>>,
    /// Every distinct channel name a handler has ever registered under
    /// (including `"*"`), needed to resolve an event fired with the
    /// wildcard *target* channel (spec.md §4.3 targeting rules: "handlers
    /// on every channel with a matching kind run").
    channels_seen: HashSet<String>,
    next_seq: Cell<u64>,
}

impl HandlerRegistry {
    /// A fresh, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        seq
    }

    /// Adds every handler declared on one component node to the index.
    /// `channel` is that node's own default channel (used when a handler
    /// declares no channel override of its own).
    pub(crate) fn add_node(
        &mut self,
        id: ComponentId,
        channel: &Channel,
        handlers: &[Rc<HandlerSpec>],
    ) {
        let mut keys = Vec::new();
        for (index, spec) in handlers.iter().enumerate() {
            let handler_channel = spec.channel.clone().unwrap_or_else(|| channel.clone());
            let kinds: Vec<String> = if spec.kinds.is_empty() {
                vec![ANY_KIND.to_string()]
            } else {
                spec.kinds.clone()
            };
            let seq = self.next_seq();
            self.channels_seen.insert(handler_channel.as_str().to_string());
            for kind in kinds {
                let key = (handler_channel.as_str().to_string(), kind);
                self.buckets.entry(key.clone()).or_default().push(Entry {
                    component: id,
                    handler_index: index,
                    priority: spec.priority,
                    seq,
                });
                keys.push(key);
            }
        }
        self.by_component.insert(id, keys);
    }

    /// Removes every handler `component` previously contributed.
    pub(crate) fn remove_component(&mut self, component: ComponentId) {
        if let Some(keys) = self.by_component.remove(&component) {
            for key in keys {
                if let Some(entries) = self.buckets.get_mut(&key) {
                    entries.retain(|e| e.component != component);
                    if entries.is_empty() {
                        self.buckets.remove(&key);
                    }
                }
            }
        }
    }

    /// Resolves the ordered list of handlers matching a *concrete* target
    /// channel and `kind`: merges the direct bucket with the `(channel,
    /// *)`, `(*, kind)` and `(*, *)` wildcard buckets.
    fn lookup_concrete(&self, channel: &str, kind: &str) -> Vec<Entry> {
        let mut fetch_keys: Vec<BucketKey> = vec![
            (channel.to_string(), kind.to_string()),
            (channel.to_string(), ANY_KIND.to_string()),
            (ANY_KIND.to_string(), kind.to_string()),
            (ANY_KIND.to_string(), ANY_KIND.to_string()),
        ];
        fetch_keys.sort();
        fetch_keys.dedup();

        let mut merged: Vec<Entry> = Vec::new();
        for key in &fetch_keys {
            if let Some(entries) = self.buckets.get(key) {
                merged.extend(entries.iter().copied());
            }
        }
        merged
    }

    /// Resolves the ordered list of handlers that should run for an event
    /// of `kind` targeted at `channel`, honoring the spec.md §4.3 targeting
    /// rules: a wildcard *target* channel visits handlers on every known
    /// channel, not just those explicitly registered on `"*"`.
    pub(crate) fn lookup(&self, channel: &Channel, kind: &str) -> Vec<Entry> {
        let mut merged = if channel.is_wildcard() {
            let mut merged = Vec::new();
            for known in &self.channels_seen {
                merged.extend(self.lookup_concrete(known, kind));
            }
            dedup_by_handler(&mut merged);
            merged
        } else {
            self.lookup_concrete(channel.as_str(), kind)
        };

        // Priority descending, tie-broken by registration order ascending.
        merged.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        merged
    }
}

/// Deduplicates entries by `(component, handler_index)`, keeping the first
/// occurrence — used when a wildcard-target lookup visits the same handler
/// through more than one channel bucket.
pub(crate) fn dedup_by_handler(entries: &mut Vec<Entry>) {
    let mut seen = HashSet::new();
    entries.retain(|e| seen.insert((e.component, e.handler_index)));
}
