use std::{
    collections::{HashMap, VecDeque},
    fmt,
};

use tracing::debug;

use crate::handle::AdHandle;

/// Identifier of an [`AdView`], unique within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Reusable container a native ad is bound into for display.
#[derive(Debug)]
pub struct AdView {
    id: ViewId,
    unit_id: String,
    bound: Option<AdHandle>,
}

impl AdView {
    /// Identifier assigned by the pool.
    pub fn id(&self) -> ViewId {
        self.id
    }

    /// Ad unit this view was allocated for.
    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    /// Bind `handle` into the view, returning whatever was bound before.
    pub fn bind(&mut self, handle: AdHandle) -> Option<AdHandle> {
        self.bound.replace(handle)
    }

    /// Take the bound handle out of the view.
    pub fn unbind(&mut self) -> Option<AdHandle> {
        self.bound.take()
    }

    /// Currently bound handle.
    pub fn handle(&self) -> Option<&AdHandle> {
        self.bound.as_ref()
    }
}

/// Keyed pool of reusable [`AdView`] containers.
///
/// Views are plain owned values: acquiring moves a view out of its queue
/// and releasing moves it back, so a view can never sit in a queue while
/// someone holds it. The pool takes `&mut self` everywhere and expects a
/// single owner.
#[derive(Debug, Default)]
pub struct AdViewPool {
    queues: HashMap<String, VecDeque<AdView>>,
    next_id: u64,
}

impl AdViewPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, key: &str) -> AdView {
        self.next_id += 1;
        AdView {
            id: ViewId(self.next_id),
            unit_id: key.to_string(),
            bound: None,
        }
    }

    /// Allocate `count` fresh views for `key` and queue them.
    pub fn preload(&mut self, key: &str, count: usize) {
        let views: Vec<AdView> = (0..count).map(|_| self.allocate(key)).collect();
        self.queues.entry(key.to_string()).or_default().extend(views);
        debug!(key, count, "preloaded ad views");
    }

    /// Take a queued view for `key`, or allocate one when none is queued.
    pub fn acquire(&mut self, key: &str) -> AdView {
        match self.queues.get_mut(key).and_then(VecDeque::pop_front) {
            Some(view) => view,
            None => {
                debug!(key, "ad view pool empty, allocating");
                self.allocate(key)
            }
        }
    }

    /// Return `view` to the queue for `key`.
    ///
    /// A bound handle that has been destroyed is dropped from the view
    /// before it is queued.
    pub fn release(&mut self, key: &str, mut view: AdView) {
        if view.handle().is_some_and(AdHandle::is_destroyed) {
            if let Some(handle) = view.unbind() {
                debug!(key, view = %view.id, handle = %handle.id(), "unbinding destroyed ad");
            }
        }
        self.queues.entry(key.to_string()).or_default().push_back(view);
    }

    /// Number of views queued for `key`.
    pub fn queued(&self, key: &str) -> usize {
        self.queues.get(key).map(VecDeque::len).unwrap_or(0)
    }

    /// Remove and return every view queued for `key`.
    pub fn drain(&mut self, key: &str) -> Vec<AdView> {
        self.queues
            .remove(key)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Drop every queued view, destroying any handles still bound to them.
    pub fn clear(&mut self) {
        let views: usize = self.queues.values().map(VecDeque::len).sum();
        self.queues.clear();
        debug!(views, "cleared ad view pool");
    }
}
