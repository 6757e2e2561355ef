//! Guard / invalidation monitor
//!
//! Watches a small set of intrinsic `(object, key)` slots. Any store to or
//! deletion of one of them bumps the epoch and hands back every optimized
//! call site that depended on the old state.

use super::guards::Guard;
use crate::bytecode::CallSiteId;
use crate::runtime::value::{ObjectFlags, ObjectRef, PropertyKey, Value};
use serde::Serialize;
use std::rc::Rc;

/// How a watched slot was touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Store,
    Delete,
}

/// Why sites were invalidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidationReason {
    /// A watched slot was assigned
    WatchedStore { slot: String },
    /// A watched slot was deleted
    WatchedDelete { slot: String },
    /// A site found its guards stale on its own
    GuardFailure { site: CallSiteId, guard: Guard },
}

/// One invalidation, as reported in optimizer statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationEvent {
    pub reason: InvalidationReason,
    /// Epoch after the invalidation
    pub epoch: u64,
    pub sites_affected: usize,
}

/// A watched `(object, key)` pair and the value it held when watching began
#[derive(Debug, Clone)]
pub struct WatchedSlot {
    pub object: ObjectRef,
    pub key: PropertyKey,
    pub original: Option<Value>,
    pub label: String,
}

impl WatchedSlot {
    fn is_intact(&self) -> bool {
        let current = self.object.borrow().get_own(&self.key);
        match (&current, &self.original) {
            (Some(current), Some(original)) => current.same_value(original),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Tracks watched slots, the epoch and the sites depending on them
#[derive(Debug)]
pub struct InvalidationMonitor {
    epoch: u64,
    slots: Vec<WatchedSlot>,
    dependents: Vec<CallSiteId>,
    events: Vec<InvalidationEvent>,
    fuse_intact: bool,
}

impl Default for InvalidationMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationMonitor {
    pub fn new() -> Self {
        Self {
            epoch: 0,
            slots: Vec::new(),
            dependents: Vec::new(),
            events: Vec::new(),
            fuse_intact: true,
        }
    }

    /// Start watching `object[key]`, remembering its current value as the original
    pub fn watch(&mut self, object: &ObjectRef, key: PropertyKey, label: impl Into<String>) {
        let original = {
            let mut obj = object.borrow_mut();
            obj.flags.insert(ObjectFlags::WATCHED);
            obj.get_own(&key)
        };
        self.slots.push(WatchedSlot {
            object: object.clone(),
            key,
            original,
            label: label.into(),
        });
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Every watched slot still holds its original value
    pub fn is_fuse_intact(&self) -> bool {
        self.fuse_intact
    }

    pub fn slots(&self) -> &[WatchedSlot] {
        &self.slots
    }

    pub fn events(&self) -> &[InvalidationEvent] {
        &self.events
    }

    /// Number of sites currently relying on the watched slots
    pub fn dependent_count(&self) -> usize {
        self.dependents.len()
    }

    /// Register an optimized site
    pub fn add_dependent(&mut self, site: CallSiteId) {
        if !self.dependents.contains(&site) {
            self.dependents.push(site);
        }
    }

    /// Report a completed write to `object[key]`
    ///
    /// Returns the invalidated dependents, or `None` when the write did not
    /// touch a watched slot.
    pub fn notify_write(
        &mut self,
        object: &ObjectRef,
        key: &PropertyKey,
        kind: WriteKind,
    ) -> Option<Vec<CallSiteId>> {
        let slot = self
            .slots
            .iter()
            .find(|slot| Rc::ptr_eq(&slot.object, object) && slot.key == *key)?;
        let label = slot.label.clone();

        self.epoch += 1;
        self.fuse_intact = self.slots.iter().all(WatchedSlot::is_intact);
        let sites = std::mem::take(&mut self.dependents);

        tracing::info!(
            epoch = self.epoch,
            slot = %label,
            sites = sites.len(),
            fuse_intact = self.fuse_intact,
            "watched slot {}",
            if kind == WriteKind::Store { "written" } else { "deleted" }
        );

        let reason = match kind {
            WriteKind::Store => InvalidationReason::WatchedStore { slot: label },
            WriteKind::Delete => InvalidationReason::WatchedDelete { slot: label },
        };
        self.events.push(InvalidationEvent {
            reason,
            epoch: self.epoch,
            sites_affected: sites.len(),
        });
        Some(sites)
    }

    /// Record that `site` invalidated itself after a guard failure
    pub fn record_guard_failure(&mut self, site: CallSiteId, guard: Guard) {
        self.dependents.retain(|s| *s != site);
        tracing::info!(epoch = self.epoch, %site, %guard, "site guards stale");
        self.events.push(InvalidationEvent {
            reason: InvalidationReason::GuardFailure { site, guard },
            epoch: self.epoch,
            sites_affected: 1,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::Object;

    #[test]
    fn test_default_starts_with_intact_fuse() {
        let monitor = InvalidationMonitor::default();
        assert!(monitor.is_fuse_intact());
        assert_eq!(monitor.epoch(), 0);
    }

    fn watched_object() -> (InvalidationMonitor, ObjectRef) {
        let object = Object::ordinary(None).into_ref();
        object
            .borrow_mut()
            .set_own("next".into(), Value::Number(1.0))
            .unwrap();
        let mut monitor = InvalidationMonitor::new();
        monitor.watch(&object, "next".into(), "proto.next");
        (monitor, object)
    }

    #[test]
    fn test_watch_sets_flag() {
        let (monitor, object) = watched_object();
        assert!(object.borrow().is_watched());
        assert!(monitor.is_fuse_intact());
        assert_eq!(monitor.epoch(), 0);
        assert_eq!(monitor.slots()[0].original, Some(Value::Number(1.0)));
    }

    #[test]
    fn test_unwatched_key_is_ignored() {
        let (mut monitor, object) = watched_object();
        monitor.add_dependent(CallSiteId(0));
        let result = monitor.notify_write(&object, &"other".into(), WriteKind::Store);
        assert!(result.is_none());
        assert_eq!(monitor.epoch(), 0);
        assert_eq!(monitor.dependent_count(), 1);
    }

    #[test]
    fn test_store_drains_dependents_and_bumps_epoch() {
        let (mut monitor, object) = watched_object();
        monitor.add_dependent(CallSiteId(0));
        monitor.add_dependent(CallSiteId(2));
        monitor.add_dependent(CallSiteId(0));

        object
            .borrow_mut()
            .set_own("next".into(), Value::Number(2.0))
            .unwrap();
        let sites = monitor
            .notify_write(&object, &"next".into(), WriteKind::Store)
            .unwrap();

        assert_eq!(sites, vec![CallSiteId(0), CallSiteId(2)]);
        assert_eq!(monitor.epoch(), 1);
        assert!(!monitor.is_fuse_intact());
        assert_eq!(monitor.dependent_count(), 0);
        assert_eq!(
            monitor.events(),
            &[InvalidationEvent {
                reason: InvalidationReason::WatchedStore {
                    slot: "proto.next".to_string()
                },
                epoch: 1,
                sites_affected: 2,
            }]
        );
    }

    #[test]
    fn test_restoring_original_repairs_fuse() {
        let (mut monitor, object) = watched_object();
        object.borrow_mut().delete_own(&"next".into());
        monitor.notify_write(&object, &"next".into(), WriteKind::Delete);
        assert!(!monitor.is_fuse_intact());

        object
            .borrow_mut()
            .set_own("next".into(), Value::Number(1.0))
            .unwrap();
        monitor.notify_write(&object, &"next".into(), WriteKind::Store);
        assert!(monitor.is_fuse_intact());
        assert_eq!(monitor.epoch(), 2);
        assert!(matches!(
            monitor.events()[0].reason,
            InvalidationReason::WatchedDelete { .. }
        ));
    }

    #[test]
    fn test_guard_failure_event() {
        let mut monitor = InvalidationMonitor::new();
        monitor.add_dependent(CallSiteId(4));
        monitor.record_guard_failure(CallSiteId(4), Guard::ProtocolUnmodified);
        assert_eq!(monitor.dependent_count(), 0);
        assert_eq!(monitor.events().len(), 1);
    }
}
