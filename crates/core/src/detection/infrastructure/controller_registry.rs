use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::detection::domain::controller::{ControllerId, DetectionController};
use crate::detection::domain::detection_result::DetectionSnapshot;

type Entry = (ControllerId, Arc<dyn DetectionController>);

/// Registration list of detection controllers with copy-on-notify delivery.
///
/// `notify` snapshots the list and calls each controller without holding the
/// list lock, so registration never waits on a slow callback. A notification
/// pass holds `notify_gate`; `remove` waits on that gate (unless called from
/// the notifying thread itself), which guarantees a removed controller is
/// never called once `remove` has returned.
pub struct ControllerRegistry {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
    notify_gate: Mutex<()>,
    notifier: Mutex<Option<ThreadId>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            notify_gate: Mutex::new(()),
            notifier: Mutex::new(None),
        }
    }

    pub fn add(&self, controller: Arc<dyn DetectionController>) -> ControllerId {
        let id = ControllerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, controller));
        id
    }

    /// Deregisters `id`; returns `false` if it was not registered.
    pub fn remove(&self, id: ControllerId) -> bool {
        let removed = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            entries.len() != before
        };
        if removed && !self.is_notifying_thread() {
            // Wait out a pass that may still hold the old list.
            drop(self.notify_gate.lock().unwrap_or_else(|e| e.into_inner()));
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every registered controller with `snapshot`.
    ///
    /// Controllers removed earlier in the same pass (e.g. by another
    /// controller's callback) are skipped.
    pub fn notify(&self, snapshot: &DetectionSnapshot) {
        let _gate = self.notify_gate.lock().unwrap_or_else(|e| e.into_inner());
        let _notifying = NotifierGuard::enter(&self.notifier);

        let controllers: Vec<Entry> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for (id, controller) in controllers {
            if self.contains(id) {
                controller.on_detection(snapshot);
            }
        }
    }

    fn contains(&self, id: ControllerId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|(entry_id, _)| *entry_id == id)
    }

    fn is_notifying_thread(&self) -> bool {
        *self.notifier.lock().unwrap_or_else(|e| e.into_inner()) == Some(thread::current().id())
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the notifying thread for the duration of a pass, even on panic.
struct NotifierGuard<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> NotifierGuard<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(thread::current().id());
        Self { slot }
    }
}

impl Drop for NotifierGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
