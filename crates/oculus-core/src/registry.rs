//! A generic, thread-safe callback registry: the fan-out mechanism behind
//! every `on_*` subscription the driver exposes.

use std::{
    sync::{mpsc, Arc, Mutex},
    time::Duration,
};

use crate::error::{OculusError, Result};

/// Opaque handle returned by [`CallbackRegistry::add`], usable to
/// [`CallbackRegistry::remove`] the subscription later.
pub type CallbackId = u32;

enum Lifetime {
    Permanent,
    OneShot,
}

struct Entry<A> {
    id: CallbackId,
    lifetime: Lifetime,
    callback: Box<dyn FnMut(&A) + Send>,
}

/// A registry of callbacks fired, in registration order, with a shared
/// argument value.
///
/// Calling [`Self::call`] takes a snapshot of the registered ids before
/// invoking anything, so a callback that adds or removes a subscription
/// does not perturb the in-progress fan-out.
pub struct CallbackRegistry<A> {
    entries: Mutex<Vec<Entry<A>>>,
    next_id: Mutex<CallbackId>,
}

impl<A> Default for CallbackRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> CallbackRegistry<A> {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()), next_id: Mutex::new(0) }
    }

    fn allocate_id(&self) -> CallbackId {
        let mut next_id = self.next_id.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let id = *next_id;
        *next_id = next_id.wrapping_add(1);
        id
    }

    /// Registers a callback that fires every time [`Self::call`] is invoked.
    pub fn add<F>(&self, callback: F) -> CallbackId
    where
        F: FnMut(&A) + Send + 'static,
    {
        let id = self.allocate_id();
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.push(Entry { id, lifetime: Lifetime::Permanent, callback: Box::new(callback) });
        id
    }

    /// Registers a callback that fires exactly once, then removes itself.
    pub fn add_single_shot<F>(&self, callback: F) -> CallbackId
    where
        F: FnMut(&A) + Send + 'static,
    {
        let id = self.allocate_id();
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.push(Entry { id, lifetime: Lifetime::OneShot, callback: Box::new(callback) });
        id
    }

    /// Removes a previously registered callback. No-op if `id` is unknown
    /// (it may have already fired as a one-shot).
    pub fn remove(&self, id: CallbackId) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.retain(|entry| entry.id != id);
    }

    /// Fires every registered callback with `args`, in registration order,
    /// then drops any one-shot callbacks that just fired.
    pub fn call(&self, args: &A) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let snapshot_ids: Vec<CallbackId> = entries.iter().map(|entry| entry.id).collect();
        let mut fired_one_shots = Vec::new();
        for id in snapshot_ids {
            let Some(entry) = entries.iter_mut().find(|entry| entry.id == id) else {
                continue;
            };
            (entry.callback)(args);
            if matches!(entry.lifetime, Lifetime::OneShot) {
                fired_one_shots.push(id);
            }
        }
        entries.retain(|entry| !fired_one_shots.contains(&entry.id));
    }

    /// `true` if no callbacks are currently registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_empty()
    }
}

impl<A: Clone + Send + 'static> CallbackRegistry<A> {
    /// Blocks the calling thread for the next value this registry fans
    /// out, up to `timeout`. Used by the driver's blocking `current_*`
    /// accessors, which wait on a single upcoming message rather than
    /// polling shared state. Requires `A: Clone` to move the value across
    /// the channel boundary.
    pub fn wait_once_cloned(self: &Arc<Self>, timeout: Duration) -> Result<A> {
        let (tx, rx) = mpsc::sync_channel(1);
        let id = self.add_single_shot(move |args: &A| {
            let _ = tx.try_send(args.clone());
        });
        match rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(_) => {
                self.remove(id);
                Err(OculusError::TimeoutReached { waited_for: "callback registry value" })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn call_fires_callbacks_in_registration_order() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = Arc::clone(&order);
        registry.add(move |value| o1.lock().unwrap().push(*value));
        let o2 = Arc::clone(&order);
        registry.add(move |value| o2.lock().unwrap().push(*value + 100));

        registry.call(&1);

        assert_eq!(*order.lock().unwrap(), vec![1, 101]);
    }

    #[test]
    fn one_shot_callback_fires_exactly_once() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);
        registry.add_single_shot(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.call(&1);
        registry.call(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_drops_a_permanent_callback() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);
        let id = registry.add(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registry.remove(id);

        registry.call(&1);

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wait_once_cloned_returns_the_next_value() {
        let registry = Arc::new(CallbackRegistry::<u32>::new());
        let waiter = Arc::clone(&registry);
        let handle = std::thread::spawn(move || waiter.wait_once_cloned(Duration::from_secs(1)));
        std::thread::sleep(Duration::from_millis(20));
        registry.call(&42);
        assert_eq!(handle.join().unwrap().unwrap(), 42);
    }

    #[test]
    fn wait_once_cloned_times_out_without_a_call() {
        let registry = Arc::new(CallbackRegistry::<u32>::new());
        let result = registry.wait_once_cloned(Duration::from_millis(20));
        assert!(matches!(result, Err(OculusError::TimeoutReached { .. })));
    }
}
