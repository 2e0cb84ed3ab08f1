// Subscription registry: key → set of callbacks.
//
// Callback identity is pointer identity of the `Arc`. The return values of
// `add` and `remove` report the 0→1 and 1→0 transitions that drive
// server-side watch/unwatch frames.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{LiveValue, RegisterSubscriptionKey};

/// Callback invoked synchronously for every push on its key.
pub type ValueCallback = Arc<dyn Fn(&LiveValue) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Registry {
    subscriptions: HashMap<RegisterSubscriptionKey, Vec<ValueCallback>>,
}

impl Registry {
    /// Register `callback`; `true` if `key` had no callbacks before.
    pub fn add(&mut self, key: RegisterSubscriptionKey, callback: ValueCallback) -> bool {
        let callbacks = self.subscriptions.entry(key).or_default();
        let first = callbacks.is_empty();
        if !callbacks.iter().any(|cb| Arc::ptr_eq(cb, &callback)) {
            callbacks.push(callback);
        }
        first
    }

    /// Remove `callback`; `true` if that emptied and deleted `key`.
    /// Unknown keys and callbacks are a no-op.
    pub fn remove(&mut self, key: &RegisterSubscriptionKey, callback: &ValueCallback) -> bool {
        let Some(callbacks) = self.subscriptions.get_mut(key) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|cb| !Arc::ptr_eq(cb, callback));
        if callbacks.len() == before || !callbacks.is_empty() {
            return false;
        }
        self.subscriptions.remove(key);
        true
    }

    pub fn callbacks(&self, key: &RegisterSubscriptionKey) -> Option<Vec<ValueCallback>> {
        self.subscriptions.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<RegisterSubscriptionKey> {
        self.subscriptions.keys().cloned().collect()
    }

    pub fn callback_count(&self, key: &RegisterSubscriptionKey) -> usize {
        self.subscriptions.get(key).map_or(0, Vec::len)
    }

    /// Empty the registry, returning every key that was active.
    pub fn drain(&mut self) -> Vec<RegisterSubscriptionKey> {
        self.subscriptions.drain().map(|(key, _)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ByteOrder;

    fn key(register_id: u64) -> RegisterSubscriptionKey {
        RegisterSubscriptionKey {
            analyzer_id: 1,
            address: 100,
            data_type: "uint16".into(),
            scale: 1.0,
            byte_order: ByteOrder::Abcd,
            bit_offset: None,
            register_id,
        }
    }

    fn noop() -> ValueCallback {
        Arc::new(|_: &LiveValue| {})
    }

    #[test]
    fn transitions_are_reported_once() {
        let mut reg = Registry::default();
        let (a, b) = (noop(), noop());

        assert!(reg.add(key(1), a.clone()));
        assert!(!reg.add(key(1), b.clone()));
        assert!(!reg.add(key(1), a.clone()));
        assert_eq!(reg.callback_count(&key(1)), 2);

        assert!(!reg.remove(&key(1), &a));
        assert!(reg.remove(&key(1), &b));
        assert_eq!(reg.callback_count(&key(1)), 0);
    }

    #[test]
    fn removing_unknown_callback_is_a_noop() {
        let mut reg = Registry::default();
        let a = noop();
        reg.add(key(1), a.clone());

        assert!(!reg.remove(&key(1), &noop()));
        assert!(!reg.remove(&key(2), &a));
        assert_eq!(reg.callback_count(&key(1)), 1);
    }

    #[test]
    fn drain_returns_active_keys() {
        let mut reg = Registry::default();
        reg.add(key(1), noop());
        reg.add(key(2), noop());

        let mut drained = reg.drain();
        drained.sort_by_key(|k| k.register_id);
        assert_eq!(drained, vec![key(1), key(2)]);
        assert!(reg.keys().is_empty());
    }
}
