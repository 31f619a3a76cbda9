//! Purpose: Hold the single process-wide provider instance.
//! Exports: `OnceSlot`, `install`, `get`, `take`, `reset`.
//! Role: The provider module is an inherently process-wide native resource;
//! this slot makes the singleton explicit instead of ambient.
//! Invariants: First installer wins; losers receive the winner's instance,
//! never an error.
//! Invariants: `get` and `take` arbitrate through one lock, so a reader on a
//! foreign callback thread either receives its own strong reference or
//! `None`; it can never observe a reclaimed instance mid-`take`.
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::provider::Provider;

/// Single-instance slot. The lock is held only for pointer-sized reads and
/// writes; no foreign call ever runs under it.
pub struct OnceSlot<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> OnceSlot<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Install `value` if the slot is empty, returning whichever instance the
    /// slot ends up holding. A losing caller's instance is dropped.
    pub fn install(&self, value: Arc<T>) -> Arc<T> {
        let mut slot = self.lock();
        match &*slot {
            Some(winner) => Arc::clone(winner),
            None => {
                *slot = Some(Arc::clone(&value));
                value
            }
        }
    }

    /// Strong reference to the stored instance, taken under the lock.
    pub fn get(&self) -> Option<Arc<T>> {
        self.lock().clone()
    }

    /// Empty the slot, handing back the stored reference. Readers that
    /// already hold a reference keep the instance alive until they drop it.
    pub fn take(&self) -> Option<Arc<T>> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

static PROVIDER: OnceSlot<Provider> = OnceSlot::new();

pub fn install(provider: Arc<Provider>) -> Arc<Provider> {
    PROVIDER.install(provider)
}

pub fn get() -> Option<Arc<Provider>> {
    PROVIDER.get()
}

pub fn take() -> Option<Arc<Provider>> {
    PROVIDER.take()
}

/// Explicit reset path so tests can exercise load flows repeatedly.
#[cfg(test)]
pub fn reset() {
    drop(PROVIDER.take());
}

#[cfg(test)]
mod tests {
    use super::OnceSlot;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn first_install_wins_and_losers_get_the_winner() {
        let slot = OnceSlot::new();
        let first = slot.install(Arc::new(String::from("winner")));
        assert_eq!(first.as_str(), "winner");
        let second = slot.install(Arc::new(String::from("loser")));
        assert_eq!(second.as_str(), "winner");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn get_returns_none_on_empty_slot() {
        let slot: OnceSlot<String> = OnceSlot::new();
        assert!(slot.get().is_none());
    }

    #[test]
    fn take_empties_the_slot_exactly_once() {
        let slot = OnceSlot::new();
        slot.install(Arc::new(7u32));
        let taken = slot.take().expect("stored value");
        assert_eq!(*taken, 7);
        assert!(slot.take().is_none());
        assert!(slot.get().is_none());
    }

    #[test]
    fn concurrent_installs_converge_on_one_instance() {
        let slot = Arc::new(OnceSlot::new());
        let handles: Vec<_> = (0..8)
            .map(|idx| {
                let slot = Arc::clone(&slot);
                std::thread::spawn(move || slot.install(Arc::new(idx)))
            })
            .collect();
        let results: Vec<Arc<usize>> = handles
            .into_iter()
            .map(|handle| handle.join().expect("install thread"))
            .collect();
        for result in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], result));
        }
    }

    #[test]
    fn dropped_loser_does_not_leak_or_double_free() {
        let slot = OnceSlot::new();
        let winner = slot.install(Arc::new(vec![1u8; 32]));
        for _ in 0..16 {
            let again = slot.install(Arc::new(vec![2u8; 32]));
            assert!(Arc::ptr_eq(&winner, &again));
        }
        drop(slot.take());
    }

    // Callback threads call `get` with no coordination against teardown;
    // a reader must either receive a live strong reference or `None`,
    // never a reclaimed instance.
    #[test]
    fn readers_racing_take_see_a_live_instance_or_none() {
        let slot = Arc::new(OnceSlot::new());
        slot.install(Arc::new(vec![7u8; 64]));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        if let Some(value) = slot.get() {
                            assert_eq!(value[0], 7);
                            assert_eq!(value.len(), 64);
                        }
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(1));
        drop(slot.take());

        for reader in readers {
            reader.join().expect("reader thread");
        }
        assert!(slot.get().is_none());
    }
}
