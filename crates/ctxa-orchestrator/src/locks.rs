//! Per-button serialization
//!
//! Two operations on the same button would otherwise race on the final
//! status write. The orchestrator keeps one [`ButtonLocks`] for whole
//! operations and one for status writes; different buttons never wait on
//! each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Map of button id to its async lock. Idle entries are reclaimed when the
/// last guard is dropped.
#[derive(Debug, Clone, Default)]
pub struct ButtonLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ButtonLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `button_id`
    pub async fn acquire(&self, button_id: &str) -> ButtonGuard {
        let lock = {
            let mut map = self.inner.lock();
            map.entry(button_id.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        ButtonGuard {
            guard: Some(guard),
            button_id: button_id.to_string(),
            locks: self.clone(),
        }
    }

    /// Number of buttons with a live lock entry
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one button, released on drop
pub struct ButtonGuard {
    guard: Option<OwnedMutexGuard<()>>,
    button_id: String,
    locks: ButtonLocks,
}

impl ButtonGuard {
    pub fn button_id(&self) -> &str {
        &self.button_id
    }
}

impl Drop for ButtonGuard {
    fn drop(&mut self) {
        // Release first so the strong count below only sees the map and waiters
        self.guard.take();
        let mut map = self.locks.inner.lock();
        if let Some(entry) = map.get(&self.button_id) {
            if Arc::strong_count(entry) == 1 {
                map.remove(&self.button_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_button_is_serialized() {
        let locks = ButtonLocks::new();
        let first = locks.acquire("btn1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _second = locks.acquire("btn1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_buttons_do_not_block() {
        let locks = ButtonLocks::new();
        let _first = locks.acquire("btn1").await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire("btn2")).await;
        assert!(second.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn idle_entries_are_reclaimed() {
        let locks = ButtonLocks::new();
        {
            let guard = locks.acquire("btn1").await;
            assert_eq!(guard.button_id(), "btn1");
        }
        assert!(locks.is_empty());
    }
}
