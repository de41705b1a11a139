//! Per-device write/erase locks
//!
//! Writes and erases need exclusive access to their device; reads do not.
//! Locks are test-and-set flags with exponential backoff, one per
//! registered device, owned by the [`crate::FlashMap`] that created them.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;

use crate::device::{DeviceId, DeviceRegistry};
use crate::error::{Error, Result};
use crate::MAX_DEVICES;

#[derive(Debug)]
struct DeviceLock {
    device: DeviceId,
    locked: AtomicBool,
}

/// Lock set covering every registered device
#[derive(Debug, Default)]
pub struct DeviceLocks {
    locks: Vec<DeviceLock, MAX_DEVICES>,
}

impl DeviceLocks {
    /// Create one unlocked lock per registered device
    pub(crate) fn new(registry: &DeviceRegistry) -> Self {
        let mut locks = Vec::new();
        for device in registry.iter() {
            // The registry holds at most MAX_DEVICES entries
            let _ = locks.push(DeviceLock {
                device: device.id,
                locked: AtomicBool::new(false),
            });
        }
        Self { locks }
    }

    fn slot(&self, device: DeviceId) -> Result<usize> {
        self.locks
            .iter()
            .position(|l| l.device == device)
            .ok_or(Error::UnknownDevice(device))
    }

    /// Acquire the lock of a device, spinning until it is free
    pub fn lock(&self, device: DeviceId) -> Result<DeviceGuard<'_>> {
        let slot = self.slot(device)?;
        let mut backoff = 1u32;

        while self.locks[slot]
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            for _ in 0..backoff {
                spin_loop();
            }
            backoff = (backoff * 2).min(64);
        }

        log::trace!("Locked device {}", device);
        Ok(DeviceGuard { locks: self, slot })
    }

    /// Try to acquire the lock of a device without blocking
    ///
    /// Returns `Ok(None)` when another guard holds it.
    pub fn try_lock(&self, device: DeviceId) -> Result<Option<DeviceGuard<'_>>> {
        let slot = self.slot(device)?;
        let acquired = self.locks[slot]
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        Ok(acquired.then_some(DeviceGuard { locks: self, slot }))
    }

    /// Check if a device is currently locked
    pub fn is_locked(&self, device: DeviceId) -> bool {
        self.slot(device)
            .is_ok_and(|slot| self.locks[slot].locked.load(Ordering::Relaxed))
    }

    fn unlock(&self, slot: usize) {
        self.locks[slot].locked.store(false, Ordering::Release);
    }
}

/// Proof of exclusive write/erase access to one device
///
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct DeviceGuard<'a> {
    locks: &'a DeviceLocks,
    slot: usize,
}

impl DeviceGuard<'_> {
    /// Device this guard locks
    pub fn device(&self) -> DeviceId {
        self.locks.locks[self.slot].device
    }

    /// Check if the guard was issued by the given lock set
    pub(crate) fn is_from(&self, locks: &DeviceLocks) -> bool {
        core::ptr::eq(self.locks, locks)
    }
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        log::trace!("Unlocked device {}", self.device());
        self.locks.unlock(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceDescriptor;
    use std::sync::Arc;

    fn locks() -> DeviceLocks {
        let mut registry = DeviceRegistry::new();
        registry
            .register(DeviceDescriptor::new(DeviceId(0), 1, 4096))
            .unwrap();
        registry
            .register(DeviceDescriptor::new(DeviceId(3), 1, 4096))
            .unwrap();
        DeviceLocks::new(&registry)
    }

    #[test]
    fn test_lock_and_release() {
        let locks = locks();
        {
            let guard = locks.lock(DeviceId(3)).unwrap();
            assert_eq!(guard.device(), DeviceId(3));
            assert!(locks.is_locked(DeviceId(3)));
            assert!(!locks.is_locked(DeviceId(0)));
            assert!(locks.try_lock(DeviceId(3)).unwrap().is_none());
            assert!(locks.try_lock(DeviceId(0)).unwrap().is_some());
        }
        assert!(!locks.is_locked(DeviceId(3)));
        assert!(locks.try_lock(DeviceId(3)).unwrap().is_some());
    }

    #[test]
    fn test_unknown_device() {
        assert_eq!(
            locks().lock(DeviceId(7)).unwrap_err(),
            Error::UnknownDevice(DeviceId(7))
        );
    }

    #[test]
    fn test_guard_origin() {
        let a = locks();
        let b = locks();
        let guard = a.lock(DeviceId(0)).unwrap();
        assert!(guard.is_from(&a));
        assert!(!guard.is_from(&b));
    }

    #[test]
    fn test_lock_is_exclusive_across_threads() {
        let locks = Arc::new(locks());
        let inside = Arc::new(AtomicBool::new(false));

        let handles: std::vec::Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let _guard = locks.lock(DeviceId(0)).unwrap();
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        std::thread::yield_now();
                        inside.store(false, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!locks.is_locked(DeviceId(0)));
    }
}
