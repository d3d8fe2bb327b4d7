//! 带数据的自旋锁

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::raw_spin_lock::{RawSpinLock, RawSpinLockGuard};

/// 提供对数据互斥访问的自旋锁
///
/// 持锁期间本地中断被屏蔽，因此临界区必须短小，且不能在其中等待
/// 其它可能在中断上下文中完成的事件。不可重入。
///
/// # 示例
/// ```
/// use sync::SpinLock;
///
/// let lock = SpinLock::new(0);
/// *lock.lock() += 1;
/// assert_eq!(*lock.lock(), 1);
/// ```
pub struct SpinLock<T: ?Sized> {
    raw_lock: RawSpinLock,
    data: UnsafeCell<T>,
}

// SAFETY: RawSpinLock 保证同一时刻只有一个持有者访问 data
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// 创建一个新的 SpinLock
    pub const fn new(data: T) -> Self {
        SpinLock {
            raw_lock: RawSpinLock::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// 消耗锁，取出内部数据
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// 获取锁并返回 RAII 守卫
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let raw_guard = self.raw_lock.lock();
        SpinLockGuard {
            _raw_guard: raw_guard,
            // SAFETY: 已持有 raw_lock
            data: unsafe { &mut *self.data.get() },
        }
    }

    /// 尝试获取锁，已被占用时返回 None
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.raw_lock.try_lock().map(|raw_guard| SpinLockGuard {
            _raw_guard: raw_guard,
            // SAFETY: 已持有 raw_lock
            data: unsafe { &mut *self.data.get() },
        })
    }

    /// 通过独占引用直接访问数据，无需上锁
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// 锁是否被占用（只用于诊断）
    pub fn is_locked(&self) -> bool {
        self.raw_lock.is_locked()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("data", &&*guard).finish(),
            None => f.write_str("SpinLock { <locked> }"),
        }
    }
}

/// SpinLock 的 RAII 守卫，离开作用域时释放锁
pub struct SpinLockGuard<'a, T: ?Sized> {
    _raw_guard: RawSpinLockGuard<'a>,
    data: &'a mut T,
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_and_release() {
        let lock = SpinLock::new(5u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn test_try_lock_contended() {
        let lock = SpinLock::new(());
        let _held = lock.lock();
        assert!(lock.try_lock().is_none());
    }

    #[test]
    fn test_into_inner_and_get_mut() {
        let mut lock = SpinLock::new([0u8; 4]);
        lock.get_mut()[2] = 7;
        assert_eq!(lock.into_inner(), [0, 0, 7, 0]);
    }
}
