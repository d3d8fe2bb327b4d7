//! 读写自旋锁
//!
//! 原始锁实现 `lock_api::RawRwLock`，数据封装与守卫类型直接使用 `lock_api`。
//! 读者之间互不阻塞，写者独占。不屏蔽中断：写操作只发生在设备
//! 拓扑变化时，不会在中断上下文中出现。

use core::hint;
use core::sync::atomic::{AtomicUsize, Ordering};

const WRITER: usize = 1;
const READER: usize = 1 << 1;

/// 读写自旋锁的原始实现
///
/// 状态字最低位表示写者，其余位为读者计数。
pub struct RawSpinRwLock {
    state: AtomicUsize,
}

// SAFETY: 写者只有在状态字为 0（无读者、无写者）时才能进入，
// 读者只有在没有写者时才能进入。
unsafe impl lock_api::RawRwLock for RawSpinRwLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinRwLock {
        state: AtomicUsize::new(0),
    };

    type GuardMarker = lock_api::GuardSend;

    fn lock_shared(&self) {
        while !self.try_lock_shared() {
            hint::spin_loop();
        }
    }

    fn try_lock_shared(&self) -> bool {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if state & WRITER != 0 {
                return false;
            }
            match self.state.compare_exchange_weak(
                state,
                state + READER,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => state = current,
            }
        }
    }

    unsafe fn unlock_shared(&self) {
        self.state.fetch_sub(READER, Ordering::Release);
    }

    fn lock_exclusive(&self) {
        while !self.try_lock_exclusive() {
            hint::spin_loop();
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_exclusive(&self) {
        self.state.fetch_and(!WRITER, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != 0
    }
}

/// 读写锁
pub type RwLock<T> = lock_api::RwLock<RawSpinRwLock, T>;
/// 读守卫
pub type RwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawSpinRwLock, T>;
/// 写守卫
pub type RwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawSpinRwLock, T>;
