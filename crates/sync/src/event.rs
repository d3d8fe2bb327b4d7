//! 自动复位事件
//!
//! 语义与同步事件一致：`signal` 置位，一次成功的 `wait`/`try_wait`
//! 消耗该信号并自动复位，因此任一时刻最多放行一个等待者。
//! 以“已置位”初始化时可以当作二值互斥使用，见 [`SyncEvent::hold`]。

use core::hint;
use core::sync::atomic::{AtomicBool, Ordering};

/// 自动复位事件
#[derive(Debug)]
pub struct SyncEvent {
    signaled: AtomicBool,
}

impl SyncEvent {
    /// 以给定初始状态创建事件
    pub const fn new(signaled: bool) -> Self {
        Self {
            signaled: AtomicBool::new(signaled),
        }
    }

    /// 置位事件，放行一个等待者
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    /// 清除信号
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    /// 当前是否处于置位状态
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// 若事件已置位则消耗信号并返回 true
    pub fn try_wait(&self) -> bool {
        self.signaled
            .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// 自旋等待直到消耗到一次信号
    pub fn wait(&self) {
        while !self.try_wait() {
            while !self.signaled.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    /// 等待信号并返回守卫，守卫析构时重新置位
    pub fn hold(&self) -> SyncEventGuard<'_> {
        self.wait();
        SyncEventGuard { event: self }
    }

    /// 非阻塞版本的 [`SyncEvent::hold`]
    pub fn try_hold(&self) -> Option<SyncEventGuard<'_>> {
        self.try_wait().then_some(SyncEventGuard { event: self })
    }
}

/// 持有事件信号的守卫
pub struct SyncEventGuard<'a> {
    event: &'a SyncEvent,
}

impl Drop for SyncEventGuard<'_> {
    fn drop(&mut self) {
        self.event.signal();
    }
}
