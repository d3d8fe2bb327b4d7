//! 同步原语
//!
//! 为虚拟块设备栈提供锁与事件：
//!
//! - [`SpinLock`] - 屏蔽本地中断的互斥自旋锁（每盘状态、全局磁盘注册表）
//! - [`RwLock`] - 基于 `lock_api` 的读写自旋锁（总线子设备表）
//! - [`SyncEvent`] - 自动复位事件，用于“信号式”互斥
//! - [`IntrGuard`] - 中断屏蔽 RAII 守卫
//!
//! # 架构依赖
//!
//! 中断屏蔽通过 [`ArchOps`] 抽象。内核环境下应在启动早期调用
//! [`register_arch_ops`]；未注册时中断屏蔽退化为空操作，
//! 因此同一份代码也可以在宿主进程（例如测试）中运行。

#![no_std]

mod event;
mod intr_guard;
mod raw_spin_lock;
mod rwlock;
mod spin_lock;

pub use event::{SyncEvent, SyncEventGuard};
pub use intr_guard::IntrGuard;
pub use raw_spin_lock::{RawSpinLock, RawSpinLockGuard};
pub use rwlock::{RawSpinRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关操作
///
/// 由宿主（内核或驱动框架）实现并注册，提供本地中断控制。
pub trait ArchOps: Send + Sync {
    /// 读取并禁用本地中断，返回之前的状态
    ///
    /// # Safety
    /// 返回值必须原样交给 [`ArchOps::restore_interrupts`]
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复中断状态
    ///
    /// # Safety
    /// flags 必须是之前 read_and_disable_interrupts 返回的值
    unsafe fn restore_interrupts(&self, flags: usize);

    /// 当前 CPU ID
    fn cpu_id(&self) -> usize;
}

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的架构操作，未注册时返回 None
#[inline]
pub(crate) fn arch_ops() -> Option<&'static dyn ArchOps> {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    if data == 0 {
        return None;
    }
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    // SAFETY: data 和 vtable 由 register_arch_ops 写入，且 vtable 先于 data 发布
    Some(unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) })
}

/// 是否已注册架构操作
pub fn arch_ops_registered() -> bool {
    arch_ops().is_some()
}
