//! 中断保护器
//!
//! 创建时禁用本地中断，销毁时恢复。只能阻止本地 CPU 上
//! “任务 vs 中断完成例程”的并发，多核共享数据仍需配合自旋锁。

use crate::arch_ops;

/// 中断保护器
///
/// 未注册 [`crate::ArchOps`] 时不做任何事。
pub struct IntrGuard {
    flags: Option<usize>,
}

impl IntrGuard {
    /// 禁用本地中断并保存之前的状态
    pub fn new() -> Self {
        // SAFETY: 保存的 flags 只会在 Drop 中原样恢复
        let flags = arch_ops().map(|ops| unsafe { ops.read_and_disable_interrupts() });
        IntrGuard { flags }
    }

    /// 守卫是否真正屏蔽了中断
    pub fn is_active(&self) -> bool {
        self.flags.is_some()
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    fn drop(&mut self) {
        if let (Some(flags), Some(ops)) = (self.flags, arch_ops()) {
            // SAFETY: flags 来自 new() 中的 read_and_disable_interrupts
            unsafe { ops.restore_interrupts(flags) };
        }
    }
}
