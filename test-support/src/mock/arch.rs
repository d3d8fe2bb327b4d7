//! 架构相关操作的 Mock 实现

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use sync::ArchOps;

/// Mock 架构操作
pub struct MockArchOps {
    pub interrupt_state: AtomicBool,
    pub cpu_id: AtomicUsize,
    pub disable_count: AtomicUsize,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            interrupt_state: AtomicBool::new(true),
            cpu_id: AtomicUsize::new(0),
            disable_count: AtomicUsize::new(0),
        }
    }
}

impl Default for MockArchOps {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchOps for MockArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        self.disable_count.fetch_add(1, Ordering::Relaxed);
        self.interrupt_state.swap(false, Ordering::SeqCst) as usize
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        self.interrupt_state.store(flags != 0, Ordering::SeqCst);
    }

    fn cpu_id(&self) -> usize {
        self.cpu_id.load(Ordering::Relaxed)
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();

// 0 = uninit, 1 = initializing, 2 = ready
static ARCH_INIT: AtomicUsize = AtomicUsize::new(0);

/// 注册 [`MOCK_ARCH_OPS`]，可重复调用
pub fn init_mock_arch_ops() {
    match ARCH_INIT.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            // SAFETY: 只有赢得 compare_exchange 的线程会注册
            unsafe { sync::register_arch_ops(&MOCK_ARCH_OPS) };
            ARCH_INIT.store(2, Ordering::Release);
        }
        Err(_) => {
            while ARCH_INIT.load(Ordering::Acquire) != 2 {
                core::hint::spin_loop();
            }
        }
    }
}
