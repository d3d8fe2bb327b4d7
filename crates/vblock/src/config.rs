//! 驱动配置
//!
//! 固定常量与运行时 [`DriverConfig`]。运行时配置随 [`crate::Driver::new`] 传入。

use alloc::string::{String, ToString};

/// 扇区大小（字节）
pub const SECTOR_SIZE: usize = 512;

/// 默认最大单次传输长度：1 MiB
pub const DEFAULT_MAX_XFER_LEN: u32 = 1024 * 1024;

/// 无法推断时使用的磁头数
pub const DEFAULT_HEADS: u32 = 255;

/// 无法推断时使用的每磁道扇区数
pub const DEFAULT_SECTORS_PER_TRACK: u32 = 63;

/// 总线物理对象的默认名称，也是硬件 ID 的前缀
pub const BUS_NAME: &str = "WinVBlock";

/// 子设备 `init` 失败时的挂载策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttachPolicy {
    /// 记录警告后照常挂载
    #[default]
    Lenient,
    /// 挂载失败，并释放已创建的物理节点
    Strict,
}

/// 驱动运行时配置
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// 子设备初始化失败时的策略
    pub attach_policy: AttachPolicy,
    /// 总线物理对象名称
    pub bus_name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            attach_policy: AttachPolicy::default(),
            bus_name: BUS_NAME.to_string(),
        }
    }
}

impl DriverConfig {
    /// 启用严格挂载
    pub fn strict(mut self) -> Self {
        self.attach_policy = AttachPolicy::Strict;
        self
    }
}
