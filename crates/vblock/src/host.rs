//! 宿主设备管理器接口
//!
//! 本 crate 不直接接触宿主的设备对象、符号链接和 I/O 管理器，
//! 这些能力通过 [`HostOps`] 抽象，在创建 [`crate::Driver`] 时以
//! `Arc<dyn HostOps>` 传入。

use alloc::sync::Arc;
use core::fmt;

use crate::error::DeviceError;
use crate::irp::{Irp, Status};

/// 宿主可见的设备对象句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalHandle(u64);

impl PhysicalHandle {
    /// 由宿主分配的原始值构造
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始值
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// 驱动对象句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverHandle(u64);

impl DriverHandle {
    /// 由原始值构造
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始值
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// 宿主设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostDeviceType {
    /// 控制器（总线）
    Controller,
    /// 磁盘
    Disk,
    /// 光驱
    CdRom,
}

bitflags::bitflags! {
    /// 设备特性
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Characteristics: u32 {
        /// 可移除介质
        const REMOVABLE_MEDIA = 0x0000_0001;
        /// 只读
        const READ_ONLY_DEVICE = 0x0000_0002;
        /// 软盘
        const FLOPPY_DISKETTE = 0x0000_0004;
        /// 由宿主生成设备名
        const AUTOGENERATED_NAME = 0x0000_0080;
        /// 打开时做安全检查
        const SECURE_OPEN = 0x0000_0100;
    }
}

/// 关系类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationType {
    /// 总线子设备
    Bus,
    /// 弹出关系
    Ejection,
    /// 移除关系
    Removal,
    /// 目标设备
    TargetDevice,
}

/// 创建物理对象所需的描述
#[derive(Debug, Clone, Copy)]
pub struct PhysicalDesc<'a> {
    /// 设备名，None 表示由宿主生成
    pub name: Option<&'a str>,
    /// 设备类型
    pub device_type: HostDeviceType,
    /// 特性
    pub characteristics: Characteristics,
}

/// 宿主设备管理器
pub trait HostOps: Send + Sync {
    /// 创建物理设备对象
    fn create_device(
        &self,
        driver: DriverHandle,
        desc: &PhysicalDesc<'_>,
    ) -> Result<PhysicalHandle, DeviceError>;

    /// 删除物理设备对象
    fn delete_device(&self, handle: PhysicalHandle);

    /// 把 fdo 挂到 pdo 所在设备栈顶，返回原栈顶（下层设备）
    fn attach_to_stack(&self, fdo: PhysicalHandle, pdo: PhysicalHandle)
    -> Option<PhysicalHandle>;

    /// 通知宿主某设备的关系已变化，宿主随后异步重新枚举
    fn invalidate_relations(&self, pdo: PhysicalHandle, relation: RelationType);

    /// 把请求交给下层设备
    fn call_lower(&self, lower: PhysicalHandle, irp: &mut Irp) -> Status;
}

/// 已创建的物理对象
///
/// 析构时通过宿主删除对应设备对象。
pub struct PhysicalNode {
    handle: PhysicalHandle,
    host: Arc<dyn HostOps>,
}

impl PhysicalNode {
    /// 通过宿主创建物理对象
    pub fn create(
        host: &Arc<dyn HostOps>,
        driver: DriverHandle,
        desc: &PhysicalDesc<'_>,
    ) -> Result<Self, DeviceError> {
        let handle = host.create_device(driver, desc)?;
        Ok(Self {
            handle,
            host: Arc::clone(host),
        })
    }

    /// 句柄
    pub fn handle(&self) -> PhysicalHandle {
        self.handle
    }
}

impl fmt::Debug for PhysicalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PhysicalNode").field(&self.handle).finish()
    }
}

impl Drop for PhysicalNode {
    fn drop(&mut self) {
        log::debug!("deleting physical device {:#x}", self.handle.raw());
        self.host.delete_device(self.handle);
    }
}
