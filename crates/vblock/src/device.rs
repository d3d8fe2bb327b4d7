//! 设备节点
//!
//! 总线和磁盘共享的 [`DeviceNode`]，以及具体设备类型实现的 [`Device`] trait。
//! 具体类型持有自己的 `DeviceNode`（组合而非内存布局重叠），
//! 通过 [`Device::as_disk`] / [`Device::as_bus`] 取得类型化视图。
//!
//! 释放顺序由所有权决定：具体类型先在自己的 `Drop` 中释放私有资源，
//! 随后其 `DeviceNode` 字段析构，最后物理对象被宿主删除。

use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicBool, Ordering};
use sync::SpinLock;

use crate::bus::Bus;
use crate::disk::Disk;
use crate::dispatch::DispatchTable;
use crate::driver::Driver;
use crate::error::DeviceError;
use crate::host::{DriverHandle, PhysicalDesc, PhysicalHandle, PhysicalNode};

/// 设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// 总线
    Bus,
    /// 磁盘（软盘、硬盘、光盘）
    Disk,
}

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// 未启动
    NotStarted,
    /// 已启动
    Started,
    /// 等待停止
    StopPending,
    /// 已停止
    Stopped,
    /// 等待移除
    RemovePending,
    /// 意外移除中
    SurpriseRemovePending,
    /// 已删除
    Deleted,
}

bitflags::bitflags! {
    /// 物理对象标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFlags: u32 {
        /// 直接 I/O
        const DIRECT_IO = 0x0000_0010;
        /// 仍在初始化，宿主暂不向其发送请求
        const INITIALIZING = 0x0000_0080;
        /// 上电需要浪涌电流
        const POWER_INRUSH = 0x0000_4000;
    }
}

#[derive(Debug, Clone, Copy)]
struct States {
    current: DeviceState,
    old: DeviceState,
}

/// 总线与磁盘共享的通用部分
pub struct DeviceNode {
    kind: DeviceKind,
    states: SpinLock<States>,
    flags: SpinLock<DeviceFlags>,
    driver: SpinLock<Option<DriverHandle>>,
    physical: SpinLock<Option<PhysicalNode>>,
    parent: SpinLock<Option<Weak<dyn Device>>>,
    attached: AtomicBool,
    table: DispatchTable,
}

impl DeviceNode {
    /// 以给定分发表创建节点
    pub fn new(kind: DeviceKind, table: DispatchTable) -> Self {
        Self {
            kind,
            states: SpinLock::new(States {
                current: DeviceState::NotStarted,
                old: DeviceState::NotStarted,
            }),
            flags: SpinLock::new(DeviceFlags::empty()),
            driver: SpinLock::new(None),
            physical: SpinLock::new(None),
            parent: SpinLock::new(None),
            attached: AtomicBool::new(false),
            table,
        }
    }

    /// 设备类型
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// 当前状态
    pub fn state(&self) -> DeviceState {
        self.states.lock().current
    }

    /// 上一个状态
    pub fn old_state(&self) -> DeviceState {
        self.states.lock().old
    }

    /// 切换状态，旧状态被保存以便恢复
    pub fn set_state(&self, state: DeviceState) {
        let mut states = self.states.lock();
        states.old = states.current;
        states.current = state;
    }

    /// 恢复到上一个状态
    pub fn restore_state(&self) {
        let mut states = self.states.lock();
        states.current = states.old;
    }

    /// 当前标志
    pub fn flags(&self) -> DeviceFlags {
        *self.flags.lock()
    }

    /// 置位标志
    pub fn set_flags(&self, flags: DeviceFlags) {
        self.flags.lock().insert(flags);
    }

    /// 清除标志
    pub fn clear_flags(&self, flags: DeviceFlags) {
        self.flags.lock().remove(flags);
    }

    /// 所属驱动
    pub fn driver_handle(&self) -> Option<DriverHandle> {
        *self.driver.lock()
    }

    /// 自身物理对象句柄，尚未创建时为 None
    pub fn self_handle(&self) -> Option<PhysicalHandle> {
        self.physical.lock().as_ref().map(PhysicalNode::handle)
    }

    /// 父设备
    pub fn parent(&self) -> Option<Arc<dyn Device>> {
        self.parent.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: Weak<dyn Device>) {
        *self.parent.lock() = Some(parent);
    }

    pub(crate) fn clear_parent(&self) {
        self.parent.lock().take();
    }

    /// 是否已挂到总线（或正在挂载）
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// 占用挂载权，已被占用时返回 false
    pub(crate) fn claim_attach(&self) -> bool {
        !self.attached.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn release_attach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    /// 分发表
    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// 通过宿主创建物理对象并初始化通用字段
    ///
    /// 成功后状态为 NotStarted，自身句柄即宿主返回的对象，
    /// 初始化标志置位；失败时节点保持原样。
    pub fn create_physical(
        &self,
        driver: &Driver,
        desc: &PhysicalDesc<'_>,
    ) -> Result<PhysicalHandle, DeviceError> {
        let node = PhysicalNode::create(driver.host(), driver.handle(), desc)?;
        let handle = node.handle();

        let previous = self.physical.lock().replace(node);
        if previous.is_some() {
            log::warn!("device node re-created its physical object");
        }
        drop(previous);

        *self.driver.lock() = Some(driver.handle());
        *self.states.lock() = States {
            current: DeviceState::NotStarted,
            old: DeviceState::NotStarted,
        };
        self.set_flags(DeviceFlags::INITIALIZING);
        Ok(handle)
    }

    /// 释放物理对象
    pub(crate) fn release_physical(&self) {
        let node = self.physical.lock().take();
        drop(node);
    }
}

/// 具体设备类型
///
/// 未覆盖的 `init` 总是成功，`close` 什么都不做。
/// `free` 由 `Drop` 表达：拆除时丢弃最后一个 `Arc`。
pub trait Device: Send + Sync {
    /// 通用部分
    fn node(&self) -> &DeviceNode;

    /// 创建宿主可见的物理对象
    ///
    /// 失败时不得自动重试，错误交给请求挂载的一方。
    fn create_pdo(&self, driver: &Driver) -> Result<PhysicalHandle, DeviceError>;

    /// 类型相关的启动逻辑
    fn init(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// 类型相关的关闭逻辑，可重复调用
    fn close(&self) {}

    /// 磁盘视图
    fn as_disk(&self) -> Option<&Disk> {
        None
    }

    /// 总线视图
    fn as_bus(&self) -> Option<&Bus> {
        None
    }

    /// 设备类型
    fn kind(&self) -> DeviceKind {
        self.node().kind()
    }
}

/// 两个设备引用是否指向同一设备
pub fn same_device(a: &dyn Device, b: &dyn Device) -> bool {
    core::ptr::eq(a.node(), b.node())
}
