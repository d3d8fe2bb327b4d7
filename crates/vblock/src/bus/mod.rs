//! 总线设备
//!
//! 总线拥有一张有序的子设备表。追加与移除在写锁下进行，计数与表在同一
//! 临界区内更新；枚举方持读锁，或取一份快照后再遍历。

mod pnp;

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use sync::{RwLock, SpinLock};

use crate::device::{Device, DeviceKind, DeviceNode, same_device};
use crate::dispatch::{DRIVER_TABLE, DispatchEntry};
use crate::driver::Driver;
use crate::error::DeviceError;
use crate::host::{Characteristics, HostDeviceType, PhysicalDesc, PhysicalHandle};
use crate::irp::MajorFunction;

static BUS_TABLE: [DispatchEntry; 7] = [
    DispatchEntry::major(MajorFunction::SystemControl, pnp::sys_ctl),
    DispatchEntry::major(MajorFunction::Power, pnp::power),
    DispatchEntry::major(MajorFunction::DeviceControl, pnp::dev_ctl),
    DispatchEntry::major(MajorFunction::Pnp, pnp::simple),
    DispatchEntry::exact(MajorFunction::Pnp, crate::irp::pnp::START_DEVICE, pnp::start_dev),
    DispatchEntry::exact(MajorFunction::Pnp, crate::irp::pnp::REMOVE_DEVICE, pnp::remove_dev),
    DispatchEntry::exact(
        MajorFunction::Pnp,
        crate::irp::pnp::QUERY_DEVICE_RELATIONS,
        pnp::query_dev_relations,
    ),
];

struct ChildList {
    nodes: Vec<Arc<dyn Device>>,
    count: usize,
}

/// 总线设备
pub struct Bus {
    node: DeviceNode,
    name: String,
    pdo: Option<PhysicalHandle>,
    lower: SpinLock<Option<PhysicalHandle>>,
    children: RwLock<ChildList>,
}

impl Bus {
    pub(crate) fn new(pdo: Option<PhysicalHandle>, name: &str) -> Result<Self, DeviceError> {
        let table = DRIVER_TABLE.extended(&BUS_TABLE)?;
        Ok(Self {
            node: DeviceNode::new(DeviceKind::Bus, table),
            name: name.to_string(),
            pdo,
            lower: SpinLock::new(None),
            children: RwLock::new(ChildList {
                nodes: Vec::new(),
                count: 0,
            }),
        })
    }

    /// 名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 宿主枚举出的物理对象，用于发送“子设备已变化”通知
    pub fn physical_device(&self) -> Option<PhysicalHandle> {
        self.pdo
    }

    /// 设备栈中的下层设备
    pub fn lower_device(&self) -> Option<PhysicalHandle> {
        *self.lower.lock()
    }

    pub(crate) fn set_lower(&self, lower: PhysicalHandle) {
        *self.lower.lock() = Some(lower);
    }

    /// 子设备数
    pub fn child_count(&self) -> usize {
        self.children.read().count
    }

    /// 按挂载顺序返回子设备快照
    pub fn children(&self) -> Vec<Arc<dyn Device>> {
        self.children.read().nodes.clone()
    }

    /// 子设备的物理对象句柄，按挂载顺序
    pub fn child_handles(&self) -> Vec<PhysicalHandle> {
        self.children
            .read()
            .nodes
            .iter()
            .filter_map(|child| child.node().self_handle())
            .collect()
    }

    /// 追加到表尾，返回新的子设备数
    pub(crate) fn append_child(&self, dev: Arc<dyn Device>) -> usize {
        let mut children = self.children.write();
        children.nodes.push(dev);
        children.count += 1;
        children.count
    }

    /// 摘除一个子设备，返回是否找到
    pub fn remove_child(&self, dev: &dyn Device) -> bool {
        let removed = {
            let mut children = self.children.write();
            let pos = children
                .nodes
                .iter()
                .position(|child| same_device(child.as_ref(), dev));
            pos.map(|pos| {
                children.count -= 1;
                children.nodes.remove(pos)
            })
        };
        match removed {
            Some(child) => {
                child.node().clear_parent();
                true
            }
            None => false,
        }
    }

    /// 摘除全部子设备
    pub(crate) fn drain_children(&self) -> Vec<Arc<dyn Device>> {
        let mut children = self.children.write();
        children.count = 0;
        core::mem::take(&mut children.nodes)
    }
}

impl Device for Bus {
    fn node(&self) -> &DeviceNode {
        &self.node
    }

    fn create_pdo(&self, driver: &Driver) -> Result<PhysicalHandle, DeviceError> {
        let desc = PhysicalDesc {
            name: Some(&self.name),
            device_type: HostDeviceType::Controller,
            characteristics: Characteristics::SECURE_OPEN,
        };
        self.node.create_physical(driver, &desc)
    }

    fn as_bus(&self) -> Option<&Bus> {
        Some(self)
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        log::debug!("bus {} freed", self.name);
    }
}
