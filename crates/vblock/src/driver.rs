//! 驱动上下文
//!
//! [`Driver`] 是挂载时创建的唯一入口，持有：
//!
//! - 宿主接口 `Arc<dyn HostOps>`
//! - 全局磁盘注册表 [`DiskRegistry`]（不依赖总线树的磁盘簿记）
//! - 总线槽位：总线在 [`Driver::add_device`] 中创建一次，之后子设备经
//!   [`Driver::add_child`] 挂到它下面
//!
//! 磁盘的创建（[`Driver::create_disk`]）与挂载是两个独立步骤。

use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use sync::RwLock;

use crate::bus::Bus;
use crate::config::{AttachPolicy, DriverConfig};
use crate::device::{Device, DeviceFlags, DeviceState};
use crate::disk::{Disk, DiskOps, DiskRegistry, DiskSpec};
use crate::error::DeviceError;
use crate::host::{DriverHandle, HostOps, PhysicalHandle, RelationType};
use crate::irp::{Dispatched, Irp};

static NEXT_DRIVER: AtomicU64 = AtomicU64::new(1);

/// 驱动上下文
pub struct Driver {
    handle: DriverHandle,
    host: Arc<dyn HostOps>,
    config: DriverConfig,
    registry: DiskRegistry,
    bus: RwLock<Option<Arc<Bus>>>,
    next_disk: AtomicU32,
}

impl Driver {
    /// 创建驱动上下文
    pub fn new(host: Arc<dyn HostOps>, config: DriverConfig) -> Self {
        let handle = DriverHandle::new(NEXT_DRIVER.fetch_add(1, Ordering::Relaxed));
        log::debug!("driver {:#x} created with {:?}", handle.raw(), config.attach_policy);
        Self {
            handle,
            host,
            config,
            registry: DiskRegistry::new(),
            bus: RwLock::new(None),
            next_disk: AtomicU32::new(0),
        }
    }

    /// 驱动句柄
    pub fn handle(&self) -> DriverHandle {
        self.handle
    }

    /// 宿主接口
    pub fn host(&self) -> &Arc<dyn HostOps> {
        &self.host
    }

    /// 配置
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 磁盘注册表
    pub fn registry(&self) -> &DiskRegistry {
        &self.registry
    }

    pub(crate) fn next_disk_number(&self) -> u32 {
        self.next_disk.fetch_add(1, Ordering::Relaxed)
    }

    /// 创建总线设备
    ///
    /// 总线已存在时直接返回它。`pdo` 为宿主枚举出的物理对象，给出时总线
    /// 挂入其设备栈；挂栈失败返回 [`DeviceError::NoSuchDevice`]，不留下总线。
    pub fn add_device(&self, pdo: Option<PhysicalHandle>) -> Result<Arc<Bus>, DeviceError> {
        let mut slot = self.bus.write();
        if let Some(bus) = slot.as_ref() {
            return Ok(Arc::clone(bus));
        }

        let bus = Arc::new(Bus::new(pdo, &self.config.bus_name)?);
        let fdo = bus.create_pdo(self).map_err(|err| {
            log::error!("bus: creating device object failed: {}", err);
            err
        })?;
        bus.node()
            .set_flags(DeviceFlags::DIRECT_IO | DeviceFlags::POWER_INRUSH);

        if let Some(pdo) = pdo {
            match self.host.attach_to_stack(fdo, pdo) {
                Some(lower) => bus.set_lower(lower),
                None => {
                    log::error!("bus: attaching to device stack of {:#x} failed", pdo.raw());
                    return Err(DeviceError::NoSuchDevice);
                }
            }
        }

        bus.node().clear_flags(DeviceFlags::INITIALIZING);
        *slot = Some(Arc::clone(&bus));
        log::info!("bus {} attached as {:#x}", self.config.bus_name, fdo.raw());
        Ok(bus)
    }

    /// 当前总线
    pub fn bus(&self) -> Option<Arc<Bus>> {
        let bus = self.bus.read().clone();
        if bus.is_none() {
            log::debug!("no bus device");
        }
        bus
    }

    /// 停止总线，清空总线槽位
    pub fn stop(&self) {
        if let Some(bus) = self.bus.write().take() {
            log::info!("bus stopped with {} children", bus.child_count());
        }
    }

    /// 把设备挂到总线下
    ///
    /// 依次：创建物理对象、设父设备、调用 `init`、清除初始化标志、
    /// 追加到子设备表尾并计数、通知宿主重新枚举。
    /// 无总线、设备已挂载、磁盘已拆除或物理对象创建失败时返回错误，子设备表不变。
    /// `init` 失败在 [`AttachPolicy::Lenient`] 下只记录警告。
    pub fn add_child(&self, dev: Arc<dyn Device>) -> Result<(), DeviceError> {
        let Some(bus) = self.bus() else {
            log::warn!("add_child: no bus device");
            return Err(DeviceError::NoBus);
        };

        if dev.as_disk().is_some_and(Disk::is_torn_down) {
            log::warn!("add_child: disk has been torn down");
            return Err(DeviceError::AlreadyTornDown);
        }
        if !dev.node().claim_attach() {
            log::warn!("add_child: device is already attached");
            return Err(DeviceError::InvalidParameter);
        }

        let handle = dev.create_pdo(self).map_err(|err| {
            log::error!("add_child: creating physical device failed: {}", err);
            dev.node().release_attach();
            err
        })?;

        let parent: Arc<dyn Device> = bus.clone();
        let parent: Weak<dyn Device> = Arc::downgrade(&parent);
        dev.node().set_parent(parent);

        if let Err(err) = dev.init() {
            match self.config.attach_policy {
                AttachPolicy::Lenient => {
                    log::warn!("add_child: init of {:#x} failed: {}", handle.raw(), err);
                }
                AttachPolicy::Strict => {
                    log::error!("add_child: init of {:#x} failed: {}", handle.raw(), err);
                    dev.node().clear_parent();
                    dev.node().release_physical();
                    dev.node().release_attach();
                    return Err(DeviceError::InitFailed);
                }
            }
        }

        dev.node().clear_flags(DeviceFlags::INITIALIZING);
        let count = bus.append_child(Arc::clone(&dev));

        // 与 teardown_disk 竞争时，拆除可能已经错过了总线上的这个节点
        if dev.as_disk().is_some_and(Disk::is_torn_down) {
            log::warn!("add_child: disk torn down during attach");
            bus.remove_child(dev.as_ref());
            dev.node().release_physical();
            return Err(DeviceError::AlreadyTornDown);
        }

        if let Some(pdo) = bus.physical_device() {
            self.host.invalidate_relations(pdo, RelationType::Bus);
        }
        log::debug!("add_child: {:#x} attached, bus has {} children", handle.raw(), count);
        Ok(())
    }

    /// 创建磁盘并登记到注册表
    ///
    /// 磁盘此时尚未挂到总线。任一步失败都不会留下可达的半成品。
    pub fn create_disk(
        &self,
        spec: DiskSpec,
        ops: Box<dyn DiskOps>,
    ) -> Result<Arc<Disk>, DeviceError> {
        let disk = Arc::new(Disk::new(spec, ops)?);
        self.registry.register(Arc::clone(&disk))?;
        log::debug!("disk ({:?}, {} sectors) created", spec.media, spec.lba_size);
        Ok(disk)
    }

    /// 拆除磁盘
    ///
    /// 每个磁盘只会被拆除一次，并发的第二次调用返回
    /// [`DeviceError::AlreadyTornDown`]。拆除依次关闭磁盘、从父总线摘除、
    /// 从注册表移除并释放物理对象；内存在最后一个引用消失时释放。
    pub fn teardown_disk(&self, disk: &Arc<Disk>) -> Result<(), DeviceError> {
        if !disk.begin_teardown() {
            log::warn!("disk teardown raced with another teardown");
            return Err(DeviceError::AlreadyTornDown);
        }

        // 总线移除或卸载时已经关闭过
        if disk.node().state() != DeviceState::Deleted {
            disk.close();
            disk.node().set_state(DeviceState::Deleted);
        }

        if let Some(parent) = disk.node().parent() {
            if let Some(bus) = parent.as_bus() {
                bus.remove_child(&**disk);
                if let Some(pdo) = bus.physical_device() {
                    self.host.invalidate_relations(pdo, RelationType::Bus);
                }
            }
        }
        disk.node().clear_parent();

        self.registry.unregister(disk);
        disk.node().release_physical();
        disk.node().release_attach();
        Ok(())
    }

    /// 把请求交给设备的分发表
    pub fn dispatch(&self, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
        dev.node().table().dispatch(self, dev, irp)
    }
}
