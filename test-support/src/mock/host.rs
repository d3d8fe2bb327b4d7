//! 宿主接口的 Mock 实现
//!
//! 按调用顺序记录设备创建、删除、重新枚举与向下转发，并支持注入失败。

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use sync::SpinLock;
use vblock::irp::MajorFunction;
use vblock::{
    Characteristics, DeviceError, DriverHandle, HostDeviceType, HostOps, Irp, PhysicalDesc,
    PhysicalHandle, RelationType, Status,
};

/// 一次设备创建
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub handle: PhysicalHandle,
    pub driver: DriverHandle,
    pub name: Option<String>,
    pub device_type: HostDeviceType,
    pub characteristics: Characteristics,
}

/// Mock 宿主
pub struct MockHost {
    next_handle: AtomicU64,
    fail_create: AtomicBool,
    fail_attach: AtomicBool,
    lower_status: SpinLock<Status>,
    created: SpinLock<Vec<Created>>,
    deleted: SpinLock<Vec<PhysicalHandle>>,
    invalidations: SpinLock<Vec<(PhysicalHandle, RelationType)>>,
    forwarded: SpinLock<Vec<(PhysicalHandle, MajorFunction, u8)>>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicU64::new(0x100),
            fail_create: AtomicBool::new(false),
            fail_attach: AtomicBool::new(false),
            lower_status: SpinLock::new(Status::Success),
            created: SpinLock::new(Vec::new()),
            deleted: SpinLock::new(Vec::new()),
            invalidations: SpinLock::new(Vec::new()),
            forwarded: SpinLock::new(Vec::new()),
        })
    }

    /// 作为 `Arc<dyn HostOps>` 交给驱动
    pub fn ops(self: &Arc<Self>) -> Arc<dyn HostOps> {
        self.clone()
    }

    /// 一个由“上层总线驱动”枚举出的物理对象
    pub fn enumerated_pdo(&self) -> PhysicalHandle {
        self.alloc_handle()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    /// 下层设备对转发请求返回的状态
    pub fn set_lower_status(&self, status: Status) {
        *self.lower_status.lock() = status;
    }

    pub fn created(&self) -> Vec<Created> {
        self.created.lock().clone()
    }

    pub fn deleted(&self) -> Vec<PhysicalHandle> {
        self.deleted.lock().clone()
    }

    /// 尚未删除的设备对象数
    pub fn live_count(&self) -> usize {
        self.created.lock().len() - self.deleted.lock().len()
    }

    pub fn invalidations(&self) -> Vec<(PhysicalHandle, RelationType)> {
        self.invalidations.lock().clone()
    }

    pub fn forwarded(&self) -> Vec<(PhysicalHandle, MajorFunction, u8)> {
        self.forwarded.lock().clone()
    }

    fn alloc_handle(&self) -> PhysicalHandle {
        PhysicalHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }
}

impl HostOps for MockHost {
    fn create_device(
        &self,
        driver: DriverHandle,
        desc: &PhysicalDesc<'_>,
    ) -> Result<PhysicalHandle, DeviceError> {
        if self.fail_create.load(Ordering::SeqCst) {
            log::debug!("mock host: create_device failing on request");
            return Err(DeviceError::InsufficientResources);
        }
        let handle = self.alloc_handle();
        self.created.lock().push(Created {
            handle,
            driver,
            name: desc.name.map(|name| name.to_string()),
            device_type: desc.device_type,
            characteristics: desc.characteristics,
        });
        Ok(handle)
    }

    fn delete_device(&self, handle: PhysicalHandle) {
        self.deleted.lock().push(handle);
    }

    fn attach_to_stack(&self, _fdo: PhysicalHandle, _pdo: PhysicalHandle) -> Option<PhysicalHandle> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.alloc_handle())
    }

    fn invalidate_relations(&self, pdo: PhysicalHandle, relation: RelationType) {
        self.invalidations.lock().push((pdo, relation));
    }

    fn call_lower(&self, lower: PhysicalHandle, irp: &mut Irp) -> Status {
        self.forwarded
            .lock()
            .push((lower, irp.major(), irp.minor()));
        let status = *self.lower_status.lock();
        irp.complete(status);
        status
    }
}
