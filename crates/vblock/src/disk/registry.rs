//! 全局磁盘注册表
//!
//! 与总线树无关：磁盘在创建时登记，拆除时注销。

use alloc::sync::Arc;
use alloc::vec::Vec;
use sync::SpinLock;

use crate::error::DeviceError;

use super::Disk;

/// 已创建磁盘的集合
#[derive(Default)]
pub struct DiskRegistry {
    disks: SpinLock<Vec<Arc<Disk>>>,
}

impl DiskRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记磁盘
    pub fn register(&self, disk: Arc<Disk>) -> Result<(), DeviceError> {
        let mut disks = self.disks.lock();
        disks
            .try_reserve(1)
            .map_err(|_| DeviceError::InsufficientResources)?;
        disks.push(disk);
        Ok(())
    }

    /// 注销磁盘；不在表中时返回 false
    pub fn unregister(&self, disk: &Disk) -> bool {
        let removed = {
            let mut disks = self.disks.lock();
            let pos = disks.iter().position(|d| core::ptr::eq(Arc::as_ptr(d), disk));
            pos.map(|pos| disks.remove(pos))
        };
        // 最后一个引用可能在这里释放，必须在锁外
        removed.is_some()
    }

    /// 已登记磁盘数
    pub fn len(&self) -> usize {
        self.disks.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.disks.lock().is_empty()
    }

    /// 是否包含该磁盘
    pub fn contains(&self, disk: &Disk) -> bool {
        self.disks
            .lock()
            .iter()
            .any(|d| core::ptr::eq(Arc::as_ptr(d), disk))
    }

    /// 当前所有磁盘的快照
    pub fn snapshot(&self) -> Vec<Arc<Disk>> {
        self.disks.lock().clone()
    }

    /// 按磁盘编号查找
    pub fn find_by_number(&self, number: u32) -> Option<Arc<Disk>> {
        self.disks
            .lock()
            .iter()
            .find(|d| d.number() == Some(number))
            .cloned()
    }
}

impl core::fmt::Debug for DiskRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DiskRegistry")
            .field("len", &self.len())
            .finish()
    }
}
