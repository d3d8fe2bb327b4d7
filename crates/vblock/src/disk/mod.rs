//! 磁盘设备
//!
//! 磁盘把某个后端（AoE、内存、文件……）呈现为标准块设备。后端通过
//! [`DiskOps`] 接入；本层只做委托，不做缓冲或重试。
//!
//! 磁盘由 [`crate::Driver::create_disk`] 创建并登记到 [`DiskRegistry`]，
//! 之后再由 [`crate::Driver::add_child`] 挂到总线下。

mod dev_ctl;
mod geometry;
mod pnp;
mod ram_disk;
mod registry;

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use sync::{SpinLock, SyncEvent};

use crate::config::{DEFAULT_MAX_XFER_LEN, SECTOR_SIZE};
use crate::device::{Device, DeviceFlags, DeviceKind, DeviceNode};
use crate::dispatch::{DRIVER_TABLE, DispatchEntry};
use crate::driver::Driver;
use crate::error::DeviceError;
use crate::host::{Characteristics, HostDeviceType, PhysicalDesc, PhysicalHandle};
use crate::irp::{Dispatched, Irp, IrpParams, MajorFunction, Status, pnp as mn};

pub use geometry::{GeometrySource, guess_geometry, infer_chs};
pub use ram_disk::RamDisk;
pub use registry::DiskRegistry;

/// 介质类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// 软盘
    Floppy = 0,
    /// 硬盘
    HardDisk = 1,
    /// 光盘
    OpticalDisc = 2,
}

const MEDIA_COUNT: usize = 3;

static REMOVABLE: [bool; MEDIA_COUNT] = [true, false, true];
static COMPAT_IDS: [&str; MEDIA_COUNT] = ["GenSFloppy", "GenDisk", "GenCdRom"];
static DESCRIPTIONS: [&str; MEDIA_COUNT] = ["Floppy Disk", "Hard Disk", "Optical Disc"];
static HOST_TYPES: [HostDeviceType; MEDIA_COUNT] =
    [HostDeviceType::Disk, HostDeviceType::Disk, HostDeviceType::CdRom];
static CHARACTERISTICS: [Characteristics; MEDIA_COUNT] = [
    Characteristics::REMOVABLE_MEDIA.union(Characteristics::FLOPPY_DISKETTE),
    Characteristics::empty(),
    Characteristics::REMOVABLE_MEDIA.union(Characteristics::READ_ONLY_DEVICE),
];

impl MediaKind {
    /// 是否为可移除介质
    pub fn removable(&self) -> bool {
        REMOVABLE[*self as usize]
    }

    /// 兼容 ID
    pub fn compat_id(&self) -> &'static str {
        COMPAT_IDS[*self as usize]
    }

    /// 设备描述
    pub fn description(&self) -> &'static str {
        DESCRIPTIONS[*self as usize]
    }

    /// 宿主设备类型
    pub fn host_device_type(&self) -> HostDeviceType {
        HOST_TYPES[*self as usize]
    }

    /// 设备特性
    pub fn characteristics(&self) -> Characteristics {
        CHARACTERISTICS[*self as usize]
    }
}

/// I/O 方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// 读
    Read,
    /// 写
    Write,
}

/// CHS 几何，0 表示未设置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    /// 磁头数
    pub heads: u32,
    /// 每磁道扇区数
    pub sectors_per_track: u32,
    /// 柱面数
    pub cylinders: u64,
}

/// 几何查询的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskGeometry {
    /// 介质
    pub media: MediaKind,
    /// 柱面数
    pub cylinders: u64,
    /// 每柱面磁道数（即磁头数）
    pub tracks_per_cylinder: u32,
    /// 每磁道扇区数
    pub sectors_per_track: u32,
    /// 扇区字节数
    pub bytes_per_sector: u32,
}

/// 创建磁盘的参数
#[derive(Debug, Clone, Copy)]
pub struct DiskSpec {
    /// 介质
    pub media: MediaKind,
    /// 总扇区数
    pub lba_size: u64,
    /// 预置几何，非零字段优先于推断结果
    pub geometry: Geometry,
}

impl DiskSpec {
    /// 无预置几何的参数
    pub fn new(media: MediaKind, lba_size: u64) -> Self {
        Self {
            media,
            lba_size,
            geometry: Geometry::default(),
        }
    }

    /// 预置几何
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }
}

/// 后端操作
///
/// 只有 `io` 必须实现；最大传输长度默认 1 MiB，`init` 默认成功，`close` 默认什么都不做。
pub trait DiskOps: Send + Sync {
    /// 扇区读写
    ///
    /// 写请求从 `buffer` 取数据，读请求写入 `buffer`。后端可以返回
    /// [`Status::Pending`] 并稍后自行完成 `irp`。
    fn io(
        &self,
        disk: &Disk,
        mode: IoMode,
        start_sector: u64,
        sector_count: u32,
        buffer: &mut [u8],
        irp: Option<&mut Irp>,
    ) -> Status;

    /// 单次传输的最大字节数
    fn max_xfer_len(&self, _disk: &Disk) -> u32 {
        DEFAULT_MAX_XFER_LEN
    }

    /// 挂载时的初始化，通常在这里确定几何
    fn init(&self, _disk: &Disk) -> Result<(), DeviceError> {
        Ok(())
    }

    /// 关闭
    fn close(&self, _disk: &Disk) {}
}

#[derive(Debug, Default)]
struct DiskState {
    number: Option<u32>,
    unmount: bool,
}

static DISK_TABLE: [DispatchEntry; 12] = [
    DispatchEntry::major(MajorFunction::DeviceControl, dev_ctl::dispatch),
    DispatchEntry::major(MajorFunction::SystemControl, sys_ctl),
    DispatchEntry::major(MajorFunction::Power, power),
    DispatchEntry::major(MajorFunction::Scsi, io),
    DispatchEntry::major(MajorFunction::Read, io),
    DispatchEntry::major(MajorFunction::Write, io),
    DispatchEntry::major(MajorFunction::Pnp, pnp::simple),
    DispatchEntry::exact(MajorFunction::Pnp, mn::QUERY_CAPABILITIES, pnp::query_capabilities),
    DispatchEntry::exact(MajorFunction::Pnp, mn::QUERY_BUS_INFORMATION, pnp::query_bus_info),
    DispatchEntry::exact(
        MajorFunction::Pnp,
        mn::QUERY_DEVICE_RELATIONS,
        pnp::query_dev_relations,
    ),
    DispatchEntry::exact(MajorFunction::Pnp, mn::QUERY_DEVICE_TEXT, pnp::query_dev_text),
    DispatchEntry::exact(MajorFunction::Pnp, mn::QUERY_ID, pnp::query_id),
];

/// 磁盘设备
pub struct Disk {
    node: DeviceNode,
    media: MediaKind,
    ops: Box<dyn DiskOps>,
    lba_size: AtomicU64,
    geometry: SpinLock<Geometry>,
    search_event: SyncEvent,
    state: SpinLock<DiskState>,
    torn_down: AtomicBool,
}

impl Disk {
    pub(crate) fn new(spec: DiskSpec, ops: Box<dyn DiskOps>) -> Result<Self, DeviceError> {
        let table = DRIVER_TABLE.extended(&DISK_TABLE)?;
        Ok(Self {
            node: DeviceNode::new(DeviceKind::Disk, table),
            media: spec.media,
            ops,
            lba_size: AtomicU64::new(spec.lba_size),
            geometry: SpinLock::new(spec.geometry),
            search_event: SyncEvent::new(true),
            state: SpinLock::new(DiskState::default()),
            torn_down: AtomicBool::new(false),
        })
    }

    /// 介质
    pub fn media(&self) -> MediaKind {
        self.media
    }

    /// 是否可移除，由介质决定
    pub fn removable(&self) -> bool {
        self.media.removable()
    }

    /// 总扇区数
    pub fn lba_size(&self) -> u64 {
        self.lba_size.load(Ordering::Acquire)
    }

    /// 由后端在初始化时更新总扇区数
    pub fn set_lba_size(&self, sectors: u64) {
        self.lba_size.store(sectors, Ordering::Release);
    }

    /// 当前几何
    pub fn geometry(&self) -> Geometry {
        *self.geometry.lock()
    }

    pub(crate) fn geometry_lock(&self) -> &SpinLock<Geometry> {
        &self.geometry
    }

    /// 查询几何所用的完整描述
    pub fn drive_geometry(&self) -> DiskGeometry {
        let geometry = self.geometry();
        DiskGeometry {
            media: self.media,
            cylinders: geometry.cylinders,
            tracks_per_cylinder: geometry.heads,
            sectors_per_track: geometry.sectors_per_track,
            bytes_per_sector: SECTOR_SIZE as u32,
        }
    }

    /// 几何/搜索类操作的互斥事件
    pub fn search_event(&self) -> &SyncEvent {
        &self.search_event
    }

    /// 物理对象创建时分配的磁盘编号
    pub fn number(&self) -> Option<u32> {
        self.state.lock().number
    }

    /// 是否已请求卸载
    pub fn is_unmounting(&self) -> bool {
        self.state.lock().unmount
    }

    /// 请求卸载：磁盘在下一次 PnP 移除时关闭
    pub fn set_unmount(&self, unmount: bool) {
        self.state.lock().unmount = unmount;
    }

    /// 扇区读写，直接交给后端
    pub fn io(
        &self,
        mode: IoMode,
        start_sector: u64,
        sector_count: u32,
        buffer: &mut [u8],
        irp: Option<&mut Irp>,
    ) -> Status {
        self.ops
            .io(self, mode, start_sector, sector_count, buffer, irp)
    }

    /// 单次传输的最大字节数
    pub fn max_xfer_len(&self) -> u32 {
        self.ops.max_xfer_len(self)
    }

    pub(crate) fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }

    /// 是否已被拆除
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

impl Device for Disk {
    fn node(&self) -> &DeviceNode {
        &self.node
    }

    fn create_pdo(&self, driver: &Driver) -> Result<PhysicalHandle, DeviceError> {
        let desc = PhysicalDesc {
            name: None,
            device_type: self.media.host_device_type(),
            characteristics: Characteristics::AUTOGENERATED_NAME
                | Characteristics::SECURE_OPEN
                | self.media.characteristics(),
        };
        let handle = self.node.create_physical(driver, &desc)?;

        {
            let mut state = self.state.lock();
            state.unmount = false;
            state.number = Some(driver.next_disk_number());
        }
        self.node
            .set_flags(DeviceFlags::DIRECT_IO | DeviceFlags::POWER_INRUSH);
        Ok(handle)
    }

    fn init(&self) -> Result<(), DeviceError> {
        self.ops.init(self)
    }

    fn close(&self) {
        self.ops.close(self);
    }

    fn as_disk(&self) -> Option<&Disk> {
        Some(self)
    }
}

impl Drop for Disk {
    fn drop(&mut self) {
        log::debug!("disk {:?} ({:?}) freed", self.state.get_mut().number, self.media);
    }
}

fn not_a_disk(irp: &mut Irp) -> Dispatched {
    log::error!("disk handler invoked on a non-disk device");
    irp.complete(Status::InvalidDeviceRequest);
    Dispatched::done(Status::InvalidDeviceRequest)
}

fn sys_ctl(_driver: &Driver, _dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let status = irp.io_status;
    irp.complete(status);
    Dispatched::done(status)
}

fn power(_driver: &Driver, _dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    irp.complete(Status::NotSupported);
    Dispatched::done(Status::NotSupported)
}

fn io(_driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(disk) = dev.as_disk() else {
        return not_a_disk(irp);
    };

    let (mode, start_sector, sector_count, mut buffer) = match &mut irp.params {
        IrpParams::Io {
            mode,
            start_sector,
            sector_count,
            buffer,
        } => (*mode, *start_sector, *sector_count, core::mem::take(buffer)),
        _ => {
            irp.complete(Status::InvalidParameter);
            return Dispatched::done(Status::InvalidParameter);
        }
    };

    if disk.is_torn_down() {
        irp.complete(Status::DeletePending);
        return Dispatched::done(Status::DeletePending);
    }

    let status = disk.io(mode, start_sector, sector_count, &mut buffer, Some(&mut *irp));

    if let IrpParams::Io { buffer: slot, .. } = &mut irp.params {
        *slot = buffer;
    }
    if status != Status::Pending && !irp.is_completed() {
        if status.is_success() {
            irp.information = sector_count as usize * SECTOR_SIZE;
        }
        irp.complete(status);
    }
    Dispatched::done(status)
}
