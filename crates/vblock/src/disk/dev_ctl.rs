//! 磁盘设备控制请求

use core::mem::size_of;

use crate::config::SECTOR_SIZE;
use crate::device::Device;
use crate::driver::Driver;
use crate::irp::{Dispatched, Irp, IrpParams, IrpResult, Status, ioctl};

use super::not_a_disk;

/// 几何结构在宿主侧的大小：柱面 8 字节，介质类型、磁头、扇区、扇区大小各 4 字节
const GEOMETRY_SIZE: usize = 24;

pub(super) fn dispatch(_driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(disk) = dev.as_disk() else {
        return not_a_disk(irp);
    };
    let IrpParams::DeviceControl { code } = irp.params else {
        irp.complete(Status::InvalidParameter);
        return Dispatched::done(Status::InvalidParameter);
    };

    let status = match code {
        ioctl::DISK_GET_DRIVE_GEOMETRY => {
            irp.result = IrpResult::Geometry(disk.drive_geometry());
            irp.information = GEOMETRY_SIZE;
            Status::Success
        }
        ioctl::DISK_GET_LENGTH_INFO => {
            irp.result = IrpResult::Length(disk.lba_size() * SECTOR_SIZE as u64);
            irp.information = size_of::<u64>();
            Status::Success
        }
        ioctl::DISK_CHECK_VERIFY | ioctl::STORAGE_CHECK_VERIFY => Status::Success,
        _ => {
            log::debug!("disk {:?}: unsupported ioctl {:#x}", disk.number(), code);
            Status::InvalidDeviceRequest
        }
    };
    irp.complete(status);
    Dispatched::done(status)
}
