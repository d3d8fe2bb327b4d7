//! 内存磁盘后端

use alloc::vec;
use alloc::vec::Vec;
use sync::SpinLock;

use crate::config::SECTOR_SIZE;
use crate::error::DeviceError;
use crate::irp::{Irp, Status};

use super::{Disk, DiskOps, IoMode};

/// 内存模拟的磁盘后端
///
/// 用于测试和开发；初始化时按首扇区推断几何。
pub struct RamDisk {
    data: SpinLock<Vec<u8>>,
}

impl RamDisk {
    /// 创建指定扇区数的空磁盘
    pub fn new(sectors: usize) -> Self {
        Self {
            data: SpinLock::new(vec![0u8; sectors * SECTOR_SIZE]),
        }
    }

    /// 从镜像创建，不足整扇区的尾部补零
    pub fn from_bytes(mut data: Vec<u8>) -> Self {
        let rem = data.len() % SECTOR_SIZE;
        if rem != 0 {
            data.resize(data.len() + SECTOR_SIZE - rem, 0);
        }
        Self {
            data: SpinLock::new(data),
        }
    }

    /// 扇区数
    pub fn sectors(&self) -> u64 {
        (self.data.lock().len() / SECTOR_SIZE) as u64
    }

    /// 获取原始数据（用于调试）
    pub fn raw_data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn range(&self, len: usize, start_sector: u64, sector_count: u32) -> Option<(usize, usize)> {
        let offset = usize::try_from(start_sector).ok()?.checked_mul(SECTOR_SIZE)?;
        let bytes = (sector_count as usize).checked_mul(SECTOR_SIZE)?;
        let end = offset.checked_add(bytes)?;
        (end <= len).then_some((offset, bytes))
    }
}

impl DiskOps for RamDisk {
    fn io(
        &self,
        disk: &Disk,
        mode: IoMode,
        start_sector: u64,
        sector_count: u32,
        buffer: &mut [u8],
        _irp: Option<&mut Irp>,
    ) -> Status {
        let mut data = self.data.lock();
        let Some((offset, bytes)) = self.range(data.len(), start_sector, sector_count) else {
            log::warn!(
                "ramdisk {:?}: {:?} {}+{} out of range",
                disk.number(),
                mode,
                start_sector,
                sector_count
            );
            return Status::InvalidParameter;
        };
        if buffer.len() < bytes {
            return Status::BufferTooSmall;
        }

        match mode {
            IoMode::Read => buffer[..bytes].copy_from_slice(&data[offset..offset + bytes]),
            IoMode::Write => data[offset..offset + bytes].copy_from_slice(&buffer[..bytes]),
        }
        Status::Success
    }

    fn init(&self, disk: &Disk) -> Result<(), DeviceError> {
        let boot = {
            let data = self.data.lock();
            if data.len() < SECTOR_SIZE {
                return Err(DeviceError::InitFailed);
            }
            data[..SECTOR_SIZE].to_vec()
        };
        disk.guess_geometry(&boot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use super::*;
    use crate::disk::{DiskSpec, MediaKind};

    fn ram_disk(sectors: usize) -> Disk {
        let spec = DiskSpec::new(MediaKind::HardDisk, sectors as u64);
        Disk::new(spec, Box::new(RamDisk::new(sectors))).unwrap()
    }

    #[test]
    fn test_ramdisk_read_write_roundtrip() {
        let disk = ram_disk(8);

        let mut wbuf = [0u8; 1024];
        wbuf[0] = 0xAA;
        wbuf[1023] = 0x55;
        assert_eq!(disk.io(IoMode::Write, 3, 2, &mut wbuf, None), Status::Success);

        let mut rbuf = [0u8; 1024];
        assert_eq!(disk.io(IoMode::Read, 3, 2, &mut rbuf, None), Status::Success);
        assert_eq!(rbuf, wbuf);

        // Other sectors remain zero.
        let mut rbuf2 = [0xFFu8; 512];
        assert_eq!(disk.io(IoMode::Read, 2, 1, &mut rbuf2, None), Status::Success);
        assert_eq!(rbuf2, [0u8; 512]);
    }

    #[test]
    fn test_ramdisk_bounds_and_short_buffer() {
        let disk = ram_disk(2);

        let mut small = [0u8; 16];
        assert_eq!(
            disk.io(IoMode::Read, 0, 1, &mut small, None),
            Status::BufferTooSmall
        );

        let mut buf = [0u8; 512];
        assert_eq!(
            disk.io(IoMode::Read, 2, 1, &mut buf, None),
            Status::InvalidParameter
        );
        assert_eq!(
            disk.io(IoMode::Write, u64::MAX, 1, &mut buf, None),
            Status::InvalidParameter
        );
    }

    #[test]
    fn test_from_bytes_pads_to_sector() {
        let rd = RamDisk::from_bytes(vec![1u8; 700]);
        assert_eq!(rd.sectors(), 2);
        assert_eq!(rd.raw_data()[699], 1);
        assert_eq!(rd.raw_data()[700], 0);
    }

    #[test]
    fn test_init_guesses_geometry() {
        let disk = ram_disk(16065 * 2);
        assert!(disk.ops.init(&disk).is_ok());
        let g = disk.geometry();
        assert_eq!((g.heads, g.sectors_per_track, g.cylinders), (255, 63, 2));
    }

    #[test]
    fn test_default_max_xfer_len() {
        let disk = ram_disk(1);
        assert_eq!(disk.max_xfer_len(), crate::config::DEFAULT_MAX_XFER_LEN);
    }
}
