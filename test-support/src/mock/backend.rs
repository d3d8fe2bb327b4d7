//! 磁盘后端的 Mock 实现
//!
//! 记录每次 I/O 与 init/close 调用；后端被装箱交给磁盘后，
//! 测试通过 [`RecordingBackend::log`] 取得的共享记录查看调用情况。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use sync::SpinLock;
use vblock::{DeviceError, Disk, DiskOps, IoMode, Irp, Status};

/// 一次 I/O 调用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRecord {
    pub mode: IoMode,
    pub start_sector: u64,
    pub sector_count: u32,
    pub buffer_len: usize,
    pub had_irp: bool,
}

/// 共享的调用记录
#[derive(Default)]
pub struct BackendLog {
    io: SpinLock<Vec<IoRecord>>,
    inits: AtomicUsize,
    closes: AtomicUsize,
}

impl BackendLog {
    pub fn io(&self) -> Vec<IoRecord> {
        self.io.lock().clone()
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// 记录调用的后端
pub struct RecordingBackend {
    log: Arc<BackendLog>,
    io_status: Status,
    fill: u8,
    init_error: Option<DeviceError>,
    boot_sector: Option<Vec<u8>>,
    max_xfer_len: Option<u32>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            log: Arc::new(BackendLog::default()),
            io_status: Status::Success,
            fill: 0,
            init_error: None,
            boot_sector: None,
            max_xfer_len: None,
        }
    }

    /// 共享记录
    pub fn log(&self) -> Arc<BackendLog> {
        Arc::clone(&self.log)
    }

    /// I/O 返回的状态；`Status::Pending` 时不写缓冲区
    pub fn with_io_status(mut self, status: Status) -> Self {
        self.io_status = status;
        self
    }

    /// 读请求用该字节填满缓冲区
    pub fn with_fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    /// init 返回错误
    pub fn failing_init(mut self, err: DeviceError) -> Self {
        self.init_error = Some(err);
        self
    }

    /// init 时用该扇区推断几何
    pub fn with_boot_sector(mut self, sector: Vec<u8>) -> Self {
        self.boot_sector = Some(sector);
        self
    }

    pub fn with_max_xfer_len(mut self, len: u32) -> Self {
        self.max_xfer_len = Some(len);
        self
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskOps for RecordingBackend {
    fn io(
        &self,
        _disk: &Disk,
        mode: IoMode,
        start_sector: u64,
        sector_count: u32,
        buffer: &mut [u8],
        irp: Option<&mut Irp>,
    ) -> Status {
        self.log.io.lock().push(IoRecord {
            mode,
            start_sector,
            sector_count,
            buffer_len: buffer.len(),
            had_irp: irp.is_some(),
        });
        if mode == IoMode::Read && self.io_status == Status::Success {
            buffer.fill(self.fill);
        }
        self.io_status
    }

    fn max_xfer_len(&self, _disk: &Disk) -> u32 {
        self.max_xfer_len
            .unwrap_or(vblock::config::DEFAULT_MAX_XFER_LEN)
    }

    fn init(&self, disk: &Disk) -> Result<(), DeviceError> {
        self.log.inits.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.init_error {
            return Err(err);
        }
        if let Some(sector) = &self.boot_sector {
            disk.guess_geometry(sector);
        }
        Ok(())
    }

    fn close(&self, _disk: &Disk) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}
