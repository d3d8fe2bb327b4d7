//! 请求分发表
//!
//! 分发表是 (主功能号, 次功能号, 任意主号?, 任意次号?, 处理函数) 的有序列表。
//! 分发时自上而下扫描，依次调用每个匹配项，直到某个处理函数报告完成：
//!
//! - 第一个匹配项完成时，就是“首个匹配生效”；
//! - 未完成的匹配项让位给后面的匹配项（回退）；
//! - 全部匹配项都未完成时，把最后的状态交回调用者，由调用者向下转发；
//! - 没有任何匹配项时，以 NotSupported 完成请求。
//!
//! 通配主号且通配次号的“兜底”项会无条件完成请求，它之后的所有项都不可达，
//! 因此它只能出现在表首。[`DispatchTable::register`] 会拒绝违反该约束的表。

use alloc::vec::Vec;
use core::fmt;
use lazy_static::lazy_static;

use crate::device::Device;
use crate::driver::Driver;
use crate::error::DeviceError;
use crate::irp::{Dispatched, Irp, MajorFunction, Status};

/// 请求处理函数
pub type IrpHandler = fn(&Driver, &dyn Device, &mut Irp) -> Dispatched;

/// 分发表项
#[derive(Clone, Copy)]
pub struct DispatchEntry {
    /// 主功能号
    pub major: MajorFunction,
    /// 次功能号
    pub minor: u8,
    /// 匹配任意主功能号
    pub any_major: bool,
    /// 匹配任意次功能号
    pub any_minor: bool,
    /// 处理函数
    pub handler: IrpHandler,
}

impl DispatchEntry {
    /// 精确匹配 (major, minor)
    pub const fn exact(major: MajorFunction, minor: u8, handler: IrpHandler) -> Self {
        Self {
            major,
            minor,
            any_major: false,
            any_minor: false,
            handler,
        }
    }

    /// 匹配 major 下的任意次功能号
    pub const fn major(major: MajorFunction, handler: IrpHandler) -> Self {
        Self {
            major,
            minor: 0,
            any_major: false,
            any_minor: true,
            handler,
        }
    }

    /// 匹配一切请求
    pub const fn catch_all(handler: IrpHandler) -> Self {
        Self {
            major: MajorFunction::Create,
            minor: 0,
            any_major: true,
            any_minor: true,
            handler,
        }
    }

    /// 是否为兜底项
    pub fn is_catch_all(&self) -> bool {
        self.any_major && self.any_minor
    }

    /// 是否匹配给定功能号
    pub fn matches(&self, major: MajorFunction, minor: u8) -> bool {
        (self.any_major || self.major == major) && (self.any_minor || self.minor == minor)
    }
}

impl fmt::Debug for DispatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major: &dyn fmt::Debug = if self.any_major { &"*" } else { &self.major };
        let minor: &dyn fmt::Debug = if self.any_minor { &"*" } else { &self.minor };
        f.debug_tuple("DispatchEntry")
            .field(major)
            .field(minor)
            .finish()
    }
}

/// 有序分发表
///
/// 只在设备构造时写入，之后只读，分发时无需加锁。
#[derive(Clone, Default)]
pub struct DispatchTable {
    entries: Vec<DispatchEntry>,
}

impl DispatchTable {
    /// 空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 不做排序检查地直接构造，只用于内置表
    fn from_entries(entries: &[DispatchEntry]) -> Self {
        Self {
            entries: entries.to_vec(),
        }
    }

    /// 注册一张表
    ///
    /// 新表排在已有表项之前，后注册的表优先。结果中若有兜底项不在表首，
    /// 返回 [`DeviceError::InvalidParameter`] 且原表不变。
    pub fn register(&mut self, table: &[DispatchEntry]) -> Result<(), DeviceError> {
        let mut merged = Vec::new();
        merged
            .try_reserve_exact(table.len() + self.entries.len())
            .map_err(|_| DeviceError::InsufficientResources)?;
        merged.extend_from_slice(table);
        merged.extend_from_slice(&self.entries);

        if let Some(pos) = merged.iter().skip(1).position(|e| e.is_catch_all()) {
            log::error!(
                "dispatch table: catch-all entry at position {} is not first",
                pos + 1
            );
            return Err(DeviceError::InvalidParameter);
        }
        self.entries = merged;
        Ok(())
    }

    /// 在本表基础上注册一张表，返回新表
    pub fn extended(&self, table: &[DispatchEntry]) -> Result<Self, DeviceError> {
        let mut out = self.clone();
        out.register(table)?;
        Ok(out)
    }

    /// 表项
    pub fn entries(&self) -> &[DispatchEntry] {
        &self.entries
    }

    /// 表项数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 第一个匹配项
    pub fn lookup(&self, major: MajorFunction, minor: u8) -> Option<&DispatchEntry> {
        self.entries.iter().find(|e| e.matches(major, minor))
    }

    /// 分发请求
    pub fn dispatch(&self, driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
        let (major, minor) = (irp.major(), irp.minor());
        let mut last = None;

        for entry in self.entries.iter().filter(|e| e.matches(major, minor)) {
            let outcome = (entry.handler)(driver, dev, irp);
            if outcome.completion {
                return outcome;
            }
            last = Some(outcome);
        }

        match last {
            Some(outcome) => outcome,
            None => {
                log::debug!("no handler for {:?}/{:#x}", major, minor);
                if !irp.is_completed() {
                    irp.complete(Status::NotSupported);
                }
                Dispatched::done(Status::NotSupported)
            }
        }
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

fn create_close(_driver: &Driver, _dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    irp.complete(Status::Success);
    Dispatched::done(Status::Success)
}

static DRIVER_ENTRIES: [DispatchEntry; 2] = [
    DispatchEntry::major(MajorFunction::Create, create_close),
    DispatchEntry::major(MajorFunction::Close, create_close),
];

lazy_static! {
    /// 所有设备共享的基础表，各设备类型在其上注册自己的表
    pub static ref DRIVER_TABLE: DispatchTable = DispatchTable::from_entries(&DRIVER_ENTRIES);
}
