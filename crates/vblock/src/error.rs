//! 设备层错误类型

use core::fmt;

use crate::irp::Status;

/// 设备层错误
///
/// 可通过 [`DeviceError::to_status()`] 转换为请求完成状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// 总线设备尚未创建
    NoBus,
    /// 宿主或本地资源分配失败
    InsufficientResources,
    /// 目标设备不存在或无法挂入设备栈
    NoSuchDevice,
    /// 设备初始化失败
    InitFailed,
    /// 设备已经被拆除
    AlreadyTornDown,
    /// 参数非法（包括违反分发表排序约束）
    InvalidParameter,
    /// 操作不支持
    NotSupported,
    /// 后端 I/O 失败
    Io,
}

impl DeviceError {
    /// 转换为请求完成状态
    pub fn to_status(&self) -> Status {
        match self {
            DeviceError::NoBus | DeviceError::NoSuchDevice => Status::NoSuchDevice,
            DeviceError::InsufficientResources => Status::InsufficientResources,
            DeviceError::InitFailed | DeviceError::Io => Status::Unsuccessful,
            DeviceError::AlreadyTornDown => Status::DeletePending,
            DeviceError::InvalidParameter => Status::InvalidParameter,
            DeviceError::NotSupported => Status::NotSupported,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DeviceError::NoBus => "no bus device",
            DeviceError::InsufficientResources => "insufficient resources",
            DeviceError::NoSuchDevice => "no such device",
            DeviceError::InitFailed => "device initialization failed",
            DeviceError::AlreadyTornDown => "device already torn down",
            DeviceError::InvalidParameter => "invalid parameter",
            DeviceError::NotSupported => "operation not supported",
            DeviceError::Io => "i/o error",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for DeviceError {}
