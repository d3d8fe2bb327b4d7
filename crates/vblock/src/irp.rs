//! 请求包模型
//!
//! [`Irp`] 携带主/次功能号、类型化的参数与结果，以及一次性的完成标记。
//! 处理函数通过 [`Dispatched`] 告诉分发器是否已经“完成”，
//! 未完成的请求由调用者继续向下层设备转发。

use alloc::string::String;
use alloc::vec::Vec;

use crate::disk::{DiskGeometry, IoMode};
use crate::host::{PhysicalHandle, RelationType};

/// 请求完成状态
///
/// 各值对应 NT 风格的 32 位状态码，见 [`Status::code()`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 成功
    Success,
    /// 已排队，稍后由下层完成
    Pending,
    /// 一般性失败
    Unsuccessful,
    /// 请求类型不受支持
    NotSupported,
    /// 设备不接受该请求
    InvalidDeviceRequest,
    /// 参数非法
    InvalidParameter,
    /// 资源不足
    InsufficientResources,
    /// 设备不存在
    NoSuchDevice,
    /// 输出缓冲区过小
    BufferTooSmall,
    /// 设备正在删除
    DeletePending,
}

impl Status {
    /// NT 风格状态码
    pub fn code(&self) -> u32 {
        match self {
            Status::Success => 0x0000_0000,
            Status::Pending => 0x0000_0103,
            Status::Unsuccessful => 0xC000_0001,
            Status::NotSupported => 0xC000_00BB,
            Status::InvalidDeviceRequest => 0xC000_0010,
            Status::InvalidParameter => 0xC000_000D,
            Status::InsufficientResources => 0xC000_009A,
            Status::NoSuchDevice => 0xC000_000E,
            Status::BufferTooSmall => 0xC000_0023,
            Status::DeletePending => 0xC000_0056,
        }
    }

    /// 是否为成功类状态（包括 Pending）
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success | Status::Pending)
    }
}

/// 主功能号
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MajorFunction {
    /// 打开
    Create = 0x00,
    /// 关闭
    Close = 0x02,
    /// 读
    Read = 0x03,
    /// 写
    Write = 0x04,
    /// 设备控制
    DeviceControl = 0x0e,
    /// SCSI（内部设备控制）
    Scsi = 0x0f,
    /// 电源
    Power = 0x16,
    /// 系统控制（WMI）
    SystemControl = 0x17,
    /// 即插即用
    Pnp = 0x1b,
}

/// PnP 次功能号
pub mod pnp {
    #![allow(missing_docs)]

    pub const START_DEVICE: u8 = 0x00;
    pub const QUERY_REMOVE_DEVICE: u8 = 0x01;
    pub const REMOVE_DEVICE: u8 = 0x02;
    pub const CANCEL_REMOVE_DEVICE: u8 = 0x03;
    pub const STOP_DEVICE: u8 = 0x04;
    pub const QUERY_STOP_DEVICE: u8 = 0x05;
    pub const CANCEL_STOP_DEVICE: u8 = 0x06;
    pub const QUERY_DEVICE_RELATIONS: u8 = 0x07;
    pub const QUERY_CAPABILITIES: u8 = 0x09;
    pub const QUERY_DEVICE_TEXT: u8 = 0x0c;
    pub const QUERY_ID: u8 = 0x13;
    pub const QUERY_BUS_INFORMATION: u8 = 0x15;
    pub const SURPRISE_REMOVAL: u8 = 0x17;
}

/// 设备控制码
pub mod ioctl {
    /// 查询 CHS 几何
    pub const DISK_GET_DRIVE_GEOMETRY: u32 = 0x0007_0000;
    /// 查询字节长度
    pub const DISK_GET_LENGTH_INFO: u32 = 0x0007_405C;
    /// 磁盘介质校验
    pub const DISK_CHECK_VERIFY: u32 = 0x0007_4800;
    /// 存储介质校验
    pub const STORAGE_CHECK_VERIFY: u32 = 0x002D_4800;
}

/// 查询 ID 的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdType {
    /// 设备 ID
    DeviceId,
    /// 硬件 ID 列表
    HardwareIds,
    /// 兼容 ID 列表
    CompatibleIds,
    /// 实例 ID
    InstanceId,
}

/// 查询设备文本的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextType {
    /// 设备描述
    Description,
    /// 位置描述
    LocationInformation,
}

/// 请求参数
#[derive(Debug, Default)]
pub enum IrpParams {
    /// 无参数
    #[default]
    None,
    /// 扇区读写；写请求从 buffer 取数据，读请求把数据放入 buffer
    Io {
        /// 方向
        mode: IoMode,
        /// 起始扇区
        start_sector: u64,
        /// 扇区数
        sector_count: u32,
        /// 数据缓冲区
        buffer: Vec<u8>,
    },
    /// 设备控制
    DeviceControl {
        /// 控制码，见 [`ioctl`]
        code: u32,
    },
    /// 查询设备关系
    QueryRelations(RelationType),
    /// 查询 ID
    QueryId(IdType),
    /// 查询设备文本
    QueryText(TextType),
}

/// 设备能力（由 PnP 能力查询填写）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// 介质可移除
    pub removable: bool,
    /// 支持弹出
    pub eject_supported: bool,
    /// ID 在系统范围内唯一
    pub unique_id: bool,
    /// 无需功能驱动即可使用
    pub raw_device_ok: bool,
    /// 总线地址
    pub address: u32,
    /// 用户可见编号
    pub ui_number: u32,
}

/// 总线信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusInformation {
    /// 总线类型
    pub legacy_bus_type: LegacyBusType,
    /// 总线编号
    pub bus_number: u32,
}

/// 传统总线类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyBusType {
    /// 内部总线
    Internal,
    /// 即插即用总线
    PnpBus,
}

/// 请求结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IrpResult {
    /// 无结果
    #[default]
    None,
    /// 磁盘几何
    Geometry(DiskGeometry),
    /// 字节长度
    Length(u64),
    /// 设备关系（物理句柄列表）
    Relations(Vec<PhysicalHandle>),
    /// 设备能力
    Capabilities(DeviceCapabilities),
    /// 总线信息
    BusInformation(BusInformation),
    /// 文本
    Text(String),
    /// ID 列表
    Ids(Vec<String>),
}

/// 请求包
#[derive(Debug)]
pub struct Irp {
    major: MajorFunction,
    minor: u8,
    /// 参数
    pub params: IrpParams,
    /// 当前状态，PnP 请求初始为 NotSupported
    pub io_status: Status,
    /// 附加信息（通常是传输字节数）
    pub information: usize,
    /// 结果
    pub result: IrpResult,
    completed: bool,
}

impl Irp {
    /// 创建请求
    pub fn new(major: MajorFunction, minor: u8) -> Self {
        Self {
            major,
            minor,
            params: IrpParams::None,
            io_status: Status::NotSupported,
            information: 0,
            result: IrpResult::None,
            completed: false,
        }
    }

    /// 创建 PnP 请求
    pub fn pnp(minor: u8) -> Self {
        Self::new(MajorFunction::Pnp, minor)
    }

    /// 设置参数
    pub fn with_params(mut self, params: IrpParams) -> Self {
        self.params = params;
        self
    }

    /// 主功能号
    pub fn major(&self) -> MajorFunction {
        self.major
    }

    /// 次功能号
    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// 完成请求
    ///
    /// 只有第一次调用生效；重复完成返回 false 且不修改状态。
    pub fn complete(&mut self, status: Status) -> bool {
        if self.completed {
            log::warn!(
                "irp {:?}/{:#x}: already completed with {:?}, ignoring {:?}",
                self.major,
                self.minor,
                self.io_status,
                status
            );
            return false;
        }
        self.io_status = status;
        self.completed = true;
        true
    }

    /// 是否已完成
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// 处理函数的返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    /// 状态
    pub status: Status,
    /// 为 true 时分发终止，请求不再交给后续处理函数或下层设备
    pub completion: bool,
}

impl Dispatched {
    /// 已处理完毕
    pub fn done(status: Status) -> Self {
        Self {
            status,
            completion: true,
        }
    }

    /// 未处理完，交给后续处理函数
    pub fn pass(status: Status) -> Self {
        Self {
            status,
            completion: false,
        }
    }
}
