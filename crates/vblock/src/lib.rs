//! 虚拟块存储核心
//!
//! 此 crate 提供把任意后端呈现为标准块设备所需的设备模型：
//!
//! - [`Device`] trait 与 [`DeviceNode`] - 设备公共部分
//! - [`DispatchTable`] - 按主/次功能号路由请求
//! - [`Bus`] - 枚举子设备的总线
//! - [`Disk`] 与 [`DiskOps`] - 磁盘设备与后端接口
//! - [`DiskRegistry`] - 全局磁盘注册表
//!
//! # 宿主解耦
//!
//! 设备对象的创建、挂栈与下层转发都通过 [`HostOps`] 完成，
//! 由 [`Driver::new`] 注入。

#![no_std]
#![allow(clippy::module_inception)]

extern crate alloc;

pub mod bus;
pub mod config;
pub mod device;
pub mod disk;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod host;
pub mod irp;

// Re-export device
pub use device::{Device, DeviceFlags, DeviceKind, DeviceNode, DeviceState, same_device};

// Re-export dispatch
pub use dispatch::{DRIVER_TABLE, DispatchEntry, DispatchTable, IrpHandler};

// Re-export bus & disk
pub use bus::Bus;
pub use disk::{
    Disk, DiskGeometry, DiskOps, DiskRegistry, DiskSpec, Geometry, GeometrySource, IoMode,
    MediaKind, RamDisk,
};

// Re-export driver
pub use config::{AttachPolicy, DriverConfig};
pub use driver::Driver;
pub use error::DeviceError;
pub use host::{
    Characteristics, DriverHandle, HostDeviceType, HostOps, PhysicalDesc, PhysicalHandle,
    PhysicalNode, RelationType,
};
pub use irp::{Dispatched, Irp, IrpParams, IrpResult, Status};
