//! 测试支持 crate
//!
//! 提供宿主、架构与磁盘后端的 Mock 实现，供集成测试使用

#![no_std]

extern crate alloc;

pub mod mock;

pub use mock::arch::{MOCK_ARCH_OPS, MockArchOps, init_mock_arch_ops};
pub use mock::backend::{BackendLog, IoRecord, RecordingBackend};
pub use mock::host::{Created, MockHost};
