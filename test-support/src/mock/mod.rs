//! Mock 实现模块
//!
//! 提供宿主接口、架构操作与磁盘后端的 Mock 实现，用于测试

pub mod arch;
pub mod backend;
pub mod host;
