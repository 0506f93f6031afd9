//! 跨存储的目录备份与同步引擎
//!
//! 同一套遍历算法通过 [`storage::Storage`] 契约运行在本地磁盘、
//! 内存虚拟树与 FTP 远端上；[`core::SyncWorker`] 顺序执行任务
//! 队列并把全部生命周期事件汇聚到一条通道。

pub mod core;
pub mod error;
pub mod logging;
pub mod model;
pub mod storage;

pub use crate::core::{CompareConfig, FileComparator, Job, JobOutcome, SyncWorker, TreeCounter};
pub use crate::error::StorageError;
pub use crate::logging::{init_logging, LogConfig};
pub use crate::model::{
    EndpointConfig, JobConfig, JobState, RunReport, ScanTotals, StorageType, SyncEvent, SyncMode,
};
pub use crate::storage::{create_storage, FileInfo, FtpStorage, LocalStorage, MemoryStorage, Storage};
