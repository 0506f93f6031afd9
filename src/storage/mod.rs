pub mod ftp;
pub mod local;
pub mod memory;

use crate::error::StorageError;
use crate::model::{EndpointConfig, StorageType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use ftp::FtpStorage;
pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// 条目信息
///
/// path 是相对存储根的完整路径，统一使用 / 分隔、不带首尾斜杠，
/// 空字符串表示根目录本身。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub modified_time: i64,
    pub is_dir: bool,
}

impl FileInfo {
    /// 最后一个路径段
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// 存储抽象接口
///
/// 同一套遍历算法通过这个接口运行在本地、内存与远程树上。
/// 各实现负责把原生错误翻译成 StorageError。
#[async_trait]
pub trait Storage: Send + Sync {
    /// 列出目录的直接子条目（单层，不递归）
    async fn list_dir(&self, path: &str) -> Result<Vec<FileInfo>, StorageError>;

    /// 递归列出目录下的所有条目
    async fn list_all(&self, path: &str) -> Result<Vec<FileInfo>, StorageError> {
        // 默认实现：基于 list_dir 逐层下探
        let mut stack = vec![path.trim_matches('/').to_string()];
        let mut all = Vec::new();
        while let Some(dir) = stack.pop() {
            for entry in self.list_dir(&dir).await? {
                if entry.is_dir {
                    stack.push(entry.path.clone());
                }
                all.push(entry);
            }
        }
        Ok(all)
    }

    /// 获取条目元数据，不存在时返回 None
    async fn stat(&self, path: &str) -> Result<Option<FileInfo>, StorageError>;

    /// 读取整个文件
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// 写入整个文件并应用修改时间，父目录不存在时自动创建
    async fn write(&self, path: &str, data: Vec<u8>, modified_time: i64)
        -> Result<(), StorageError>;

    /// 创建目录（含缺失的父目录）
    async fn create_dir(&self, path: &str) -> Result<(), StorageError>;

    /// 删除单个文件，条目不存在时静默成功
    async fn delete_file(&self, path: &str) -> Result<(), StorageError>;

    /// 递归删除目录
    async fn delete_dir(&self, path: &str) -> Result<(), StorageError>;

    /// 检查条目是否存在
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.stat(path).await?.is_some())
    }

    /// 存储名称（用于日志）
    fn name(&self) -> &str;
}

impl std::fmt::Debug for dyn Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Storage").field(&self.name()).finish()
    }
}

/// 根据端点配置创建存储实例
///
/// 必填字段缺失或为空时返回 InvalidArgument，
/// 这个校验与真实存储是否可达无关，内存端点同样适用。
pub async fn create_storage(config: &EndpointConfig) -> Result<Arc<dyn Storage>, StorageError> {
    match config.typ {
        StorageType::Local => {
            let path = config
                .path
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| StorageError::InvalidArgument("本地端点缺少 path".to_string()))?;
            tracing::info!("初始化本地存储: {}", path);
            Ok(Arc::new(LocalStorage::new(path)?) as Arc<dyn Storage>)
        }
        StorageType::Ftp => {
            let endpoint = config
                .endpoint
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| StorageError::InvalidArgument("FTP 端点缺少 endpoint".to_string()))?;
            let username = config
                .username
                .as_deref()
                .ok_or_else(|| StorageError::InvalidArgument("FTP 端点缺少 username".to_string()))?;
            let password = config
                .password
                .as_deref()
                .ok_or_else(|| StorageError::InvalidArgument("FTP 端点缺少 password".to_string()))?;
            tracing::info!("初始化 FTP 存储: endpoint={}, root={:?}", endpoint, config.root);
            Ok(Arc::new(FtpStorage::new(endpoint, username, password, config.root.clone()).await?)
                as Arc<dyn Storage>)
        }
        StorageType::Memory => {
            let name = config
                .root
                .as_deref()
                .ok_or_else(|| StorageError::InvalidArgument("内存端点缺少 root 存储名".to_string()))?;
            Ok(MemoryStorage::named(name)? as Arc<dyn Storage>)
        }
    }
}
