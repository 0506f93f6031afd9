//! 错误类型 - 存储层统一的失败分类

use thiserror::Error;

/// 存储层共享错误
///
/// 各后端把自身的原生错误映射到这套分类，
/// 遍历算法只依赖分类做决策，不感知具体后端。
#[derive(Debug, Error)]
pub enum StorageError {
    /// 构造参数无效（路径为空、缺少必填字段、时间戳非法等）
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    /// 权限或安全限制导致的访问失败
    #[error("访问被拒绝: {path}")]
    AccessDenied { path: String },

    /// 复制或删除过程中的 IO 错误
    #[error("存储 IO 错误: {path}: {message}")]
    Io { path: String, message: String },

    /// 请求的条目不存在
    #[error("条目不存在: {path}")]
    NotFound { path: String },
}

impl StorageError {
    /// 扫描/删除检查阶段据此跳过整棵子树
    pub fn is_access_denied(&self) -> bool {
        matches!(self, StorageError::AccessDenied { .. })
    }

    /// 把 std::io 错误映射到统一分类
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => StorageError::AccessDenied {
                path: path.to_string(),
            },
            std::io::ErrorKind::NotFound => StorageError::NotFound {
                path: path.to_string(),
            },
            _ => StorageError::Io {
                path: path.to_string(),
                message: err.to_string(),
            },
        }
    }

    /// 把 opendal 错误映射到统一分类
    pub fn from_opendal(path: &str, err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::PermissionDenied => StorageError::AccessDenied {
                path: path.to_string(),
            },
            opendal::ErrorKind::NotFound => StorageError::NotFound {
                path: path.to_string(),
            },
            _ => StorageError::Io {
                path: path.to_string(),
                message: err.to_string(),
            },
        }
    }
}
