use super::{FileInfo, Storage};
use crate::error::StorageError;
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{Metakey, Operator};

/// FTP 远程存储
///
/// 传输层的重试与超时策略由 opendal 承担，
/// 这里只负责把远端条目映射到统一的存储契约。
pub struct FtpStorage {
    operator: Operator,
    name: String,
}

impl FtpStorage {
    pub async fn new(
        endpoint: &str,
        username: &str,
        password: &str,
        root: Option<String>,
    ) -> Result<Self, StorageError> {
        use opendal::services::Ftp;

        let mut builder = Ftp::default()
            .endpoint(endpoint)
            .user(username)
            .password(password);

        if let Some(ref r) = root {
            builder = builder.root(r);
        }

        let operator = Operator::new(builder)
            .map_err(|e| StorageError::from_opendal("/", e))?
            .finish();

        let name = format!(
            "ftp://{}{}",
            endpoint.trim_end_matches('/'),
            root.as_deref()
                .map(|r| format!("/{}", r.trim_start_matches('/')))
                .unwrap_or_default()
        );

        Ok(Self { operator, name })
    }

    /// opendal 要求目录路径以 / 结尾，根目录用空串
    fn dir_path(path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        }
    }

    fn entry_to_info(entry: &opendal::Entry) -> Option<FileInfo> {
        let path = entry.path().trim_matches('/').to_string();
        if path.is_empty() {
            return None;
        }
        let meta = entry.metadata();
        Some(FileInfo {
            path,
            size: meta.content_length(),
            modified_time: meta.last_modified().map_or(0, |t| t.timestamp()),
            is_dir: meta.is_dir(),
        })
    }
}

#[async_trait]
impl Storage for FtpStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<FileInfo>, StorageError> {
        let dir = Self::dir_path(path);

        let mut lister = self
            .operator
            .lister_with(&dir)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await
            .map_err(|e| StorageError::from_opendal(path, e))?;

        let listed = dir.trim_end_matches('/');
        let mut files = Vec::new();
        while let Some(entry) = lister
            .try_next()
            .await
            .map_err(|e| StorageError::from_opendal(path, e))?
        {
            if let Some(info) = Self::entry_to_info(&entry) {
                // 跳过被列出的目录本身
                if info.path != listed {
                    files.push(info);
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn list_all(&self, path: &str) -> Result<Vec<FileInfo>, StorageError> {
        let dir = Self::dir_path(path);

        let mut lister = self
            .operator
            .lister_with(&dir)
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await
            .map_err(|e| StorageError::from_opendal(path, e))?;

        let listed = dir.trim_end_matches('/');
        let mut files = Vec::new();
        while let Some(entry) = lister
            .try_next()
            .await
            .map_err(|e| StorageError::from_opendal(path, e))?
        {
            if let Some(info) = Self::entry_to_info(&entry) {
                if info.path != listed {
                    files.push(info);
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileInfo>, StorageError> {
        match self.operator.stat(path).await {
            Ok(meta) => Ok(Some(FileInfo {
                path: path.trim_matches('/').to_string(),
                size: meta.content_length(),
                modified_time: meta.last_modified().map_or(0, |t| t.timestamp()),
                is_dir: meta.is_dir(),
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_opendal(path, e)),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let data = self
            .operator
            .read(path)
            .await
            .map_err(|e| StorageError::from_opendal(path, e))?;
        Ok(data.to_vec())
    }

    async fn write(
        &self,
        path: &str,
        data: Vec<u8>,
        _modified_time: i64,
    ) -> Result<(), StorageError> {
        let path = path.replace('\\', "/");
        let path = path.trim_start_matches('/');

        // 逐级创建缺失的父目录
        if let Some(parent) = std::path::Path::new(path).parent() {
            let parent_str = parent.to_string_lossy().replace('\\', "/");
            if !parent_str.is_empty() && parent_str != "." {
                let parts: Vec<&str> = parent_str.split('/').filter(|s| !s.is_empty()).collect();
                let mut current = String::new();
                for part in parts {
                    current.push_str(part);
                    current.push('/');
                    // 目录可能已存在，忽略创建错误
                    let _ = self.operator.create_dir(&current).await;
                }
            }
        }

        // FTP 无法回写修改时间，新旧判定依赖比较策略的容差
        self.operator
            .write(path, data)
            .await
            .map_err(|e| StorageError::from_opendal(path, e))?;
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), StorageError> {
        let dir = Self::dir_path(path);
        self.operator
            .create_dir(&dir)
            .await
            .map_err(|e| StorageError::from_opendal(path, e))
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        match self.operator.delete(path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_opendal(path, e)),
        }
    }

    async fn delete_dir(&self, path: &str) -> Result<(), StorageError> {
        let dir = Self::dir_path(path);
        match self.operator.remove_all(&dir).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_opendal(path, e)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
