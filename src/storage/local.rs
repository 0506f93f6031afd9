use super::{FileInfo, Storage};
use crate::error::StorageError;
use async_trait::async_trait;
use filetime::FileTime;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// 本地磁盘存储
pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let base_path = PathBuf::from(path);
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path).map_err(|e| StorageError::from_io(path, e))?;
        }
        let name = format!("local:{}", path);
        Ok(Self { base_path, name })
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    /// 规范化路径分隔符（统一使用 /）
    fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }

    fn entry_info(base: &Path, full: &Path, meta: &std::fs::Metadata) -> Option<FileInfo> {
        let relative = full.strip_prefix(base).ok()?.to_str()?.to_string();
        // 跳过根目录本身
        if relative.is_empty() {
            return None;
        }

        let modified = meta
            .modified()
            .ok()?
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs() as i64;

        Some(FileInfo {
            path: Self::normalize_path(&relative),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified_time: modified,
            is_dir: meta.is_dir(),
        })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<FileInfo>, StorageError> {
        let dir = self.resolve_path(path);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&dir)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;

        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(path, e))?
        {
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("读取元数据失败: {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            if let Some(info) = Self::entry_info(&self.base_path, &entry.path(), &meta) {
                entries.push(info);
            }
        }

        // 排序保证事件顺序可复现
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn list_all(&self, path: &str) -> Result<Vec<FileInfo>, StorageError> {
        let root = self.resolve_path(path);
        if !root.exists() {
            return Ok(Vec::new());
        }

        let base_path = self.base_path.clone();
        let rel = path.to_string();

        // 使用 spawn_blocking 避免阻塞 async runtime
        let entries = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter_map(|entry| {
                    let meta = entry.metadata().ok()?;
                    Self::entry_info(&base_path, entry.path(), &meta)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| StorageError::Io {
            path: rel,
            message: e.to_string(),
        })?;

        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileInfo>, StorageError> {
        let full_path = self.resolve_path(path);

        match fs::metadata(&full_path).await {
            Ok(meta) => {
                let modified = meta
                    .modified()
                    .map_err(|e| StorageError::from_io(path, e))?
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs() as i64;

                Ok(Some(FileInfo {
                    path: Self::normalize_path(path.trim_matches('/')),
                    size: if meta.is_dir() { 0 } else { meta.len() },
                    modified_time: modified,
                    is_dir: meta.is_dir(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_io(path, e)),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        fs::read(self.resolve_path(path))
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn write(
        &self,
        path: &str,
        data: Vec<u8>,
        modified_time: i64,
    ) -> Result<(), StorageError> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(path, e))?;
        }

        // 使用临时文件写入，然后原子重命名
        let temp_path = full_path.with_extension("tmp");
        fs::write(&temp_path, data)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        fs::rename(&temp_path, &full_path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;

        // 回写源文件的修改时间，保证复制结果与源一致
        let mtime = FileTime::from_unix_time(modified_time, 0);
        let target = full_path.clone();
        let path_owned = path.to_string();
        tokio::task::spawn_blocking(move || filetime::set_file_mtime(&target, mtime))
            .await
            .map_err(|e| StorageError::Io {
                path: path_owned.clone(),
                message: e.to_string(),
            })?
            .map_err(|e| StorageError::from_io(&path_owned, e))?;

        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), StorageError> {
        fs::create_dir_all(self.resolve_path(path))
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let full_path = self.resolve_path(path);
        if !full_path.exists() {
            return Ok(());
        }
        fs::remove_file(&full_path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn delete_dir(&self, path: &str) -> Result<(), StorageError> {
        let full_path = self.resolve_path(path);
        if !full_path.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&full_path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
