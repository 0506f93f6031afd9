//! 内存虚拟存储 - 纯内存树，用于确定性的预览与测试

use super::{FileInfo, Storage};
use crate::error::StorageError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// 进程级命名注册表，让端点配置能解析到共享的内存树
static REGISTRY: Lazy<Mutex<HashMap<String, Arc<MemoryStorage>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone)]
struct MemEntry {
    data: Vec<u8>,
    modified_time: i64,
    is_dir: bool,
}

/// 内存存储
///
/// 路径键不含首尾斜杠；denied 集合用于故障注入，
/// 命中的路径（或其任一祖先被标记时）一律返回 AccessDenied。
pub struct MemoryStorage {
    name: String,
    entries: Mutex<HashMap<String, MemEntry>>,
    denied: Mutex<HashSet<String>>,
}

impl MemoryStorage {
    pub fn new(label: &str) -> Result<Arc<Self>, StorageError> {
        if label.trim().is_empty() {
            return Err(StorageError::InvalidArgument("内存存储名为空".to_string()));
        }
        Ok(Arc::new(Self {
            name: format!("mem:{}", label),
            entries: Mutex::new(HashMap::new()),
            denied: Mutex::new(HashSet::new()),
        }))
    }

    /// 取得（或创建）注册表中的命名存储
    pub fn named(label: &str) -> Result<Arc<Self>, StorageError> {
        if label.trim().is_empty() {
            return Err(StorageError::InvalidArgument("内存存储名为空".to_string()));
        }
        let mut registry = REGISTRY.lock().unwrap();
        if let Some(existing) = registry.get(label) {
            return Ok(existing.clone());
        }
        let storage = Self::new(label)?;
        registry.insert(label.to_string(), storage.clone());
        Ok(storage)
    }

    fn normalize(path: &str) -> String {
        path.replace('\\', "/").trim_matches('/').to_string()
    }

    fn parent_of(path: &str) -> &str {
        match path.rfind('/') {
            Some(idx) => &path[..idx],
            None => "",
        }
    }

    /// 预置文件，构造校验与真实存在性无关
    pub fn add_file(&self, path: &str, data: &[u8], modified_time: i64) -> Result<(), StorageError> {
        let path = Self::normalize(path);
        if path.is_empty() {
            return Err(StorageError::InvalidArgument("文件路径为空".to_string()));
        }
        if modified_time < 0 {
            return Err(StorageError::InvalidArgument(format!(
                "修改时间无效: {}",
                modified_time
            )));
        }
        let mut entries = self.entries.lock().unwrap();
        Self::ensure_parents(&mut entries, &path, modified_time);
        entries.insert(
            path,
            MemEntry {
                data: data.to_vec(),
                modified_time,
                is_dir: false,
            },
        );
        Ok(())
    }

    /// 预置目录
    pub fn add_dir(&self, path: &str) -> Result<(), StorageError> {
        let path = Self::normalize(path);
        if path.is_empty() {
            return Err(StorageError::InvalidArgument("目录路径为空".to_string()));
        }
        let mut entries = self.entries.lock().unwrap();
        Self::ensure_parents(&mut entries, &path, 0);
        entries.entry(path).or_insert(MemEntry {
            data: Vec::new(),
            modified_time: 0,
            is_dir: true,
        });
        Ok(())
    }

    /// 故障注入：该路径及其子树的访问一律拒绝
    pub fn deny(&self, path: &str) {
        self.denied.lock().unwrap().insert(Self::normalize(path));
    }

    /// 清空内容与故障标记（测试用）
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.denied.lock().unwrap().clear();
    }

    fn ensure_parents(entries: &mut HashMap<String, MemEntry>, path: &str, modified_time: i64) {
        let mut parent = Self::parent_of(path);
        let mut missing = Vec::new();
        while !parent.is_empty() && !entries.contains_key(parent) {
            missing.push(parent.to_string());
            parent = Self::parent_of(parent);
        }
        for dir in missing {
            entries.insert(
                dir,
                MemEntry {
                    data: Vec::new(),
                    modified_time,
                    is_dir: true,
                },
            );
        }
    }

    fn check_denied(&self, path: &str) -> Result<(), StorageError> {
        let denied = self.denied.lock().unwrap();
        if denied.is_empty() {
            return Ok(());
        }
        let mut current = path;
        loop {
            if denied.contains(current) {
                return Err(StorageError::AccessDenied {
                    path: path.to_string(),
                });
            }
            if current.is_empty() {
                return Ok(());
            }
            current = Self::parent_of(current);
        }
    }

    fn info_for(path: &str, entry: &MemEntry) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            size: if entry.is_dir { 0 } else { entry.data.len() as u64 },
            modified_time: entry.modified_time,
            is_dir: entry.is_dir,
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<FileInfo>, StorageError> {
        let dir = Self::normalize(path);
        self.check_denied(&dir)?;

        let entries = self.entries.lock().unwrap();
        let mut result: Vec<FileInfo> = entries
            .iter()
            .filter(|(p, _)| Self::parent_of(p) == dir && !p.is_empty())
            .map(|(p, e)| Self::info_for(p, e))
            .collect();
        result.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(result)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileInfo>, StorageError> {
        let path = Self::normalize(path);
        self.check_denied(&path)?;

        if path.is_empty() {
            // 根目录总是存在
            return Ok(Some(FileInfo {
                path,
                size: 0,
                modified_time: 0,
                is_dir: true,
            }));
        }

        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&path).map(|e| Self::info_for(&path, e)))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let path = Self::normalize(path);
        self.check_denied(&path)?;

        let entries = self.entries.lock().unwrap();
        match entries.get(&path) {
            Some(entry) if !entry.is_dir => Ok(entry.data.clone()),
            _ => Err(StorageError::NotFound { path }),
        }
    }

    async fn write(
        &self,
        path: &str,
        data: Vec<u8>,
        modified_time: i64,
    ) -> Result<(), StorageError> {
        let path = Self::normalize(path);
        if path.is_empty() {
            return Err(StorageError::InvalidArgument("文件路径为空".to_string()));
        }
        self.check_denied(&path)?;

        let mut entries = self.entries.lock().unwrap();
        Self::ensure_parents(&mut entries, &path, modified_time);
        entries.insert(
            path,
            MemEntry {
                data,
                modified_time,
                is_dir: false,
            },
        );
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), StorageError> {
        let dir = Self::normalize(path);
        self.check_denied(&dir)?;
        if dir.is_empty() {
            return Ok(());
        }
        self.add_dir(&dir)
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let path = Self::normalize(path);
        self.check_denied(&path)?;
        self.entries.lock().unwrap().remove(&path);
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> Result<(), StorageError> {
        let dir = Self::normalize(path);
        self.check_denied(&dir)?;

        let mut entries = self.entries.lock().unwrap();
        if dir.is_empty() {
            entries.clear();
            return Ok(());
        }
        let prefix = format!("{}/", dir);
        entries.retain(|p, _| p != &dir && !p.starts_with(&prefix));
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_validation() {
        assert!(MemoryStorage::new("").is_err());
        assert!(MemoryStorage::named(" ").is_err());

        let storage = MemoryStorage::new("v").unwrap();
        assert!(matches!(
            storage.add_file("", b"x", 1),
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(matches!(
            storage.add_file("a.txt", b"x", -5),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_add_list_read() {
        let storage = MemoryStorage::new("t1").unwrap();
        storage.add_file("a.txt", b"aa", 10).unwrap();
        storage.add_file("sub/b.txt", b"bbb", 20).unwrap();

        let root = storage.list_dir("").await.unwrap();
        assert_eq!(root.len(), 2);
        assert_eq!(root[0].path, "a.txt");
        assert_eq!(root[0].size, 2);
        assert_eq!(root[0].modified_time, 10);
        assert_eq!(root[1].path, "sub");
        assert!(root[1].is_dir);

        let sub = storage.list_dir("sub").await.unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].path, "sub/b.txt");

        assert_eq!(storage.read("sub/b.txt").await.unwrap(), b"bbb");
        assert!(storage.stat("missing.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deny_returns_access_denied() {
        let storage = MemoryStorage::new("t2").unwrap();
        storage.add_file("locked/secret.txt", b"s", 1).unwrap();
        storage.deny("locked");

        let err = storage.list_dir("locked").await.unwrap_err();
        assert!(err.is_access_denied());

        // 子树内的条目同样被拒绝
        let err = storage.read("locked/secret.txt").await.unwrap_err();
        assert!(err.is_access_denied());

        // 兄弟路径不受影响
        storage.add_file("open.txt", b"o", 1).unwrap();
        assert_eq!(storage.read("open.txt").await.unwrap(), b"o");
    }

    #[tokio::test]
    async fn test_delete_dir_removes_subtree() {
        let storage = MemoryStorage::new("t3").unwrap();
        storage.add_file("old/a.txt", b"a", 1).unwrap();
        storage.add_file("old/deep/b.txt", b"b", 1).unwrap();
        storage.add_file("keep.txt", b"k", 1).unwrap();

        storage.delete_dir("old").await.unwrap();

        assert!(storage.stat("old").await.unwrap().is_none());
        assert!(storage.stat("old/deep/b.txt").await.unwrap().is_none());
        assert!(storage.stat("keep.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_named_registry_shares_tree() {
        let first = MemoryStorage::named("shared-reg").unwrap();
        first.clear();
        first.add_file("x.txt", b"x", 1).unwrap();

        let second = MemoryStorage::named("shared-reg").unwrap();
        assert_eq!(second.read("x.txt").await.unwrap(), b"x");
    }
}
