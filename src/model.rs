#![allow(non_snake_case)]

use serde::{Deserialize, Serialize};

/// 存储类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Local,
    Ftp,
    Memory,
}

/// 端点配置
///
/// 本地端点只需要 path；FTP 端点需要 endpoint/username/password，
/// root 可选；内存端点用 root 作为注册表中的存储名。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    #[serde(rename = "type")]
    pub typ: StorageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

impl EndpointConfig {
    pub fn local(path: &str) -> Self {
        Self {
            typ: StorageType::Local,
            path: Some(path.to_string()),
            endpoint: None,
            username: None,
            password: None,
            root: None,
        }
    }

    pub fn ftp(endpoint: &str, username: &str, password: &str, root: Option<String>) -> Self {
        Self {
            typ: StorageType::Ftp,
            path: None,
            endpoint: Some(endpoint.to_string()),
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            root,
        }
    }

    pub fn memory(name: &str) -> Self {
        Self {
            typ: StorageType::Memory,
            path: None,
            endpoint: None,
            username: None,
            password: None,
            root: Some(name.to_string()),
        }
    }
}

/// 同步模式标签
///
/// backup 带删除镜像阶段，sync 双向合并且从不删除。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    LocalBackup,
    LocalSync,
    RemoteBackup,
    RemoteSync,
}

impl SyncMode {
    pub fn is_backup(&self) -> bool {
        matches!(self, SyncMode::LocalBackup | SyncMode::RemoteBackup)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SyncMode::RemoteBackup | SyncMode::RemoteSync)
    }
}

/// 任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub name: String,
    pub sourceConfig: EndpointConfig,
    pub destConfig: EndpointConfig,
    pub syncMode: SyncMode,
    /// 为 false 的配置不会进入执行队列
    pub enabled: bool,
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Running,
    Paused,
    Finished,
    Stopped,
}

/// 预扫描统计，字段逐项相加即可合并
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanTotals {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
}

impl std::ops::Add for ScanTotals {
    type Output = ScanTotals;

    fn add(self, other: ScanTotals) -> ScanTotals {
        ScanTotals {
            files: self.files + other.files,
            dirs: self.dirs + other.dirs,
            bytes: self.bytes + other.bytes,
        }
    }
}

impl std::ops::AddAssign for ScanTotals {
    fn add_assign(&mut self, other: ScanTotals) {
        *self = *self + other;
    }
}

/// 生命周期事件
///
/// 任务与调度器的全部进度都通过这一条事件流对外发布，
/// 每个 "即将变更" 事件之后必然跟随且只跟随一个结果事件。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    FileCreating { path: String },
    FileCreated { path: String, size: u64 },
    FileModifying { path: String },
    FileModified { path: String, size: u64 },
    FileDeleting { path: String },
    FileDeleted { path: String },
    FileCopyError { path: String, error: String },
    FileDeleteError { path: String, error: String },
    DirCreating { path: String },
    DirCreated { path: String },
    DirCreateError { path: String, error: String },
    DirDeleting { path: String },
    DirDeleted { path: String },
    DirDeleteError { path: String, error: String },
    /// 无需变更（或属于待删除子树）的条目进度
    Progress { path: String },
    Counted { totals: ScanTotals },
    JobStarted { jobId: String, name: String },
    JobFinished { jobId: String, name: String, filesProcessed: u64, bytesWritten: u64 },
    Finished { jobsRun: u32, filesProcessed: u64, bytesWritten: u64 },
}

/// 一次队列运行的汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub startTime: i64,
    pub endTime: i64,
    pub jobsRun: u32,
    pub filesProcessed: u64,
    pub bytesWritten: u64,
    pub stopped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_totals_add() {
        let a = ScanTotals { files: 3, dirs: 1, bytes: 100 };
        let b = ScanTotals { files: 2, dirs: 4, bytes: 50 };

        assert_eq!(a + b, b + a);
        assert_eq!((a + b).files, 5);
        assert_eq!((a + b).dirs, 5);
        assert_eq!((a + b).bytes, 150);
    }

    #[test]
    fn test_job_config_roundtrip() {
        let config = JobConfig {
            name: "照片备份".to_string(),
            sourceConfig: EndpointConfig::local("/data/photos"),
            destConfig: EndpointConfig::ftp("ftp.example.com", "user", "pass", None),
            syncMode: SyncMode::RemoteBackup,
            enabled: true,
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"syncMode\":\"remoteBackup\""));
        assert!(json.contains("\"type\":\"ftp\""));

        let parsed: JobConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.syncMode, SyncMode::RemoteBackup);
        assert!(parsed.syncMode.is_backup());
        assert!(parsed.syncMode.is_remote());
    }
}
