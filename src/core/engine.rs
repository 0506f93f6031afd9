use crate::core::comparator::{CompareConfig, FileComparator};
use crate::error::StorageError;
use crate::model::{JobConfig, JobState, SyncEvent};
use crate::storage::{self, FileInfo, Storage};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 暂停状态的轮询间隔（毫秒）
const PAUSE_POLL_MS: u64 = 50;

const STATE_CREATED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_PAUSED: u8 = 2;
const STATE_FINISHED: u8 = 3;
const STATE_STOPPED: u8 = 4;

/// 任务在遍历边界被停止时的内部信号，不是错误
struct JobStopped;

type Flow = Result<(), JobStopped>;

/// 任务执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Finished,
    Stopped,
}

/// 一次运行中的单个备份/同步任务
///
/// 每个启用的配置在每次运行中恰好对应一个 Job 实例，
/// 运行结束后即丢弃。暂停与停止都是协作式信号，
/// 只在文件/目录边界生效，不打断进行中的单个复制。
pub struct Job {
    id: String,
    config: JobConfig,
    preview: bool,
    comparator: FileComparator,
    state: AtomicU8,
    paused: AtomicBool,
    stopped: AtomicBool,
    bytes_written: AtomicU64,
    files_processed: AtomicU64,
}

impl Job {
    pub fn new(config: JobConfig, preview: bool) -> Self {
        // 远程端点不保留修改时间，改用大小判定
        let comparator = if config.syncMode.is_remote() {
            FileComparator::with_config(CompareConfig::remote())
        } else {
            FileComparator::new()
        };

        Self {
            id: Uuid::new_v4().to_string(),
            config,
            preview,
            comparator,
            state: AtomicU8::new(STATE_CREATED),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            bytes_written: AtomicU64::new(0),
            files_processed: AtomicU64::new(0),
        }
    }

    /// 覆盖默认的新旧判定策略
    pub fn with_comparator(mut self, comparator: FileComparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn state(&self) -> JobState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => JobState::Running,
            STATE_PAUSED => JobState::Paused,
            STATE_FINISHED => JobState::Finished,
            STATE_STOPPED => JobState::Stopped,
            _ => JobState::Created,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    /// 暂停，遍历会在下一个文件/目录边界停下等待
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            STATE_RUNNING,
            STATE_PAUSED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// 继续被暂停的遍历
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            STATE_PAUSED,
            STATE_RUNNING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// 请求停止，遍历在下一个边界干净退出，已完成的变更不回滚
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// 执行任务，生命周期内只允许调用一次
    pub async fn run(
        &self,
        events: Option<mpsc::Sender<SyncEvent>>,
    ) -> Result<JobOutcome, StorageError> {
        if self
            .state
            .compare_exchange(
                STATE_CREATED,
                STATE_RUNNING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(StorageError::InvalidArgument(format!(
                "任务 {} 已经启动过",
                self.config.name
            )));
        }

        info!(
            "任务开始: {} ({:?}, preview={})",
            self.config.name, self.config.syncMode, self.preview
        );

        let source = storage::create_storage(&self.config.sourceConfig).await?;
        let dest = storage::create_storage(&self.config.destConfig).await?;

        let result = if self.config.syncMode.is_backup() {
            self.run_backup(source.as_ref(), dest.as_ref(), &events).await
        } else {
            self.run_sync(source.as_ref(), dest.as_ref(), &events).await
        };

        match result {
            Ok(()) => {
                self.state.store(STATE_FINISHED, Ordering::SeqCst);
                info!(
                    "任务完成: {} - {} 个文件, {} 字节",
                    self.config.name,
                    self.files_processed(),
                    self.bytes_written()
                );
                Ok(JobOutcome::Finished)
            }
            Err(JobStopped) => {
                self.state.store(STATE_STOPPED, Ordering::SeqCst);
                info!("任务已停止: {}", self.config.name);
                Ok(JobOutcome::Stopped)
            }
        }
    }

    /// 备份：先合并，再反向镜像删除
    async fn run_backup(
        &self,
        source: &dyn Storage,
        dest: &dyn Storage,
        events: &Option<mpsc::Sender<SyncEvent>>,
    ) -> Flow {
        debug!("合并阶段: {} -> {}", source.name(), dest.name());
        self.merge_dir(source, dest, "", events).await?;
        debug!("镜像删除阶段: 对照 {} 清理 {}", source.name(), dest.name());
        self.mirror_dir(source, dest, "", events).await
    }

    /// 双向同步：两个方向各跑一次合并，从不删除
    async fn run_sync(
        &self,
        source: &dyn Storage,
        dest: &dyn Storage,
        events: &Option<mpsc::Sender<SyncEvent>>,
    ) -> Flow {
        debug!("合并阶段: {} -> {}", source.name(), dest.name());
        self.merge_dir(source, dest, "", events).await?;
        debug!("合并阶段: {} -> {}", dest.name(), source.name());
        self.merge_dir(dest, source, "", events).await
    }

    /// 在文件/目录边界检查暂停与停止
    async fn checkpoint(&self) -> Flow {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Err(JobStopped);
            }
            if !self.paused.load(Ordering::SeqCst) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(PAUSE_POLL_MS)).await;
        }
    }

    async fn emit(&self, events: &Option<mpsc::Sender<SyncEvent>>, event: SyncEvent) {
        if let Some(tx) = events {
            let _ = tx.send(event).await;
        }
    }

    /// 合并一个目录：缺失的复制、过期的覆盖、子目录递归。
    /// 先处理文件，再进入子目录（深度优先）。
    fn merge_dir<'a>(
        &'a self,
        source: &'a dyn Storage,
        dest: &'a dyn Storage,
        dir: &'a str,
        events: &'a Option<mpsc::Sender<SyncEvent>>,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            self.checkpoint().await?;

            let entries = match source.list_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.is_access_denied() => {
                    warn!("跳过无法访问的源目录 {}:{}", source.name(), dir);
                    return Ok(());
                }
                Err(e) => {
                    warn!("列出源目录失败 {}:{}: {}", source.name(), dir, e);
                    return Ok(());
                }
            };

            let dest_map: HashMap<String, FileInfo> = match dest.list_dir(dir).await {
                Ok(entries) => entries
                    .into_iter()
                    .map(|f| (f.name().to_string(), f))
                    .collect(),
                Err(StorageError::NotFound { .. }) => HashMap::new(),
                Err(e) if e.is_access_denied() => {
                    warn!("跳过无法访问的目标目录 {}:{}", dest.name(), dir);
                    return Ok(());
                }
                Err(e) => {
                    warn!("列出目标目录失败 {}:{}: {}", dest.name(), dir, e);
                    HashMap::new()
                }
            };

            let (files, dirs): (Vec<FileInfo>, Vec<FileInfo>) =
                entries.into_iter().partition(|e| !e.is_dir);

            for file in &files {
                self.checkpoint().await?;

                match dest_map.get(file.name()) {
                    None => {
                        self.emit(events, SyncEvent::FileCreating { path: file.path.clone() })
                            .await;
                        match self.copy_file(source, dest, file).await {
                            Ok(()) => {
                                self.emit(
                                    events,
                                    SyncEvent::FileCreated {
                                        path: file.path.clone(),
                                        size: file.size,
                                    },
                                )
                                .await;
                            }
                            Err(e) => {
                                warn!("复制失败 {}: {}", file.path, e);
                                self.emit(
                                    events,
                                    SyncEvent::FileCopyError {
                                        path: file.path.clone(),
                                        error: e.to_string(),
                                    },
                                )
                                .await;
                            }
                        }
                    }
                    Some(existing) if self.comparator.needs_update(file, existing) => {
                        self.emit(events, SyncEvent::FileModifying { path: file.path.clone() })
                            .await;
                        match self.copy_file(source, dest, file).await {
                            Ok(()) => {
                                self.emit(
                                    events,
                                    SyncEvent::FileModified {
                                        path: file.path.clone(),
                                        size: file.size,
                                    },
                                )
                                .await;
                            }
                            Err(e) => {
                                warn!("覆盖失败 {}: {}", file.path, e);
                                self.emit(
                                    events,
                                    SyncEvent::FileCopyError {
                                        path: file.path.clone(),
                                        error: e.to_string(),
                                    },
                                )
                                .await;
                            }
                        }
                    }
                    Some(_) => {
                        self.emit(events, SyncEvent::Progress { path: file.path.clone() })
                            .await;
                    }
                }

                self.files_processed.fetch_add(1, Ordering::Relaxed);
            }

            for sub in &dirs {
                self.checkpoint().await?;

                if !dest_map.contains_key(sub.name()) {
                    self.emit(events, SyncEvent::DirCreating { path: sub.path.clone() })
                        .await;
                    let created = if self.preview {
                        Ok(())
                    } else {
                        dest.create_dir(&sub.path).await
                    };
                    match created {
                        Ok(()) => {
                            self.emit(events, SyncEvent::DirCreated { path: sub.path.clone() })
                                .await;
                        }
                        Err(e) => {
                            warn!("创建目录失败 {}: {}", sub.path, e);
                            self.emit(
                                events,
                                SyncEvent::DirCreateError {
                                    path: sub.path.clone(),
                                    error: e.to_string(),
                                },
                            )
                            .await;
                            // 无法创建目标目录，该子树不再下探
                            continue;
                        }
                    }
                }

                self.merge_dir(source, dest, &sub.path, events).await?;
            }

            Ok(())
        })
    }

    /// 复制单个文件；preview 只累计计数，不做任何变更
    async fn copy_file(
        &self,
        source: &dyn Storage,
        dest: &dyn Storage,
        file: &FileInfo,
    ) -> Result<(), StorageError> {
        if self.preview {
            self.bytes_written.fetch_add(file.size, Ordering::Relaxed);
            return Ok(());
        }

        let data = source.read(&file.path).await?;
        let len = data.len() as u64;
        dest.write(&file.path, data, file.modified_time).await?;
        self.bytes_written.fetch_add(len, Ordering::Relaxed);
        debug!("已复制 {} ({} 字节)", file.path, len);
        Ok(())
    }

    /// 镜像删除：反向扫描目标，清掉源里已不存在的条目。
    /// 单项删除失败只上报错误事件，不影响兄弟条目。
    fn mirror_dir<'a>(
        &'a self,
        source: &'a dyn Storage,
        dest: &'a dyn Storage,
        dir: &'a str,
        events: &'a Option<mpsc::Sender<SyncEvent>>,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            self.checkpoint().await?;

            let dest_entries = match dest.list_dir(dir).await {
                Ok(entries) => entries,
                Err(StorageError::NotFound { .. }) => return Ok(()),
                Err(e) if e.is_access_denied() => {
                    // 只放弃这棵子树的删除检查
                    warn!("跳过无法检查的目标目录 {}:{}", dest.name(), dir);
                    return Ok(());
                }
                Err(e) => {
                    warn!("列出目标目录失败 {}:{}: {}", dest.name(), dir, e);
                    return Ok(());
                }
            };

            let source_map: HashMap<String, FileInfo> = match source.list_dir(dir).await {
                Ok(entries) => entries
                    .into_iter()
                    .map(|f| (f.name().to_string(), f))
                    .collect(),
                Err(e) if e.is_access_denied() => {
                    warn!("跳过无法访问的源目录 {}:{}", source.name(), dir);
                    return Ok(());
                }
                Err(e) => {
                    warn!("列出源目录失败 {}:{}: {}", source.name(), dir, e);
                    return Ok(());
                }
            };

            let (files, dirs): (Vec<FileInfo>, Vec<FileInfo>) =
                dest_entries.into_iter().partition(|e| !e.is_dir);

            for file in &files {
                if source_map.contains_key(file.name()) {
                    continue;
                }
                self.checkpoint().await?;

                self.emit(events, SyncEvent::FileDeleting { path: file.path.clone() })
                    .await;
                let deleted = if self.preview {
                    Ok(())
                } else {
                    dest.delete_file(&file.path).await
                };
                match deleted {
                    Ok(()) => {
                        self.emit(events, SyncEvent::FileDeleted { path: file.path.clone() })
                            .await;
                        self.files_processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!("删除失败 {}: {}", file.path, e);
                        self.emit(
                            events,
                            SyncEvent::FileDeleteError {
                                path: file.path.clone(),
                                error: e.to_string(),
                            },
                        )
                        .await;
                    }
                }
            }

            for sub in &dirs {
                self.checkpoint().await?;

                if source_map.contains_key(sub.name()) {
                    self.mirror_dir(source, dest, &sub.path, events).await?;
                    continue;
                }

                // 整棵子树将被删除：先逐文件上报进度，保证计数准确
                match dest.list_all(&sub.path).await {
                    Ok(contained) => {
                        for entry in contained.iter().filter(|e| !e.is_dir) {
                            self.emit(events, SyncEvent::Progress { path: entry.path.clone() })
                                .await;
                            self.files_processed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => {
                        warn!("枚举待删除子树失败 {}: {}", sub.path, e);
                    }
                }

                self.emit(events, SyncEvent::DirDeleting { path: sub.path.clone() })
                    .await;
                let deleted = if self.preview {
                    Ok(())
                } else {
                    dest.delete_dir(&sub.path).await
                };
                match deleted {
                    Ok(()) => {
                        self.emit(events, SyncEvent::DirDeleted { path: sub.path.clone() })
                            .await;
                    }
                    Err(e) => {
                        warn!("删除目录失败 {}: {}", sub.path, e);
                        self.emit(
                            events,
                            SyncEvent::DirDeleteError {
                                path: sub.path.clone(),
                                error: e.to_string(),
                            },
                        )
                        .await;
                    }
                }
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EndpointConfig, SyncMode};
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn memory_config(name: &str, source: &str, dest: &str, mode: SyncMode) -> JobConfig {
        JobConfig {
            name: name.to_string(),
            sourceConfig: EndpointConfig::memory(source),
            destConfig: EndpointConfig::memory(dest),
            syncMode: mode,
            enabled: true,
        }
    }

    fn fresh(label: &str) -> Arc<MemoryStorage> {
        let storage = MemoryStorage::named(label).unwrap();
        storage.clear();
        storage
    }

    async fn run_collect(config: JobConfig, preview: bool) -> (JobOutcome, Vec<SyncEvent>) {
        let (tx, mut rx) = mpsc::channel(1024);
        let job = Job::new(config, preview);
        let outcome = job.run(Some(tx)).await.unwrap();
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (outcome, events)
    }

    fn count_matching(events: &[SyncEvent], pred: impl Fn(&SyncEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    #[tokio::test]
    async fn test_backup_creates_missing_entries() {
        let source = fresh("eng-create-src");
        source.add_file("a.txt", b"aa", 10).unwrap();
        source.add_file("sub/b.txt", b"bbb", 20).unwrap();
        let dest = fresh("eng-create-dst");

        let (outcome, events) = run_collect(
            memory_config("j", "eng-create-src", "eng-create-dst", SyncMode::LocalBackup),
            false,
        )
        .await;

        assert_eq!(outcome, JobOutcome::Finished);
        assert!(events.contains(&SyncEvent::FileCreating { path: "a.txt".into() }));
        assert!(events.contains(&SyncEvent::FileCreated { path: "a.txt".into(), size: 2 }));
        assert!(events.contains(&SyncEvent::DirCreating { path: "sub".into() }));
        assert!(events.contains(&SyncEvent::DirCreated { path: "sub".into() }));
        assert!(events.contains(&SyncEvent::FileCreated { path: "sub/b.txt".into(), size: 3 }));

        // 目标内容与源一致，时间戳被保留
        let copied = dest.stat("sub/b.txt").await.unwrap().unwrap();
        assert_eq!(copied.size, 3);
        assert_eq!(copied.modified_time, 20);
        assert_eq!(dest.read("a.txt").await.unwrap(), b"aa");
    }

    #[tokio::test]
    async fn test_backup_modifies_stale_file() {
        let source = fresh("eng-mod-src");
        source.add_file("a.txt", b"new content", 10).unwrap();
        let dest = fresh("eng-mod-dst");
        dest.add_file("a.txt", b"old", 5).unwrap();

        let (_, events) = run_collect(
            memory_config("j", "eng-mod-src", "eng-mod-dst", SyncMode::LocalBackup),
            false,
        )
        .await;

        // modifying 在 modified 之前
        let modifying = events
            .iter()
            .position(|e| matches!(e, SyncEvent::FileModifying { .. }))
            .unwrap();
        let modified = events
            .iter()
            .position(|e| matches!(e, SyncEvent::FileModified { .. }))
            .unwrap();
        assert!(modifying < modified);

        let info = dest.stat("a.txt").await.unwrap().unwrap();
        assert_eq!(info.modified_time, 10);
        assert_eq!(dest.read("a.txt").await.unwrap(), b"new content");
    }

    #[tokio::test]
    async fn test_backup_equal_time_different_size_is_modified() {
        let source = fresh("eng-size-src");
        source.add_file("a.txt", b"12345", 10).unwrap();
        let dest = fresh("eng-size-dst");
        dest.add_file("a.txt", b"12", 10).unwrap();

        let (_, events) = run_collect(
            memory_config("j", "eng-size-src", "eng-size-dst", SyncMode::LocalBackup),
            false,
        )
        .await;

        assert_eq!(
            count_matching(&events, |e| matches!(e, SyncEvent::FileModified { .. })),
            1
        );
        assert_eq!(dest.read("a.txt").await.unwrap(), b"12345");
    }

    #[tokio::test]
    async fn test_backup_is_idempotent() {
        let source = fresh("eng-idem-src");
        source.add_file("a.txt", b"aa", 10).unwrap();
        source.add_file("sub/b.txt", b"bbb", 20).unwrap();
        fresh("eng-idem-dst");

        let config = memory_config("j", "eng-idem-src", "eng-idem-dst", SyncMode::LocalBackup);
        let (_, first) = run_collect(config.clone(), false).await;
        let (_, second) = run_collect(config, false).await;

        assert!(count_matching(&first, |e| matches!(e, SyncEvent::FileCreated { .. })) == 2);

        // 第二次运行不再有任何变更事件，只有进度
        assert_eq!(
            count_matching(&second, |e| matches!(
                e,
                SyncEvent::FileCreating { .. }
                    | SyncEvent::FileModifying { .. }
                    | SyncEvent::DirCreating { .. }
            )),
            0
        );
        assert_eq!(
            count_matching(&second, |e| matches!(e, SyncEvent::Progress { .. })),
            2
        );
    }

    #[tokio::test]
    async fn test_backup_deletes_extra_file() {
        let source = fresh("eng-del-src");
        let dest = fresh("eng-del-dst");
        dest.add_file("old.txt", b"stale", 1).unwrap();

        let (_, events) = run_collect(
            memory_config("j", "eng-del-src", "eng-del-dst", SyncMode::LocalBackup),
            false,
        )
        .await;

        assert!(events.contains(&SyncEvent::FileDeleting { path: "old.txt".into() }));
        assert!(events.contains(&SyncEvent::FileDeleted { path: "old.txt".into() }));
        assert!(dest.stat("old.txt").await.unwrap().is_none());
        drop(source);
    }

    #[tokio::test]
    async fn test_backup_deletes_extra_dir_with_progress() {
        let source = fresh("eng-deldir-src");
        source.add_file("keep.txt", b"k", 1).unwrap();
        let dest = fresh("eng-deldir-dst");
        dest.add_file("keep.txt", b"k", 1).unwrap();
        dest.add_file("extra/x.txt", b"x", 1).unwrap();
        dest.add_file("extra/deep/y.txt", b"y", 1).unwrap();

        let (_, events) = run_collect(
            memory_config("j", "eng-deldir-src", "eng-deldir-dst", SyncMode::LocalBackup),
            false,
        )
        .await;

        // 子树内每个文件先上报进度，再整体删除
        assert!(events.contains(&SyncEvent::Progress { path: "extra/x.txt".into() }));
        assert!(events.contains(&SyncEvent::Progress { path: "extra/deep/y.txt".into() }));
        let deleting = events
            .iter()
            .position(|e| matches!(e, SyncEvent::DirDeleting { .. }))
            .unwrap();
        let progress = events
            .iter()
            .position(|e| e == &SyncEvent::Progress { path: "extra/x.txt".into() })
            .unwrap();
        assert!(progress < deleting);
        assert!(events.contains(&SyncEvent::DirDeleted { path: "extra".into() }));
        assert!(dest.stat("extra").await.unwrap().is_none());
        assert!(dest.stat("extra/deep/y.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_preview_reports_without_mutation() {
        let source = fresh("eng-prev-src");
        source.add_file("new.txt", b"nn", 10).unwrap();
        let dest = fresh("eng-prev-dst");
        dest.add_file("old.txt", b"oo", 1).unwrap();

        let (_, events) = run_collect(
            memory_config("j", "eng-prev-src", "eng-prev-dst", SyncMode::LocalBackup),
            true,
        )
        .await;

        assert!(events.contains(&SyncEvent::FileCreated { path: "new.txt".into(), size: 2 }));
        assert!(events.contains(&SyncEvent::FileDeleted { path: "old.txt".into() }));

        // 预览不做任何变更
        assert!(dest.stat("new.txt").await.unwrap().is_none());
        assert!(dest.stat("old.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sync_merges_both_directions_never_deletes() {
        let a = fresh("eng-sync-a");
        a.add_file("only-a.txt", b"aa", 10).unwrap();
        let b = fresh("eng-sync-b");
        b.add_file("only-b.txt", b"bbb", 10).unwrap();

        let (_, events) = run_collect(
            memory_config("j", "eng-sync-a", "eng-sync-b", SyncMode::LocalSync),
            false,
        )
        .await;

        assert!(a.stat("only-b.txt").await.unwrap().is_some());
        assert!(b.stat("only-a.txt").await.unwrap().is_some());
        assert_eq!(
            count_matching(&events, |e| matches!(
                e,
                SyncEvent::FileDeleting { .. } | SyncEvent::DirDeleting { .. }
            )),
            0
        );
    }

    #[tokio::test]
    async fn test_sync_newer_side_wins() {
        let a = fresh("eng-newer-a");
        a.add_file("doc.txt", b"from a", 100).unwrap();
        let b = fresh("eng-newer-b");
        b.add_file("doc.txt", b"b old", 50).unwrap();

        run_collect(
            memory_config("j", "eng-newer-a", "eng-newer-b", SyncMode::LocalSync),
            false,
        )
        .await;

        assert_eq!(a.read("doc.txt").await.unwrap(), b"from a");
        assert_eq!(b.read("doc.txt").await.unwrap(), b"from a");
        assert_eq!(b.stat("doc.txt").await.unwrap().unwrap().modified_time, 100);
    }

    #[tokio::test]
    async fn test_copy_error_does_not_abort_job() {
        let source = fresh("eng-err-src");
        source.add_file("bad/locked.txt", b"x", 1).unwrap();
        source.add_file("good.txt", b"ok", 1).unwrap();
        source.deny("bad/locked.txt");
        let dest = fresh("eng-err-dst");

        let (outcome, events) = run_collect(
            memory_config("j", "eng-err-src", "eng-err-dst", SyncMode::LocalBackup),
            false,
        )
        .await;

        assert_eq!(outcome, JobOutcome::Finished);
        assert_eq!(
            count_matching(&events, |e| matches!(e, SyncEvent::FileCopyError { .. })),
            1
        );
        assert!(dest.stat("good.txt").await.unwrap().is_some());
        assert!(dest.stat("bad/locked.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_denied_source_subtree_is_skipped() {
        let source = fresh("eng-skip-src");
        source.add_file("open/a.txt", b"a", 1).unwrap();
        source.add_file("locked/b.txt", b"b", 1).unwrap();
        source.deny("locked");
        let dest = fresh("eng-skip-dst");

        let (outcome, _) = run_collect(
            memory_config("j", "eng-skip-src", "eng-skip-dst", SyncMode::LocalBackup),
            false,
        )
        .await;

        assert_eq!(outcome, JobOutcome::Finished);
        assert!(dest.stat("open/a.txt").await.unwrap().is_some());
        assert!(dest.stat("locked/b.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_job_runs_only_once() {
        fresh("eng-once-src");
        fresh("eng-once-dst");
        let job = Job::new(
            memory_config("j", "eng-once-src", "eng-once-dst", SyncMode::LocalBackup),
            false,
        );

        job.run(None).await.unwrap();
        let err = job.run(None).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_stop_before_first_boundary_emits_nothing() {
        let source = fresh("eng-stop-src");
        source.add_file("a.txt", b"a", 1).unwrap();
        fresh("eng-stop-dst");

        let job = std::sync::Arc::new(Job::new(
            memory_config("j", "eng-stop-src", "eng-stop-dst", SyncMode::LocalBackup),
            false,
        ));
        // 先暂停再启动，遍历会停在第一个边界上
        job.pause();

        let (tx, mut rx) = mpsc::channel(1024);
        let runner = {
            let job = job.clone();
            tokio::spawn(async move { job.run(Some(tx)).await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        job.stop();
        let outcome = runner.await.unwrap();

        assert_eq!(outcome, JobOutcome::Stopped);
        assert_eq!(job.state(), JobState::Stopped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pause_and_resume_completes_job() {
        let source = fresh("eng-pause-src");
        source.add_file("a.txt", b"aa", 1).unwrap();
        let dest = fresh("eng-pause-dst");

        let job = std::sync::Arc::new(Job::new(
            memory_config("j", "eng-pause-src", "eng-pause-dst", SyncMode::LocalBackup),
            false,
        ));
        job.pause();

        let runner = {
            let job = job.clone();
            tokio::spawn(async move { job.run(None).await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!runner.is_finished());

        job.resume();
        let outcome = runner.await.unwrap();
        assert_eq!(outcome, JobOutcome::Finished);
        assert!(dest.stat("a.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_local_backup_end_to_end() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src_dir.path().join("docs")).unwrap();
        std::fs::write(src_dir.path().join("docs/report.txt"), b"report body").unwrap();

        let config = JobConfig {
            name: "local".to_string(),
            sourceConfig: EndpointConfig::local(src_dir.path().to_str().unwrap()),
            destConfig: EndpointConfig::local(dst_dir.path().to_str().unwrap()),
            syncMode: SyncMode::LocalBackup,
            enabled: true,
        };

        let (outcome, events) = run_collect(config, false).await;
        assert_eq!(outcome, JobOutcome::Finished);
        assert!(events
            .contains(&SyncEvent::FileCreated { path: "docs/report.txt".into(), size: 11 }));

        let copied = std::fs::read(dst_dir.path().join("docs/report.txt")).unwrap();
        assert_eq!(copied, b"report body");
    }
}
