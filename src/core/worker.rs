use crate::core::counter::TreeCounter;
use crate::core::engine::{Job, JobOutcome};
use crate::error::StorageError;
use crate::model::{JobConfig, RunReport, ScanTotals, SyncEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

/// 任务队列调度器
///
/// 同一时刻最多只有一个任务在执行；start 立即返回，
/// 预扫描、遍历与事件发布都在后台任务上进行。
/// 所有任务的细粒度事件共用 start 传入的那一条通道，
/// 消费者只需在调度器层订阅一次。
pub struct SyncWorker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    queue: Mutex<VecDeque<Arc<Job>>>,
    current: Mutex<Option<Arc<Job>>>,
    running: AtomicBool,
    total_bytes: AtomicU64,
    total_files: AtomicU64,
    jobs_run: AtomicU32,
    totals: Mutex<Option<ScanTotals>>,
}

impl SyncWorker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                queue: Mutex::new(VecDeque::new()),
                current: Mutex::new(None),
                running: AtomicBool::new(false),
                total_bytes: AtomicU64::new(0),
                total_files: AtomicU64::new(0),
                jobs_run: AtomicU32::new(0),
                totals: Mutex::new(None),
            }),
        }
    }

    /// 提交一批任务配置并立即返回
    ///
    /// 未启用的配置被过滤掉，其余按提交顺序入队。
    /// 返回的句柄可用于等待整个队列跑完并取得汇总。
    pub async fn start(
        &self,
        configs: Vec<JobConfig>,
        preview: bool,
        events: mpsc::Sender<SyncEvent>,
    ) -> Result<tokio::task::JoinHandle<RunReport>, StorageError> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StorageError::InvalidArgument(
                "调度器已有正在执行的队列".to_string(),
            ));
        }

        // 重置上一次运行的累计
        self.inner.total_bytes.store(0, Ordering::SeqCst);
        self.inner.total_files.store(0, Ordering::SeqCst);
        self.inner.jobs_run.store(0, Ordering::SeqCst);
        *self.inner.totals.lock().await = None;

        let jobs: Vec<Arc<Job>> = configs
            .into_iter()
            .filter(|c| c.enabled)
            .map(|c| Arc::new(Job::new(c, preview)))
            .collect();

        {
            let mut queue = self.inner.queue.lock().await;
            queue.clear();
            queue.extend(jobs.iter().cloned());
        }

        info!("队列已提交: {} 个任务, preview={}", jobs.len(), preview);

        let inner = self.inner.clone();
        Ok(tokio::spawn(async move {
            Self::run_queue(inner, events).await
        }))
    }

    async fn run_queue(inner: Arc<WorkerInner>, events: mpsc::Sender<SyncEvent>) -> RunReport {
        let start_time = chrono::Utc::now().timestamp();

        // 先对整条队列做预扫描，给消费者一个统一的进度基数
        let configs: Vec<JobConfig> = {
            let queue = inner.queue.lock().await;
            queue.iter().map(|j| j.config().clone()).collect()
        };
        let mut totals = ScanTotals::default();
        for config in &configs {
            match TreeCounter::count_config(config).await {
                Ok(t) => totals += t,
                Err(e) => warn!("预扫描失败 {}: {}", config.name, e),
            }
        }
        *inner.totals.lock().await = Some(totals);
        let _ = events.send(SyncEvent::Counted { totals }).await;

        let mut stopped = false;
        loop {
            let job = { inner.queue.lock().await.pop_front() };
            let Some(job) = job else { break };

            *inner.current.lock().await = Some(job.clone());
            let _ = events
                .send(SyncEvent::JobStarted {
                    jobId: job.id().to_string(),
                    name: job.name().to_string(),
                })
                .await;

            match job.run(Some(events.clone())).await {
                Ok(JobOutcome::Finished) => {
                    inner
                        .total_bytes
                        .fetch_add(job.bytes_written(), Ordering::Relaxed);
                    inner
                        .total_files
                        .fetch_add(job.files_processed(), Ordering::Relaxed);
                    inner.jobs_run.fetch_add(1, Ordering::Relaxed);
                    let _ = events
                        .send(SyncEvent::JobFinished {
                            jobId: job.id().to_string(),
                            name: job.name().to_string(),
                            filesProcessed: job.files_processed(),
                            bytesWritten: job.bytes_written(),
                        })
                        .await;
                }
                Ok(JobOutcome::Stopped) => {
                    // 被停止的任务不发送完成通知，队列此时已被清空
                    info!("任务被停止: {}", job.name());
                    stopped = true;
                }
                Err(e) => {
                    // 任务级失败（如存储连接失败）不影响后续任务，
                    // 完成通知仍然发出，保证每个任务恰好收尾一次
                    error!("任务失败 {}: {}", job.name(), e);
                    inner.jobs_run.fetch_add(1, Ordering::Relaxed);
                    let _ = events
                        .send(SyncEvent::JobFinished {
                            jobId: job.id().to_string(),
                            name: job.name().to_string(),
                            filesProcessed: job.files_processed(),
                            bytesWritten: job.bytes_written(),
                        })
                        .await;
                }
            }

            *inner.current.lock().await = None;
            if stopped {
                break;
            }
        }

        let report = RunReport {
            startTime: start_time,
            endTime: chrono::Utc::now().timestamp(),
            jobsRun: inner.jobs_run.load(Ordering::Relaxed),
            filesProcessed: inner.total_files.load(Ordering::Relaxed),
            bytesWritten: inner.total_bytes.load(Ordering::Relaxed),
            stopped,
        };
        let _ = events
            .send(SyncEvent::Finished {
                jobsRun: report.jobsRun,
                filesProcessed: report.filesProcessed,
                bytesWritten: report.bytesWritten,
            })
            .await;

        inner.running.store(false, Ordering::SeqCst);
        info!(
            "队列执行完毕: {} 个任务, {} 个文件, {} 字节",
            report.jobsRun, report.filesProcessed, report.bytesWritten
        );
        report
    }

    /// 暂停当前任务（没有任务在执行时为空操作）
    pub async fn pause(&self) {
        if let Some(job) = self.inner.current.lock().await.as_ref() {
            job.pause();
        }
    }

    /// 继续被暂停的任务
    pub async fn resume(&self) {
        if let Some(job) = self.inner.current.lock().await.as_ref() {
            job.resume();
        }
    }

    /// 停止当前任务并清空剩余队列
    pub async fn stop(&self) {
        self.inner.queue.lock().await.clear();
        if let Some(job) = self.inner.current.lock().await.as_ref() {
            job.stop();
        }
    }

    /// 缓存的预扫描结果（Counted 事件之前为 None）
    pub async fn totals(&self) -> Option<ScanTotals> {
        *self.inner.totals.lock().await
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn bytes_written(&self) -> u64 {
        self.inner.total_bytes.load(Ordering::Relaxed)
    }

    pub fn files_processed(&self) -> u64 {
        self.inner.total_files.load(Ordering::Relaxed)
    }
}

impl Default for SyncWorker {
    fn default() -> Self {
        Self::new()
    }
}
