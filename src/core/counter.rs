use crate::error::StorageError;
use crate::model::{JobConfig, ScanTotals};
use crate::storage::{self, Storage};
use std::collections::HashMap;
use tracing::{debug, warn};

/// 预扫描计数器
///
/// 在任何变更发生之前统计任务涉及的文件/目录/字节总量，
/// 供调度器把整条队列的进度归一化。
pub struct TreeCounter;

impl TreeCounter {
    /// 统计一个任务配置的扫描域：
    /// backup 只统计源树，sync 统计两棵树的并集
    pub async fn count_config(config: &JobConfig) -> Result<ScanTotals, StorageError> {
        let source = storage::create_storage(&config.sourceConfig).await?;

        let totals = if config.syncMode.is_backup() {
            Self::count_tree(source.as_ref()).await
        } else {
            let dest = storage::create_storage(&config.destConfig).await?;
            let mut merged = HashMap::new();
            Self::collect_tree(source.as_ref(), &mut merged).await;
            Self::collect_tree(dest.as_ref(), &mut merged).await;
            Self::totals_from(&merged)
        };

        debug!(
            "预扫描 {}: {} 文件, {} 目录, {} 字节",
            config.name, totals.files, totals.dirs, totals.bytes
        );
        Ok(totals)
    }

    /// 统计单棵树
    pub async fn count_tree(storage: &dyn Storage) -> ScanTotals {
        let mut entries = HashMap::new();
        Self::collect_tree(storage, &mut entries).await;
        Self::totals_from(&entries)
    }

    /// 逐目录下探收集条目；无法访问的子树跳过并记录，不中断扫描。
    /// 两侧都出现的路径只计一次，字节数取较大的一侧。
    async fn collect_tree(storage: &dyn Storage, out: &mut HashMap<String, (u64, bool)>) {
        let mut stack = vec![String::new()];
        while let Some(dir) = stack.pop() {
            match storage.list_dir(&dir).await {
                Ok(entries) => {
                    for entry in entries {
                        if entry.is_dir {
                            stack.push(entry.path.clone());
                            out.insert(entry.path, (0, true));
                        } else {
                            out.entry(entry.path)
                                .and_modify(|v| v.0 = v.0.max(entry.size))
                                .or_insert((entry.size, false));
                        }
                    }
                }
                Err(e) if e.is_access_denied() => {
                    warn!("预扫描跳过无法访问的目录 {}:{}", storage.name(), dir);
                }
                Err(e) => {
                    warn!("预扫描目录失败 {}:{}: {}", storage.name(), dir, e);
                }
            }
        }
    }

    fn totals_from(entries: &HashMap<String, (u64, bool)>) -> ScanTotals {
        let mut totals = ScanTotals::default();
        for (size, is_dir) in entries.values() {
            if *is_dir {
                totals.dirs += 1;
            } else {
                totals.files += 1;
                totals.bytes += size;
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EndpointConfig, SyncMode};
    use crate::storage::MemoryStorage;

    fn config(name: &str, source: &str, dest: &str, mode: SyncMode) -> JobConfig {
        JobConfig {
            name: name.to_string(),
            sourceConfig: EndpointConfig::memory(source),
            destConfig: EndpointConfig::memory(dest),
            syncMode: mode,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_backup_counts_source_tree_only() {
        let source = MemoryStorage::named("cnt-src-1").unwrap();
        source.clear();
        source.add_file("a.txt", b"12345", 1).unwrap();
        source.add_file("sub/b.txt", b"123", 1).unwrap();

        let dest = MemoryStorage::named("cnt-dst-1").unwrap();
        dest.clear();
        dest.add_file("extra.txt", b"xxxxxxx", 1).unwrap();

        let totals =
            TreeCounter::count_config(&config("j", "cnt-src-1", "cnt-dst-1", SyncMode::LocalBackup))
                .await
                .unwrap();

        assert_eq!(totals.files, 2);
        assert_eq!(totals.dirs, 1);
        assert_eq!(totals.bytes, 8);
    }

    #[tokio::test]
    async fn test_sync_counts_union_once() {
        let source = MemoryStorage::named("cnt-src-2").unwrap();
        source.clear();
        source.add_file("both.txt", b"1234", 1).unwrap();
        source.add_file("only-a.txt", b"1", 1).unwrap();

        let dest = MemoryStorage::named("cnt-dst-2").unwrap();
        dest.clear();
        dest.add_file("both.txt", b"123456", 2).unwrap();
        dest.add_file("only-b.txt", b"22", 1).unwrap();

        let totals =
            TreeCounter::count_config(&config("j", "cnt-src-2", "cnt-dst-2", SyncMode::LocalSync))
                .await
                .unwrap();

        // both.txt 只计一次，字节取较大一侧
        assert_eq!(totals.files, 3);
        assert_eq!(totals.bytes, 6 + 1 + 2);
    }

    #[tokio::test]
    async fn test_totals_are_order_independent() {
        let x = MemoryStorage::named("cnt-x").unwrap();
        x.clear();
        x.add_file("x/a.txt", b"aaa", 1).unwrap();

        let y = MemoryStorage::named("cnt-y").unwrap();
        y.clear();
        y.add_file("b.txt", b"bb", 1).unwrap();
        y.add_file("c.txt", b"c", 1).unwrap();

        let empty = MemoryStorage::named("cnt-empty").unwrap();
        empty.clear();

        let cx = config("x", "cnt-x", "cnt-empty", SyncMode::LocalBackup);
        let cy = config("y", "cnt-y", "cnt-empty", SyncMode::LocalBackup);

        let forward = TreeCounter::count_config(&cx).await.unwrap()
            + TreeCounter::count_config(&cy).await.unwrap();
        let backward = TreeCounter::count_config(&cy).await.unwrap()
            + TreeCounter::count_config(&cx).await.unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.files, 3);
        assert_eq!(forward.dirs, 1);
        assert_eq!(forward.bytes, 6);
    }

    #[tokio::test]
    async fn test_denied_subtree_is_skipped() {
        let source = MemoryStorage::named("cnt-denied").unwrap();
        source.clear();
        source.add_file("open/a.txt", b"123", 1).unwrap();
        source.add_file("locked/secret.txt", b"123456", 1).unwrap();
        source.deny("locked");

        let empty = MemoryStorage::named("cnt-empty-2").unwrap();
        empty.clear();

        let totals = TreeCounter::count_config(&config(
            "j",
            "cnt-denied",
            "cnt-empty-2",
            SyncMode::LocalBackup,
        ))
        .await
        .unwrap();

        // locked 子树整体跳过，目录本身已被列出计数
        assert_eq!(totals.files, 1);
        assert_eq!(totals.bytes, 3);
        assert_eq!(totals.dirs, 2);
    }
}
