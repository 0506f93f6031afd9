use crate::storage::FileInfo;

/// 比较配置
#[derive(Debug, Clone)]
pub struct CompareConfig {
    /// 时间容差（秒），吸收不同后端的时钟精度差异
    pub time_tolerance_seconds: i64,
    /// 大小相同即视为相同（适用于 FTP 等不保留修改时间的后端）
    pub size_only_for_same_size: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            time_tolerance_seconds: 2,
            size_only_for_same_size: false,
        }
    }
}

impl CompareConfig {
    /// 远程端点的推荐配置
    pub fn remote() -> Self {
        Self {
            size_only_for_same_size: true,
            ..Default::default()
        }
    }
}

/// 文件新旧比较器
///
/// "目标是否过期" 的判定策略集中在这里，遍历算法不自带时钟假设。
#[derive(Debug, Clone, Default)]
pub struct FileComparator {
    config: CompareConfig,
}

impl FileComparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CompareConfig) -> Self {
        Self { config }
    }

    /// 目标是否需要覆盖：源更新，或时间相同但长度不同
    pub fn needs_update(&self, source: &FileInfo, dest: &FileInfo) -> bool {
        if self.config.size_only_for_same_size {
            return source.size != dest.size;
        }

        let diff = source.modified_time - dest.modified_time;
        if diff > self.config.time_tolerance_seconds {
            return true;
        }
        diff.abs() <= self.config.time_tolerance_seconds && source.size != dest.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(modified_time: i64, size: u64) -> FileInfo {
        FileInfo {
            path: "a.txt".to_string(),
            size,
            modified_time,
            is_dir: false,
        }
    }

    #[test]
    fn test_source_newer_needs_update() {
        let cmp = FileComparator::new();
        assert!(cmp.needs_update(&file(10, 5), &file(5, 5)));
    }

    #[test]
    fn test_equal_time_same_size_skipped() {
        let cmp = FileComparator::new();
        assert!(!cmp.needs_update(&file(10, 5), &file(10, 5)));
        // 容差以内视为同一时间
        assert!(!cmp.needs_update(&file(11, 5), &file(10, 5)));
    }

    #[test]
    fn test_equal_time_different_size_needs_update() {
        let cmp = FileComparator::new();
        assert!(cmp.needs_update(&file(10, 5), &file(10, 7)));
        assert!(cmp.needs_update(&file(10, 5), &file(11, 7)));
    }

    #[test]
    fn test_dest_newer_is_not_stale() {
        let cmp = FileComparator::new();
        assert!(!cmp.needs_update(&file(5, 5), &file(10, 5)));
    }

    #[test]
    fn test_size_only_mode_ignores_time() {
        let cmp = FileComparator::with_config(CompareConfig::remote());
        assert!(!cmp.needs_update(&file(100, 5), &file(0, 5)));
        assert!(cmp.needs_update(&file(0, 5), &file(100, 7)));
    }
}
