//! 失败日志 - 记录投递失败，写入带轮转的本地文件

use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// 单个日志文件上限，超过后轮转到 `.1`
const MAX_LOG_BYTES: u64 = 512 * 1024;

/// 失败记录能力，永不报错
pub trait FailureLog: Send + Sync {
    fn record(&self, message: &str);
}

/// 只写 tracing，不落盘
#[derive(Debug, Default)]
pub struct TracingLog;

impl FailureLog for TracingLog {
    fn record(&self, message: &str) {
        warn!(message, "Notification failure");
    }
}

/// 本地失败日志文件
pub struct ErrorLog {
    path: PathBuf,
    max_bytes: u64,
    // 同进程内串行化写入和轮转，跨进程靠文件锁
    write_lock: Mutex<()>,
}

impl ErrorLog {
    /// 创建写入 `path` 的错误日志
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: MAX_LOG_BYTES,
            write_lock: Mutex::new(()),
        }
    }

    /// 默认路径 ~/.config/agent-notifier/errors.log
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("agent-notifier")
            .join("errors.log")
    }

    /// 设置轮转阈值
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    fn append(&self, message: &str) -> std::io::Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Ok(metadata) = fs::metadata(&self.path) {
            if metadata.len() >= self.max_bytes {
                fs::rename(&self.path, self.rotated_path())?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock_exclusive()?;
        let line = format!("[{}] {}\n", Utc::now().to_rfc3339(), message.trim_end());
        let result = file.write_all(line.as_bytes());
        let _ = file.unlock();
        result
    }
}

impl FailureLog for ErrorLog {
    fn record(&self, message: &str) {
        warn!(message, "Notification failure");

        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = self.append(message) {
            warn!(path = %self.path.display(), error = %e, "Failed to write error log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("errors.log"));

        log.record("ntfy: provider returned 500");
        log.record("slack: delivery timed out");

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("ntfy: provider returned 500"));
        assert!(lines[1].contains("slack"));
    }

    #[test]
    fn test_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("errors.log")).with_max_bytes(64);

        for i in 0..10 {
            log.record(&format!("failure number {}", i));
        }

        assert!(dir.path().join("errors.log.1").exists());
        let current = fs::metadata(log.path()).unwrap().len();
        assert!(current < 64 + 80);
    }

    #[test]
    fn test_record_never_panics_on_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        // 父路径是文件，create_dir_all 会失败
        let log = ErrorLog::new(blocker.join("errors.log"));
        log.record("ignored");
    }
}
