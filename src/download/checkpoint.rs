//! 下载状态检查点的读写。
//!
//! 以 `source_url` 为对账键：URL 不一致的旧状态直接丢弃，绝不合并。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::models::DownloadState;

const STATE_FILE: &str = "download_state.json";

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// `base_dir` 下固定使用一个状态文件；同一目录同一时刻只支持一个任务。
    pub fn new(base_dir: &Path) -> Self {
        Self {
            path: base_dir.join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取检查点。文件不存在、无法解析、或 `source_url` 不匹配都视为无状态。
    pub fn load(&self, expected_url: &str) -> Option<DownloadState> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let state: DownloadState = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "checkpoint", error = %e, "检查点文件无法解析，按全新任务处理");
                return None;
            }
        };

        if state.source_url != expected_url {
            info!(
                target: "checkpoint",
                found = %state.source_url,
                expected = %expected_url,
                "检查点属于另一本书，忽略"
            );
            return None;
        }

        debug!(
            target: "checkpoint",
            next_index = state.next_index,
            chapters = state.chapters.len(),
            "检查点已加载"
        );
        Some(state)
    }

    /// 原子写入：先写临时文件再重命名，避免出现半截状态。
    pub fn save(&self, state: &DownloadState) -> io::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp = NamedTempFile::new_in(dir)?;
        fs::write(tmp.path(), json)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(target: "checkpoint", next_index = state.next_index, "检查点已写入");
        Ok(())
    }

    /// 删除检查点。文件本就不存在不算错误。
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(target: "checkpoint", "检查点已清除");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
