//! 下载相关的数据模型定义。
//!
//! 包含书籍目录、章节引用、下载模式、下载状态、运行结果与错误类型。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 目录页中的一条章节引用。顺序即章节顺序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRef {
    pub name: String,
    pub url: String,
}

/// 一本书的目录：元数据 + 有序章节列表。抓取后不再变化。
#[derive(Debug, Clone)]
pub struct BookIndex {
    pub source_url: String,
    pub title: String,
    pub author: Option<String>,
    pub chapters: Vec<ChapterRef>,
}

/// 已下载的单章正文。`body` 为各内容段落按换行拼接的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterText {
    pub title: String,
    pub body: String,
}

/// 下载模式。`Range` 内部统一为 0 起始的半开区间 `[start, end)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadMode {
    Full,
    Range { start: usize, end: usize },
}

impl DownloadMode {
    pub fn start_index(&self) -> usize {
        match self {
            DownloadMode::Full => 0,
            DownloadMode::Range { start, .. } => *start,
        }
    }

    pub fn end_index(&self, total: usize) -> usize {
        match self {
            DownloadMode::Full => total,
            DownloadMode::Range { end, .. } => *end,
        }
    }
}

/// 可断点续传的下载状态，也是检查点文件的磁盘投影。
///
/// 不变量：`start <= next_index <= end`；`chapters` 只增不减；
/// `flushed <= chapters.len()`（已写入输出文件的章节数水位）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadState {
    pub source_url: String,
    pub title: String,
    pub author: Option<String>,
    pub total_chapters: usize,
    pub mode: DownloadMode,
    pub next_index: usize,
    pub flushed: usize,
    pub chapters: Vec<ChapterText>,
}

impl DownloadState {
    pub fn fresh(index: &BookIndex, mode: DownloadMode) -> Self {
        Self {
            source_url: index.source_url.clone(),
            title: index.title.clone(),
            author: index.author.clone(),
            total_chapters: index.chapters.len(),
            mode,
            next_index: mode.start_index(),
            flushed: 0,
            chapters: Vec::new(),
        }
    }

    /// 本次任务的目标终点（半开）。
    pub fn end_index(&self) -> usize {
        self.mode.end_index(self.total_chapters)
    }

    /// 已消费的章节数（含跳过的缺章）。
    pub fn progress(&self) -> usize {
        self.next_index.saturating_sub(self.mode.start_index())
    }

    /// 本次任务应消费的章节总数。
    pub fn target_len(&self) -> usize {
        self.end_index().saturating_sub(self.mode.start_index())
    }
}

/// 单次运行的终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 跑完了整个目标区间。
    Completed,
    /// 外部中断（Ctrl-C），状态已保留。
    Interrupted,
    /// 传输层错误导致中止，位置停在最后成功章节之后。
    AbortedOnError,
}

/// 抓取失败分两类：缺章（可跳过）与传输错误（致命）。
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("页面缺少可提取的内容: {0}")]
    ContentNotFound(String),
    #[error("网络请求失败: {0:#}")]
    Transport(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("章节范围无效: {lower}~{upper}（共 {total} 章，应为 1 起始的闭区间）")]
    InvalidRange {
        lower: usize,
        upper: usize,
        total: usize,
    },
}
