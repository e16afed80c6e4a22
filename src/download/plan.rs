//! 下载计划：把操作者输入的模式与范围归一化，并与历史检查点对账。

use tracing::{debug, info};

use super::models::{BookIndex, DownloadMode, DownloadState, PlanError};

/// 操作者请求的下载模式。范围为 1 起始的闭区间，顺序可颠倒。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeRequest {
    Full,
    Range { lower: usize, upper: usize },
}

impl ModeRequest {
    /// 构造范围请求，上下界颠倒时自动交换。
    pub fn range(lower: usize, upper: usize) -> Self {
        if lower > upper {
            ModeRequest::Range {
                lower: upper,
                upper: lower,
            }
        } else {
            ModeRequest::Range { lower, upper }
        }
    }

    /// 不依赖目录即可做的校验：下界必须从 1 起。
    /// 在任何网络请求之前调用，把用法错误挡在最前面。
    pub fn validate_bounds(&self) -> Result<(), PlanError> {
        if let ModeRequest::Range { lower, upper } = self
            && *lower == 0
        {
            return Err(PlanError::InvalidRange {
                lower: *lower,
                upper: *upper,
                total: 0,
            });
        }
        Ok(())
    }

    /// 按目录章节总数归一化为内部模式（0 起始半开区间）。
    fn normalize(&self, total: usize) -> Result<DownloadMode, PlanError> {
        match *self {
            ModeRequest::Full => Ok(DownloadMode::Full),
            ModeRequest::Range { lower, upper } => {
                if lower == 0 || upper > total {
                    return Err(PlanError::InvalidRange {
                        lower,
                        upper,
                        total,
                    });
                }
                Ok(DownloadMode::Range {
                    start: lower - 1,
                    end: upper,
                })
            }
        }
    }
}

/// 计算本次运行的起始状态。
///
/// 仅当恢复状态的 `source_url` 与归一化后的模式都与本次请求完全一致时才续传，
/// 否则生成全新状态。相同输入永远得到相同的目标区间与起点。
pub fn plan(
    request: ModeRequest,
    index: &BookIndex,
    restored: Option<DownloadState>,
) -> Result<DownloadState, PlanError> {
    let mode = request.normalize(index.chapters.len())?;

    if let Some(prev) = restored {
        // 最后两项校验状态自身的不变量：磁盘上被改坏的检查点可能
        // 反序列化成功但携带非法水位或越界起点
        let compatible = prev.source_url == index.source_url
            && prev.mode == mode
            && prev.total_chapters == index.chapters.len()
            && prev.next_index <= prev.end_index()
            && prev.next_index >= prev.mode.start_index()
            && prev.flushed <= prev.chapters.len();
        if compatible {
            info!(
                target: "plan",
                next_index = prev.next_index,
                done = prev.chapters.len(),
                "检测到可用的下载状态，从断点继续"
            );
            return Ok(prev);
        }
        debug!(target: "plan", "历史状态与本次请求不匹配，重新开始");
    }

    Ok(DownloadState::fresh(index, mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::{ChapterRef, ChapterText};

    fn index_with(total: usize) -> BookIndex {
        BookIndex {
            source_url: "https://example.com/book/7".to_string(),
            title: "书名".to_string(),
            author: None,
            chapters: (0..total)
                .map(|i| ChapterRef {
                    name: format!("第{}章", i + 1),
                    url: format!("https://example.com/chapter/{i}"),
                })
                .collect(),
        }
    }

    #[test]
    fn full_mode_targets_every_chapter() {
        let index = index_with(3);
        let state = plan(ModeRequest::Full, &index, None).unwrap();
        assert_eq!(state.mode, DownloadMode::Full);
        assert_eq!(state.next_index, 0);
        assert_eq!(state.end_index(), 3);
        assert!(state.chapters.is_empty());
    }

    #[test]
    fn range_is_normalized_to_half_open() {
        let index = index_with(5);
        let state = plan(ModeRequest::range(2, 3), &index, None).unwrap();
        assert_eq!(state.mode, DownloadMode::Range { start: 1, end: 3 });
        assert_eq!(state.next_index, 1);
        assert_eq!(state.target_len(), 2);
    }

    #[test]
    fn swapped_bounds_yield_identical_range() {
        let index = index_with(10);
        let a = plan(ModeRequest::range(2, 5), &index, None).unwrap();
        let b = plan(ModeRequest::range(5, 2), &index, None).unwrap();
        assert_eq!(a.mode, b.mode);
        assert_eq!(a.next_index, b.next_index);
    }

    #[test]
    fn zero_lower_bound_is_rejected_before_any_network() {
        let request = ModeRequest::range(0, 2);
        assert!(request.validate_bounds().is_err());
    }

    #[test]
    fn upper_bound_past_index_is_rejected() {
        let index = index_with(3);
        let err = plan(ModeRequest::range(2, 4), &index, None).unwrap_err();
        assert!(matches!(err, PlanError::InvalidRange { upper: 4, total: 3, .. }));
    }

    #[test]
    fn matching_checkpoint_resumes_at_saved_position() {
        let index = index_with(5);
        let mut prev = DownloadState::fresh(&index, DownloadMode::Full);
        prev.next_index = 2;
        prev.chapters = vec![
            ChapterText {
                title: "一".to_string(),
                body: "a".to_string(),
            },
            ChapterText {
                title: "二".to_string(),
                body: "b".to_string(),
            },
        ];

        let state = plan(ModeRequest::Full, &index, Some(prev)).unwrap();
        assert_eq!(state.next_index, 2);
        assert_eq!(state.chapters.len(), 2);
    }

    #[test]
    fn mismatched_url_never_reuses_accumulation() {
        let index = index_with(5);
        let mut prev = DownloadState::fresh(&index, DownloadMode::Full);
        prev.source_url = "https://example.com/book/other".to_string();
        prev.next_index = 3;
        prev.chapters.push(ChapterText {
            title: "旧".to_string(),
            body: "stale".to_string(),
        });

        let state = plan(ModeRequest::Full, &index, Some(prev)).unwrap();
        assert_eq!(state.next_index, 0);
        assert!(state.chapters.is_empty());
    }

    #[test]
    fn flushed_watermark_past_accumulation_discards_checkpoint() {
        let index = index_with(5);
        let mut prev = DownloadState::fresh(&index, DownloadMode::Full);
        prev.next_index = 1;
        prev.chapters.push(ChapterText {
            title: "一".to_string(),
            body: "a".to_string(),
        });
        // 手改/损坏的检查点：水位超过已累积章节数
        prev.flushed = 10;

        let state = plan(ModeRequest::Full, &index, Some(prev)).unwrap();
        assert_eq!(state.flushed, 0);
        assert!(state.chapters.is_empty());
        assert_eq!(state.next_index, 0);
    }

    #[test]
    fn next_index_below_range_start_discards_checkpoint() {
        let index = index_with(10);
        let mut prev = DownloadState::fresh(&index, DownloadMode::Range { start: 3, end: 7 });
        prev.next_index = 1;

        let state = plan(ModeRequest::range(4, 7), &index, Some(prev)).unwrap();
        assert_eq!(state.next_index, 3);
        assert!(state.chapters.is_empty());
    }

    #[test]
    fn mode_change_discards_checkpoint() {
        let index = index_with(5);
        let mut prev = DownloadState::fresh(&index, DownloadMode::Full);
        prev.next_index = 4;

        let state = plan(ModeRequest::range(1, 5), &index, Some(prev)).unwrap();
        assert_eq!(state.mode, DownloadMode::Range { start: 0, end: 5 });
        assert_eq!(state.next_index, 0);
    }
}
