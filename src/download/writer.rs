//! 输出文件组装：按书名（与范围）生成文件名，把累计章节写成纯文本。
//!
//! 单章渲染为 `"{标题}\n{正文}\n"`，章节块之间再以换行相接，
//! 与老版脚本的输出格式保持一致。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::base_system::context::{Config, safe_fs_name};

use super::models::{DownloadMode, DownloadState, RunOutcome};

/// 把尚未落盘的章节写入输出文件，返回文件路径。
///
/// 全新任务（`flushed == 0`）覆盖写；续传任务追加写，只补
/// `chapters[flushed..]`，水位随写入推进并随检查点持久化。
/// 空章节列表写出空文件而不报错。
pub fn write(config: &Config, state: &mut DownloadState, outcome: RunOutcome) -> Result<PathBuf> {
    let dir = config.default_save_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("创建输出目录失败: {}", dir.display()))?;
    let path = dir.join(output_file_name(state));

    let fresh = state.flushed == 0;
    let chunk = render_chunk(state, fresh);

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(fresh)
        .append(!fresh)
        .open(&path)
        .with_context(|| format!("打开输出文件失败: {}", path.display()))?;
    file.write_all(chunk.as_bytes())
        .with_context(|| format!("写入输出文件失败: {}", path.display()))?;

    state.flushed = state.chapters.len();

    match outcome {
        RunOutcome::Completed => {
            info!("已保存到 {}", path.display());
        }
        RunOutcome::Interrupted | RunOutcome::AbortedOnError => {
            warn!(
                "本次下载未完成，已写出部分内容: {} (进度 {}/{})",
                path.display(),
                state.progress(),
                state.target_len()
            );
        }
    }

    Ok(path)
}

fn output_file_name(state: &DownloadState) -> String {
    let title = safe_fs_name(&state.title, "_", 120);
    match state.mode {
        DownloadMode::Full => format!("{title}.txt"),
        DownloadMode::Range { start, end } => format!("{title}-{start}-{end}.txt"),
    }
}

fn render_chunk(state: &DownloadState, fresh: bool) -> String {
    let pending = &state.chapters[state.flushed..];
    let mut out = String::new();
    for (i, ch) in pending.iter().enumerate() {
        // 首块不带前导分隔；追加块先补上块间换行
        if i > 0 || !fresh {
            out.push('\n');
        }
        out.push_str(&ch.title);
        out.push('\n');
        out.push_str(&ch.body);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::ChapterText;

    fn config_in(dir: &std::path::Path) -> Config {
        Config {
            save_path: dir.to_string_lossy().to_string(),
            ..Config::default()
        }
    }

    fn state_with(mode: DownloadMode, chapters: Vec<(&str, &str)>) -> DownloadState {
        let next = mode.start_index() + chapters.len();
        DownloadState {
            source_url: "https://example.com/book/1".to_string(),
            title: "测试书".to_string(),
            author: None,
            total_chapters: 5,
            mode,
            next_index: next,
            flushed: 0,
            chapters: chapters
                .into_iter()
                .map(|(t, b)| ChapterText {
                    title: t.to_string(),
                    body: b.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn completed_full_run_joins_chapters_with_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with(
            DownloadMode::Full,
            vec![("C0", "b0"), ("C1", "b1"), ("C2", "b2")],
        );
        state.total_chapters = 3;

        let path = write(&config_in(dir.path()), &mut state, RunOutcome::Completed).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "C0\nb0\n\nC1\nb1\n\nC2\nb2\n");
        assert_eq!(path.file_name().unwrap(), "测试书.txt");
        assert_eq!(state.flushed, 3);
    }

    #[test]
    fn range_file_name_encodes_normalized_bounds() {
        let dir = tempfile::tempdir().unwrap();
        // 操作者输入 2~3 章 → 归一化 [1, 3)
        let mut state = state_with(
            DownloadMode::Range { start: 1, end: 3 },
            vec![("C1", "b1"), ("C2", "b2")],
        );

        let path = write(&config_in(dir.path()), &mut state, RunOutcome::Completed).unwrap();
        assert_eq!(path.file_name().unwrap(), "测试书-1-3.txt");
    }

    #[test]
    fn resume_appends_only_unflushed_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        // 第一次运行：中止于第 2 章之后
        let mut state = state_with(DownloadMode::Full, vec![("C0", "b0"), ("C1", "b1")]);
        let path = write(&config, &mut state, RunOutcome::AbortedOnError).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "C0\nb0\n\nC1\nb1\n");

        // 续传后补齐剩余章节，只追加未落盘部分
        state.chapters.push(ChapterText {
            title: "C2".to_string(),
            body: "b2".to_string(),
        });
        state.next_index = 3;
        write(&config, &mut state, RunOutcome::Completed).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "C0\nb0\n\nC1\nb1\n\nC2\nb2\n");
        assert_eq!(state.flushed, 3);
    }

    #[test]
    fn fresh_run_overwrites_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let mut old = state_with(DownloadMode::Full, vec![("旧章", "旧正文")]);
        let path = write(&config, &mut old, RunOutcome::Completed).unwrap();

        let mut fresh = state_with(DownloadMode::Full, vec![("C0", "b0")]);
        write(&config, &mut fresh, RunOutcome::Completed).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "C0\nb0\n");
    }

    #[test]
    fn empty_chapter_list_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with(DownloadMode::Full, vec![]);

        let path = write(&config_in(dir.path()), &mut state, RunOutcome::Completed).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
