//! 顺序抓取循环：限速、缺章跳过、错误中止与断点落盘。
//!
//! 任意时刻只有一个未完成的抓取请求；章节严格按目录顺序消费，
//! 不重排也不并发。

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rand::Rng;
use tracing::{error, info, warn};

use crate::base_system::context::Config;
use crate::fetcher::Fetcher;

use super::checkpoint::CheckpointStore;
use super::models::{BookIndex, DownloadState, FetchError, RunOutcome};

/// 运行上下文：把状态与检查点仓库绑进同一个作用域。
/// Drop 时落盘，任何退出路径（正常返回、提前中止、panic）都会留下
/// 一致可续传的检查点，取代进程级退出钩子。
struct RunContext<'a> {
    state: &'a mut DownloadState,
    store: &'a CheckpointStore,
}

impl RunContext<'_> {
    /// 每章落盘一次。失败只告警：下一次写入或 Drop 还会再试。
    fn flush(&self) {
        if let Err(e) = self.store.save(self.state) {
            warn!(target: "engine", error = %e, "写入检查点失败");
        }
    }
}

impl Drop for RunContext<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.save(self.state) {
            error!(target: "engine", error = %e, "退出时写入检查点失败，本次进度可能无法续传");
        }
    }
}

/// 从 `state.next_index` 顺序抓到目标终点，返回运行终态。
///
/// 缺章按配置跳过或中止；传输错误一律中止且不越过失败章节；
/// `cancel` 置位后在下一个间隙优雅收尾。
pub fn run(
    config: &Config,
    state: &mut DownloadState,
    index: &BookIndex,
    fetcher: &dyn Fetcher,
    store: &CheckpointStore,
    cancel: &AtomicBool,
) -> RunOutcome {
    let end = state.end_index();
    let ctx = RunContext { state, store };

    let start_time = Instant::now();
    info!(
        "开始下载：{} ({} 章，从第 {} 章继续)",
        ctx.state.title,
        end.saturating_sub(ctx.state.next_index),
        ctx.state.next_index + 1
    );

    let bar = make_bar(ctx.state.target_len() as u64, ctx.state.progress() as u64);

    let outcome = loop {
        if cancel.load(Ordering::Relaxed) {
            info!(target: "engine", "收到停止信号，保存进度后退出");
            break RunOutcome::Interrupted;
        }
        if ctx.state.next_index >= end {
            break RunOutcome::Completed;
        }

        let chapter = &index.chapters[ctx.state.next_index];
        match fetcher.fetch_chapter(&chapter.url) {
            Ok(text) => {
                ctx.state.chapters.push(text);
                ctx.state.next_index += 1;
            }
            Err(FetchError::ContentNotFound(msg)) => {
                if !config.advance_on_missing {
                    error!(
                        "无法获取章节内容: {} ({})，按配置中止，下次运行将重试该章",
                        chapter.name, msg
                    );
                    break RunOutcome::AbortedOnError;
                }
                // 永远拿不到正文的章节会卡死续传，跳过并照常推进位置
                warn!("无法获取章节内容，已跳过此章节: {} ({})", chapter.name, msg);
                ctx.state.next_index += 1;
            }
            Err(FetchError::Transport(e)) => {
                error!(
                    "抓取章节失败，中止本次下载: {} - {:#}",
                    chapter.name, e
                );
                break RunOutcome::AbortedOnError;
            }
        }

        bar.inc(1);
        ctx.flush();

        let done = ctx.state.progress();
        let remaining = ctx.state.target_len().saturating_sub(done);
        info!(target: "engine", done, remaining, "已处理 {} 章 剩 {} 章", done, remaining);

        if ctx.state.next_index < end && !throttle(config, cancel) {
            info!(target: "engine", "收到停止信号，保存进度后退出");
            break RunOutcome::Interrupted;
        }
    };

    bar.finish_and_clear();

    let elapsed = start_time.elapsed().as_secs_f32();
    match outcome {
        RunOutcome::Completed => {
            info!(
                "下载完毕：{} 共 {} 章，用时 {:.1}s",
                ctx.state.title,
                ctx.state.chapters.len(),
                elapsed
            );
        }
        RunOutcome::Interrupted | RunOutcome::AbortedOnError => {
            info!(
                "下载未完成：{} 进度 {}/{}，停在第 {} 章",
                ctx.state.title,
                ctx.state.progress(),
                ctx.state.target_len(),
                ctx.state.next_index + 1
            );
        }
    }

    outcome
}

fn make_bar(len: u64, pos: u64) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template("{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    bar.set_prefix("章节下载");
    bar.set_position(pos);
    bar
}

/// 章节之间的随机限速：`[min_wait_time, max_wait_time]` 毫秒加最多 1s 抖动。
/// 分片睡眠以便及时响应停止信号；返回 false 表示睡眠中被取消。
fn throttle(config: &Config, cancel: &AtomicBool) -> bool {
    let min = config.min_wait_time.min(config.max_wait_time);
    let max = config.max_wait_time.max(config.min_wait_time);
    if max == 0 {
        return !cancel.load(Ordering::Relaxed);
    }

    let mut rng = rand::thread_rng();
    let wait = rng.gen_range(min..=max) + rng.gen_range(0..1000);
    let deadline = Instant::now() + Duration::from_millis(wait);

    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        thread::sleep(left.min(Duration::from_millis(200)));
    }
}
