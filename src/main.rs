//! Qidian Novel Downloader（起点小说下载器）。
//!
//! 从目录页顺序抓取章节正文并保存为纯文本，带限速、断点续传与
//! 范围下载。代码结构（读代码入口）：
//! - `base_system`：配置/日志等基础设施
//! - `download`：计划、抓取循环、检查点、输出落盘
//! - `fetcher`：目录页/章节页的薄 HTTP 胶水层

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info};

mod base_system;
mod download;
mod fetcher;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{self, LogOptions, LogSystem};
use download::checkpoint::CheckpointStore;
use download::models::RunOutcome;
use download::plan::{self, ModeRequest};
use download::{engine, writer};
use fetcher::{Fetcher, QidianFetcher};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "qidian-novel-downloader")]
#[command(about = "Qidian Novel Downloader (Rust CLI)")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,

    /// 数据目录路径（用于存放 config.yml、检查点和 logs）
    #[arg(long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 下载目录页中的全部章节
    Full {
        /// 小说目录页地址
        url: String,
    },
    /// 下载指定章节范围（1 起始，闭区间，上下界可颠倒）
    Range {
        /// 小说目录页地址
        url: String,
        /// 起始章节（含）
        lower: usize,
        /// 结束章节（含）
        upper: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Qidian Novel Downloader v{}", VERSION);
        return Ok(());
    }

    let Some(command) = cli.command else {
        bail!("未指定下载模式，使用 `full <url>` 或 `range <url> <起> <止>`");
    };

    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let _log = LogSystem::init(
        LogOptions {
            debug: cli.debug,
            use_color: true,
        },
        data_dir,
    )?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let config: Config = load_or_create(data_dir)?;
    run_download(command, &config, data_dir)
}

fn run_download(command: Command, config: &Config, data_dir: Option<&Path>) -> Result<()> {
    let (url, request) = match command {
        Command::Full { url } => (url, ModeRequest::Full),
        Command::Range { url, lower, upper } => (url, ModeRequest::range(lower, upper)),
    };

    // 用法错误在任何网络与磁盘操作之前拦下
    request.validate_bounds()?;

    // 检查点先于任何网络请求读取
    let store = CheckpointStore::new(data_dir.unwrap_or_else(|| Path::new(".")));
    let restored = store.load(&url);

    let fetcher = QidianFetcher::new(config).context("初始化 HTTP 客户端失败")?;
    let index = fetcher
        .fetch_index(&url)
        .with_context(|| format!("获取目录失败: {url}"))?;

    info!(
        "书名: {} | 作者: {} | 共 {} 章",
        index.title,
        index.author.as_deref().unwrap_or("未知"),
        index.chapters.len()
    );
    let mut state = plan::plan(request, &index, restored)?;

    let cancel = logging::cancel_flag();
    let outcome = engine::run(config, &mut state, &index, &fetcher, &store, &cancel);

    let written = writer::write(config, &mut state, outcome);

    // 只有写出成功的完整运行才清除检查点；其余情况保留并刷新水位
    if written.is_ok() && outcome == RunOutcome::Completed {
        if let Err(e) = store.clear() {
            error!("清除检查点失败: {e}");
        }
    } else if let Err(e) = store.save(&state) {
        error!("保存检查点失败，断点可能失效: {e}");
    }

    written.context("写出小说文件失败")?;

    match outcome {
        RunOutcome::Completed | RunOutcome::Interrupted => Ok(()),
        RunOutcome::AbortedOnError => bail!(
            "下载因错误中止，停在第 {} 章；重新运行同一命令可从断点续传",
            state.next_index + 1
        ),
    }
}
