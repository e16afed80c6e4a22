//! 抓取协作方接口：目录页与单章页各一个操作。
//!
//! 下载引擎只依赖这个 trait，具体的 HTTP/解析实现在 `qidian` 模块。

pub mod qidian;

pub use qidian::QidianFetcher;

use crate::download::models::{BookIndex, ChapterText, FetchError};

pub trait Fetcher {
    /// 抓取目录页：书名、作者与有序章节列表。
    fn fetch_index(&self, url: &str) -> Result<BookIndex, FetchError>;

    /// 抓取单章：标题与正文。正文缺失返回 `ContentNotFound`。
    fn fetch_chapter(&self, url: &str) -> Result<ChapterText, FetchError>;
}
