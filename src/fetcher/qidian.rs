//! 起点站点的薄 HTTP 胶水层。
//!
//! 只负责拉页面和最小限度的选择器抽取（`#bookName`、`.chapter-name`、
//! `.content-text`），不做更深的内容解析。

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::anyhow;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::base_system::context::Config;
use crate::download::models::{BookIndex, ChapterRef, ChapterText, FetchError};

use super::Fetcher;

// 编译一次复用的正则缓存
fn re_book_name() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"(?is)id=["']bookName["'][^>]*>(.*?)<"#).unwrap())
}

fn re_author() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"(?is)class=["']writer[^"']*["'][^>]*>(.*?)<"#).unwrap())
}

fn re_chapter_link() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r#"(?is)<a\b[^>]*class=["'][^"']*chapter-name[^"']*["'][^>]*>(.*?)</a>"#)
            .unwrap()
    })
}

fn re_href_attr() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"(?is)\bhref\s*=\s*["']([^"']+)["']"#).unwrap())
}

fn re_chapter_title() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"(?is)class=["'][^"']*\btitle\b[^"']*["'][^>]*>(.*?)<"#).unwrap())
}

fn re_content_block() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r#"(?is)<[a-z][a-z0-9]*\b[^>]*class=["'][^"']*content-text[^"']*["'][^>]*>(.*?)</[a-z][a-z0-9]*>"#)
            .unwrap()
    })
}

fn re_all_tags() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?is)<[^>]+>").unwrap())
}

pub struct QidianFetcher {
    client: Client,
    max_retries: u32,
}

impl QidianFetcher {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout.max(1)))
            .build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries.max(1),
        })
    }

    /// 拉取页面文本。404 视为缺页；其余失败按退避重试，
    /// 重试耗尽后作为传输错误上抛。
    fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let mut delay = Duration::from_millis(1100);
        let mut last_err = None;

        for attempt in 0..self.max_retries {
            match self.client.get(url).send() {
                Ok(resp) => {
                    if resp.status().as_u16() == 404 {
                        return Err(FetchError::ContentNotFound(format!("页面不存在: {url}")));
                    }
                    match resp.error_for_status().and_then(|r| r.text()) {
                        Ok(text) => return Ok(text),
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(e) => last_err = Some(e),
            }

            if attempt + 1 < self.max_retries {
                warn!(target: "fetcher", url, attempt = attempt + 1, "请求失败，稍后重试");
                std::thread::sleep(delay);
                delay = std::cmp::min(delay * 2, Duration::from_secs(8));
            }
        }

        Err(FetchError::Transport(match last_err {
            Some(e) => anyhow::Error::new(e).context(format!("请求失败: {url}")),
            None => anyhow!("请求失败: {url}"),
        }))
    }
}

impl Fetcher for QidianFetcher {
    fn fetch_index(&self, url: &str) -> Result<BookIndex, FetchError> {
        let html = self.get_text(url)?;
        let index = parse_index(&html, url)?;
        debug!(target: "fetcher", chapters = index.chapters.len(), "目录页解析完成");
        Ok(index)
    }

    fn fetch_chapter(&self, url: &str) -> Result<ChapterText, FetchError> {
        let html = self.get_text(url)?;
        parse_chapter(&html)
    }
}

// ── 页面抽取（纯函数，便于离线测试）──────────────────────────────

pub(crate) fn parse_index(html: &str, source_url: &str) -> Result<BookIndex, FetchError> {
    let title = re_book_name()
        .captures(html)
        .map(|c| clean_text(&c[1]))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| FetchError::ContentNotFound("目录页缺少书名".to_string()))?;

    let author = re_author()
        .captures(html)
        .map(|c| clean_text(&c[1]))
        .filter(|a| !a.is_empty());

    let mut chapters = Vec::new();
    for caps in re_chapter_link().captures_iter(html) {
        let tag = &caps[0];
        let Some(href) = re_href_attr().captures(tag).map(|c| c[1].to_string()) else {
            continue;
        };
        let name = clean_text(&caps[1]);
        chapters.push(ChapterRef {
            name,
            url: absolutize(&href, source_url),
        });
    }

    if chapters.is_empty() {
        return Err(FetchError::ContentNotFound(
            "目录页没有任何章节链接".to_string(),
        ));
    }

    Ok(BookIndex {
        source_url: source_url.to_string(),
        title,
        author,
        chapters,
    })
}

pub(crate) fn parse_chapter(html: &str) -> Result<ChapterText, FetchError> {
    let title = re_chapter_title()
        .captures(html)
        .map(|c| clean_text(&c[1]))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| FetchError::ContentNotFound("章节页缺少标题".to_string()))?;

    let blocks: Vec<String> = re_content_block()
        .captures_iter(html)
        .map(|c| clean_text(&c[1]))
        .filter(|b| !b.is_empty())
        .collect();

    if blocks.is_empty() {
        return Err(FetchError::ContentNotFound("章节页缺少正文段落".to_string()));
    }

    Ok(ChapterText {
        title,
        body: blocks.join("\n"),
    })
}

/// 去掉嵌套标签、解码常见实体并裁掉首尾空白。
fn clean_text(fragment: &str) -> String {
    let stripped = re_all_tags().replace_all(fragment, "");
    unescape_basic_entities(&stripped).trim().to_string()
}

fn unescape_basic_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// 目录里的章节链接常见 `//host/path` 或 `/path` 形式，统一成绝对地址。
fn absolutize(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if href.starts_with('/') {
        return format!("{}{}", origin_of(base_url), href);
    }
    format!("{}/{}", base_url.trim_end_matches('/'), href)
}

fn origin_of(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url;
    };
    match url[scheme_end + 3..].find('/') {
        Some(p) => &url[..scheme_end + 3 + p],
        None => url,
    }
}
