//! 全局配置结构（Config）与默认值。
//!
//! 同时提供生成 `config.yml` 的字段元信息和文件名清洗工具。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 限速配置
    #[serde(default = "default_min_wait_time")]
    pub min_wait_time: u64,
    #[serde(default = "default_max_wait_time")]
    pub max_wait_time: u64,

    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 保存配置
    #[serde(default)]
    pub save_path: String,

    // 缺章策略：true 表示跳过缺章并照常推进位置
    #[serde(default = "default_true")]
    pub advance_on_missing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_wait_time: default_min_wait_time(),
            max_wait_time: default_max_wait_time(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            save_path: String::new(),
            advance_on_missing: default_true(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 7] = [
            FieldMeta {
                name: "min_wait_time",
                description: "最小冷却时间, 单位ms（章节之间的请求间隔下限）",
            },
            FieldMeta {
                name: "max_wait_time",
                description: "最大冷却时间, 单位ms（章节之间的请求间隔上限）",
            },
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "max_retries",
                description: "单次请求的最大重试次数",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "save_path",
                description: "小说保存路径（留空表示当前目录）",
            },
            FieldMeta {
                name: "advance_on_missing",
                description: "章节缺失时是否跳过并继续（false 表示中止，下次运行重试该章）",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }
}

/// 清洗文件名：替换 Windows 禁用字符为全角等价物，截断超长名称。
pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            ':' => '：',
            '"' => '“',
            '<' => '《',
            '>' => '》',
            '/' | '\\' => '、',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            c if (c as u32) < 32 => replacement.chars().next().unwrap_or('_'),
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断
        let mut end = max_len;
        while end > 0 && !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    cleaned
}

fn default_min_wait_time() -> u64 {
    5000
}

fn default_max_wait_time() -> u64 {
    10000
}

fn default_request_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_characters_are_replaced() {
        assert_eq!(safe_fs_name("a/b:c?", "_", 120), "a、b：c？");
    }

    #[test]
    fn trailing_dots_and_spaces_are_trimmed() {
        assert_eq!(safe_fs_name("书名. ", "_", 120), "书名");
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let name = "很长的书名".repeat(40);
        let cleaned = safe_fs_name(&name, "_", 120);
        assert!(cleaned.len() <= 120);
        assert!(cleaned.is_char_boundary(cleaned.len()));
    }

    #[test]
    fn empty_name_falls_back() {
        assert_eq!(safe_fs_name("  ", "_", 120), "unnamed");
    }
}
