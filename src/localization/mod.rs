use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "zh-Hans")]
    ChineseSimplified,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::ChineseSimplified => "zh-Hans",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "zh-hans" | "zh" | "zh_hans" | "chinese" => Ok(Self::ChineseSimplified),
            other => Err(format!(
                "Unsupported language `{other}`; expected `en` or `zh-Hans`"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    PathCopied,
    FileNameCopied,
    TerminalOpened,
    Error,
    PermissionDenied,
    HostNotRunning,
    ScriptFailed,
    EmptySelection,
    QueryTimedOut,
    UnexpectedResult,
    ClipboardFailed,
    TerminalFailed,
}

/// Looks up user-facing strings for one language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Localizer {
    language: Language,
}

impl Localizer {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn text(&self, key: MessageKey) -> &'static str {
        match self.language {
            Language::English => english(key),
            Language::ChineseSimplified => chinese_simplified(key),
        }
    }
}

fn english(key: MessageKey) -> &'static str {
    match key {
        MessageKey::PathCopied => "Path copied",
        MessageKey::FileNameCopied => "File name copied",
        MessageKey::TerminalOpened => "Terminal opened",
        MessageKey::Error => "Error",
        MessageKey::PermissionDenied => {
            "Apple Events permission is required. Allow pathbar to control Finder in System Settings > Privacy & Security > Automation."
        }
        MessageKey::HostNotRunning => "Finder is not running. Make sure Finder is open.",
        MessageKey::ScriptFailed => "The Finder query failed to run.",
        MessageKey::EmptySelection => {
            "Could not get a path. Select a file or folder in Finder and try again."
        }
        MessageKey::QueryTimedOut => "Finder did not answer in time. Try again.",
        MessageKey::UnexpectedResult => "Finder returned something that is not a file path.",
        MessageKey::ClipboardFailed => "Could not write to the clipboard.",
        MessageKey::TerminalFailed => "Could not open Terminal.",
    }
}

fn chinese_simplified(key: MessageKey) -> &'static str {
    match key {
        MessageKey::PathCopied => "路径已复制",
        MessageKey::FileNameCopied => "文件名已复制",
        MessageKey::TerminalOpened => "终端已打开",
        MessageKey::Error => "错误",
        MessageKey::PermissionDenied => {
            "需要 Apple Events 权限。请在系统设置 > 隐私与安全性 > 自动化中允许 pathbar 控制 Finder。"
        }
        MessageKey::HostNotRunning => "Finder 未运行。请确保 Finder 处于运行状态。",
        MessageKey::ScriptFailed => "AppleScript 执行失败。",
        MessageKey::EmptySelection => "无法获取选中路径，请确保在 Finder 中选中了文件或文件夹。",
        MessageKey::QueryTimedOut => "Finder 响应超时，请重试。",
        MessageKey::UnexpectedResult => "Finder 返回的结果不是有效路径。",
        MessageKey::ClipboardFailed => "无法写入剪贴板。",
        MessageKey::TerminalFailed => "无法打开终端。",
    }
}
