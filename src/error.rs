//! 全局错误类型定义

use std::fmt;
use std::io::Error as IoError;
use std::path::PathBuf;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// 流水线阶段（用于失败时报告具体阶段）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Merge,
    Normalize,
    Sort,
    Extract,
    Convert,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Merge => "merge",
            Stage::Normalize => "normalize",
            Stage::Sort => "sort",
            Stage::Extract => "extract",
            Stage::Convert => "convert",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RsadrulesError {
    // 规则源相关错误
    #[error("规则源 [{name}] 不可用：{reason}")]
    SourceUnavailable { name: String, reason: String },
    #[error("所有远程规则源拉取失败（共 {0} 个）")]
    AllSourcesFailed(usize),
    #[error("自定义规则文件不存在：{}", .0.display())]
    MissingCustomRules(PathBuf),

    // 外部协作程序错误（排序器 / 规则集转换器）
    #[error("{collaborator} 执行失败：{detail}")]
    CollaboratorFailure { collaborator: String, detail: String },

    // 阶段包装错误
    #[error("阶段 [{stage}] 失败：{source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<RsadrulesError>,
    },

    // 配置错误
    #[error("配置无效：{0}")]
    ConfigError(String),

    // 网络相关错误
    #[error("网络请求失败：{0}")]
    HttpError(#[from] reqwest::Error),

    // 序列化/反序列化错误
    #[error("JSON解析失败：{0}")]
    JsonError(#[from] SerdeJsonError),
    #[error("MessagePack序列化失败：{0}")]
    MsgPackError(String),

    // 基础错误
    #[error("IO操作失败：{0}")]
    IoError(#[from] IoError),
    #[error("URL解析失败：{0}")]
    UrlError(#[from] UrlParseError),
    #[error("无效输入：{0}")]
    InvalidInput(String),
}

impl RsadrulesError {
    /// 标注失败阶段（已标注的错误保持原阶段）
    pub fn at(self, stage: Stage) -> Self {
        match self {
            already @ RsadrulesError::StageFailed { .. } => already,
            other => RsadrulesError::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// 失败阶段（未标注时为 None）
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RsadrulesError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

// 全局Result类型
pub type RsadResult<T> = Result<T, RsadrulesError>;
