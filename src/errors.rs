use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("缺少必要的配置: {0}")]
    MissingConfig(&'static str),

    #[error("请求参数无效: {0}")]
    Validation(String),

    #[error("生成服务调用失败: {0}")]
    Service(String),

    /// 服务有返回，但内容不符合结果 schema；`raw` 保留原始文本用于排查
    #[error("生成结果解析失败: {reason}")]
    Decoding { reason: String, raw: String },

    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 序列化失败: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Service,
    Decoding,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Service => "service",
            ErrorKind::Decoding => "decoding",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AgentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    pub fn decoding(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Decoding {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Validation(_) => ErrorKind::Validation,
            AgentError::Service(_) => ErrorKind::Service,
            AgentError::Decoding { .. } => ErrorKind::Decoding,
            AgentError::MissingConfig(_)
            | AgentError::Io(_)
            | AgentError::SerdeJson(_)
            | AgentError::Other(_) => ErrorKind::Internal,
        }
    }

    pub fn raw_response(&self) -> Option<&str> {
        match self {
            AgentError::Decoding { raw, .. } => Some(raw.as_str()),
            _ => None,
        }
    }

    /// 面向最终用户的提示文案
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Validation(msg) => msg.clone(),
            _ => "An error occurred while generating the music. Please try again.".to_string(),
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(value: reqwest::Error) -> Self {
        Self::Service(value.to_string())
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
