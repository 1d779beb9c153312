//! 设备层错误类型定义

use thiserror::Error;

/// 设备层统一错误类型
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 与驱动器通信失败
    #[error("Communication error: {0}")]
    Communication(#[from] CommunicationError),

    /// 操作超时
    #[error("Operation timeout ({timeout_ms} ms)")]
    Timeout { timeout_ms: u64 },

    /// 设备未使能
    #[error("Device not enabled")]
    NotEnabled,
}

impl DeviceError {
    /// 便捷构造：通信错误
    pub fn communication(kind: CommunicationErrorKind, message: impl Into<String>) -> Self {
        DeviceError::Communication(CommunicationError::new(kind, message))
    }

    /// 是否为超时
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeviceError::Timeout { .. })
    }

    /// 是否为不可恢复错误（设备已丢失）
    pub fn is_fatal(&self) -> bool {
        match self {
            DeviceError::Communication(e) => e.is_fatal(),
            DeviceError::Io(_) => true,
            _ => false,
        }
    }
}

/// 通信错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicationErrorKind {
    Unknown,
    NoDevice,
    NoResponse,
    AccessDenied,
    Busy,
    InvalidResponse,
    Fault,
}

/// 结构化通信错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CommunicationError {
    pub kind: CommunicationErrorKind,
    pub message: String,
}

impl CommunicationError {
    pub fn new(kind: CommunicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CommunicationErrorKind::NoDevice | CommunicationErrorKind::AccessDenied
        )
    }
}
