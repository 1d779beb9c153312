//! # Scope Protocol
//!
//! 单轴伺服监控的数据定义（无硬件依赖、无线程）
//!
//! ## 模块
//!
//! - `registers`: 寄存器描述与常用寄存器常量
//! - `mode`: 运行模式与单位定义
//! - `sample`: 采样点与遥测通道
//! - `state`: 轴状态机的状态枚举
//!
//! ## 单位约定
//!
//! - 位置：度（deg），由 `PositionUnits::Degrees` 选择
//! - 速度：转/秒（rps），由 `VelocityUnits::RevolutionsPerSecond` 选择
//! - 采样时间：相对采集开始的秒数（`f64`）

pub mod mode;
pub mod registers;
pub mod sample;
pub mod state;

// 重新导出常用类型
pub use mode::*;
pub use registers::*;
pub use sample::*;
pub use state::*;

use thiserror::Error;

/// 协议层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 无效的运行模式编码
    #[error("Invalid operation mode code: {code}")]
    InvalidOperationMode { code: i8 },

    /// 无效的位置单位编码
    #[error("Invalid position units code: {code}")]
    InvalidPositionUnits { code: u8 },

    /// 无效的速度单位编码
    #[error("Invalid velocity units code: {code}")]
    InvalidVelocityUnits { code: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidOperationMode { code: 42 };
        assert_eq!(err.to_string(), "Invalid operation mode code: 42");

        let err = ProtocolError::InvalidVelocityUnits { code: 9 };
        assert!(err.to_string().contains("velocity units"));
    }
}
