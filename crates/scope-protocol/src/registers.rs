//! 寄存器定义
//!
//! 驱动器对象字典中的寄存器描述（索引、子索引、数据类型、访问权限、物理量）。
//! 这里只描述寄存器本身，具体读写由 `scope-device` 的 `Device` 实现完成。

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// 寄存器数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DataType {
    U8 = 0,
    S8 = 1,
    U16 = 2,
    S16 = 3,
    U32 = 4,
    S32 = 5,
    U64 = 6,
    S64 = 7,
    Float = 8,
}

impl DataType {
    /// 数据宽度（字节）
    pub fn size(self) -> usize {
        match self {
            DataType::U8 | DataType::S8 => 1,
            DataType::U16 | DataType::S16 => 2,
            DataType::U32 | DataType::S32 | DataType::Float => 4,
            DataType::U64 | DataType::S64 => 8,
        }
    }

    /// 是否为有符号类型
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::S8 | DataType::S16 | DataType::S32 | DataType::S64 | DataType::Float
        )
    }
}

/// 寄存器访问权限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Access {
    ReadWrite = 0,
    ReadOnly = 1,
    WriteOnly = 2,
}

/// 寄存器对应的物理量
///
/// 决定读数在单位换算时使用哪一组单位（位置单位 / 速度单位）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Physical {
    /// 无物理量（原始值）
    None = 0,
    Torque = 1,
    Position = 2,
    Velocity = 3,
    Acceleration = 4,
}

/// 寄存器描述
///
/// # 示例
///
/// ```rust
/// use scope_protocol::{POS_ACTUAL, Physical};
///
/// assert_eq!(POS_ACTUAL.index, 0x6064);
/// assert_eq!(POS_ACTUAL.phy, Physical::Position);
/// assert_eq!(POS_ACTUAL.to_string(), "0x6064:00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Register {
    /// 对象索引
    pub index: u16,
    /// 子索引
    pub subindex: u8,
    /// 数据类型
    pub dtype: DataType,
    /// 访问权限
    pub access: Access,
    /// 物理量
    pub phy: Physical,
}

impl Register {
    /// 创建寄存器描述
    pub const fn new(
        index: u16,
        subindex: u8,
        dtype: DataType,
        access: Access,
        phy: Physical,
    ) -> Self {
        Self {
            index,
            subindex,
            dtype,
            access,
            phy,
        }
    }

    /// 是否可读
    pub fn is_readable(&self) -> bool {
        self.access != Access::WriteOnly
    }

    /// 是否可写
    pub fn is_writable(&self) -> bool {
        self.access != Access::ReadOnly
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}:{:02X}", self.index, self.subindex)
    }
}

/// 实际位置（0x6064:00）
pub const POS_ACTUAL: Register =
    Register::new(0x6064, 0x00, DataType::S32, Access::ReadWrite, Physical::Position);

/// 实际速度（0x606C:00）
pub const VEL_ACTUAL: Register =
    Register::new(0x606C, 0x00, DataType::S32, Access::ReadWrite, Physical::Velocity);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_constants() {
        assert_eq!(POS_ACTUAL.index, 0x6064);
        assert_eq!(POS_ACTUAL.subindex, 0x00);
        assert_eq!(POS_ACTUAL.dtype, DataType::S32);
        assert_eq!(VEL_ACTUAL.index, 0x606C);
        assert_eq!(VEL_ACTUAL.phy, Physical::Velocity);
    }

    #[test]
    fn test_register_display() {
        assert_eq!(VEL_ACTUAL.to_string(), "0x606C:00");
        let reg = Register::new(0x2001, 0x1A, DataType::U8, Access::ReadOnly, Physical::None);
        assert_eq!(reg.to_string(), "0x2001:1A");
    }

    #[test]
    fn test_register_access() {
        let ro = Register::new(0x1000, 0, DataType::U32, Access::ReadOnly, Physical::None);
        assert!(ro.is_readable());
        assert!(!ro.is_writable());

        let wo = Register::new(0x1001, 0, DataType::U32, Access::WriteOnly, Physical::None);
        assert!(!wo.is_readable());
        assert!(wo.is_writable());

        assert!(POS_ACTUAL.is_readable() && POS_ACTUAL.is_writable());
    }

    #[test]
    fn test_dtype_size() {
        assert_eq!(DataType::S32.size(), 4);
        assert_eq!(DataType::U64.size(), 8);
        assert!(DataType::S16.is_signed());
        assert!(!DataType::U16.is_signed());
        assert!(matches!(DataType::try_from(5u8), Ok(DataType::S32)));
        assert!(DataType::try_from(200u8).is_err());
    }
}
