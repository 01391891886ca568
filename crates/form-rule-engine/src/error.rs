//! 规则引擎错误类型
//!
//! 这些错误只在操作符内部和规则解析阶段出现，评估入口会把它们转换为
//! `valid: false` 并交给诊断接口，不会向调用方传播。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("未知的操作符: {0}")]
    UnknownOperator(String),

    #[error("自定义函数操作符 '{0}' 不支持在通用引擎中执行")]
    UnsupportedCustomFunction(String),

    #[error("缺少操作数: {operator} 需要 {slot}")]
    MissingOperand {
        operator: String,
        slot: &'static str,
    },

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("无效的正则表达式 '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl RuleError {
    pub(crate) fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
