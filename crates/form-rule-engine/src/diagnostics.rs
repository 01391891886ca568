//! 评估诊断
//!
//! 引擎不直接写日志，而是把跳过的规则、失败的操作和每次操作的求值结果交给
//! `Diagnostics`。默认实现输出 tracing 事件；测试和规则编辑器可以注入自己的实现。

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::RuleError;
use crate::operators::OperatorRef;

/// 诊断接口
#[cfg_attr(test, mockall::automock)]
pub trait Diagnostics: Send + Sync {
    /// 规则被跳过（不完整或无法解析）
    fn rule_skipped(&self, rule_index: usize, reason: &str);

    /// 一次操作完成求值
    fn operation_evaluated(
        &self,
        rule_index: usize,
        operation_index: usize,
        operator: &OperatorRef,
        valid: bool,
    );

    /// 操作执行失败，结果按 `valid: false` 处理
    fn operation_failed(
        &self,
        rule_index: usize,
        operation_index: usize,
        operator: &OperatorRef,
        error: &RuleError,
    );
}

/// 输出 tracing 事件的默认实现
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn rule_skipped(&self, rule_index: usize, reason: &str) {
        warn!(rule_index, reason, "Skipping: rule incomplete");
    }

    fn operation_evaluated(
        &self,
        rule_index: usize,
        operation_index: usize,
        operator: &OperatorRef,
        valid: bool,
    ) {
        debug!(rule_index, operation_index, %operator, valid, "operation evaluated");
    }

    fn operation_failed(
        &self,
        rule_index: usize,
        operation_index: usize,
        operator: &OperatorRef,
        error: &RuleError,
    ) {
        match error {
            RuleError::UnknownOperator(_) | RuleError::UnsupportedCustomFunction(_) => {
                error!(rule_index, operation_index, %operator, error = %error, "operation rejected");
            }
            _ => {
                debug!(rule_index, operation_index, %operator, error = %error, "operation failed");
            }
        }
    }
}

/// 记录下来的诊断事件
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    RuleSkipped {
        rule_index: usize,
        reason: String,
    },
    OperationEvaluated {
        rule_index: usize,
        operation_index: usize,
        operator: String,
        valid: bool,
    },
    OperationFailed {
        rule_index: usize,
        operation_index: usize,
        operator: String,
        error: String,
    },
}

/// 把诊断事件收集到内存中，供规则编辑器展示
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出当前全部事件
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    /// 被求值过的操作 (rule_index, operation_index)
    pub fn evaluated_operations(&self) -> Vec<(usize, usize)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DiagnosticEvent::OperationEvaluated {
                    rule_index,
                    operation_index,
                    ..
                } => Some((*rule_index, *operation_index)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn rule_skipped(&self, rule_index: usize, reason: &str) {
        self.events.lock().push(DiagnosticEvent::RuleSkipped {
            rule_index,
            reason: reason.to_string(),
        });
    }

    fn operation_evaluated(
        &self,
        rule_index: usize,
        operation_index: usize,
        operator: &OperatorRef,
        valid: bool,
    ) {
        self.events.lock().push(DiagnosticEvent::OperationEvaluated {
            rule_index,
            operation_index,
            operator: operator.to_string(),
            valid,
        });
    }

    fn operation_failed(
        &self,
        rule_index: usize,
        operation_index: usize,
        operator: &OperatorRef,
        error: &RuleError,
    ) {
        self.events.lock().push(DiagnosticEvent::OperationFailed {
            rule_index,
            operation_index,
            operator: operator.to_string(),
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::OperatorId;

    #[test]
    fn test_recording_diagnostics() {
        let diagnostics = RecordingDiagnostics::new();
        let op = OperatorRef::Known(OperatorId::Equal);

        diagnostics.rule_skipped(0, "missing actions");
        diagnostics.operation_evaluated(1, 0, &op, true);
        diagnostics.operation_failed(1, 1, &op, &RuleError::UnknownOperator("x".to_string()));

        assert_eq!(diagnostics.events().len(), 3);
        assert_eq!(diagnostics.evaluated_operations(), vec![(1, 0)]);

        diagnostics.clear();
        assert!(diagnostics.events().is_empty());
    }
}
