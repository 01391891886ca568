//! 规则校验器
//!
//! 供规则编辑器在保存前检查规则结构，评估流程本身不依赖它：
//! 评估时有问题的规则只会被跳过。

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::models::{Operand, Rule, When};
use crate::operators::{OperatorId, OperatorRef};

/// 校验发现的问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleIssue {
    pub rule_index: usize,
    /// 出问题的位置，如 `rules[0].operations[1]`
    pub path: String,
    pub message: String,
}

impl RuleIssue {
    fn new(rule_index: usize, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_index,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// 规则校验器
pub struct RuleValidator;

impl RuleValidator {
    /// 校验 JSON 形式的规则列表
    pub fn validate(rules: &Value) -> Vec<RuleIssue> {
        let Some(entries) = rules.as_array() else {
            return vec![RuleIssue::new(0, "rules", "rules 必须是数组")];
        };

        let mut issues = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match serde_json::from_value::<Rule>(entry.clone()) {
                Ok(rule) => Self::validate_rule(index, &rule, &mut issues),
                Err(e) => issues.push(RuleIssue::new(
                    index,
                    format!("rules[{}]", index),
                    format!("规则无法解析: {}", e),
                )),
            }
        }
        issues
    }

    /// 校验单条规则
    pub fn validate_rule(index: usize, rule: &Rule, issues: &mut Vec<RuleIssue>) {
        let path = format!("rules[{}]", index);

        if rule.operations.is_empty() {
            issues.push(RuleIssue::new(index, &path, "operations 不能为空"));
        }
        if rule.actions.is_empty() {
            issues.push(RuleIssue::new(index, &path, "actions 不能为空"));
        }

        for (i, operation) in rule.operations.iter().enumerate() {
            let op_path = format!("{}.operations[{}]", path, i);
            let id = match &operation.operator {
                OperatorRef::Known(id) => *id,
                OperatorRef::Unknown(name) => {
                    issues.push(RuleIssue::new(index, op_path, format!("未知的操作符: {}", name)));
                    continue;
                }
            };

            if id == OperatorId::Fn {
                issues.push(RuleIssue::new(index, &op_path, "自定义函数操作符不能在表单规则中使用"));
            }

            if id.requires_value_b() && operation.value_b == Operand::Missing {
                issues.push(RuleIssue::new(index, &op_path, format!("{} 操作符需要 valueB", id)));
            }

            if id.is_bound() && operation.value_a == Operand::Missing {
                issues.push(RuleIssue::new(
                    index,
                    &op_path,
                    format!("{} 操作符需要在 valueA 中给出边界", id),
                ));
            }

            // 预验证正则表达式
            if matches!(id, OperatorId::Match | OperatorId::NotMatch) {
                if let Operand::Literal(Value::String(pattern)) = &operation.value_b {
                    if let Err(e) = regex::Regex::new(pattern) {
                        issues.push(RuleIssue::new(
                            index,
                            &op_path,
                            format!("正则表达式无效: {}", e),
                        ));
                    }
                }
            }
        }

        for (i, action) in rule.actions.iter().enumerate() {
            let action_path = format!("{}.actions[{}]", path, i);
            if action.fields.is_empty() {
                issues.push(RuleIssue::new(index, &action_path, "fields 不能为空"));
            }
            if let Some(When::Other(when)) = &action.when {
                issues.push(RuleIssue::new(
                    index,
                    &action_path,
                    format!("when 只能是 \"true\" 或 \"false\"，实际为 {}", when),
                ));
            }
        }
    }

    /// 提取规则中引用的所有字段路径，调用方据此判断哪些字段变化需要重新评估
    pub fn referenced_fields(rules: &[Rule]) -> BTreeSet<String> {
        rules
            .iter()
            .flat_map(|rule| &rule.operations)
            .flat_map(|op| [&op.value_a, &op.value_b])
            .filter_map(|operand| match operand {
                Operand::Template(t) => Some(t.path.clone()),
                _ => None,
            })
            .collect()
    }
}
