//! 规则执行器
//!
//! 两个入口：
//! - `run_form_rules`：复合规则（多操作 + join + 动作列表），输出按字段聚合的动作
//! - `run_element_rules`：schema 元素上的单操作规则，输出元素自身的状态标志/属性
//!
//! 单条规则有问题时只跳过这一条，绝不中断整个 schema 的评估。

use mintflow_shared::config::EngineConfig;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;

use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::models::{
    ELEMENT_FLAGS, ElementRule, EvaluationContext, FieldAction, Operand, Operation, ResultByPath,
    Rule, SET_PROPERTY, When, merge_context,
};
use crate::operators::{Join, OperatorRef};
use crate::patterns::PatternCache;
use crate::resolver::TemplateResolver;

/// 单条规则的评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub rule_index: usize,
    pub valid: bool,
    /// 实际被求值的操作数量（短路后可能少于声明数量）
    pub operations_evaluated: usize,
}

/// 一次评估的完整结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationResult {
    pub result_by_path: ResultByPath,
    pub outcomes: Vec<RuleOutcome>,
    pub evaluation_trace: Vec<String>,
}

/// 表单规则引擎
#[derive(Clone)]
pub struct FormRuleEngine {
    evaluator: ConditionEvaluator,
    diagnostics: Arc<dyn Diagnostics>,
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl FormRuleEngine {
    pub fn new() -> Self {
        Self {
            evaluator: ConditionEvaluator::default(),
            diagnostics: Arc::new(TracingDiagnostics),
            trace_enabled: false,
        }
    }

    /// 按配置创建
    pub fn from_config(config: &EngineConfig) -> Self {
        let engine = Self::new().with_pattern_cache(PatternCache::with_capacity(
            config.pattern_cache_capacity,
        ));
        if config.trace_enabled {
            engine.with_trace()
        } else {
            engine
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 注入诊断实现
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// 使用指定的正则缓存（可在多个引擎之间共享）
    pub fn with_pattern_cache(mut self, patterns: PatternCache) -> Self {
        self.evaluator = ConditionEvaluator::new(patterns);
        self
    }

    pub fn patterns(&self) -> &PatternCache {
        self.evaluator.patterns()
    }

    /// 评估 JSON 形式的规则列表
    ///
    /// `rules` 不是数组时返回 None；无法解析的规则条目会被跳过。
    #[instrument(skip_all)]
    pub fn run_form_rules(
        &self,
        rules: &Value,
        data: &Value,
        array_data: &Value,
    ) -> Option<ResultByPath> {
        let entries = rules.as_array()?;
        let context = merge_context(data, array_data);

        let parsed: Vec<(usize, Rule)> = entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value::<Rule>(entry.clone()) {
                Ok(rule) => Some((index, rule)),
                Err(e) => {
                    self.diagnostics
                        .rule_skipped(index, &format!("rule could not be parsed: {}", e));
                    None
                }
            })
            .collect();

        let result = self.evaluate_indexed(parsed.iter().map(|(i, r)| (*i, r)), &context);
        Some(result.result_by_path)
    }

    /// 评估已解析的规则列表
    #[instrument(skip_all, fields(rules = rules.len()))]
    pub fn evaluate(&self, rules: &[Rule], context: &EvaluationContext) -> EvaluationResult {
        self.evaluate_indexed(rules.iter().enumerate(), context)
    }

    fn evaluate_indexed<'r>(
        &self,
        rules: impl Iterator<Item = (usize, &'r Rule)>,
        context: &EvaluationContext,
    ) -> EvaluationResult {
        let mut result = EvaluationResult::default();

        for (index, rule) in rules {
            if !rule.is_complete() {
                self.diagnostics.rule_skipped(
                    index,
                    "rule incomplete, actions and operations are required",
                );
                if self.trace_enabled {
                    result
                        .evaluation_trace
                        .push(format!("rules[{}]: 跳过 - 缺少 actions 或 operations", index));
                }
                continue;
            }

            let outcome = self.evaluate_rule(index, rule, context, &mut result.evaluation_trace);
            Self::collect_actions(rule, outcome.valid, &mut result.result_by_path);
            result.outcomes.push(outcome);
        }

        result
    }

    /// 评估单条规则的操作列表
    ///
    /// - `or`：遇到 true 立即停止
    /// - `and`：遇到 false 立即停止
    /// - 未指定：按 AND 累积，但所有操作都会求值
    pub fn evaluate_rule(
        &self,
        rule_index: usize,
        rule: &Rule,
        context: &EvaluationContext,
        trace: &mut Vec<String>,
    ) -> RuleOutcome {
        let mut valid: Option<bool> = None;
        let mut evaluated = 0;

        for (op_index, operation) in rule.operations.iter().enumerate() {
            let matched = self.evaluate_operation(rule_index, op_index, operation, context);
            evaluated += 1;

            if self.trace_enabled {
                trace.push(format!(
                    "rules[{}].operations[{}]: {} => {}",
                    rule_index,
                    op_index,
                    operation.operator,
                    if matched { "MATCHED" } else { "NOT_MATCHED" }
                ));
            }

            let running = valid.map_or(matched, |v| v && matched);
            valid = Some(running);

            match rule.join {
                Some(Join::Or) if running => {
                    if self.trace_enabled {
                        trace.push(format!("rules[{}]: OR 短路 - 操作 {} 匹配", rule_index, op_index));
                    }
                    break;
                }
                Some(Join::And) if !running => {
                    if self.trace_enabled {
                        trace.push(format!("rules[{}]: AND 短路 - 操作 {} 不匹配", rule_index, op_index));
                    }
                    break;
                }
                _ => {}
            }
        }

        RuleOutcome {
            rule_index,
            valid: valid.unwrap_or(false),
            operations_evaluated: evaluated,
        }
    }

    /// 解析操作数并执行操作符，任何错误都按不匹配处理
    fn evaluate_operation(
        &self,
        rule_index: usize,
        op_index: usize,
        operation: &Operation,
        context: &EvaluationContext,
    ) -> bool {
        match self.execute(operation, context) {
            Ok(valid) => {
                self.diagnostics
                    .operation_evaluated(rule_index, op_index, &operation.operator, valid);
                valid
            }
            Err(e) => {
                self.diagnostics
                    .operation_failed(rule_index, op_index, &operation.operator, &e);
                self.diagnostics
                    .operation_evaluated(rule_index, op_index, &operation.operator, false);
                false
            }
        }
    }

    /// 执行单个操作
    pub fn execute(&self, operation: &Operation, context: &EvaluationContext) -> Result<bool> {
        let operator = match &operation.operator {
            OperatorRef::Known(id) => *id,
            OperatorRef::Unknown(name) => return Err(RuleError::UnknownOperator(name.clone())),
        };

        if operator.requires_value_b() && operation.value_b == Operand::Missing {
            return Err(RuleError::MissingOperand {
                operator: operator.to_string(),
                slot: "valueB",
            });
        }

        let value_a = TemplateResolver::resolve(&operation.value_a, context);
        let value_b = TemplateResolver::resolve(&operation.value_b, context);

        self.evaluator.evaluate(operator, value_a, value_b)
    }

    /// 按规则结果收集动作
    fn collect_actions(rule: &Rule, valid: bool, result_by_path: &mut ResultByPath) {
        for action in &rule.actions {
            if !When::fires(action.when.as_ref(), valid) {
                continue;
            }
            for field in &action.fields {
                result_by_path
                    .entry(field.clone())
                    .or_default()
                    .push(FieldAction {
                        operator: action.operator.clone(),
                        field: field.clone(),
                        value: action.value.clone(),
                    });
            }
        }
    }

    /// 评估 schema 元素上的规则
    ///
    /// `schema.rules` 不是数组时返回 None；缺少 action/operation 的规则静默跳过。
    #[instrument(skip_all)]
    pub fn run_element_rules(
        &self,
        schema: &Value,
        data: &Value,
        array_data: &Value,
    ) -> Option<Map<String, Value>> {
        let entries = schema.get("rules")?.as_array()?;
        let context = merge_context(data, array_data);
        let mut rule_actions = Map::new();

        for (index, entry) in entries.iter().enumerate() {
            let Ok(rule) = serde_json::from_value::<ElementRule>(entry.clone()) else {
                continue;
            };
            let Some(operation) = rule.operation() else {
                continue;
            };

            if !self.evaluate_operation(index, 0, &operation, &context) {
                continue;
            }

            if ELEMENT_FLAGS.contains(&rule.action.as_str()) {
                rule_actions.insert(rule.action.clone(), Value::Bool(true));
            } else if rule.action == SET_PROPERTY {
                for entry in &rule.property {
                    let key = TemplateResolver::render_key(&entry.key, &context);
                    let value = TemplateResolver::render(&entry.value, &context);
                    rule_actions.insert(key, value);
                }
            }
        }

        Some(rule_actions)
    }
}

impl Default for FormRuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MockDiagnostics;
    use crate::models::Action;
    use crate::operators::OperatorId;
    use mockall::predicate::{always, eq};
    use serde_json::json;

    fn create_test_context() -> EvaluationContext {
        merge_context(
            &json!({
                "status": "active",
                "action": "upload_reel",
                "amount": 1000,
                "tags": ["vip", "frequent"]
            }),
            &json!({}),
        )
    }

    fn hide(field: &str) -> Action {
        Action::new("hide", true, &[field])
    }

    fn rule(operations: Vec<Operation>, join: Option<Join>) -> Rule {
        Rule::new(operations, join, vec![hide("target")])
    }

    fn matching() -> Operation {
        Operation::new(OperatorId::Equal, "{{status}}", "active")
    }

    fn failing() -> Operation {
        Operation::new(OperatorId::Equal, "{{status}}", "archived")
    }

    #[test]
    fn test_simple_rule_match() {
        let engine = FormRuleEngine::new();
        let result = engine.evaluate(&[rule(vec![matching()], None)], &create_test_context());

        assert!(result.outcomes[0].valid);
        assert_eq!(
            result.result_by_path["target"],
            vec![FieldAction {
                operator: "hide".to_string(),
                field: "target".to_string(),
                value: Some(json!(true)),
            }]
        );
    }

    #[test]
    fn test_or_short_circuit_skips_remaining_operations() {
        let mut diagnostics = MockDiagnostics::new();
        diagnostics
            .expect_operation_evaluated()
            .with(eq(0), eq(0), always(), eq(true))
            .times(1)
            .return_const(());
        diagnostics
            .expect_operation_evaluated()
            .with(always(), eq(1), always(), always())
            .times(0);

        let engine = FormRuleEngine::new().with_diagnostics(Arc::new(diagnostics));
        let result = engine.evaluate(
            &[rule(vec![matching(), failing()], Some(Join::Or))],
            &create_test_context(),
        );

        assert!(result.outcomes[0].valid);
        assert_eq!(result.outcomes[0].operations_evaluated, 1);
    }

    #[test]
    fn test_and_short_circuit_skips_remaining_operations() {
        let mut diagnostics = MockDiagnostics::new();
        diagnostics
            .expect_operation_evaluated()
            .with(eq(0), eq(0), always(), eq(false))
            .times(1)
            .return_const(());
        diagnostics
            .expect_operation_evaluated()
            .with(always(), eq(1), always(), always())
            .times(0);

        let engine = FormRuleEngine::new().with_diagnostics(Arc::new(diagnostics));
        let result = engine.evaluate(
            &[rule(vec![failing(), matching()], Some(Join::And))],
            &create_test_context(),
        );

        assert!(!result.outcomes[0].valid);
        assert_eq!(result.outcomes[0].operations_evaluated, 1);
    }

    #[test]
    fn test_no_join_evaluates_all_and_ands() {
        let mut diagnostics = MockDiagnostics::new();
        diagnostics
            .expect_operation_evaluated()
            .times(2)
            .return_const(());

        let engine = FormRuleEngine::new().with_diagnostics(Arc::new(diagnostics));
        let result = engine.evaluate(
            &[rule(vec![failing(), matching()], None)],
            &create_test_context(),
        );

        assert!(!result.outcomes[0].valid);
        assert_eq!(result.outcomes[0].operations_evaluated, 2);
        assert!(result.result_by_path.is_empty());
    }

    #[test]
    fn test_or_without_match_is_invalid() {
        let engine = FormRuleEngine::new();
        let result = engine.evaluate(
            &[rule(vec![failing(), failing()], Some(Join::Or))],
            &create_test_context(),
        );
        assert!(!result.outcomes[0].valid);
        assert_eq!(result.outcomes[0].operations_evaluated, 2);
    }

    #[test]
    fn test_incomplete_rule_is_skipped_with_warning() {
        let mut diagnostics = MockDiagnostics::new();
        diagnostics
            .expect_rule_skipped()
            .with(eq(0), always())
            .times(1)
            .return_const(());
        diagnostics.expect_operation_evaluated().return_const(());

        let engine = FormRuleEngine::new().with_diagnostics(Arc::new(diagnostics));
        let incomplete = Rule::new(vec![], None, vec![hide("a")]);
        let result = engine.evaluate(&[incomplete, rule(vec![matching()], None)], &create_test_context());

        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].rule_index, 1);
        assert!(result.result_by_path.contains_key("target"));
    }

    #[test]
    fn test_unknown_operator_is_invalid() {
        let mut diagnostics = MockDiagnostics::new();
        diagnostics
            .expect_operation_failed()
            .withf(|_, _, _, e| matches!(e, RuleError::UnknownOperator(name) if name == "between"))
            .times(1)
            .return_const(());
        diagnostics.expect_operation_evaluated().return_const(());

        let engine = FormRuleEngine::new().with_diagnostics(Arc::new(diagnostics));
        let op = Operation::new("between", "{{amount}}", json!([0, 10]));
        let result = engine.evaluate(&[rule(vec![op], None)], &create_test_context());

        assert!(!result.outcomes[0].valid);
    }

    #[test]
    fn test_missing_value_b_is_invalid() {
        let engine = FormRuleEngine::new();
        let err = engine
            .execute(&Operation::unary(OperatorId::Equal, "{{status}}"), &create_test_context())
            .unwrap_err();
        assert!(matches!(err, RuleError::MissingOperand { slot: "valueB", .. }));
    }

    #[test]
    fn test_when_false_fires_on_invalid_rule() {
        let engine = FormRuleEngine::new();
        let rules = vec![Rule::new(
            vec![failing()],
            Some(Join::And),
            vec![
                Action::new("show", true, &["on_true"]),
                Action::new("show", true, &["on_false"]).when(When::False),
            ],
        )];

        let result = engine.evaluate(&rules, &create_test_context());
        assert!(!result.result_by_path.contains_key("on_true"));
        assert_eq!(result.result_by_path["on_false"].len(), 1);
    }

    #[test]
    fn test_actions_accumulate_in_declaration_order() {
        let engine = FormRuleEngine::new();
        let rules = vec![
            Rule::new(
                vec![matching()],
                None,
                vec![Action::new("hide", true, &["a", "b"])],
            ),
            Rule::new(
                vec![matching()],
                None,
                vec![Action::new("disabled", true, &["b"]), Action::new("set", 5, &["a"])],
            ),
        ];

        let result = engine.evaluate(&rules, &create_test_context());
        let keys: Vec<_> = result.result_by_path.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);

        let a: Vec<_> = result.result_by_path["a"].iter().map(|x| x.operator.as_str()).collect();
        let b: Vec<_> = result.result_by_path["b"].iter().map(|x| x.operator.as_str()).collect();
        assert_eq!(a, vec!["hide", "set"]);
        assert_eq!(b, vec!["hide", "disabled"]);
    }

    #[test]
    fn test_trace_output() {
        let engine = FormRuleEngine::new().with_trace();
        let result = engine.evaluate(
            &[rule(vec![matching(), failing()], Some(Join::Or))],
            &create_test_context(),
        );

        assert!(result.evaluation_trace[0].contains("MATCHED"));
        assert!(result.evaluation_trace.iter().any(|t| t.contains("短路")));
    }

    #[test]
    fn test_run_form_rules_rejects_non_array() {
        let engine = FormRuleEngine::new();
        assert!(engine.run_form_rules(&json!("not-an-array"), &json!({}), &json!({})).is_none());
        assert!(engine.run_form_rules(&json!({"rules": []}), &json!({}), &json!({})).is_none());
    }

    #[test]
    fn test_run_form_rules_skips_unparseable_entries() {
        let mut diagnostics = MockDiagnostics::new();
        diagnostics
            .expect_rule_skipped()
            .with(eq(0), always())
            .times(1)
            .return_const(());
        diagnostics.expect_operation_evaluated().return_const(());

        let engine = FormRuleEngine::new().with_diagnostics(Arc::new(diagnostics));
        let rules = json!([
            {"operations": "oops", "actions": []},
            {
                "operations": [{"operator": "isNotEmpty", "valueA": "{{status}}"}],
                "actions": [{"operator": "show", "value": true, "fields": ["details"]}]
            }
        ]);

        let result = engine
            .run_form_rules(&rules, &json!({"status": "active"}), &json!(null))
            .unwrap();
        assert_eq!(result["details"][0].operator, "show");
    }

    #[test]
    fn test_run_element_rules_flags() {
        let engine = FormRuleEngine::new();
        let schema = json!({
            "rules": [
                {"action": "hide", "operation": "isEmpty", "valueA": "{{missing}}"},
                {"action": "disabled", "operation": "equal", "valueA": "{{status}}", "valueB": "archived"},
                {"action": "readOnly", "operation": "in", "valueA": "{{status}}", "valueB": "active,draft"},
                {"action": "", "operation": "isEmpty", "valueA": ""}
            ]
        });

        let output = engine
            .run_element_rules(&schema, &json!({"status": "active"}), &json!({}))
            .unwrap();
        assert_eq!(output.get("hide"), Some(&json!(true)));
        assert_eq!(output.get("readOnly"), Some(&json!(true)));
        assert!(!output.contains_key("disabled"));
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_run_element_rules_requires_rules_array() {
        let engine = FormRuleEngine::new();
        assert!(engine.run_element_rules(&json!({}), &json!({}), &json!({})).is_none());
        assert!(engine
            .run_element_rules(&json!({"rules": {}}), &json!({}), &json!({}))
            .is_none());
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig {
            trace_enabled: true,
            pattern_cache_capacity: 8,
        };
        let engine = FormRuleEngine::from_config(&config);

        assert_eq!(engine.patterns().capacity(), 8);
        let result = engine.evaluate(&[rule(vec![matching()], None)], &create_test_context());
        assert!(!result.evaluation_trace.is_empty());
    }
}
