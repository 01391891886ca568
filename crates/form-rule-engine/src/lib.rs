//! 表单规则引擎
//!
//! 对表单/流程数据评估声明式规则（"当 X 比较 Y 时执行 Z"），决定字段的
//! 显示、启用状态和派生值。支持：
//! - 模板引用 `{{field}}` 解析（记录数据与数组项数据合并）
//! - and/or 短路求值
//! - 按字段聚合动作，以及 schema 元素级别的单操作规则
//! - 操作符目录导出，供规则编辑器使用

pub mod diagnostics;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod models;
pub mod operators;
pub mod patterns;
pub mod resolver;
pub mod validator;
pub mod values;

pub use diagnostics::{DiagnosticEvent, Diagnostics, RecordingDiagnostics, TracingDiagnostics};
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use executor::{EvaluationResult, FormRuleEngine, RuleOutcome};
pub use models::{
    Action, ElementRule, EvaluationContext, FieldAction, Operand, Operation, PropertyEntry,
    ResultByPath, Rule, TemplateRef, When, merge_context,
};
pub use operators::{Join, OperatorId, OperatorRef, RuleOperation, rule_operations};
pub use patterns::PatternCache;
pub use resolver::TemplateResolver;
pub use validator::{RuleIssue, RuleValidator};

use mintflow_shared::config::AppConfig;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::LazyLock;

/// 进程内共享的默认引擎，正则缓存在所有调用之间复用
static DEFAULT_ENGINE: LazyLock<FormRuleEngine> = LazyLock::new(FormRuleEngine::new);

/// 评估表单规则，返回字段 → 动作列表
///
/// `name`、`path`、`data_path`、`new_value` 和 `schema` 为兼容既有调用方保留，
/// 不参与评估。`rules` 不是数组时返回 None。
#[allow(clippy::too_many_arguments)]
pub fn run_form_rules(
    _name: &str,
    _path: &str,
    _data_path: &str,
    _new_value: &Value,
    _schema: &Value,
    rules: &Value,
    data: &Value,
    array_data: &Value,
) -> Option<ResultByPath> {
    DEFAULT_ENGINE.run_form_rules(rules, data, array_data)
}

/// 评估 schema 元素上的规则，返回标志/属性 → 值
pub fn run_element_rules(schema: &Value, data: &Value, array_data: &Value) -> Option<Map<String, Value>> {
    DEFAULT_ENGINE.run_element_rules(schema, data, array_data)
}

/// 按服务配置初始化日志并创建引擎，供宿主进程启动时调用
pub fn bootstrap(service_name: &str) -> anyhow::Result<FormRuleEngine> {
    let config = AppConfig::load(service_name)?;
    start(&config)
}

/// 从指定配置目录启动
pub fn bootstrap_from(config_dir: &Path, service_name: &str) -> anyhow::Result<FormRuleEngine> {
    let config = AppConfig::load_from(config_dir, service_name)?;
    start(&config)
}

fn start(config: &AppConfig) -> anyhow::Result<FormRuleEngine> {
    mintflow_shared::observability::init(&config.observability)?;
    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        trace_enabled = config.engine.trace_enabled,
        "表单规则引擎已启动"
    );
    Ok(FormRuleEngine::from_config(&config.engine))
}
