//! 规则引擎领域模型

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::operators::{Join, OperatorRef};
use crate::values;

/// 模板引用 `{{path}}`
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRef {
    /// 去掉分隔符后的字段路径
    pub path: String,
    /// 规则中的原始写法
    pub source: Value,
}

impl TemplateRef {
    /// 解析 `{{path}}` 形式的字符串，不是模板时返回 None
    pub fn parse(s: &str) -> Option<String> {
        if s.len() >= 4 && s.starts_with("{{") && s.ends_with("}}") {
            Some(s[2..s.len() - 2].trim().to_string())
        } else {
            None
        }
    }
}

/// 操作数
///
/// 是否为模板在解析时一次性确定：空值永远是字面量；数组只看第一个元素，
/// 第一个元素是模板时整个数组被当作这一个模板引用，其余元素丢弃。
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Operand {
    /// 规则中没有写这个操作数
    #[default]
    Missing,
    Literal(Value),
    Template(TemplateRef),
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        if values::is_empty(Some(&value)) {
            return Self::Literal(value);
        }

        let probe = match &value {
            Value::Array(items) => items.first(),
            other => Some(other),
        };

        match probe.and_then(Value::as_str).and_then(TemplateRef::parse) {
            Some(path) => Self::Template(TemplateRef {
                path,
                source: value,
            }),
            None => Self::Literal(value),
        }
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Self::from(Value::String(s.to_string()))
    }
}

impl From<Operand> for Value {
    fn from(operand: Operand) -> Self {
        match operand {
            Operand::Missing => Value::Null,
            Operand::Literal(v) => v,
            Operand::Template(t) => t.source,
        }
    }
}

impl<'de> Deserialize<'de> for Operand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Operand::from)
    }
}

impl Serialize for Operand {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Value::from(self.clone()).serialize(serializer)
    }
}

/// 单个比较操作
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operator: OperatorRef,
    #[serde(default)]
    pub value_a: Operand,
    #[serde(default)]
    pub value_b: Operand,
}

impl Operation {
    pub fn new(
        operator: impl Into<OperatorRef>,
        value_a: impl Into<Operand>,
        value_b: impl Into<Operand>,
    ) -> Self {
        Self {
            operator: operator.into(),
            value_a: value_a.into(),
            value_b: value_b.into(),
        }
    }

    /// 单操作数的操作
    pub fn unary(operator: impl Into<OperatorRef>, value_a: impl Into<Operand>) -> Self {
        Self {
            operator: operator.into(),
            value_a: value_a.into(),
            value_b: Operand::Missing,
        }
    }
}

/// 动作触发条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum When {
    True,
    False,
    /// 其他取值永远不会触发
    Other(String),
}

impl When {
    /// 动作是否在规则结果为 `valid` 时触发；`when` 缺省等同于 "true"
    pub fn fires(when: Option<&When>, valid: bool) -> bool {
        match when {
            None | Some(When::True) => valid,
            Some(When::False) => !valid,
            Some(When::Other(_)) => false,
        }
    }
}

impl From<When> for String {
    fn from(when: When) -> Self {
        match when {
            When::True => "true".to_string(),
            When::False => "false".to_string(),
            When::Other(s) => s,
        }
    }
}

impl<'de> Deserialize<'de> for When {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) if s == "true" => When::True,
            Value::String(s) if s == "false" => When::False,
            Value::Bool(true) => When::True,
            Value::Bool(false) => When::False,
            Value::String(s) => When::Other(s),
            other => When::Other(other.to_string()),
        })
    }
}

/// 规则动作
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<When>,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl Action {
    pub fn new(operator: impl Into<String>, value: impl Into<Value>, fields: &[&str]) -> Self {
        Self {
            operator: operator.into(),
            value: Some(value.into()),
            when: None,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn when(mut self, when: When) -> Self {
        self.when = Some(when);
        self
    }
}

/// 表单规则：若干操作按 join 组合，结果决定哪些动作生效
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default, deserialize_with = "lenient_join", skip_serializing_if = "Option::is_none")]
    pub join: Option<Join>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(operations: Vec<Operation>, join: Option<Join>, actions: Vec<Action>) -> Self {
        Self {
            operations,
            join,
            actions,
        }
    }

    /// 缺少操作或动作的规则会被跳过
    pub fn is_complete(&self) -> bool {
        !self.operations.is_empty() && !self.actions.is_empty()
    }
}

/// join 只识别 "and" / "or"，其他取值视为未指定
fn lenient_join<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Join>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value.as_ref().and_then(Value::as_str) {
        Some("and") => Some(Join::And),
        Some("or") => Some(Join::Or),
        _ => None,
    })
}

/// 输出到某个字段上的动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAction {
    pub operator: String,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// 字段 → 按声明顺序排列的动作列表；字段按首次出现的顺序排列
pub type ResultByPath = IndexMap<String, Vec<FieldAction>>;

/// `set-property` 的属性条目，key 和 value 都可以是模板
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyEntry {
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
}

/// schema 元素上的单操作规则
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRule {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub operation: Option<OperatorRef>,
    #[serde(default)]
    pub value_a: Operand,
    #[serde(default)]
    pub value_b: Operand,
    #[serde(default)]
    pub property: Vec<PropertyEntry>,
}

impl ElementRule {
    /// action 和 operation 都不为空才会被评估
    pub fn operation(&self) -> Option<Operation> {
        if self.action.is_empty() {
            return None;
        }
        let operator = self
            .operation
            .as_ref()
            .filter(|op| !matches!(op, OperatorRef::Unknown(s) if s.is_empty()))?;

        Some(Operation {
            operator: operator.clone(),
            value_a: self.value_a.clone(),
            value_b: self.value_b.clone(),
        })
    }
}

/// 元素动作：命中后把对应标志置为 true
pub const ELEMENT_FLAGS: [&str; 4] = ["disabled", "hide", "show", "readOnly"];

/// 元素动作：按 property 列表设置属性
pub const SET_PROPERTY: &str = "set-property";

/// 评估上下文 - 当前记录数据与数组项数据合并后的视图
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    data: Map<String, Value>,
}

impl EvaluationContext {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// 合并上下文：先取 `data` 的顶层键，再用 `array_data` 覆盖同名键；非对象输入忽略
    pub fn merge(data: &Value, array_data: &Value) -> Self {
        let mut merged = Map::new();
        for source in [data, array_data] {
            if let Value::Object(map) = source {
                for (key, value) in map {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        Self { data: merged }
    }

    /// 获取字段值（支持点号分隔的路径，如 "user.profile.age" 或 "items.0.name"）
    ///
    /// 先按完整键名查找，找不到再按路径逐级查找。
    pub fn get_field(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(path) {
            return Some(value);
        }

        let mut parts = path.split('.');
        let mut current = self.data.get(parts.next()?)?;

        for part in parts {
            match current {
                Value::Object(map) => {
                    current = map.get(part)?;
                }
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    /// 获取底层数据
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

/// 合并 `data` 与 `array_data`，`array_data` 优先
pub fn merge_context(data: &Value, array_data: &Value) -> EvaluationContext {
    EvaluationContext::merge(data, array_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::OperatorId;
    use serde_json::json;

    #[test]
    fn test_operand_classification() {
        assert_eq!(
            Operand::from(json!("{{status}}")),
            Operand::Template(TemplateRef {
                path: "status".to_string(),
                source: json!("{{status}}"),
            })
        );
        assert_eq!(Operand::from(json!("active")), Operand::Literal(json!("active")));
        assert_eq!(Operand::from(json!(5)), Operand::Literal(json!(5)));
        assert_eq!(Operand::from(json!("{{")), Operand::Literal(json!("{{")));
    }

    #[test]
    fn test_empty_operand_is_never_template() {
        assert_eq!(Operand::from(json!([])), Operand::Literal(json!([])));
        assert_eq!(Operand::from(json!("")), Operand::Literal(json!("")));
    }

    #[test]
    fn test_array_operand_uses_first_element() {
        match Operand::from(json!(["{{tags}}", "extra"])) {
            Operand::Template(t) => assert_eq!(t.path, "tags"),
            other => panic!("unexpected operand: {:?}", other),
        }
        assert_eq!(
            Operand::from(json!(["a", "{{b}}"])),
            Operand::Literal(json!(["a", "{{b}}"]))
        );
    }

    #[test]
    fn test_rule_deserialization() {
        let json = json!({
            "operations": [
                {"operator": "notEqual", "valueA": "upload_photo", "valueB": "{{action}}"}
            ],
            "join": "and",
            "actions": [
                {"when": "true", "operator": "hide", "value": true, "fields": ["photoUrl"]}
            ]
        });

        let rule: Rule = serde_json::from_value(json).unwrap();
        assert_eq!(rule.join, Some(Join::And));
        assert_eq!(
            rule.operations[0].operator,
            OperatorRef::Known(OperatorId::NotEqual)
        );
        assert!(matches!(rule.operations[0].value_b, Operand::Template(_)));
        assert_eq!(rule.actions[0].when, Some(When::True));
        assert!(rule.is_complete());
    }

    #[test]
    fn test_unrecognized_join_is_unspecified() {
        let rule: Rule = serde_json::from_value(json!({"join": "xor"})).unwrap();
        assert_eq!(rule.join, None);
        assert!(!rule.is_complete());
    }

    #[test]
    fn test_when_gating() {
        assert!(When::fires(None, true));
        assert!(!When::fires(None, false));
        assert!(When::fires(Some(&When::True), true));
        assert!(When::fires(Some(&When::False), false));
        assert!(!When::fires(Some(&When::False), true));
        assert!(!When::fires(Some(&When::Other("maybe".to_string())), true));
    }

    #[test]
    fn test_when_accepts_booleans() {
        let action: Action = serde_json::from_value(json!({"when": false, "fields": []})).unwrap();
        assert_eq!(action.when, Some(When::False));
    }

    #[test]
    fn test_merge_context_precedence() {
        let ctx = merge_context(
            &json!({"name": "record", "status": "active"}),
            &json!({"name": "item", "index": 2}),
        );

        assert_eq!(ctx.get_field("name"), Some(&json!("item")));
        assert_eq!(ctx.get_field("status"), Some(&json!("active")));
        assert_eq!(ctx.get_field("index"), Some(&json!(2)));
    }

    #[test]
    fn test_merge_context_ignores_non_objects() {
        let ctx = merge_context(&json!(null), &json!([1, 2]));
        assert!(ctx.data().is_empty());
    }

    #[test]
    fn test_evaluation_context_paths() {
        let ctx = merge_context(
            &json!({
                "user": {"profile": {"age": 30}},
                "items": [{"name": "ticket"}],
                "a.b": "literal"
            }),
            &json!({}),
        );

        assert_eq!(ctx.get_field("user.profile.age"), Some(&json!(30)));
        assert_eq!(ctx.get_field("items.0.name"), Some(&json!("ticket")));
        assert_eq!(ctx.get_field("a.b"), Some(&json!("literal")));
        assert_eq!(ctx.get_field("nonexistent"), None);
        assert_eq!(ctx.get_field("user.missing.age"), None);
    }

    #[test]
    fn test_element_rule_requires_action_and_operation() {
        let rule: ElementRule =
            serde_json::from_value(json!({"action": "hide", "operation": ""})).unwrap();
        assert!(rule.operation().is_none());

        let rule: ElementRule =
            serde_json::from_value(json!({"operation": "equal", "valueA": 1, "valueB": 1})).unwrap();
        assert!(rule.operation().is_none());

        let rule: ElementRule = serde_json::from_value(
            json!({"action": "hide", "operation": "isEmpty", "valueA": "{{x}}"}),
        )
        .unwrap();
        assert!(rule.operation().is_some());
    }
}
