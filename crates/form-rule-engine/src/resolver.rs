//! 操作数解析与模板渲染
//!
//! `resolve` 用于规则操作数：模板引用替换为上下文中的值，引用不到时为未定义。
//! `render` 用于 `set-property` 的 key/value：整串模板保留原始类型，嵌入式模板
//! 做字符串插值，数组和对象递归处理。

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::models::{EvaluationContext, Operand, TemplateRef};
use crate::operators::OperatorId;
use crate::values;

/// 匹配 {{path}} 格式的占位符
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder pattern is valid")
});

/// 模板解析器
pub struct TemplateResolver;

impl TemplateResolver {
    /// 解析操作数，`None` 表示未定义
    pub fn resolve<'a>(operand: &'a Operand, context: &'a EvaluationContext) -> Option<&'a Value> {
        match operand {
            Operand::Missing => None,
            Operand::Literal(value) => Some(value),
            Operand::Template(template) => context.get_field(&template.path),
        }
    }

    /// 渲染值中的模板
    pub fn render(value: &Value, context: &EvaluationContext) -> Value {
        match value {
            Value::String(s) => {
                if let Some(path) = TemplateRef::parse(s).filter(|p| !p.contains("{{")) {
                    return context.get_field(&path).cloned().unwrap_or(Value::Null);
                }
                if PLACEHOLDER.is_match(s) {
                    return Value::String(Self::interpolate(s, context));
                }
                value.clone()
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| Self::render(item, context)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::render(v, context)))
                    .collect::<Map<_, _>>(),
            ),
            other => other.clone(),
        }
    }

    /// 渲染为字符串，用作属性名
    pub fn render_key(value: &Value, context: &EvaluationContext) -> String {
        values::display(Some(&Self::render(value, context)))
    }

    /// 字符串插值，引用不到的占位符替换为空串
    pub fn interpolate(template: &str, context: &EvaluationContext) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                values::display(context.get_field(&caps[1]))
            })
            .into_owned()
    }

    /// 渲染操作符的提示消息
    pub fn render_message(
        operator: OperatorId,
        value_a: Option<&Value>,
        value_b: Option<&Value>,
    ) -> Option<String> {
        let template = operator.definition().message?;
        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| match &caps[1] {
            "valueA" => values::display(value_a),
            "valueB" => values::display(value_b),
            _ => caps[0].to_string(),
        });
        Some(rendered.into_owned())
    }
}
