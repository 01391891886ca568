//! 条件评估器
//!
//! 每个操作符对应一个求值函数，`ConditionEvaluator::handler` 把 `OperatorId`
//! 映射到函数指针。操作数在进入这里之前已经完成模板解析：`None` 表示未定义。
//!
//! 约定：`valueA` 是被检查的字段值；边界类操作符
//! （maxLength/minLength/maxValue/minValue）与目录一致，`valueA` 是边界，
//! 被检查的字段值取自 `valueB`。

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::error::{Result, RuleError};
use crate::operators::OperatorId;
use crate::patterns::PatternCache;
use crate::values::{self, as_f64, as_text, type_name};

type Operand<'a> = Option<&'a Value>;

/// 操作符求值函数
pub type OperatorFn = fn(&ConditionEvaluator, Operand<'_>, Operand<'_>) -> Result<bool>;

/// 条件评估器
#[derive(Clone, Default)]
pub struct ConditionEvaluator {
    patterns: PatternCache,
}

impl ConditionEvaluator {
    pub fn new(patterns: PatternCache) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &PatternCache {
        &self.patterns
    }

    /// 评估条件
    ///
    /// # Arguments
    /// * `operator` - 操作符
    /// * `value_a` - 解析后的 valueA（被检查的值）
    /// * `value_b` - 解析后的 valueB（比较对象、列表、模式或边界）
    pub fn evaluate(
        &self,
        operator: OperatorId,
        value_a: Option<&Value>,
        value_b: Option<&Value>,
    ) -> Result<bool> {
        let handler = Self::handler(operator);
        handler(self, value_a, value_b)
    }

    /// 操作符 → 求值函数
    pub fn handler(operator: OperatorId) -> OperatorFn {
        match operator {
            OperatorId::Required => |_, a, _| Ok(!values::is_empty(a)),
            OperatorId::Equal => |_, a, b| Ok(Self::eq(a, b)),
            OperatorId::NotEqual => |_, a, b| Ok(!Self::eq(a, b)),
            OperatorId::GreaterThan => |_, a, b| Self::compare(a, b, |x, y| x > y),
            OperatorId::LessThan => |_, a, b| Self::compare(a, b, |x, y| x < y),
            OperatorId::GreaterThanOrEqual => |_, a, b| Self::compare(a, b, |x, y| x >= y),
            OperatorId::LessThanOrEqual => |_, a, b| Self::compare(a, b, |x, y| x <= y),
            OperatorId::In => |_, a, b| Ok(Self::in_list(a, b)),
            OperatorId::NotIn => |_, a, b| Ok(!Self::in_list(a, b)),
            OperatorId::StartsWith => |_, a, b| Self::text_op(a, b, |s, p| s.starts_with(p)),
            OperatorId::NotStartsWith => |_, a, b| Self::text_op(a, b, |s, p| !s.starts_with(p)),
            OperatorId::EndsWith => |_, a, b| Self::text_op(a, b, |s, p| s.ends_with(p)),
            OperatorId::NotEndsWith => |_, a, b| Self::text_op(a, b, |s, p| !s.ends_with(p)),
            OperatorId::Match => |e, a, b| e.regex_match(a, b),
            OperatorId::NotMatch => |e, a, b| e.regex_match(a, b).map(|r| !r),
            OperatorId::IsEmpty => |_, a, _| Ok(values::is_empty(a)),
            OperatorId::IsNotEmpty => |_, a, _| Ok(!values::is_empty(a)),
            OperatorId::IsTruthy => |_, a, _| Ok(values::is_truthy(a)),
            OperatorId::IsFalsy => |_, a, _| Ok(!values::is_truthy(a)),
            OperatorId::MaxLength => |_, a, b| Self::length_bound(a, b, |len, max| len <= max),
            OperatorId::MinLength => |_, a, b| Self::length_bound(a, b, |len, min| len >= min),
            OperatorId::MaxValue => |_, a, b| Self::value_bound(a, b, |v, max| v <= max),
            OperatorId::MinValue => |_, a, b| Self::value_bound(a, b, |v, min| v >= min),
            OperatorId::IsEmail => |e, a, _| e.pattern_match(OperatorId::IsEmail, a),
            OperatorId::IsUrl => |e, a, _| e.pattern_match(OperatorId::IsUrl, a),
            OperatorId::IsNumeric => |e, a, _| e.pattern_match(OperatorId::IsNumeric, a),
            OperatorId::IsAlpha => |e, a, _| e.pattern_match(OperatorId::IsAlpha, a),
            OperatorId::IsPhone => |e, a, _| e.pattern_match(OperatorId::IsPhone, a),
            OperatorId::IsZipCode => |e, a, _| e.pattern_match(OperatorId::IsZipCode, a),
            OperatorId::IsAlphaNumeric => |_, a, _| {
                Ok(Self::subject_text(a)?.is_some_and(|s| Self::is_alpha_numeric(&s)))
            },
            OperatorId::IsDate => |_, a, _| Ok(Self::is_date(a)),
            OperatorId::IsCreditCard => |_, a, _| {
                Ok(Self::subject_text(a)?.is_some_and(|s| Self::luhn(&s)))
            },
            OperatorId::Fn => |_, _, _| {
                Err(RuleError::UnsupportedCustomFunction(OperatorId::Fn.to_string()))
            }
        }
    }

    /// 相等比较
    ///
    /// - 缺失与 null 互相相等
    /// - 任一侧为数字且两侧都能转为数字时按数值比较（"10" == 10）
    /// - 数组按顺序逐项比较，对象按键逐项比较
    pub fn eq(a: Operand<'_>, b: Operand<'_>) -> bool {
        match (a, b) {
            (None | Some(Value::Null), None | Some(Value::Null)) => true,
            (Some(x), Some(y)) => Self::values_equal(x, y),
            _ => false,
        }
    }

    fn values_equal(x: &Value, y: &Value) -> bool {
        if x.is_number() || y.is_number() {
            // 统一转为浮点数后精确比较（100 == 100.0，但 1e-20 != 0）
            if let (Some(f1), Some(f2)) = (as_f64(x), as_f64(y)) {
                return f1 == f2;
            }
        }

        match (x, y) {
            (Value::Array(xs), Value::Array(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(a, b)| Self::values_equal(a, b))
            }
            (Value::Object(xm), Value::Object(ym)) => {
                xm.len() == ym.len()
                    && xm
                        .iter()
                        .all(|(k, v)| ym.get(k).is_some_and(|w| Self::values_equal(v, w)))
            }
            _ => x == y,
        }
    }

    /// 数值比较，任一侧无法转为数字时返回类型错误
    fn compare<F>(a: Operand<'_>, b: Operand<'_>, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        Ok(cmp(Self::number(a)?, Self::number(b)?))
    }

    fn number(value: Operand<'_>) -> Result<f64> {
        value
            .and_then(as_f64)
            .ok_or_else(|| RuleError::type_mismatch("number", type_name(value)))
    }

    /// 列表包含检查 (in)
    ///
    /// 列表可以是数组、逗号分隔的字符串或单个标量；数组形式的 valueA
    /// 只要有一个元素在列表中即视为包含。
    fn in_list(a: Operand<'_>, b: Operand<'_>) -> bool {
        let items = Self::list_items(b);
        if items.is_empty() {
            return false;
        }

        match a {
            Some(Value::Array(candidates)) => candidates
                .iter()
                .any(|c| items.iter().any(|item| Self::eq(Some(c), Some(item)))),
            _ => items.iter().any(|item| Self::eq(a, Some(item))),
        }
    }

    fn list_items(b: Operand<'_>) -> Vec<Value> {
        match b {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(Value::String(s)) if s.is_empty() => Vec::new(),
            Some(Value::String(s)) => s
                .split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect(),
            Some(other) => vec![other.clone()],
        }
    }

    /// 字符串操作，两侧都必须是标量
    fn text_op<F>(a: Operand<'_>, b: Operand<'_>, op: F) -> Result<bool>
    where
        F: Fn(&str, &str) -> bool,
    {
        let s = Self::text(a)?;
        let other = Self::text(b)?;
        Ok(op(&s, &other))
    }

    fn text(value: Operand<'_>) -> Result<String> {
        value
            .and_then(as_text)
            .ok_or_else(|| RuleError::type_mismatch("string", type_name(value)))
    }

    /// 正则表达式匹配，valueB 为模式
    fn regex_match(&self, a: Operand<'_>, b: Operand<'_>) -> Result<bool> {
        let s = Self::text(a)?;
        let pattern = b
            .and_then(Value::as_str)
            .ok_or_else(|| RuleError::type_mismatch("string (regex pattern)", type_name(b)))?;

        let regex = self.patterns.get_or_compile(pattern)?;
        Ok(regex.is_match(&s))
    }

    /// 长度边界：字符串按字符计数，数组按元素计数，未定义按 0
    fn length_bound<F>(bound: Operand<'_>, subject: Operand<'_>, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let limit = Self::bound(bound)?;
        let len = match subject {
            None | Some(Value::Null) => 0,
            Some(Value::String(s)) => s.chars().count(),
            Some(Value::Array(items)) => items.len(),
            other => return Err(RuleError::type_mismatch("string or array", type_name(other))),
        };
        Ok(cmp(len as f64, limit))
    }

    /// 数值边界
    fn value_bound<F>(bound: Operand<'_>, subject: Operand<'_>, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let limit = Self::bound(bound)?;
        Ok(cmp(Self::number(subject)?, limit))
    }

    fn bound(bound: Operand<'_>) -> Result<f64> {
        if values::is_empty(bound) {
            return Err(RuleError::MissingOperand {
                operator: "bound".to_string(),
                slot: "valueA",
            });
        }
        Self::number(bound)
    }

    /// 用目录中的模式校验 valueA；空值视为不匹配
    fn pattern_match(&self, operator: OperatorId, a: Operand<'_>) -> Result<bool> {
        let Some(pattern) = operator.definition().pattern else {
            return Ok(false);
        };
        match Self::subject_text(a)? {
            Some(s) => Ok(self.patterns.get_or_compile(pattern)?.is_match(&s)),
            None => Ok(false),
        }
    }

    /// 格式校验的对象：字符串或数字；空值返回 None
    fn subject_text(a: Operand<'_>) -> Result<Option<String>> {
        match a {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            other => Err(RuleError::type_mismatch("string", type_name(other))),
        }
    }

    /// 至少 8 个字符（不含换行），同时包含字母和数字
    fn is_alpha_numeric(s: &str) -> bool {
        !s.contains('\n')
            && s.chars().count() >= 8
            && s.chars().any(|c| c.is_ascii_alphabetic())
            && s.chars().any(|c| c.is_ascii_digit())
    }

    /// 日期检查：常见日期字符串格式，或毫秒时间戳
    fn is_date(a: Operand<'_>) -> bool {
        match a {
            Some(Value::String(s)) => Self::parse_date(s.trim()),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .is_some(),
            _ => false,
        }
    }

    fn parse_date(s: &str) -> bool {
        if s.is_empty() {
            return false;
        }

        // 尝试解析 ISO 8601 格式
        if DateTime::parse_from_rfc3339(s).is_ok() {
            return true;
        }

        const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
        const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

        DATETIME_FORMATS
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
            || DATE_FORMATS
                .iter()
                .any(|f| NaiveDate::parse_from_str(s, f).is_ok())
    }

    /// Luhn 校验，忽略空格和连字符，要求 12-19 位数字
    fn luhn(s: &str) -> bool {
        let mut digits = Vec::with_capacity(19);
        for c in s.chars() {
            match c {
                ' ' | '-' => continue,
                d if d.is_ascii_digit() => digits.push(d as u32 - '0' as u32),
                _ => return false,
            }
        }

        if !(12..=19).contains(&digits.len()) {
            return false;
        }

        let sum: u32 = digits
            .iter()
            .rev()
            .enumerate()
            .map(|(i, &d)| {
                if i % 2 == 1 {
                    let doubled = d * 2;
                    if doubled > 9 { doubled - 9 } else { doubled }
                } else {
                    d
                }
            })
            .sum();

        sum % 10 == 0
    }
}
