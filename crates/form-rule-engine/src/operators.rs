//! 规则操作符定义
//!
//! `OperatorId` 是操作符的封闭枚举；`rule_operations()` 导出给规则编辑器使用的
//! 操作符目录，字段形状（operation/args/message/label/info/pattern）由前端绑定，
//! 不能随意改动。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::RuleError;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorId {
    Required,

    // 通用比较
    Equal,
    NotEqual,

    // 数值比较
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,

    // 包含检查
    In,
    NotIn,

    // 字符串操作
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Match,
    NotMatch,

    // 空值与真值检查
    IsEmpty,
    IsNotEmpty,
    IsTruthy,
    IsFalsy,

    // 长度与数值边界
    MaxLength,
    MinLength,
    MaxValue,
    MinValue,

    // 格式校验
    IsEmail,
    IsUrl,
    IsNumeric,
    IsAlphaNumeric,
    IsAlpha,
    IsDate,
    IsPhone,
    IsZipCode,
    IsCreditCard,

    /// 调用方自定义函数，通用引擎不执行
    Fn,
}

impl OperatorId {
    /// 目录顺序与规则编辑器下拉框顺序一致
    pub const ALL: [OperatorId; 33] = [
        Self::Required,
        Self::Equal,
        Self::NotEqual,
        Self::GreaterThan,
        Self::LessThan,
        Self::GreaterThanOrEqual,
        Self::LessThanOrEqual,
        Self::In,
        Self::NotIn,
        Self::StartsWith,
        Self::NotStartsWith,
        Self::EndsWith,
        Self::NotEndsWith,
        Self::Match,
        Self::NotMatch,
        Self::IsEmpty,
        Self::IsNotEmpty,
        Self::IsTruthy,
        Self::IsFalsy,
        Self::MaxLength,
        Self::MinLength,
        Self::MaxValue,
        Self::MinValue,
        Self::IsEmail,
        Self::IsUrl,
        Self::IsNumeric,
        Self::IsAlphaNumeric,
        Self::IsAlpha,
        Self::IsDate,
        Self::IsPhone,
        Self::IsZipCode,
        Self::IsCreditCard,
        Self::Fn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Equal => "equal",
            Self::NotEqual => "notEqual",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::LessThanOrEqual => "lessThanOrEqual",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::StartsWith => "startsWith",
            Self::NotStartsWith => "notStartsWith",
            Self::EndsWith => "endsWith",
            Self::NotEndsWith => "notEndsWith",
            Self::Match => "match",
            Self::NotMatch => "notMatch",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
            Self::IsTruthy => "isTruthy",
            Self::IsFalsy => "isFalsy",
            Self::MaxLength => "maxLength",
            Self::MinLength => "minLength",
            Self::MaxValue => "maxValue",
            Self::MinValue => "minValue",
            Self::IsEmail => "isEmail",
            Self::IsUrl => "isUrl",
            Self::IsNumeric => "isNumeric",
            Self::IsAlphaNumeric => "isAlphaNumeric",
            Self::IsAlpha => "isAlpha",
            Self::IsDate => "isDate",
            Self::IsPhone => "isPhone",
            Self::IsZipCode => "isZipCode",
            Self::IsCreditCard => "isCreditCard",
            Self::Fn => "fn",
        }
    }

    /// 获取操作符的目录定义
    pub fn definition(&self) -> &'static RuleOperation {
        &DEFINITIONS[self.index()]
    }

    /// 是否需要 `valueB`
    pub fn requires_value_b(&self) -> bool {
        self.definition().args.contains(&"valueB")
    }

    /// 边界类操作符：`valueA` 为边界，被检查的字段值放在 `valueB`
    pub fn is_bound(&self) -> bool {
        matches!(
            self,
            Self::MaxLength | Self::MinLength | Self::MaxValue | Self::MinValue
        )
    }

    /// `ALL` 与变体声明顺序一致
    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperatorId {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| RuleError::UnknownOperator(s.to_string()))
    }
}

/// 规则中引用的操作符
///
/// 未知 id 在解析阶段保留下来，评估时按 `valid: false` 处理，
/// 这样一条写错的规则不会让整份 schema 解析失败。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperatorRef {
    Known(OperatorId),
    Unknown(String),
}

impl OperatorRef {
    pub fn known(&self) -> Option<OperatorId> {
        match self {
            Self::Known(id) => Some(*id),
            Self::Unknown(_) => None,
        }
    }
}

impl From<String> for OperatorRef {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(id) => Self::Known(id),
            Err(_) => Self::Unknown(s),
        }
    }
}

impl From<&str> for OperatorRef {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<OperatorId> for OperatorRef {
    fn from(id: OperatorId) -> Self {
        Self::Known(id)
    }
}

impl From<OperatorRef> for String {
    fn from(op: OperatorRef) -> Self {
        op.to_string()
    }
}

impl fmt::Display for OperatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(id) => write!(f, "{}", id),
            Self::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// 逻辑连接符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Join {
    And,
    Or,
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
        }
    }
}

/// 操作符目录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOperation {
    pub operation: &'static str,
    pub args: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<&'static str>,
}

const A: &[&str] = &["valueA"];
const AB: &[&str] = &["valueA", "valueB"];

const fn entry(
    operation: &'static str,
    args: &'static [&'static str],
    message: Option<&'static str>,
    label: &'static str,
    info: Option<&'static str>,
    pattern: Option<&'static str>,
) -> RuleOperation {
    RuleOperation {
        operation,
        args,
        message,
        label,
        info,
        pattern,
    }
}

/// 与 `OperatorId::ALL` 一一对应
static DEFINITIONS: [RuleOperation; 33] = [
    entry("required", A, Some("This field is required"), "Required", Some("value"), None),
    entry("equal", AB, Some("This field must be equal to {{valueB}}"), "Equal", Some("value"), None),
    entry("notEqual", AB, Some("This field must not be equal to {{valueB}}"), "Not Equal", Some("value"), None),
    entry("greaterThan", AB, Some("This field must be greater than {{valueB}}"), "Greater Than", None, None),
    entry("lessThan", AB, Some("This field must be less than {{valueB}}"), "Less Than", None, None),
    entry(
        "greaterThanOrEqual",
        AB,
        Some("This field must be greater than or equal to {{valueB}}"),
        "Greater Than or Equal",
        None,
        None,
    ),
    entry(
        "lessThanOrEqual",
        AB,
        Some("This field must be less than or equal to {{valueB}}"),
        "Less Than or Equal",
        None,
        None,
    ),
    entry(
        "in",
        AB,
        Some("This field must be in the list of values {{valueB}}"),
        "In",
        Some("value or separated by ,"),
        None,
    ),
    entry(
        "notIn",
        AB,
        Some("This field must not be in the list of values {{valueB}}"),
        "Not In",
        Some("value or separated by ,"),
        None,
    ),
    entry("startsWith", AB, Some("This field must start with {{valueB}}"), "Starts With", Some("value"), None),
    entry(
        "notStartsWith",
        AB,
        Some("This field must not start with {{valueB}}"),
        "Not Starts With",
        Some("value"),
        None,
    ),
    entry("endsWith", AB, Some("This field must end with {{valueB}}"), "Ends With", Some("value"), None),
    entry("notEndsWith", AB, Some("This field must not end with {{valueB}}"), "Not Ends With", Some("value"), None),
    entry("match", AB, Some("This field must match the pattern {{valueB}}"), "Matches", Some("RegEx pattern"), None),
    entry(
        "notMatch",
        AB,
        Some("This field must not match the pattern {{valueB}}"),
        "Not Matches",
        Some("RegEx pattern"),
        None,
    ),
    entry("isEmpty", A, Some("This field must be empty"), "Is Empty", None, None),
    entry("isNotEmpty", A, Some("This field must not be empty"), "Is Not Empty", None, None),
    entry("isTruthy", A, Some("This field must be truthy"), "Is Truthy", None, None),
    entry("isFalsy", A, Some("This field must be falsy"), "Is Falsy", None, None),
    entry("maxLength", A, Some("This field must be at most {{valueA}} characters"), "Max Length", Some("value"), None),
    entry("minLength", A, Some("This field must be at least {{valueA}} characters"), "Min Length", Some("value"), None),
    entry("maxValue", A, Some("This field must be less than or equal to {{valueA}}"), "Max Value", Some("value"), None),
    entry("minValue", A, Some("This field must be greater than or equal to {{valueA}}"), "Min Value", Some("value"), None),
    entry(
        "isEmail",
        A,
        Some("This field must be a valid email address"),
        "Is Email",
        None,
        Some(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"),
    ),
    entry(
        "isUrl",
        A,
        Some("This field must be a valid URL"),
        "Is URL",
        None,
        Some(r"^(http|https)://[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)+([/?].*)?$"),
    ),
    entry("isNumeric", A, Some("This field must be a number"), "Is Numeric", None, Some("^[0-9]+$")),
    entry(
        "isAlphaNumeric",
        A,
        Some("This field must contain both letters and numbers only"),
        "Is Alpha Numeric",
        None,
        Some(r"^(?=.*[A-Za-z])(?=.*\d).{8,}$"),
    ),
    entry("isAlpha", A, Some("This field must contain only letters"), "Is Alpha", None, Some("^[a-zA-Z]+$")),
    entry("isDate", A, Some("This field must be a date"), "Is Date", None, None),
    entry(
        "isPhone",
        A,
        Some("This field must be a valid phone number"),
        "Is Phone",
        None,
        Some("^[0-9]{10,14}$"),
    ),
    entry(
        "isZipCode",
        A,
        Some("This field must be a valid zip code"),
        "Is Zip Code",
        None,
        Some("^[0-9]{5}(?:-[0-9]{4})?$"),
    ),
    entry(
        "isCreditCard",
        A,
        Some("This field must be a valid credit card number"),
        "Is Credit Card",
        None,
        None,
    ),
    entry("fn", A, None, "Custom Function", None, None),
];

static CATALOG: LazyLock<IndexMap<&'static str, RuleOperation>> = LazyLock::new(|| {
    OperatorId::ALL
        .iter()
        .map(|id| (id.as_str(), id.definition().clone()))
        .collect()
});

/// 操作符目录（id → 定义），供规则编辑器渲染下拉框和帮助文本
pub fn rule_operations() -> &'static IndexMap<&'static str, RuleOperation> {
    &CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definitions_align_with_ids() {
        for id in OperatorId::ALL {
            assert_eq!(id.definition().operation, id.as_str());
        }
    }

    #[test]
    fn test_parse_operator_id() {
        assert_eq!("equal".parse::<OperatorId>().unwrap(), OperatorId::Equal);
        assert_eq!(
            "isAlphaNumeric".parse::<OperatorId>().unwrap(),
            OperatorId::IsAlphaNumeric
        );
        assert!("between".parse::<OperatorId>().is_err());
    }

    #[test]
    fn test_operator_ref_keeps_unknown_ids() {
        let op: OperatorRef = serde_json::from_value(json!("between")).unwrap();
        assert_eq!(op, OperatorRef::Unknown("between".to_string()));
        assert_eq!(serde_json::to_value(&op).unwrap(), json!("between"));

        let op: OperatorRef = serde_json::from_value(json!("notIn")).unwrap();
        assert_eq!(op.known(), Some(OperatorId::NotIn));
    }

    #[test]
    fn test_catalog_shape() {
        let catalog = serde_json::to_value(rule_operations()).unwrap();

        assert_eq!(
            catalog["in"],
            json!({
                "operation": "in",
                "args": ["valueA", "valueB"],
                "message": "This field must be in the list of values {{valueB}}",
                "label": "In",
                "info": "value or separated by ,"
            })
        );
        assert_eq!(catalog["isZipCode"]["pattern"], json!("^[0-9]{5}(?:-[0-9]{4})?$"));
        assert_eq!(catalog["fn"], json!({"operation": "fn", "args": ["valueA"], "label": "Custom Function"}));
    }

    #[test]
    fn test_catalog_order() {
        let keys: Vec<_> = rule_operations().keys().copied().collect();
        assert_eq!(keys.first(), Some(&"required"));
        assert_eq!(keys.last(), Some(&"fn"));
        assert_eq!(keys.len(), OperatorId::ALL.len());
    }

    #[test]
    fn test_arity() {
        assert!(OperatorId::Equal.requires_value_b());
        assert!(!OperatorId::IsEmail.requires_value_b());
        assert!(!OperatorId::MaxLength.requires_value_b());
        assert!(OperatorId::MaxLength.is_bound());
    }

    #[test]
    fn test_definitions_follow_declaration_order() {
        for (i, id) in OperatorId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
            assert_eq!(id.definition().operation, id.as_str());
        }
    }
}
