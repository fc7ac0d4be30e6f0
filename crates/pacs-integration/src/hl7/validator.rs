//! HL7结构校验
//!
//! 解析失败（无法构造消息）与校验失败（消息已构造但不符合规则）分开处理：
//! 前者立即返回单条错误，后者全部累积后返回。

use super::{Hl7Error, Hl7Parser, Message};
use pacs_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// 单条必需段规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRule {
    /// 消息类型，格式为 `CODE^TRIGGER`
    pub message_type: String,
    /// 至少出现一次的段类型
    pub segments: Vec<String>,
}

impl SegmentRule {
    pub fn new(message_type: &str, segments: &[&str]) -> Self {
        Self {
            message_type: message_type.to_string(),
            segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// 必需段规则表
///
/// 只列出有更严格要求的已知消息类型；不在表中的类型不做段存在性检查。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SegmentRule>", into = "Vec<SegmentRule>")]
pub struct RequiredSegmentRules {
    rules: BTreeMap<String, Vec<String>>,
}

impl Default for RequiredSegmentRules {
    fn default() -> Self {
        Self::from(vec![
            SegmentRule::new("ORM^O01", &["MSH", "PID", "ORC", "OBR"]),
            SegmentRule::new("ORU^R01", &["MSH", "PID", "OBR", "OBX"]),
            SegmentRule::new("MDM^T02", &["MSH", "EVN", "PID", "PV1", "TXA"]),
        ])
    }
}

impl RequiredSegmentRules {
    /// 空规则表
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// 添加或替换一条规则，段类型保持声明顺序并去重
    pub fn insert(&mut self, rule: SegmentRule) {
        let mut segments: Vec<String> = Vec::with_capacity(rule.segments.len());
        for segment in rule.segments {
            if !segments.contains(&segment) {
                segments.push(segment);
            }
        }
        self.rules.insert(rule.message_type, segments);
    }

    pub fn with_rule(mut self, rule: SegmentRule) -> Self {
        self.insert(rule);
        self
    }

    /// 用另一张表中的规则覆盖同名规则
    pub fn merge(&mut self, other: RequiredSegmentRules) {
        self.rules.extend(other.rules);
    }

    pub fn required_for(&self, message_type: &str) -> Option<&[String]> {
        self.rules.get(message_type).map(Vec::as_slice)
    }

    /// 已配置规则的消息类型
    pub fn message_types(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<Vec<SegmentRule>> for RequiredSegmentRules {
    fn from(rules: Vec<SegmentRule>) -> Self {
        let mut table = Self::empty();
        for rule in rules {
            table.insert(rule);
        }
        table
    }
}

impl From<RequiredSegmentRules> for Vec<SegmentRule> {
    fn from(table: RequiredSegmentRules) -> Self {
        table
            .rules
            .into_iter()
            .map(|(message_type, segments)| SegmentRule {
                message_type,
                segments,
            })
            .collect()
    }
}

/// 校验诊断
#[derive(Debug, Clone, PartialEq, Eq)]
enum Diagnostic {
    MissingRequiredSegment(String),
    UnrecognizedSegmentTag(String),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingRequiredSegment(tag) => write!(f, "MissingRequiredSegment({})", tag),
            Diagnostic::UnrecognizedSegmentTag(tag) => write!(f, "UnrecognizedSegmentTag({})", tag),
        }
    }
}

/// 验证结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// 是否通过验证
    pub is_valid: bool,
    /// 验证错误列表，按发现顺序
    pub errors: Vec<String>,
    /// 验证警告列表，不影响 `is_valid`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    /// 创建新的验证结果
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// 解析失败对应的单条错误结果
    pub fn parse_failure(error: &Hl7Error) -> Self {
        let mut result = Self::new();
        result.add_error(error.to_string());
        result
    }

    /// 添加错误
    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// 获取验证报告摘要
    pub fn get_summary(&self) -> String {
        if self.is_valid {
            if self.has_warnings() {
                format!("Validation passed with {} warning(s)", self.warnings.len())
            } else {
                "Validation passed".to_string()
            }
        } else {
            format!("Validation failed: {}", self.errors.join("; "))
        }
    }

    /// 序列化为JSON，供HTTP层返回
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 解析并校验的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Hl7Outcome {
    /// 无法构造消息
    ParseFailure(Hl7Error),
    /// 消息已构造，附带校验诊断
    Validated {
        message: Message,
        result: ValidationResult,
    },
}

impl Hl7Outcome {
    pub fn is_valid(&self) -> bool {
        match self {
            Hl7Outcome::ParseFailure(_) => false,
            Hl7Outcome::Validated { result, .. } => result.is_valid,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            Hl7Outcome::ParseFailure(_) => None,
            Hl7Outcome::Validated { message, .. } => Some(message),
        }
    }

    /// 扁平化为验证结果
    pub fn result(&self) -> ValidationResult {
        match self {
            Hl7Outcome::ParseFailure(error) => ValidationResult::parse_failure(error),
            Hl7Outcome::Validated { result, .. } => result.clone(),
        }
    }
}

/// HL7结构校验器
#[derive(Debug, Clone, Default)]
pub struct Hl7Validator {
    parser: Hl7Parser,
    rules: RequiredSegmentRules,
}

impl Hl7Validator {
    /// 使用给定规则表创建校验器
    pub fn new(rules: RequiredSegmentRules) -> Self {
        Self {
            parser: Hl7Parser::new(),
            rules,
        }
    }

    pub fn rules(&self) -> &RequiredSegmentRules {
        &self.rules
    }

    /// 校验已解析的消息，所有规则都会被执行
    pub fn validate(&self, message: &Message) -> ValidationResult {
        let mut result = ValidationResult::new();
        let message_type = message.message_type().key();

        match self.rules.required_for(&message_type) {
            Some(required) => {
                for tag in required {
                    if !message.contains_segment(tag) {
                        result.add_error(Diagnostic::MissingRequiredSegment(tag.clone()).to_string());
                    }
                }
            }
            None => {
                debug!("No segment rules for message type {}", message_type);
            }
        }

        for segment in message.segments().iter().skip(1) {
            if !is_valid_segment_tag(segment.tag()) {
                result.add_warning(Diagnostic::UnrecognizedSegmentTag(segment.tag().to_string()).to_string());
            }
        }

        if result.is_valid {
            info!("HL7 message {} passed validation", message_type);
        } else {
            warn!("HL7 message {} failed validation: {:?}", message_type, result.errors);
        }

        result
    }

    /// 解析并校验消息文本
    pub fn check(&self, text: &str) -> Hl7Outcome {
        match self.parser.parse(text) {
            Ok(message) => {
                let result = self.validate(&message);
                Hl7Outcome::Validated { message, result }
            }
            Err(error) => {
                warn!("HL7 message could not be parsed: {}", error);
                Hl7Outcome::ParseFailure(error)
            }
        }
    }

    /// 解析并校验消息文本，返回扁平的验证结果
    pub fn validate_message(&self, text: &str) -> ValidationResult {
        self.check(text).result()
    }
}

/// 段标识：三个字符，首字符为大写字母，其余为大写字母或数字
fn is_valid_segment_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    bytes.len() == 3
        && bytes[0].is_ascii_uppercase()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "MSH|^~\\&|HIS|HOSPITAL|RIS|RADIOLOGY|20241215143000||ORM^O01|MSG001|P|2.5";
    const PID: &str = "PID|1||12345^^^HOSPITAL^MR||ALBADR^AHMED^MOHAMMAD||19850312|M";
    const ORC: &str = "ORC|NW|ORD001";
    const OBR: &str = "OBR|1|ORD001";

    fn order(segments: &[&str]) -> String {
        let mut lines = vec![HEADER];
        lines.extend_from_slice(segments);
        lines.join("\r")
    }

    #[test]
    fn test_complete_order_is_valid() {
        let result = Hl7Validator::default().validate_message(&order(&[PID, ORC, OBR]));
        assert_eq!(
            result,
            ValidationResult {
                is_valid: true,
                errors: vec![],
                warnings: vec![],
            }
        );
    }

    #[test]
    fn test_each_missing_segment_reported_once() {
        let validator = Hl7Validator::default();

        let cases = [
            (order(&[ORC, OBR]), "MissingRequiredSegment(PID)"),
            (order(&[PID, OBR]), "MissingRequiredSegment(ORC)"),
            (order(&[PID, ORC]), "MissingRequiredSegment(OBR)"),
        ];
        for (text, expected) in cases {
            let result = validator.validate_message(&text);
            assert!(!result.is_valid);
            assert_eq!(result.errors, vec![expected.to_string()]);
        }
    }

    #[test]
    fn test_errors_accumulate_in_rule_order() {
        let result = Hl7Validator::default().validate_message(&order(&[ORC]));
        assert_eq!(
            result.errors,
            vec![
                "MissingRequiredSegment(PID)".to_string(),
                "MissingRequiredSegment(OBR)".to_string(),
            ]
        );
    }

    #[test]
    fn test_repeated_segments_count_once() {
        let text = order(&[PID, ORC, OBR, ORC, OBR]);
        assert!(Hl7Validator::default().validate_message(&text).is_valid);
    }

    #[test]
    fn test_unknown_message_type_is_accepted() {
        let text = "MSH|^~\\&|HIS|HOSPITAL|RIS|RADIOLOGY|20241215143000||ZZZ^Z01|MSG001|P|2.5";
        let result = Hl7Validator::default().validate_message(text);
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_parse_failures_are_single_errors() {
        let validator = Hl7Validator::default();

        assert_eq!(validator.validate_message("").errors, vec!["EmptyMessage".to_string()]);
        assert_eq!(
            validator.validate_message("PID|1\rORC|NW").errors,
            vec!["MissingHeader(PID)".to_string()]
        );

        let short = validator.validate_message("MSH|^~\\&|HIS|HOSPITAL");
        assert!(!short.is_valid);
        assert_eq!(short.error_count(), 1);
        assert!(short.errors[0].starts_with("InvalidHeader"));

        let outcome = validator.check("MSH|^~\\&|HIS|HOSPITAL|RIS|RADIOLOGY|20241215143000||");
        assert_eq!(outcome, Hl7Outcome::ParseFailure(Hl7Error::MissingMessageType));
        assert!(outcome.message().is_none());
    }

    #[test]
    fn test_invalid_message_is_still_returned() {
        let outcome = Hl7Validator::default().check(&order(&[PID, OBR]));
        assert!(!outcome.is_valid());

        let message = outcome.message().unwrap();
        assert_eq!(message.field("PID", 3), Some("12345^^^HOSPITAL^MR"));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let validator = Hl7Validator::default();
        let text = order(&[PID]);
        let message = Hl7Parser::new().parse(&text).unwrap();

        assert_eq!(validator.validate(&message), validator.validate(&message));
        assert_eq!(validator.validate_message(&text), validator.validate_message(&text));
    }

    #[test]
    fn test_custom_rules() {
        let rules = RequiredSegmentRules::empty().with_rule(SegmentRule::new("ZZZ^Z01", &["MSH", "ZDS", "ZDS"]));
        assert_eq!(rules.required_for("ZZZ^Z01").unwrap(), &["MSH".to_string(), "ZDS".to_string()]);

        let validator = Hl7Validator::new(rules);
        let text = "MSH|^~\\&|HIS|HOSPITAL|RIS|RADIOLOGY|20241215143000||ZZZ^Z01|MSG001|P|2.5";
        assert_eq!(validator.validate_message(text).errors, vec!["MissingRequiredSegment(ZDS)".to_string()]);

        // 旧规则表不认识的类型不会被拒绝
        assert!(validator.validate_message(&order(&[])).is_valid);
    }

    #[test]
    fn test_default_result_rule() {
        let validator = Hl7Validator::default();
        let header = "MSH|^~\\&|LAB|HOSPITAL|RIS|RADIOLOGY|20241215143000||ORU^R01|MSG002|P|2.5";

        let complete = [header, PID, OBR, "OBX|1|TX|FINDING||Caries detected"].join("\r");
        assert!(validator.validate_message(&complete).is_valid);

        let without_obx = [header, PID, OBR].join("\r");
        assert_eq!(
            validator.validate_message(&without_obx).errors,
            vec!["MissingRequiredSegment(OBX)".to_string()]
        );
    }

    #[test]
    fn test_default_document_rule() {
        let validator = Hl7Validator::default();
        let header = "MSH|^~\\&|HIS|HOSPITAL|RIS|RADIOLOGY|20241215143000||MDM^T02|MSG003|P|2.5";
        let evn = "EVN|T02|20241215143000";
        let pv1 = "PV1|1|O";
        let txa = "TXA|1|RAD|TX";

        let complete = [header, evn, PID, pv1, txa].join("\r");
        assert!(validator.validate_message(&complete).is_valid);

        let without_evn_and_txa = [header, PID, pv1].join("\r");
        assert_eq!(
            validator.validate_message(&without_evn_and_txa).errors,
            vec![
                "MissingRequiredSegment(EVN)".to_string(),
                "MissingRequiredSegment(TXA)".to_string(),
            ]
        );

        let without_pv1 = [header, evn, PID, txa].join("\r");
        assert_eq!(
            validator.validate_message(&without_pv1).errors,
            vec!["MissingRequiredSegment(PV1)".to_string()]
        );
    }

    #[test]
    fn test_default_rule_table() {
        let rules = RequiredSegmentRules::default();
        assert_eq!(rules.required_for("ORM^O01").unwrap(), &["MSH", "PID", "ORC", "OBR"]);
        assert_eq!(rules.required_for("ORU^R01").unwrap(), &["MSH", "PID", "OBR", "OBX"]);
        assert_eq!(rules.required_for("MDM^T02").unwrap(), &["MSH", "EVN", "PID", "PV1", "TXA"]);
    }

    #[test]
    fn test_merge_rules() {
        let mut rules = RequiredSegmentRules::default();
        rules.merge(RequiredSegmentRules::from(vec![SegmentRule::new("ORM^O01", &["MSH", "PID"])]));

        assert_eq!(rules.len(), 3);
        assert_eq!(rules.required_for("ORM^O01").unwrap().len(), 2);
    }

    #[test]
    fn test_segment_tag_warnings() {
        let text = order(&[PID, ORC, OBR, "ZX|custom", "obx|1"]);
        let result = Hl7Validator::default().validate_message(&text);

        assert!(result.is_valid);
        assert_eq!(
            result.warnings,
            vec!["UnrecognizedSegmentTag(ZX)".to_string(), "UnrecognizedSegmentTag(obx)".to_string()]
        );
        assert!(is_valid_segment_tag("PV1"));
        assert!(is_valid_segment_tag("ZDS"));
        assert!(!is_valid_segment_tag("1AB"));
    }

    #[test]
    fn test_result_json() {
        let result = Hl7Validator::default().validate_message(&order(&[PID, OBR]));
        let json = result.to_json().unwrap();
        assert_eq!(json, r#"{"is_valid":false,"errors":["MissingRequiredSegment(ORC)"]}"#);
        assert!(result.get_summary().contains("MissingRequiredSegment(ORC)"));
    }

    #[test]
    fn test_rules_serde_as_list() {
        let json = serde_json::to_value(RequiredSegmentRules::default()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 3);

        let rules: RequiredSegmentRules = serde_json::from_value(serde_json::json!([
            { "message_type": "ADT^A01", "segments": ["MSH", "EVN", "PID"] }
        ]))
        .unwrap();
        assert_eq!(rules.required_for("ADT^A01").unwrap().len(), 3);
    }
}
