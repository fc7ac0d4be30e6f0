//! HL7消息模型
//!
//! 消息构造后不可变。段按出现顺序保存，段类型索引是派生的多值映射
//! （同类型段可以出现多次，例如多个OBX）。字段只在顶层切分，
//! 组件、重复、子组件在调用方请求时才切分。

use super::delimiters::HEADER_TAG;
use super::escape::unescape;
use super::Delimiters;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// 消息类型 (MSH-9)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MessageType {
    /// 消息代码，如 ORM
    pub code: String,
    /// 触发事件，如 O01
    pub trigger: Option<String>,
    /// 消息结构，如 ORM_O01
    pub structure: Option<String>,
}

impl MessageType {
    pub(crate) fn from_field(field: &Field<'_>) -> Option<Self> {
        let code = field.component(1).filter(|c| !c.is_empty())?;
        let non_empty = |n: usize| {
            field
                .component(n)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            code: code.to_string(),
            trigger: non_empty(2),
            structure: non_empty(3),
        })
    }

    /// 规则表使用的键：`CODE^TRIGGER`，与消息声明的组件分隔符无关
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.trigger {
            Some(trigger) => write!(f, "{}^{}", self.code, trigger),
            None => write!(f, "{}", self.code),
        }
    }
}

/// 字段视图
///
/// MSH-1 和 MSH-2 承载分隔符本身，按字面值处理，不再切分。
#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    raw: &'a str,
    delimiters: &'a Delimiters,
    literal: bool,
}

impl<'a> Field<'a> {
    pub fn new(raw: &'a str, delimiters: &'a Delimiters) -> Self {
        Self {
            raw,
            delimiters,
            literal: false,
        }
    }

    pub fn as_str(&self) -> &'a str {
        self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// 按重复分隔符切分
    pub fn repetitions(&self) -> Vec<Field<'a>> {
        if self.literal {
            return vec![*self];
        }
        self.raw
            .split(self.delimiters.repetition)
            .map(|raw| Field::new(raw, self.delimiters))
            .collect()
    }

    /// 第一个重复的组件
    pub fn components(&self) -> Vec<&'a str> {
        if self.literal {
            return vec![self.raw];
        }
        self.first_repetition()
            .split(self.delimiters.component)
            .collect()
    }

    /// 第n个组件（从1开始）
    pub fn component(&self, n: usize) -> Option<&'a str> {
        if n == 0 {
            return None;
        }
        if self.literal {
            return (n == 1).then_some(self.raw);
        }
        self.first_repetition()
            .split(self.delimiters.component)
            .nth(n - 1)
    }

    /// 第n个组件的子组件
    pub fn sub_components(&self, n: usize) -> Vec<&'a str> {
        match self.component(n) {
            Some(component) if !self.literal => {
                component.split(self.delimiters.subcomponent).collect()
            }
            Some(component) => vec![component],
            None => Vec::new(),
        }
    }

    /// 解码转义序列后的字段文本
    pub fn decoded(&self) -> Cow<'a, str> {
        if self.literal {
            return Cow::Borrowed(self.raw);
        }
        unescape(self.raw, self.delimiters)
    }

    fn first_repetition(&self) -> &'a str {
        self.raw
            .split(self.delimiters.repetition)
            .next()
            .unwrap_or(self.raw)
    }
}

/// HL7段
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// 位置0为段标识，其余位置为字段
    fields: Vec<String>,
    #[serde(skip)]
    delimiters: Delimiters,
}

impl Segment {
    pub(crate) fn new(fields: Vec<String>, delimiters: Delimiters) -> Self {
        Self { fields, delimiters }
    }

    /// 段类型，如 PID
    pub fn tag(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or_default()
    }

    pub fn is_header(&self) -> bool {
        self.tag() == HEADER_TAG
    }

    /// 第n个字段的原始文本；空字段返回 `Some("")`，不存在返回 `None`
    pub fn field(&self, position: usize) -> Option<&str> {
        if position == 0 {
            return None;
        }
        self.fields.get(position).map(String::as_str)
    }

    /// 第n个字段的视图，用于按需切分组件
    pub fn field_ref(&self, position: usize) -> Option<Field<'_>> {
        let raw = self.field(position)?;
        let literal = self.is_header() && position <= 2;
        Some(Field {
            raw,
            delimiters: &self.delimiters,
            literal,
        })
    }

    /// 最后一个字段的位置
    pub fn field_count(&self) -> usize {
        self.fields.len().saturating_sub(1)
    }

    /// 原始字段列表，包含位置0的段标识
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// 解析后的HL7消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    message_type: MessageType,
    delimiters: Delimiters,
    segments: Vec<Segment>,
    #[serde(skip)]
    index: HashMap<String, Vec<usize>>,
}

impl Message {
    /// 由解析器构造，`segments` 的第一个元素必须是MSH
    pub(crate) fn new(message_type: MessageType, delimiters: Delimiters, segments: Vec<Segment>) -> Self {
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, segment) in segments.iter().enumerate() {
            index.entry(segment.tag().to_string()).or_default().push(position);
        }

        Self {
            message_type,
            delimiters,
            segments,
            index,
        }
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// MSH段
    pub fn header(&self) -> &Segment {
        &self.segments[0]
    }

    /// 指定类型的所有段，按出现顺序
    pub fn segment(&self, tag: &str) -> Vec<&Segment> {
        self.segment_positions(tag)
            .iter()
            .map(|&position| &self.segments[position])
            .collect()
    }

    /// 指定类型的第一个段
    pub fn first_segment(&self, tag: &str) -> Option<&Segment> {
        self.segment_positions(tag)
            .first()
            .map(|&position| &self.segments[position])
    }

    /// 指定类型的段在消息中的位置
    pub fn segment_positions(&self, tag: &str) -> &[usize] {
        self.index.get(tag).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains_segment(&self, tag: &str) -> bool {
        self.index.contains_key(tag)
    }

    /// 消息中出现过的段类型（去重，按首次出现顺序）
    pub fn segment_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::with_capacity(self.index.len());
        for segment in &self.segments {
            if !types.contains(&segment.tag()) {
                types.push(segment.tag());
            }
        }
        types
    }

    /// 指定类型第一个段的字段
    pub fn field(&self, tag: &str, position: usize) -> Option<&str> {
        self.first_segment(tag)?.field(position)
    }

    fn header_field(&self, position: usize) -> Option<&str> {
        self.header().field(position).filter(|value| !value.is_empty())
    }

    /// 发送应用 (MSH-3)
    pub fn sending_application(&self) -> Option<&str> {
        self.header_field(3)
    }

    /// 发送机构 (MSH-4)
    pub fn sending_facility(&self) -> Option<&str> {
        self.header_field(4)
    }

    /// 接收应用 (MSH-5)
    pub fn receiving_application(&self) -> Option<&str> {
        self.header_field(5)
    }

    /// 接收机构 (MSH-6)
    pub fn receiving_facility(&self) -> Option<&str> {
        self.header_field(6)
    }

    /// 消息时间 (MSH-7)
    pub fn timestamp(&self) -> Option<&str> {
        self.header_field(7)
    }

    /// 消息控制ID (MSH-10)
    pub fn control_id(&self) -> Option<&str> {
        self.header_field(10)
    }

    /// 处理ID (MSH-11)
    pub fn processing_id(&self) -> Option<&str> {
        self.header_field(11)
    }

    /// 版本号 (MSH-12)
    pub fn version(&self) -> Option<&str> {
        self.header_field(12)
    }
}
