//! Subjects, concept node kinds and review priorities.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::entities::ParseError;

/// Subject used when nothing better can be inferred.
pub const UNSORTED_SUBJECT: &str = "未分类";

/// Canonical subject names.
pub const SUBJECT_CHOICES: &[&str] = &[
    "语文",
    "数学",
    "英语",
    "物理",
    "化学",
    "生物",
    "历史",
    "地理",
    "政治",
    "道德与法治",
    "科学",
    "信息技术",
    "通用技术",
    "体育与健康",
    "音乐",
    "美术",
    "劳动",
    "心理健康",
    "书法",
    "综合实践",
    "研究性学习",
    "校本课程",
    "地方课程",
    "少儿编程",
    "日语",
    "俄语",
    "法语",
    "德语",
    "经济与金融",
    UNSORTED_SUBJECT,
];

/// Alias -> canonical subject. Order matters for containment matching.
const SUBJECT_ALIASES: &[(&str, &str)] = &[
    ("中文", "语文"),
    ("汉语", "语文"),
    ("国文", "语文"),
    ("语文作文", "语文"),
    ("作文", "语文"),
    ("数学(奥数)", "数学"),
    ("奥数", "数学"),
    ("英语口语", "英语"),
    ("英语听力", "英语"),
    ("生物学", "生物"),
    ("历史学", "历史"),
    ("地理学", "地理"),
    ("思想政治", "政治"),
    ("思政", "政治"),
    ("道法", "道德与法治"),
    ("品德与社会", "道德与法治"),
    ("品德与生活", "道德与法治"),
    ("信息科技", "信息技术"),
    ("计算机", "信息技术"),
    ("电脑", "信息技术"),
    ("体育", "体育与健康"),
    ("体育健康", "体育与健康"),
    ("健康", "体育与健康"),
    ("心理", "心理健康"),
    ("综合实践活动", "综合实践"),
    ("编程", "少儿编程"),
    ("其他", UNSORTED_SUBJECT),
    ("其它", UNSORTED_SUBJECT),
];

const SUBJECT_PREFIXES: &[&str] = &["学科：", "科目：", "科目:", "学科:", "subject:", "Subject:"];

/// English hints matched case-insensitively as substrings.
const ENGLISH_HINTS: &[(&str, &str)] = &[
    ("math", "数学"),
    ("english", "英语"),
    ("physics", "物理"),
    ("chem", "化学"),
    ("bio", "生物"),
    ("history", "历史"),
    ("geography", "地理"),
];

/// A canonical subject tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject(String);

impl Subject {
    /// Map a free-text subject hint onto one of [`SUBJECT_CHOICES`].
    pub fn normalize(hint: Option<&str>) -> Self {
        let raw = hint.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Self::unsorted();
        }

        let mut s = raw;
        for prefix in SUBJECT_PREFIXES {
            if let Some(rest) = s.strip_prefix(prefix) {
                s = rest.trim();
                break;
            }
        }

        if let Some(choice) = SUBJECT_CHOICES.iter().find(|c| **c == s) {
            return Self((*choice).to_string());
        }

        if let Some((_, canonical)) = SUBJECT_ALIASES.iter().find(|(alias, _)| *alias == s) {
            return Self((*canonical).to_string());
        }

        let lower = s.to_lowercase();
        if let Some((_, canonical)) = ENGLISH_HINTS.iter().find(|(hint, _)| lower.contains(hint)) {
            return Self((*canonical).to_string());
        }

        if let Some((_, canonical)) = SUBJECT_ALIASES
            .iter()
            .find(|(alias, _)| !alias.is_empty() && s.contains(alias))
        {
            return Self((*canonical).to_string());
        }

        SUBJECT_CHOICES
            .iter()
            .find(|c| **c != UNSORTED_SUBJECT && s.contains(*c))
            .map(|c| Self((*c).to_string()))
            .unwrap_or_else(Self::unsorted)
    }

    /// Wrap a tag that was produced by [`Subject::normalize`] earlier, such as
    /// one read back from storage.
    pub fn from_stored(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn unsorted() -> Self {
        Self(UNSORTED_SUBJECT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kinds of nodes in a student's concept graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Chapter,
    Concept,
    Method,
    /// A recorded, recurring mistake pattern.
    Mistake,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Chapter,
        NodeKind::Concept,
        NodeKind::Method,
        NodeKind::Mistake,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Chapter => "chapter",
            NodeKind::Concept => "concept",
            NodeKind::Method => "method",
            NodeKind::Mistake => "mistake",
        }
    }

    /// Parse model-provided kind text, ignoring case and surrounding noise.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "chapter" | "章节" | "章" => Some(NodeKind::Chapter),
            "concept" | "概念" | "知识点" => Some(NodeKind::Concept),
            "method" | "方法" => Some(NodeKind::Method),
            "mistake" | "易错点" | "错因" => Some(NodeKind::Mistake),
            _ => None,
        }
    }

    /// Whether an existing node of kind `other` may stand in for a node of this kind.
    ///
    /// Concepts and methods are interchangeable; chapters and mistakes only match themselves.
    pub fn is_compatible_with(&self, other: NodeKind) -> bool {
        *self == other
            || matches!(
                (self, other),
                (NodeKind::Concept, NodeKind::Method) | (NodeKind::Method, NodeKind::Concept)
            )
    }
}

impl FromStr for NodeKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s).ok_or_else(|| ParseError::UnknownNodeKind(s.to_string()))
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review urgency bucket. Ordered most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(ParseError::UnknownPriority(other.to_string())),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
