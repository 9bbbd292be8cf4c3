use regex::Regex;
use study_model::NodeKind;

use crate::error::ConfigError;

/// Decides the kind of a newly created node.
#[derive(Debug, Clone)]
pub struct KindClassifier {
    chapter_patterns: Vec<Regex>,
}

impl KindClassifier {
    /// Compile the chapter-name patterns.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let chapter_patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { chapter_patterns })
    }

    pub fn looks_like_chapter(&self, label: &str) -> bool {
        let label = label.trim();
        self.chapter_patterns.iter().any(|re| re.is_match(label))
    }

    /// An explicit hint wins, then the chapter heuristic, then `Concept`.
    pub fn classify(&self, label: &str, hint: Option<NodeKind>) -> NodeKind {
        match hint {
            Some(kind) => kind,
            None if self.looks_like_chapter(label) => NodeKind::Chapter,
            None => NodeKind::Concept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;

    fn classifier() -> KindClassifier {
        KindClassifier::new(&ResolverConfig::default().chapter_patterns).unwrap()
    }

    #[test]
    fn test_chapter_heuristics() {
        let c = classifier();
        assert!(c.looks_like_chapter("第二章 二次函数"));
        assert!(c.looks_like_chapter("第3单元"));
        assert!(c.looks_like_chapter("Unit 4 Reading"));
        assert!(c.looks_like_chapter("一元二次方程章节"));
        assert!(!c.looks_like_chapter("二次函数顶点式"));
        assert!(!c.looks_like_chapter("unite"));
    }

    #[test]
    fn test_hint_wins() {
        let c = classifier();
        assert_eq!(c.classify("第二章", Some(NodeKind::Mistake)), NodeKind::Mistake);
        assert_eq!(c.classify("第二章", None), NodeKind::Chapter);
        assert_eq!(c.classify("配方法", None), NodeKind::Concept);
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let err = KindClassifier::new(&["(unclosed".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { .. }));
    }
}
