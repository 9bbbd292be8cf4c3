//! Evidence Extractor - normalizes one artifact and its model analysis into a
//! [`DiagnosisRecord`].
//!
//! Raw model text never leaves this module. Everything downstream sees the
//! strict record schema: clamped confidence, validated spans, non-empty items.

pub mod lenient;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use study_model::{Artifact, NodeKind, SourceType, Subject};
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
use crate::knowledge_base::{label, DiagnosisRecord, EvidenceSpan, MistakeItem, Verdict};

/// Full-width colon separating a summary heading from its body.
const HEADING_SEPARATOR: char = '：';

/// Characters kept when a summary point has no heading.
const HEADING_FALLBACK_CHARS: usize = 12;

pub struct EvidenceExtractor {
    config: ExtractorConfig,
}

impl EvidenceExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ExtractorConfig::default())
    }

    /// Build a record from an artifact and the raw analysis text produced for it.
    ///
    /// Never fails: output with no recoverable object yields an `Unparsed`
    /// record with no items.
    pub fn extract(&self, artifact: &Artifact, raw: &str, now: DateTime<Utc>) -> DiagnosisRecord {
        let Some(object) = lenient::parse_object(raw) else {
            warn!(
                artifact = %artifact.reference,
                raw_chars = raw.chars().count(),
                "analysis has no structured object"
            );
            return DiagnosisRecord::new(
                artifact.student,
                artifact.reference,
                Subject::normalize(artifact.subject_hint.as_deref()),
                Verdict::Unparsed,
                self.config.fallback_confidence,
                now,
            );
        };

        let subject = Subject::normalize(
            artifact
                .subject_hint
                .as_deref()
                .or_else(|| object.get("subject").and_then(Value::as_str)),
        );
        let confidence = parse_confidence(object.get("confidence"))
            .unwrap_or(self.config.fallback_confidence);
        let items = self.collect_items(artifact, &object);
        let verdict = verdict_from(&object, &items);

        debug!(
            artifact = %artifact.reference,
            items = items.len(),
            confidence,
            "analysis extracted"
        );

        DiagnosisRecord::new(
            artifact.student,
            artifact.reference,
            subject,
            verdict,
            confidence,
            now,
        )
        .with_items(items)
    }

    /// Record shown when the analysis could not be fetched at all.
    pub fn error_record(&self, artifact: &Artifact, now: DateTime<Utc>) -> DiagnosisRecord {
        DiagnosisRecord::new(
            artifact.student,
            artifact.reference,
            Subject::normalize(artifact.subject_hint.as_deref()),
            Verdict::Error,
            0.0,
            now,
        )
    }

    fn collect_items(&self, artifact: &Artifact, object: &Map<String, Value>) -> Vec<MistakeItem> {
        let mut items = Vec::new();
        let mut mistake_keys = HashSet::new();
        let mut labels = HashSet::new();

        for entry in array(object, "mistakes") {
            let Some(fields) = entry.as_object() else {
                debug!("dropping non-object mistake entry");
                continue;
            };
            let Some(item) = mistake_item(artifact, fields) else {
                debug!("dropping mistake entry without concept or reason");
                continue;
            };
            let normalized = label::normalize(&item.concept_label, usize::MAX);
            if !mistake_keys.insert((normalized.clone(), item.reason.clone())) {
                continue;
            }
            if !normalized.is_empty() {
                labels.insert(normalized);
            }
            items.push(item);
        }

        let mut terms: Vec<String> = array(object, "key_terms")
            .iter()
            .chain(array(object, "key_points"))
            .filter_map(text_of)
            .collect();
        if terms.is_empty() && artifact.reference.source_type == SourceType::Note {
            terms = array(object, "summary_points")
                .iter()
                .filter_map(text_of)
                .map(|point| summary_heading(&point))
                .collect();
        }

        for term in terms {
            let normalized = label::normalize(&term, usize::MAX);
            if normalized.is_empty() || !labels.insert(normalized) {
                continue;
            }
            items.push(MistakeItem::key_term(term));
        }

        if items.len() > self.config.max_items {
            debug!(
                kept = self.config.max_items,
                dropped = items.len() - self.config.max_items,
                "truncating extracted items"
            );
            items.truncate(self.config.max_items);
        }
        items
    }
}

fn mistake_item(artifact: &Artifact, fields: &Map<String, Value>) -> Option<MistakeItem> {
    let concept = field(fields, "concept");
    let reason = field(fields, "reason");
    if concept.is_empty() && reason.is_empty() {
        return None;
    }

    let mut item = MistakeItem::new(concept)
        .with_reason(reason)
        .with_correct_approach(field(fields, "correct_approach"));

    if let Some(kind) = fields
        .get("kind")
        .and_then(Value::as_str)
        .and_then(NodeKind::parse_lenient)
    {
        item = item.with_kind_hint(kind);
    }

    let quoted = field(fields, "evidence");
    let span = fields
        .get("span")
        .and_then(|raw| span_from(raw, &artifact.text))
        .or_else(|| locate(&artifact.text, &quoted));
    match span {
        Some(span) => item = item.with_evidence(span),
        None if fields.contains_key("span") || !quoted.is_empty() => {
            debug!(artifact = %artifact.reference, "evidence span outside artifact text, dropped");
        }
        None => {}
    }
    Some(item)
}

/// Parse a confidence value: a number, a numeric string, or a percentage.
///
/// Values in (1, 100] are read as percentages. Returns `None` when absent or
/// not a finite number.
pub fn parse_confidence(value: Option<&Value>) -> Option<f64> {
    let (number, percent) = match value? {
        Value::Number(n) => (n.as_f64()?, false),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(body) => (body.trim().parse::<f64>().ok()?, true),
                None => (s.parse::<f64>().ok()?, false),
            }
        }
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    let scaled = if percent || (number > 1.0 && number <= 100.0) {
        number / 100.0
    } else {
        number
    };
    Some(scaled.clamp(0.0, 1.0))
}

fn verdict_from(object: &Map<String, Value>, items: &[MistakeItem]) -> Verdict {
    let stated = field(object, "verdict");
    if !stated.is_empty() {
        return Verdict::Stated(stated);
    }
    let first_reason = items
        .iter()
        .map(|i| i.reason.as_str())
        .find(|r| !r.is_empty())
        .unwrap_or_default();
    Verdict::Stated(first_reason.to_string())
}

/// `[start, end]` or `{start, end}` in characters, end exclusive.
fn span_from(raw: &Value, text: &str) -> Option<EvidenceSpan> {
    let (start, end) = match raw {
        Value::Array(bounds) if bounds.len() == 2 => (bounds[0].as_u64()?, bounds[1].as_u64()?),
        Value::Object(bounds) => (bounds.get("start")?.as_u64()?, bounds.get("end")?.as_u64()?),
        _ => return None,
    };
    let (start, end) = (usize::try_from(start).ok()?, usize::try_from(end).ok()?);
    if start >= end || end > text.chars().count() {
        return None;
    }
    Some(EvidenceSpan {
        start,
        end,
        text: text.chars().skip(start).take(end - start).collect(),
    })
}

/// Find a quoted snippet in the artifact text.
fn locate(text: &str, quoted: &str) -> Option<EvidenceSpan> {
    if quoted.is_empty() {
        return None;
    }
    let byte_start = text.find(quoted)?;
    let start = text[..byte_start].chars().count();
    Some(EvidenceSpan {
        start,
        end: start + quoted.chars().count(),
        text: quoted.to_string(),
    })
}

fn summary_heading(point: &str) -> String {
    match point.split_once(HEADING_SEPARATOR) {
        Some((head, _)) => head.trim().to_string(),
        None => point.chars().take(HEADING_FALLBACK_CHARS).collect(),
    }
}

fn field(object: &Map<String, Value>, key: &str) -> String {
    object.get(key).and_then(text_of).unwrap_or_default()
}

fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn array<'a>(object: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}
