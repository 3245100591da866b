//! Per-chunk extraction results

use crate::chunk::ChunkId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Top-level sections of an extraction fragment and of the assembled record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Technical and contractual requirements
    Requirements,
    /// Unit-price line items
    UnitPrices,
    /// Dated obligations
    Deadlines,
    /// Tables with footnotes
    Tables,
    /// Contact details
    Contact,
    /// Administrative fields (tender number, authority, procedure)
    Administrative,
}

impl Section {
    /// All sections in output order
    pub const ALL: [Section; 6] = [
        Section::Requirements,
        Section::UnitPrices,
        Section::Deadlines,
        Section::Tables,
        Section::Contact,
        Section::Administrative,
    ];

    /// JSON key
    pub fn key(&self) -> &'static str {
        match self {
            Section::Requirements => "requirements",
            Section::UnitPrices => "unit_prices",
            Section::Deadlines => "deadlines",
            Section::Tables => "tables",
            Section::Contact => "contact",
            Section::Administrative => "administrative",
        }
    }

    /// Sections holding a map of scalars instead of a list of records
    pub fn is_scalar_map(&self) -> bool {
        matches!(self, Section::Contact | Section::Administrative)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How one section appears in a fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mention {
    /// Key absent or `null`
    NotMentioned,
    /// `[]`, `{}`, `""` or `0`
    ExplicitlyEmpty,
    /// Holds at least one value
    HasData,
}

impl Mention {
    /// Classify a JSON value
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Mention::NotMentioned,
            Some(Value::Array(a)) if a.is_empty() => Mention::ExplicitlyEmpty,
            Some(Value::Object(o)) if o.is_empty() => Mention::ExplicitlyEmpty,
            Some(Value::String(s)) if s.trim().is_empty() => Mention::ExplicitlyEmpty,
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => Mention::ExplicitlyEmpty,
            Some(_) => Mention::HasData,
        }
    }

    /// Classify a whole section value.
    ///
    /// Containers are walked: `[null]`, `[{}]` and `{"phone": null}` carry no
    /// data and count as explicitly empty.
    pub fn of_section(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| Self::of_section(Some(v)).merge(Mention::ExplicitlyEmpty))
                .fold(Mention::ExplicitlyEmpty, Mention::merge),
            Some(Value::Object(fields)) => fields
                .values()
                .map(|v| Self::of_section(Some(v)).merge(Mention::ExplicitlyEmpty))
                .fold(Mention::ExplicitlyEmpty, Mention::merge),
            other => Self::of(other),
        }
    }

    /// Combine states of the same field across fragments
    pub fn merge(self, other: Mention) -> Mention {
        use Mention::*;
        match (self, other) {
            (HasData, _) | (_, HasData) => HasData,
            (ExplicitlyEmpty, _) | (_, ExplicitlyEmpty) => ExplicitlyEmpty,
            _ => NotMentioned,
        }
    }
}

/// Field entries of a scalar-map section value.
///
/// Objects give their entries, arrays are flattened, and any other non-null
/// value is kept under the key `value`.
pub fn scalar_entries(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Null => Vec::new(),
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items.iter().flat_map(scalar_entries).collect(),
        other => vec![("value".to_string(), other)],
    }
}

/// Outcome of extracting one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    /// A JSON fragment was decoded
    Parsed {
        /// Decoded fragment
        fragment: Value,
        /// Decoded only after truncation repair
        recovered: bool,
        /// Text discarded by the repair
        dropped_suffix: String,
    },
    /// Permanently failed after retries
    Failed {
        /// Last failure
        reason: String,
    },
}

/// Result for one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Chunk the fragment came from
    pub chunk_id: ChunkId,
    /// Parsed fragment or failure
    pub outcome: ExtractionOutcome,
    /// Provider calls made, retries included
    pub attempts: u32,
}

impl ExtractionResult {
    /// Successful clean parse
    pub fn parsed(chunk_id: ChunkId, fragment: Value) -> Self {
        Self {
            chunk_id,
            outcome: ExtractionOutcome::Parsed {
                fragment,
                recovered: false,
                dropped_suffix: String::new(),
            },
            attempts: 1,
        }
    }

    /// Permanent failure
    pub fn failed(chunk_id: ChunkId, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            chunk_id,
            outcome: ExtractionOutcome::Failed {
                reason: reason.into(),
            },
            attempts,
        }
    }

    /// Decoded fragment, if any
    pub fn fragment(&self) -> Option<&Value> {
        match &self.outcome {
            ExtractionOutcome::Parsed { fragment, .. } => Some(fragment),
            ExtractionOutcome::Failed { .. } => None,
        }
    }

    /// True for failures
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Failed { .. })
    }

    /// True when the fragment needed truncation repair
    pub fn is_recovered(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Parsed { recovered: true, .. })
    }

    /// Section value of the fragment
    pub fn section(&self, section: Section) -> Option<&Value> {
        self.fragment().and_then(|f| f.get(section.key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mention_classification() {
        assert_eq!(Mention::of(None), Mention::NotMentioned);
        assert_eq!(Mention::of(Some(&json!(null))), Mention::NotMentioned);
        assert_eq!(Mention::of(Some(&json!([]))), Mention::ExplicitlyEmpty);
        assert_eq!(Mention::of(Some(&json!(0))), Mention::ExplicitlyEmpty);
        assert_eq!(Mention::of(Some(&json!(""))), Mention::ExplicitlyEmpty);
        assert_eq!(Mention::of(Some(&json!(["x"]))), Mention::HasData);
    }

    #[test]
    fn test_section_mention_walks_containers() {
        assert_eq!(Mention::of_section(None), Mention::NotMentioned);
        assert_eq!(Mention::of_section(Some(&json!([null, {}]))), Mention::ExplicitlyEmpty);
        assert_eq!(Mention::of_section(Some(&json!({"phone": null}))), Mention::ExplicitlyEmpty);
        assert_eq!(Mention::of_section(Some(&json!([{"item": "Bread"}]))), Mention::HasData);
        assert_eq!(Mention::of_section(Some(&json!({"phone": "", "fax": "555"}))), Mention::HasData);
    }

    #[test]
    fn test_scalar_entries() {
        let value = json!({"phone": "555", "fax": null});
        let entries = scalar_entries(&value);
        assert_eq!(entries.len(), 2);
        let listed = json!([{"email": "a@b.c"}, "Ankara"]);
        let keys: Vec<String> = scalar_entries(&listed).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["email", "value"]);
        assert!(scalar_entries(&json!(null)).is_empty());
    }

    #[test]
    fn test_mention_merge_prefers_data() {
        assert_eq!(
            Mention::NotMentioned.merge(Mention::ExplicitlyEmpty),
            Mention::ExplicitlyEmpty
        );
        assert_eq!(Mention::ExplicitlyEmpty.merge(Mention::HasData), Mention::HasData);
        assert_eq!(
            Mention::NotMentioned.merge(Mention::NotMentioned),
            Mention::NotMentioned
        );
    }

    #[test]
    fn test_section_lookup() {
        let result = ExtractionResult::parsed(
            ChunkId::from_index(0),
            json!({"unit_prices": [{"item": "Bread"}]}),
        );
        assert!(result.section(Section::UnitPrices).is_some());
        assert!(result.section(Section::Deadlines).is_none());
        assert!(!result.is_failed());
    }
}
