//! Scan data model: references, records and notes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A lightweight pointer to one issue, produced by the collector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub id: String,
    pub url: String,
}

impl Reference {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// A comment attached to an issue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(rename = "date", skip_serializing_if = "Option::is_none")]
    pub date_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Note {
    /// True if no field was found
    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.date_text.is_none() && self.content.is_none()
    }
}

/// The labelled fields read from an issue's detail view
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Category,
    Summary,
    Description,
    StepsToReproduce,
    AdditionalInformation,
    Status,
    Resolution,
    Reporter,
    AssignedTo,
    Priority,
    Severity,
    DateSubmitted,
    LastUpdated,
    Version,
    FixedInVersion,
    TargetVersion,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::Category,
        Field::Summary,
        Field::Description,
        Field::StepsToReproduce,
        Field::AdditionalInformation,
        Field::Status,
        Field::Resolution,
        Field::Reporter,
        Field::AssignedTo,
        Field::Priority,
        Field::Severity,
        Field::DateSubmitted,
        Field::LastUpdated,
        Field::Version,
        Field::FixedInVersion,
        Field::TargetVersion,
    ];

    /// Lowercase label text as shown on the detail view
    pub fn label(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Summary => "summary",
            Self::Description => "description",
            Self::StepsToReproduce => "steps to reproduce",
            Self::AdditionalInformation => "additional information",
            Self::Status => "status",
            Self::Resolution => "resolution",
            Self::Reporter => "reporter",
            Self::AssignedTo => "assigned to",
            Self::Priority => "priority",
            Self::Severity => "severity",
            Self::DateSubmitted => "date submitted",
            Self::LastUpdated => "last updated",
            Self::Version => "version",
            Self::FixedInVersion => "fixed in version",
            Self::TargetVersion => "target version",
        }
    }

    /// Column name in the durable store
    pub fn column(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Summary => "summary",
            Self::Description => "description",
            Self::StepsToReproduce => "steps_to_reproduce",
            Self::AdditionalInformation => "additional_information",
            Self::Status => "status",
            Self::Resolution => "resolution",
            Self::Reporter => "reporter",
            Self::AssignedTo => "assigned_to",
            Self::Priority => "priority",
            Self::Severity => "severity",
            Self::DateSubmitted => "date_submitted",
            Self::LastUpdated => "last_updated",
            Self::Version => "version",
            Self::FixedInVersion => "fixed_in_version",
            Self::TargetVersion => "target_version",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Field values keyed by [`Field`]; absent keys were not found on the page
pub type FieldSet = BTreeMap<Field, String>;

/// A fully resolved issue
///
/// Records are assembled once and never modified afterwards. Every field other
/// than the id, url and scrape time is optional: absent means "not found",
/// which is distinct from an empty value.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    issue_id: String,
    url: String,
    project_id: Option<String>,
    project_name: Option<String>,
    fields: FieldSet,
    notes: Vec<Note>,
    scraped_at: DateTime<Utc>,
}

impl Record {
    /// Assembles a record from extracted data, deriving the project name
    pub fn assemble(
        reference: &Reference,
        project_id: Option<String>,
        fields: FieldSet,
        notes: Vec<Note>,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        let project_name = fields
            .get(&Field::Category)
            .and_then(|category| derive_project_name(category));

        Self {
            issue_id: reference.id.clone(),
            url: reference.url.clone(),
            project_id,
            project_name,
            fields,
            notes,
            scraped_at,
        }
    }

    /// The minimal record produced when extraction failed
    pub fn minimal(reference: &Reference, project_id: Option<String>) -> Self {
        Self::assemble(reference, project_id, FieldSet::new(), Vec::new(), Utc::now())
    }

    /// Rebuilds a record read back from the store
    pub(crate) fn from_stored(
        issue_id: String,
        url: String,
        project_id: Option<String>,
        project_name: Option<String>,
        fields: FieldSet,
        notes: Vec<Note>,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        Self {
            issue_id,
            url,
            project_id,
            project_name,
            fields,
            notes,
            scraped_at,
        }
    }

    pub fn issue_id(&self) -> &str {
        &self.issue_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project_name.as_deref()
    }

    /// Value of a labelled field, if it was found
    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn category(&self) -> Option<&str> {
        self.get(Field::Category)
    }

    pub fn status(&self) -> Option<&str> {
        self.get(Field::Status)
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn scraped_at(&self) -> DateTime<Utc> {
        self.scraped_at
    }

    /// True if no field and no note was extracted
    pub fn is_partial(&self) -> bool {
        self.fields.is_empty() && self.notes.is_empty()
    }
}

/// Derives the project name from a category value
///
/// `"[Cloud Portal] Registration"` yields `"Cloud Portal"`; without a bracketed
/// segment the first whitespace-delimited token is used. An empty category has
/// no project name.
pub fn derive_project_name(category: &str) -> Option<String> {
    if let Some(start) = category.find('[') {
        if let Some(len) = category[start + 1..].find(']') {
            let name = category[start + 1..start + 1 + len].trim();
            return if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            };
        }
    }
    category.split_whitespace().next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_name_from_brackets() {
        assert_eq!(
            derive_project_name("[Cloud Portal] Registration"),
            Some("Cloud Portal".to_string())
        );
        assert_eq!(
            derive_project_name("Misc [ Mobile ] crash"),
            Some("Mobile".to_string())
        );
        assert_eq!(derive_project_name("]x [Foo] Sub"), Some("Foo".to_string()));
    }

    #[test]
    fn test_project_name_first_token() {
        assert_eq!(derive_project_name("Gateway login"), Some("Gateway".to_string()));
        assert_eq!(derive_project_name("  Gateway"), Some("Gateway".to_string()));
    }

    #[test]
    fn test_project_name_empty_category() {
        assert_eq!(derive_project_name(""), None);
        assert_eq!(derive_project_name("   "), None);
    }

    #[test]
    fn test_project_name_unbalanced_brackets_use_first_token() {
        assert_eq!(derive_project_name("a] b [c"), Some("a]".to_string()));
    }

    #[test]
    fn test_assemble_derives_project_name() {
        let reference = Reference::new("42", "https://t.example.com/view.php?id=42");
        let mut fields = FieldSet::new();
        fields.insert(Field::Category, "[Cloud Portal] Registration".to_string());
        fields.insert(Field::Status, "new".to_string());

        let record = Record::assemble(&reference, Some("7".to_string()), fields, vec![], Utc::now());
        assert_eq!(record.issue_id(), "42");
        assert_eq!(record.project_name(), Some("Cloud Portal"));
        assert_eq!(record.project_id(), Some("7"));
        assert_eq!(record.status(), Some("new"));
        assert_eq!(record.get(Field::Severity), None);
        assert!(!record.is_partial());
    }

    #[test]
    fn test_minimal_record() {
        let reference = Reference::new("42", "https://t.example.com/view.php?id=42");
        let record = Record::minimal(&reference, None);
        assert_eq!(record.issue_id(), "42");
        assert_eq!(record.url(), reference.url);
        assert!(record.category().is_none());
        assert!(record.project_name().is_none());
        assert!(record.is_partial());
    }

    #[test]
    fn test_note_serializes_without_absent_fields() {
        let note = Note {
            author: Some("alice (developer)".to_string()),
            date_text: None,
            content: Some("Reproduced on build 12".to_string()),
        };
        let json = serde_json::to_string(&note).unwrap();
        assert_eq!(
            json,
            r#"{"author":"alice (developer)","content":"Reproduced on build 12"}"#
        );
        assert!(Note::default().is_empty());
    }

    #[test]
    fn test_field_vocabulary_is_complete() {
        assert_eq!(Field::ALL.len(), 16);
        assert_eq!(Field::StepsToReproduce.column(), "steps_to_reproduce");
        assert_eq!(Field::FixedInVersion.label(), "fixed in version");
    }
}
