//! Metadata Validator - Completeness checks on a layer's metadata
//!
//! Issues are advisory: they are reported to the user and never block a
//! publish on their own.

use crate::core::metadata::LayerMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One problem found in a metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataIssue {
    /// Section of the record (e.g. "Identification")
    pub section: String,
    pub note: String,
}

impl MetadataIssue {
    fn new(section: &str, note: impl Into<String>) -> Self {
        Self {
            section: section.to_string(),
            note: note.into(),
        }
    }
}

impl fmt::Display for MetadataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.section, self.note)
    }
}

pub struct MetadataValidator;

impl MetadataValidator {
    /// Check a record; an empty list means it is complete
    pub fn validate(metadata: &LayerMetadata) -> Vec<MetadataIssue> {
        let mut issues = Vec::new();

        let required = [
            (&metadata.identifier, "Identifier"),
            (&metadata.title, "Title"),
            (&metadata.abstract_text, "Abstract"),
            (&metadata.language, "Language"),
        ];
        for (value, element) in required {
            if value.trim().is_empty() {
                issues.push(MetadataIssue::new(
                    "Identification",
                    format!("{} element is required.", element),
                ));
            }
        }

        if metadata.all_keywords().is_empty() {
            issues.push(MetadataIssue::new("Keywords", "At least one keyword is required."));
        }

        if metadata.contacts.is_empty() {
            issues.push(MetadataIssue::new("Contacts", "At least one contact is required."));
        }
        for (i, contact) in metadata.contacts.iter().enumerate() {
            if contact.name.trim().is_empty() && contact.organization.trim().is_empty() {
                issues.push(MetadataIssue::new(
                    "Contacts",
                    format!("Contact {} needs a name or an organization.", i + 1),
                ));
            }
        }

        if metadata.licenses.is_empty() {
            issues.push(MetadataIssue::new("Constraints", "A license is required."));
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::{Contact, FREE_KEYWORD_VOCABULARY};

    #[test]
    fn test_empty_record() {
        let issues = MetadataValidator::validate(&LayerMetadata::default());

        assert_eq!(issues.len(), 7);
        assert_eq!(issues[0].to_string(), "Identification: Identifier element is required.");
        assert!(issues.iter().any(|i| i.section == "Constraints"));
    }

    #[test]
    fn test_complete_record() {
        let mut metadata = LayerMetadata {
            identifier: "roads".to_string(),
            title: "Roads".to_string(),
            abstract_text: "All roads".to_string(),
            language: "eng".to_string(),
            contacts: vec![Contact {
                name: "Jo".to_string(),
                ..Default::default()
            }],
            licenses: vec!["CC-BY".to_string()],
            ..Default::default()
        };
        metadata
            .keywords
            .insert(FREE_KEYWORD_VOCABULARY.to_string(), vec!["transport".to_string()]);

        assert!(MetadataValidator::validate(&metadata).is_empty());

        metadata.contacts.push(Contact::default());
        let issues = MetadataValidator::validate(&metadata);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].note, "Contact 2 needs a name or an organization.");
    }
}
