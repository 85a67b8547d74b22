//! Publish Validator - Blocking checks before any publish attempt
//!
//! Name checks run first, then the selected servers add their own issues to
//! the same set. Validation never touches server state.
//!
//! # Example
//!
//! ```
//! use layer_publisher::core::traits::ValidationErrors;
//! use layer_publisher::validation::PublishValidator;
//!
//! let mut errors = ValidationErrors::new();
//! PublishValidator::check_names(&["roads#1", "roads#1"], &mut errors);
//!
//! assert!(errors.contains("Unsupported character in layer name: #"));
//! assert!(errors.contains("Several layers with the same name"));
//! ```

use crate::core::error::PublishError;
use crate::core::traits::{GeodataServer, MetadataServer, ValidationErrors};
use crate::orchestration::layer_catalog::PublishCandidate;
use std::collections::HashSet;

/// Characters map servers cannot take in a layer name
pub const UNSUPPORTED_CHARACTERS: [char; 4] = ['?', '&', '=', '#'];

pub const DUPLICATE_NAME_ERROR: &str = "Several layers with the same name";

/// Aggregated outcome of a validation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: ValidationErrors,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Human-readable list of every issue
    pub fn to_message(&self) -> String {
        let mut lines = vec![
            "Cannot publish data.".to_string(),
            "The following issues were found:".to_string(),
        ];
        lines.extend(self.errors.iter().map(|e| format!("  - {}", e)));
        lines.join("\n")
    }

    /// Convert a failed report into an error; `None` when publishing may proceed
    pub fn into_error(self) -> Option<PublishError> {
        if self.is_ok() {
            None
        } else {
            Some(PublishError::ValidationRejected {
                errors: self.errors.into_iter().collect(),
            })
        }
    }
}

/// Validator for a publish candidate
pub struct PublishValidator;

impl PublishValidator {
    /// Add name issues: one per unsupported character, one for any duplicate
    pub fn check_names(names: &[&str], errors: &mut ValidationErrors) {
        let mut seen = HashSet::new();
        for name in names {
            for c in UNSUPPORTED_CHARACTERS {
                if name.contains(c) {
                    errors.insert(format!("Unsupported character in layer name: {}", c));
                }
            }
            if !seen.insert(*name) {
                errors.insert(DUPLICATE_NAME_ERROR.to_string());
            }
        }
    }

    /// Validate the checked layers against the selected servers
    ///
    /// # Arguments
    ///
    /// * `candidate` - Snapshot of the checked layers
    /// * `geodata` - Selected geodata server, if any
    /// * `metadata` - Selected metadata server, if any
    pub async fn validate(
        candidate: &PublishCandidate,
        geodata: Option<&dyn GeodataServer>,
        metadata: Option<&dyn MetadataServer>,
    ) -> ValidationReport {
        let mut errors = ValidationErrors::new();
        Self::check_names(&candidate.names(), &mut errors);

        let layers = candidate.layers();
        if let Some(server) = geodata {
            server
                .validate_geodata_before_publication(&layers, &mut errors)
                .await;
        }
        if let Some(server) = metadata {
            server
                .validate_metadata_before_publication(&layers, &mut errors)
                .await;
        }

        if !errors.is_empty() {
            tracing::debug!(issues = errors.len(), "publish candidate rejected");
        }
        ValidationReport { errors }
    }
}
