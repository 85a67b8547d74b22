pub mod metadata_validator;
pub mod publish_validator;

pub use metadata_validator::{MetadataIssue, MetadataValidator};
pub use publish_validator::{PublishValidator, ValidationReport};
