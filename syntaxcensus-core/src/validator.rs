//! Population membership checks against a repository's manifest.

use serde_json::Value;

use crate::domain::{RepositoryRecord, ValidationOutcome};
use crate::error::{CensusError, Result, SourceError};
use crate::source::DiscoverySource;

/// Dependency maps searched for the target dependency.
const DEPENDENCY_SECTIONS: [&str; 2] = ["dependencies", "devDependencies"];

/// Confirms that a repository declares the target dependency.
pub struct ProjectValidator<'a, S: DiscoverySource + ?Sized> {
    source: &'a S,
    dependency: String,
    manifest_path: String,
}

impl<'a, S: DiscoverySource + ?Sized> ProjectValidator<'a, S> {
    /// Validate against `dependency` declared in `manifest_path`.
    pub fn new(source: &'a S, dependency: impl Into<String>, manifest_path: impl Into<String>) -> Self {
        Self {
            source,
            dependency: dependency.into(),
            manifest_path: manifest_path.into(),
        }
    }

    /// Classify a record. Only critical source errors are returned as `Err`.
    pub async fn validate(&self, record: &RepositoryRecord) -> Result<ValidationOutcome> {
        let manifest = match self
            .source
            .fetch_manifest(&record.full_name, &self.manifest_path)
            .await
        {
            Ok(manifest) => manifest,
            Err(SourceError::NotFound) => {
                return Ok(ValidationOutcome::Invalid {
                    reason: "manifest absent".to_string(),
                });
            }
            Err(err) if err.is_critical() => return Err(CensusError::Critical(err.to_string())),
            Err(err) => {
                return Ok(ValidationOutcome::Indeterminate {
                    reason: err.to_string(),
                });
            }
        };

        Ok(classify_manifest(&manifest, &self.dependency))
    }
}

/// Classify manifest text by exact dependency key.
pub fn classify_manifest(manifest: &str, dependency: &str) -> ValidationOutcome {
    let Ok(Value::Object(root)) = serde_json::from_str::<Value>(manifest) else {
        return ValidationOutcome::Indeterminate {
            reason: "unparseable manifest".to_string(),
        };
    };

    let declared = DEPENDENCY_SECTIONS
        .iter()
        .filter_map(|section| root.get(*section).and_then(Value::as_object))
        .find_map(|deps| deps.get(dependency));

    match declared {
        Some(version) => ValidationOutcome::Valid {
            version: match version {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
        },
        None => ValidationOutcome::Invalid {
            reason: "dependency absent".to_string(),
        },
    }
}
