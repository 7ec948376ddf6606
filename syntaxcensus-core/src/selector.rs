//! Sample selection: merge discovery results, validate, filter, rank, truncate.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::PopulationCriteria;
use crate::domain::{RepositoryRecord, ValidationOutcome};
use crate::error::{CensusError, Result};
use crate::source::DiscoverySource;
use crate::validator::ProjectValidator;

/// Records returned by each discovery strategy, plus recovered failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    /// One list per strategy, in query order.
    pub results: Vec<Vec<RepositoryRecord>>,
    /// One message per strategy that failed.
    pub warnings: Vec<String>,
}

/// Run every discovery strategy.
///
/// A failing strategy contributes no records and a warning; only a critical
/// failure (rejected credential) aborts.
pub async fn discover_all<S: DiscoverySource + ?Sized>(source: &S, queries: &[String]) -> Result<Discovery> {
    let mut discovery = Discovery::default();
    for query in queries.iter().filter(|query| !query.trim().is_empty()) {
        match source.discover(query).await {
            Ok(records) => {
                log::info!("query `{query}` returned {} candidates", records.len());
                discovery.results.push(records);
            }
            Err(err) if err.is_critical() => return Err(CensusError::Critical(err.to_string())),
            Err(err) => {
                log::warn!("discovery query `{query}` failed: {err}");
                discovery.warnings.push(format!("query `{query}` failed: {err}"));
                discovery.results.push(Vec::new());
            }
        }
    }
    Ok(discovery)
}

/// A candidate left out of the sample, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedCandidate {
    /// Repository identity.
    pub full_name: String,
    /// Why it was excluded.
    pub reason: String,
}

/// Accounting for one selection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSummary {
    /// Unique candidates after deduplication.
    pub total_found: usize,
    /// Candidates confirmed as population members.
    pub total_valid: usize,
    /// Candidates confirmed as non-members.
    pub total_invalid: usize,
    /// Candidates whose membership could not be decided.
    pub indeterminate: Vec<ExcludedCandidate>,
    /// Valid candidates rejected by popularity or date filters.
    pub filtered_out: usize,
    /// Size of the final sample.
    pub sampled: usize,
    /// Configured or derived target sample size.
    pub target_sample_size: usize,
    /// Size required by the statistical targets.
    pub required_sample_size: usize,
    /// Recovered discovery failures.
    pub warnings: Vec<String>,
}

/// Selected sample with its accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    /// Final sample, ranked.
    pub sample: Vec<RepositoryRecord>,
    /// Accounting for the run.
    pub summary: SelectionSummary,
}

/// Flatten strategy results, keeping the first occurrence of each identity.
pub fn deduplicate(results: Vec<Vec<RepositoryRecord>>) -> Vec<RepositoryRecord> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .flatten()
        .filter(|record| seen.insert(record.full_name.clone()))
        .collect()
}

/// Sort by stars descending, then identity ascending.
pub fn rank(records: &mut [RepositoryRecord]) {
    records.sort_by(|a, b| {
        b.stars
            .cmp(&a.stars)
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
}

/// Turn discovery results into a validated, filtered, ranked sample.
///
/// Fails with [`CensusError::NoCandidates`] when no candidate validates.
pub async fn select<S: DiscoverySource + ?Sized>(
    results: Vec<Vec<RepositoryRecord>>,
    criteria: &PopulationCriteria,
    validator: &ProjectValidator<'_, S>,
) -> Result<SelectionOutcome> {
    let mut summary = SelectionSummary {
        target_sample_size: criteria.target_sample_size()?,
        required_sample_size: criteria.required_sample_size()?,
        ..SelectionSummary::default()
    };

    let raw_count: usize = results.iter().map(Vec::len).sum();
    let candidates = deduplicate(results);
    summary.total_found = candidates.len();
    log::debug!(
        "collapsed {} duplicate candidates",
        raw_count - candidates.len()
    );

    let mut valid = Vec::new();
    for record in candidates {
        match validator.validate(&record).await? {
            ValidationOutcome::Valid { version } => {
                log::debug!("{} declares version {version}", record.full_name);
                valid.push(record);
            }
            ValidationOutcome::Invalid { reason } => {
                log::debug!("{} is not a population member: {reason}", record.full_name);
                summary.total_invalid += 1;
            }
            ValidationOutcome::Indeterminate { reason } => {
                log::warn!("{} could not be validated: {reason}", record.full_name);
                summary.indeterminate.push(ExcludedCandidate {
                    full_name: record.full_name,
                    reason,
                });
            }
        }
    }
    summary.total_valid = valid.len();
    if valid.is_empty() {
        return Err(CensusError::NoCandidates);
    }

    let mut sample: Vec<RepositoryRecord> = valid
        .into_iter()
        .filter(|record| criteria.admits(record))
        .collect();
    summary.filtered_out = summary.total_valid - sample.len();

    rank(&mut sample);
    sample.truncate(summary.target_sample_size);
    summary.sampled = sample.len();

    log::info!(
        "selected {} of {} candidates ({} valid, {} invalid, {} indeterminate, {} filtered)",
        summary.sampled,
        summary.total_found,
        summary.total_valid,
        summary.total_invalid,
        summary.indeterminate.len(),
        summary.filtered_out
    );
    if summary.sampled < summary.required_sample_size {
        log::warn!(
            "sample of {} is below the {} needed for the configured confidence and margin",
            summary.sampled,
            summary.required_sample_size
        );
    }

    Ok(SelectionOutcome { sample, summary })
}
