//! Duplicate detection and cleanup
//!
//! Clustering is a single greedy pass in scan order: each record is compared
//! against the canonical of every group found so far and joins the first one
//! it matches, otherwise it starts a new group. The result therefore depends
//! on scan order and is not a globally optimal clustering; a record that is
//! close to two canonicals always lands in the earlier one.

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::scan::{FileRecord, is_reserved};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Similarity required for two images to count as duplicates. Every point
/// below 100 allows one more differing perceptual hash bit, so 100 accepts
/// identical hashes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold(u8);

impl Threshold {
    pub const IDENTICAL: Threshold = Threshold(100);

    pub fn new(percent: u32) -> Result<Self> {
        match u8::try_from(percent) {
            Ok(p) if p <= 100 => Ok(Self(p)),
            _ => Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidThreshold,
                format!("similarity threshold must be between 0 and 100, got {}", percent),
            )),
        }
    }

    pub fn percent(&self) -> u8 {
        self.0
    }

    /// Largest Hamming distance accepted for a hash of `bits` bits.
    pub fn max_distance(&self, bits: u32) -> u32 {
        u32::from(100 - self.0).min(bits)
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::IDENTICAL
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub canonical: FileRecord,
    pub duplicates: Vec<FileRecord>,
}

/// Whether `candidate` belongs in the group headed by `canonical`.
fn is_duplicate_of(canonical: &FileRecord, candidate: &FileRecord, threshold: Threshold) -> bool {
    if canonical.content_hash == candidate.content_hash {
        return true;
    }
    match (&canonical.perceptual_hash, &candidate.perceptual_hash) {
        (Some(a), Some(b)) => a.distance(b) <= threshold.max_distance(a.bits()),
        _ => false,
    }
}

/// Cluster records into duplicate groups. Only groups with at least one
/// duplicate are returned, in the order their canonicals were scanned.
pub fn find_duplicates(
    records: impl IntoIterator<Item = FileRecord>,
    threshold: Threshold,
) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();

    for record in records {
        match groups
            .iter_mut()
            .find(|group| is_duplicate_of(&group.canonical, &record, threshold))
        {
            Some(group) => {
                debug!(
                    duplicate = %record.path.display(),
                    canonical = %group.canonical.path.display(),
                    "duplicate found"
                );
                group.duplicates.push(record);
            }
            None => groups.push(DuplicateGroup {
                canonical: record,
                duplicates: Vec::new(),
            }),
        }
    }

    groups.retain(|group| !group.duplicates.is_empty());
    groups
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDeletion {
    pub path: PathBuf,
    pub size: u64,
    pub duplicate_of: PathBuf,
}

/// What a cleanup would delete. Building one has no side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    pub paths_to_delete: Vec<PlannedDeletion>,
    pub bytes_reclaimed: u64,
}

impl DeletionPlan {
    pub fn is_empty(&self) -> bool {
        self.paths_to_delete.is_empty()
    }
}

pub fn plan_deletion(groups: &[DuplicateGroup]) -> DeletionPlan {
    let mut plan = DeletionPlan::default();
    for group in groups {
        for duplicate in &group.duplicates {
            plan.bytes_reclaimed += duplicate.size;
            plan.paths_to_delete.push(PlannedDeletion {
                path: duplicate.path.clone(),
                size: duplicate.size,
                duplicate_of: group.canonical.path.clone(),
            });
        }
    }
    plan
}

#[derive(Debug, Default)]
pub struct DeletionReport {
    pub deleted: usize,
    pub bytes_freed: u64,
    pub failures: Vec<(PathBuf, VaultError)>,
}

impl DeletionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delete every planned path.
///
/// A plan that names a vault artifact is rejected before anything is
/// deleted. Individual failures (including a file that changed size since
/// the scan) are collected in the report and do not stop the remaining
/// deletions.
pub fn execute_deletion(plan: &DeletionPlan) -> Result<DeletionReport> {
    if let Some(entry) = plan
        .paths_to_delete
        .iter()
        .find(|entry| entry.path.file_name().is_some_and(is_reserved))
    {
        return Err(VaultError::new(
            ErrorCategory::User,
            format!(
                "refusing to execute a plan that deletes vault artifact {}",
                entry.path.display()
            ),
        ));
    }

    let mut report = DeletionReport::default();
    for entry in &plan.paths_to_delete {
        match delete_planned(entry) {
            Ok(()) => {
                report.deleted += 1;
                report.bytes_freed += entry.size;
            }
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "failed to delete duplicate");
                report.failures.push((entry.path.clone(), e));
            }
        }
    }

    info!(
        deleted = report.deleted,
        failed = report.failures.len(),
        bytes_freed = report.bytes_freed,
        "deletion finished"
    );
    Ok(report)
}

fn delete_planned(entry: &PlannedDeletion) -> Result<()> {
    let metadata = fs::symlink_metadata(&entry.path).map_err(|e| {
        VaultError::io(
            ErrorCategory::User,
            format!("failed to stat {}", entry.path.display()),
            e,
        )
    })?;
    if !metadata.is_file() || metadata.len() != entry.size {
        return Err(VaultError::new(
            ErrorCategory::User,
            format!(
                "{} changed since it was scanned; not deleting",
                entry.path.display()
            ),
        ));
    }
    fs::remove_file(&entry.path).map_err(|e| {
        VaultError::io(
            ErrorCategory::Internal,
            format!("failed to delete {}", entry.path.display()),
            e,
        )
    })
}
