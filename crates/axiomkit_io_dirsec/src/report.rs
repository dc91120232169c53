//! Replication report and step journal.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One completed filesystem or security mutation, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumReplicateStep {
    CreatedDirectory(PathBuf),
    CommittedDescriptor(PathBuf),
    CopiedFile {
        source: PathBuf,
        destination: PathBuf,
        n_bytes: u64,
    },
    MovedFile {
        source: PathBuf,
        destination: PathBuf,
    },
    RemovedTree(PathBuf),
}

/// Counters and journal for one clone/copy/move run.
///
/// When a run fails partway, the report travels inside
/// [`crate::DirSecurityError::PartialReplicate`] and `l_steps` lists exactly
/// what is already on disk.
#[derive(Debug, Default, Clone)]
pub struct ReportReplicate {
    /// Directories created at the destination.
    pub cnt_dirs_created: u64,
    /// Descriptor commits performed.
    pub cnt_descriptors_committed: u64,
    /// Files copied.
    pub cnt_files_copied: u64,
    /// Files moved.
    pub cnt_files_moved: u64,
    /// Entries skipped by exclude patterns or because they are special files.
    pub cnt_skipped: u64,
    /// Bytes written by file copies.
    pub n_bytes_copied: u64,
    /// Non-fatal warnings collected during traversal.
    pub warnings: Vec<String>,
    /// Completed steps, oldest first.
    pub l_steps: Vec<EnumReplicateStep>,
}

impl ReportReplicate {
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn step_count(&self) -> usize {
        self.l_steps.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_dirs_created".to_string(), self.cnt_dirs_created);
        dict_counts.insert(
            "cnt_descriptors_committed".to_string(),
            self.cnt_descriptors_committed,
        );
        dict_counts.insert("cnt_files_copied".to_string(), self.cnt_files_copied);
        dict_counts.insert("cnt_files_moved".to_string(), self.cnt_files_moved);
        dict_counts.insert("cnt_skipped".to_string(), self.cnt_skipped);
        dict_counts.insert("n_bytes_copied".to_string(), self.n_bytes_copied);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} dirs={} descriptors={} copied={} moved={} skipped={} bytes={} warnings={}",
            dict_counts["cnt_dirs_created"],
            dict_counts["cnt_descriptors_committed"],
            dict_counts["cnt_files_copied"],
            dict_counts["cnt_files_moved"],
            dict_counts["cnt_skipped"],
            dict_counts["n_bytes_copied"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportReplicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[REPLICATE]"))
    }
}

/// Mutable accumulator; every `add_*` for a mutation also journals the step.
#[derive(Debug, Default, Clone)]
pub struct ReportReplicateBuilder {
    report: ReportReplicate,
}

impl ReportReplicateBuilder {
    pub fn add_dir_created(&mut self, path: PathBuf) {
        self.report.cnt_dirs_created += 1;
        self.report
            .l_steps
            .push(EnumReplicateStep::CreatedDirectory(path));
    }

    pub fn add_descriptor_committed(&mut self, path: PathBuf) {
        self.report.cnt_descriptors_committed += 1;
        self.report
            .l_steps
            .push(EnumReplicateStep::CommittedDescriptor(path));
    }

    pub fn add_file_copied(&mut self, source: PathBuf, destination: PathBuf, n_bytes: u64) {
        self.report.cnt_files_copied += 1;
        self.report.n_bytes_copied += n_bytes;
        self.report.l_steps.push(EnumReplicateStep::CopiedFile {
            source,
            destination,
            n_bytes,
        });
    }

    pub fn add_file_moved(&mut self, source: PathBuf, destination: PathBuf) {
        self.report.cnt_files_moved += 1;
        self.report.l_steps.push(EnumReplicateStep::MovedFile {
            source,
            destination,
        });
    }

    pub fn add_tree_removed(&mut self, path: PathBuf) {
        self.report.l_steps.push(EnumReplicateStep::RemovedTree(path));
    }

    pub fn add_skipped(&mut self) {
        self.report.cnt_skipped += 1;
    }

    pub fn add_warning(&mut self, warning: String) {
        self.report.warnings.push(warning);
    }

    pub fn has_steps(&self) -> bool {
        !self.report.l_steps.is_empty()
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportReplicate {
        self.report
    }
}
