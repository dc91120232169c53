//! Directory clone, copy and move with security-descriptor replication.
//!
//! Traversal uses an explicit task stack (copy) or a flat walker listing
//! (move), so tree depth never grows the call stack. Every mutation is
//! journaled in a [`ReportReplicate`]; a failure after some steps returns
//! [`DirSecurityError::PartialReplicate`] with that journal. Nothing is
//! rolled back.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::descriptor::{SpecAccessRule, SpecSecurityDescriptor};
use crate::engine::AccessRuleEngine;
use crate::events::{EnumEventSeverity, EventLog, SpecEvent};
use crate::owner::OwnershipManager;
use crate::report::{ReportReplicate, ReportReplicateBuilder};
use crate::spec::{
    DirSecurityError, EnumAccessEffect, EnumInheritedRuleMode, SpecReplicateOptions,
};
use crate::store::{DescriptorStore, SecurityAdapter};
use crate::util::{
    SpecCopyPatterns, copy_file_with_metadata, file_size, is_overlap, move_file,
    normalize_dir_path, validate_path_arg,
};

const C_EVENT_SOURCE: &str = "axiomkit_io_dirsec";

#[derive(Debug, Clone)]
struct SpecDirEntry {
    path_dir_src_sub: PathBuf,
    name_dir: OsString,
}

#[derive(Debug, Clone)]
struct SpecFileEntry {
    path_file_src: PathBuf,
    name_file: OsString,
}

#[derive(Debug)]
enum TaskCopy {
    /// Ensure the destination directory exists, then schedule its children.
    EnterDir {
        path_dir_src: PathBuf,
        path_dir_dst: PathBuf,
    },
    /// Copy the files of a directory whose subdirectories are done.
    CopyFiles {
        path_dir_dst: PathBuf,
        l_files: Vec<SpecFileEntry>,
    },
}

/// Clones, copies and moves directory trees, carrying security descriptors
/// along through the adapter, rule engine and ownership manager.
pub struct DirectoryReplicator<S> {
    adapter: SecurityAdapter<S>,
    spec_rep_options: SpecReplicateOptions,
    spec_rep_pats: SpecCopyPatterns,
    event_log: Option<Arc<dyn EventLog + Send + Sync>>,
}

impl<S: DescriptorStore> DirectoryReplicator<S> {
    pub fn new(store: S, spec_rep_options: SpecReplicateOptions) -> Result<Self, DirSecurityError> {
        let spec_rep_pats = SpecCopyPatterns::from_raw(
            spec_rep_options.patterns_exclude_files.as_deref(),
            spec_rep_options.patterns_exclude_dirs.as_deref(),
            spec_rep_options.rule_pattern,
        )?;
        Ok(Self {
            adapter: SecurityAdapter::new(store),
            spec_rep_options,
            spec_rep_pats,
            event_log: None,
        })
    }

    /// Record one event per completed or failed operation.
    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog + Send + Sync>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    pub fn adapter(&self) -> &SecurityAdapter<S> {
        &self.adapter
    }

    pub fn engine(&self) -> AccessRuleEngine<'_, S> {
        AccessRuleEngine::new(&self.adapter)
    }

    pub fn owners(&self) -> OwnershipManager<'_, S> {
        OwnershipManager::new(&self.adapter)
    }

    /// Create `new_path` as an empty directory carrying the security
    /// descriptor of `path`.
    pub fn clone_dir(
        &self,
        path: impl AsRef<Path>,
        new_path: impl AsRef<Path>,
    ) -> Result<ReportReplicate, DirSecurityError> {
        let (path, new_path) = (path.as_ref(), new_path.as_ref());
        self.run("clone", path, new_path, |builder| {
            validate_path_arg(path)?;
            validate_path_arg(new_path)?;
            self.clone_node(path, new_path, builder)
        })
    }

    /// Recursively copy `path` into `new_path`, depth-first pre-order:
    /// each directory is cloned, then its subdirectories are copied, then
    /// its files. Stops at the first failure.
    pub fn copy_dir(
        &self,
        path: impl AsRef<Path>,
        new_path: impl AsRef<Path>,
        if_overwrite: bool,
    ) -> Result<ReportReplicate, DirSecurityError> {
        let (path, new_path) = (path.as_ref(), new_path.as_ref());
        self.run("copy", path, new_path, |builder| {
            self.copy_tree(path, new_path, if_overwrite, builder)
        })
    }

    /// Move `path` to `new_path`: clone every directory, move every file,
    /// then delete the source tree. Each entry is visited exactly once.
    pub fn move_dir(
        &self,
        path: impl AsRef<Path>,
        new_path: impl AsRef<Path>,
    ) -> Result<ReportReplicate, DirSecurityError> {
        let (path, new_path) = (path.as_ref(), new_path.as_ref());
        self.run("move", path, new_path, |builder| {
            self.move_tree(path, new_path, builder)
        })
    }

    fn run<F>(
        &self,
        name_op: &str,
        path_src: &Path,
        path_dst: &Path,
        op: F,
    ) -> Result<ReportReplicate, DirSecurityError>
    where
        F: FnOnce(&mut ReportReplicateBuilder) -> Result<(), DirSecurityError>,
    {
        let mut builder = ReportReplicateBuilder::default();
        match op(&mut builder) {
            Ok(()) => {
                let report = builder.build();
                let c_summary = report.format(&format!("[{}]", name_op.to_uppercase()));
                info!(
                    source = %path_src.display(),
                    destination = %path_dst.display(),
                    "{c_summary}"
                );
                self.log_event(
                    EnumEventSeverity::Info,
                    name_op,
                    format!(
                        "{} -> {}: {c_summary}",
                        path_src.display(),
                        path_dst.display()
                    ),
                );
                Ok(report)
            }
            Err(e) => {
                warn!(
                    source = %path_src.display(),
                    destination = %path_dst.display(),
                    error = %e,
                    "{name_op} failed"
                );
                self.log_event(
                    EnumEventSeverity::Error,
                    name_op,
                    format!("{} -> {}: {e}", path_src.display(), path_dst.display()),
                );
                if builder.has_steps() {
                    return Err(DirSecurityError::PartialReplicate {
                        report: Box::new(builder.build()),
                        source: Box::new(e),
                    });
                }
                Err(e)
            }
        }
    }

    fn log_event(&self, severity: EnumEventSeverity, category: &str, message: String) {
        let Some(event_log) = &self.event_log else {
            return;
        };
        if !event_log.log(SpecEvent::now(C_EVENT_SOURCE, severity, category, message)) {
            debug!(category, "event log rejected entry");
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // #region Clone

    fn clone_node(
        &self,
        path_src: &Path,
        path_dst: &Path,
        builder: &mut ReportReplicateBuilder,
    ) -> Result<(), DirSecurityError> {
        let meta_src = fs::metadata(path_src).map_err(|e| DirSecurityError::from_io(path_src, e))?;
        if !meta_src.is_dir() {
            return Err(DirSecurityError::InvalidArgument(format!(
                "Source is not a directory: {}",
                path_src.display()
            )));
        }
        let desc_src = self.adapter.read(path_src)?;

        let b_existed = fs::symlink_metadata(path_dst).is_ok();
        fs::create_dir_all(path_dst).map_err(|e| DirSecurityError::from_io(path_dst, e))?;
        if b_existed {
            warn!(path = %path_dst.display(), "destination exists, reapplying descriptor");
        } else {
            builder.add_dir_created(path_dst.to_path_buf());
        }

        let desc_dst = self.replicate_descriptor(&desc_src, path_dst)?;
        self.adapter.commit(path_dst, &desc_dst)?;
        builder.add_descriptor_committed(path_dst.to_path_buf());
        Ok(())
    }

    /// Rebuild the descriptor of `path_dst` from `desc_src` in memory.
    fn replicate_descriptor(
        &self,
        desc_src: &SpecSecurityDescriptor,
        path_dst: &Path,
    ) -> Result<SpecSecurityDescriptor, DirSecurityError> {
        let engine = self.engine();
        let owners = self.owners();

        let desc_dst = self.adapter.read(path_dst)?;
        let desc_dst = engine.remove_all_explicit_rules(path_dst, desc_dst, false)?;
        let mut desc_dst = owners.set_owner(path_dst, desc_dst, desc_src.owner().clone(), false)?;

        let if_materialize = match self.spec_rep_options.rule_inherited {
            EnumInheritedRuleMode::Materialize => true,
            EnumInheritedRuleMode::Rederive => {
                let if_live = desc_src.is_inheritance_blocked()
                    || (!desc_dst.is_inheritance_blocked()
                        && desc_src.inherited_rules().eq(desc_dst.inherited_rules()));
                if !if_live {
                    debug!(
                        path = %path_dst.display(),
                        "destination inherits different rules, materializing"
                    );
                }
                !if_live
            }
        };

        if if_materialize || desc_src.is_inheritance_blocked() {
            desc_dst = engine.remove_all_rules(path_dst, desc_dst, false)?;
            desc_dst = engine.block_inheritance(path_dst, desc_dst, false, false)?;
        }
        let l_rules_src: Vec<SpecAccessRule> = if if_materialize {
            let mut l_rules: Vec<SpecAccessRule> =
                desc_src.rules().iter().map(SpecAccessRule::as_explicit).collect();
            l_rules.sort_by_key(|r| matches!(r.rule_effect, EnumAccessEffect::Allow));
            l_rules
        } else {
            desc_src.explicit_rules().cloned().collect()
        };
        for rule in l_rules_src {
            desc_dst = engine.add_rule(path_dst, desc_dst, rule, false)?;
        }
        Ok(desc_dst)
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
    // #region Copy

    fn copy_tree(
        &self,
        path_src: &Path,
        path_dst: &Path,
        if_overwrite: bool,
        builder: &mut ReportReplicateBuilder,
    ) -> Result<(), DirSecurityError> {
        validate_path_arg(path_src)?;
        validate_path_arg(path_dst)?;
        let path_dir_src = normalize_dir_path(path_src);
        let path_dir_dst = normalize_dir_path(path_dst);
        ensure_source_dir(&path_dir_src)?;
        if is_overlap(&path_dir_src, &path_dir_dst)
            .map_err(|e| DirSecurityError::from_io(&path_dir_dst, e))?
        {
            return Err(DirSecurityError::InvalidArgument(format!(
                "Source and destination directories overlap: {} <-> {}",
                path_dir_src.display(),
                path_dir_dst.display()
            )));
        }

        let mut l_stack = vec![TaskCopy::EnterDir {
            path_dir_src,
            path_dir_dst,
        }];
        while let Some(task) = l_stack.pop() {
            match task {
                TaskCopy::EnterDir {
                    path_dir_src,
                    path_dir_dst,
                } => {
                    match fs::symlink_metadata(&path_dir_dst) {
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {
                            self.clone_node(&path_dir_src, &path_dir_dst, builder)?;
                        }
                        Err(e) => return Err(DirSecurityError::from_io(&path_dir_dst, e)),
                        Ok(meta) if !meta.is_dir() => {
                            return Err(DirSecurityError::AlreadyExists(path_dir_dst));
                        }
                        Ok(_) => {}
                    }

                    let (l_dirs, l_files) = self.list_children(&path_dir_src, builder)?;
                    l_stack.push(TaskCopy::CopyFiles {
                        path_dir_dst: path_dir_dst.clone(),
                        l_files,
                    });
                    for spec_dir_entry in l_dirs.into_iter().rev() {
                        l_stack.push(TaskCopy::EnterDir {
                            path_dir_dst: path_dir_dst.join(&spec_dir_entry.name_dir),
                            path_dir_src: spec_dir_entry.path_dir_src_sub,
                        });
                    }
                }
                TaskCopy::CopyFiles {
                    path_dir_dst,
                    l_files,
                } => {
                    for spec_file_entry in l_files {
                        let path_file_dst = path_dir_dst.join(&spec_file_entry.name_file);
                        self.copy_one_file(
                            &spec_file_entry.path_file_src,
                            &path_file_dst,
                            if_overwrite,
                            builder,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Immediate subdirectories and files of `path_root`, sorted by name.
    fn list_children(
        &self,
        path_root: &Path,
        builder: &mut ReportReplicateBuilder,
    ) -> Result<(Vec<SpecDirEntry>, Vec<SpecFileEntry>), DirSecurityError> {
        let mut l_dirs: Vec<SpecDirEntry> = Vec::new();
        let mut l_files: Vec<SpecFileEntry> = Vec::new();

        let iter_entries =
            fs::read_dir(path_root).map_err(|e| DirSecurityError::from_io(path_root, e))?;
        for entry_res in iter_entries {
            let entry = entry_res.map_err(|e| DirSecurityError::from_io(path_root, e))?;
            let path_entry = entry.path();
            let name_entry = entry.file_name();
            let cfg_file_type = entry
                .file_type()
                .map_err(|e| DirSecurityError::from_io(&path_entry, e))?;
            let c_name = name_entry.to_string_lossy();

            if cfg_file_type.is_symlink() {
                if path_entry.is_dir() {
                    builder.add_warning(format!(
                        "Symlinked directory skipped: {}",
                        path_entry.display()
                    ));
                    builder.add_skipped();
                    continue;
                }
                if !path_entry.exists() {
                    builder.add_warning(format!("Broken symlink skipped: {}", path_entry.display()));
                    builder.add_skipped();
                    continue;
                }
            }

            if cfg_file_type.is_dir() {
                if self.spec_rep_pats.should_exclude_dir(&c_name) {
                    builder.add_skipped();
                    continue;
                }
                l_dirs.push(SpecDirEntry {
                    path_dir_src_sub: path_entry,
                    name_dir: name_entry,
                });
            } else if cfg_file_type.is_file() || cfg_file_type.is_symlink() {
                if self.spec_rep_pats.should_exclude_file(&c_name) {
                    builder.add_skipped();
                    continue;
                }
                l_files.push(SpecFileEntry {
                    path_file_src: path_entry,
                    name_file: name_entry,
                });
            } else {
                builder.add_warning(format!("Special file skipped: {}", path_entry.display()));
                builder.add_skipped();
            }
        }

        l_dirs.sort_by(|a, b| a.name_dir.cmp(&b.name_dir));
        l_files.sort_by(|a, b| a.name_file.cmp(&b.name_file));
        Ok((l_dirs, l_files))
    }

    fn copy_one_file(
        &self,
        path_file_src: &Path,
        path_file_dst: &Path,
        if_overwrite: bool,
        builder: &mut ReportReplicateBuilder,
    ) -> Result<(), DirSecurityError> {
        match fs::symlink_metadata(path_file_dst) {
            Ok(meta) if meta.is_dir() || !if_overwrite => {
                return Err(DirSecurityError::AlreadyExists(path_file_dst.to_path_buf()));
            }
            Ok(_) => debug!(path = %path_file_dst.display(), "overwriting"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(DirSecurityError::from_io(path_file_dst, e)),
        }

        let res_copy = if self.spec_rep_options.if_preserve_file_metadata {
            copy_file_with_metadata(
                path_file_src,
                path_file_dst,
                self.adapter.store().reserved_attribute(),
            )
        } else {
            fs::copy(path_file_src, path_file_dst)
        };
        let n_bytes = res_copy.map_err(|e| DirSecurityError::from_io(path_file_dst, e))?;
        debug!(
            source = %path_file_src.display(),
            destination = %path_file_dst.display(),
            n_bytes,
            "file copied"
        );
        builder.add_file_copied(
            path_file_src.to_path_buf(),
            path_file_dst.to_path_buf(),
            n_bytes,
        );
        Ok(())
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
    // #region Move

    fn move_tree(
        &self,
        path_src: &Path,
        path_dst: &Path,
        builder: &mut ReportReplicateBuilder,
    ) -> Result<(), DirSecurityError> {
        validate_path_arg(path_src)?;
        validate_path_arg(path_dst)?;
        let path_dir_src = normalize_dir_path(path_src);
        let path_dir_dst = normalize_dir_path(path_dst);
        ensure_source_dir(&path_dir_src)?;
        if is_overlap(&path_dir_src, &path_dir_dst)
            .map_err(|e| DirSecurityError::from_io(&path_dir_dst, e))?
        {
            return Err(DirSecurityError::InvalidArgument(format!(
                "Source and destination directories overlap: {} <-> {}",
                path_dir_src.display(),
                path_dir_dst.display()
            )));
        }

        self.clone_node(&path_dir_src, &path_dir_dst, builder)?;

        // Listing is taken up front; entries are renamed away while we go.
        let l_entries = WalkDir::new(&path_dir_src)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| from_walkdir(&path_dir_src, e))?;

        for entry in &l_entries {
            let path_rel = entry.path().strip_prefix(&path_dir_src).map_err(|_| {
                DirSecurityError::InvalidArgument(format!(
                    "Entry escapes source root: {}",
                    entry.path().display()
                ))
            })?;
            let path_entry_dst = path_dir_dst.join(path_rel);

            if entry.file_type().is_dir() {
                self.clone_node(entry.path(), &path_entry_dst, builder)?;
                continue;
            }
            move_file(entry.path(), &path_entry_dst)
                .map_err(|e| DirSecurityError::from_io(&path_entry_dst, e))?;
            self.adapter.store().relocate(entry.path(), &path_entry_dst);
            debug!(
                source = %entry.path().display(),
                destination = %path_entry_dst.display(),
                "file moved"
            );
            builder.add_file_moved(entry.path().to_path_buf(), path_entry_dst);
        }

        fs::remove_dir_all(&path_dir_src).map_err(|e| DirSecurityError::from_io(&path_dir_src, e))?;
        self.adapter.store().discard_tree(&path_dir_src);
        builder.add_tree_removed(path_dir_src);
        Ok(())
    }

    // #endregion
}

/// Total size in bytes of the files below `path`. Unreadable entries count
/// as zero; returns `-1` when `path` is not an existing directory.
pub fn size_in_bytes(path: impl AsRef<Path>) -> i64 {
    let path = path.as_ref();
    if path.as_os_str().is_empty() || !path.is_dir() {
        return -1;
    }
    WalkDir::new(path)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry_res| match entry_res {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "entry skipped while sizing");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| file_size(entry.path()).max(0))
        .fold(0i64, i64::saturating_add)
}

fn ensure_source_dir(path_dir_src: &Path) -> Result<(), DirSecurityError> {
    let meta = fs::metadata(path_dir_src).map_err(|e| DirSecurityError::from_io(path_dir_src, e))?;
    if !meta.is_dir() {
        return Err(DirSecurityError::InvalidArgument(format!(
            "Source is not a directory: {}",
            path_dir_src.display()
        )));
    }
    Ok(())
}

fn from_walkdir(path_root: &Path, err: walkdir::Error) -> DirSecurityError {
    let path = err.path().unwrap_or(path_root).to_path_buf();
    match err.into_io_error() {
        Some(e) => DirSecurityError::from_io(&path, e),
        None => DirSecurityError::InvalidArgument(format!(
            "Filesystem loop detected: {}",
            path.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::{DirectoryReplicator, size_in_bytes};
    use crate::descriptor::{SpecAccessRule, SpecSecurityDescriptor};
    use crate::events::{EnumEventSeverity, EventLog, MemoryEventLog, SpecEventFilter};
    use crate::principal::Principal;
    use crate::report::EnumReplicateStep;
    use crate::rights::{EnumAbstractRight, RightFlags};
    use crate::spec::{
        DirSecurityError, EnumAccessEffect, EnumCopyPatternMode, EnumErrorKind,
        EnumInheritance, EnumInheritedRuleMode, SpecReplicateOptions,
    };
    use crate::store::MemoryDescriptorStore;

    fn write_text(path: &Path, txt: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, txt).expect("write text");
    }

    fn replicator(store: &MemoryDescriptorStore) -> DirectoryReplicator<&MemoryDescriptorStore> {
        DirectoryReplicator::new(store, SpecReplicateOptions::default()).expect("replicator")
    }

    /// Give `path` an explicit rule set and a distinct owner.
    fn decorate(rep: &DirectoryReplicator<&MemoryDescriptorStore>, path: &Path, uid: u32) {
        let engine = rep.engine();
        let descriptor = rep.adapter().read(path).expect("read");
        let descriptor = engine
            .grant_rights(
                EnumAbstractRight::Modify,
                &Principal::from_unix_uid(uid),
                path,
                descriptor,
                true,
                true,
                false,
            )
            .expect("grant");
        rep.owners()
            .set_owner(path, descriptor, Principal::from_unix_uid(uid), true)
            .expect("owner");
    }

    #[test]
    fn clone_copies_descriptor_not_content() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("template");
        let dst = tmp.path().join("alice");
        write_text(&src.join("readme.txt"), "hi");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);
        decorate(&rep, &src, 1001);

        let report = rep.clone_dir(&src, &dst).expect("clone");
        assert_eq!(report.cnt_dirs_created, 1);
        assert_eq!(report.cnt_descriptors_committed, 1);
        assert_eq!(fs::read_dir(&dst).expect("read dst").count(), 0);

        let desc_src = rep.adapter().read(&src).expect("read src");
        let desc_dst = rep.adapter().read(&dst).expect("read dst");
        assert_eq!(desc_dst.owner(), desc_src.owner());
        assert_eq!(desc_dst.rules(), desc_src.rules());
    }

    #[test]
    fn clone_materialize_carries_inherited_rules_anywhere() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("share/template");
        let dst = tmp.path().join("elsewhere/alice");
        fs::create_dir_all(&src).expect("mkdir");
        fs::create_dir_all(tmp.path().join("elsewhere")).expect("mkdir");
        let store = MemoryDescriptorStore::new();
        let options = SpecReplicateOptions {
            rule_inherited: EnumInheritedRuleMode::Materialize,
            ..SpecReplicateOptions::default()
        };
        let rep = DirectoryReplicator::new(&store, options).expect("replicator");
        decorate(&rep, &tmp.path().join("share"), 2000);

        rep.clone_dir(&src, &dst).expect("clone");
        let desc_src = rep.adapter().read(&src).expect("read src");
        let desc_dst = rep.adapter().read(&dst).expect("read dst");
        assert!(desc_src.inherited_rules().count() > 0);
        assert!(desc_dst.is_inheritance_blocked());
        let l_src: Vec<SpecAccessRule> = desc_src.rules().iter().map(|r| r.as_explicit()).collect();
        assert_eq!(desc_dst.rules(), l_src.as_slice());
    }

    /// Source rules as a materialized clone must carry them.
    fn materialized(desc: &SpecSecurityDescriptor) -> Vec<SpecAccessRule> {
        let mut l_rules: Vec<SpecAccessRule> =
            desc.rules().iter().map(|r| r.as_explicit()).collect();
        l_rules.sort_by_key(|r| r.rule_effect == EnumAccessEffect::Allow);
        l_rules
    }

    #[test]
    fn clone_across_parents_keeps_rule_set_by_default() {
        let tmp = TempDir::new().expect("tempdir");
        let share = tmp.path().join("share");
        let src = share.join("template");
        let dst = tmp.path().join("elsewhere/alice");
        fs::create_dir_all(&src).expect("mkdir");
        fs::create_dir_all(tmp.path().join("elsewhere")).expect("mkdir");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);
        let staff = Principal::from_unix_gid(100);
        let descriptor = rep.adapter().read(&share).expect("read share");
        rep.engine()
            .grant_rights(EnumAbstractRight::Read, &staff, &share, descriptor, true, true, true)
            .expect("grant");

        rep.clone_dir(&src, &dst).expect("clone");
        let desc_src = rep.adapter().read(&src).expect("read src");
        let desc_dst = rep.adapter().read(&dst).expect("read dst");
        assert_eq!(desc_src.rules().len(), 2);
        assert_eq!(desc_dst.rules(), materialized(&desc_src).as_slice());
        assert_eq!(desc_dst.owner(), desc_src.owner());
        assert_eq!(desc_dst.effective_rights(&staff), RightFlags::READ);
        assert_eq!(
            desc_dst.effective_rights(&staff),
            desc_src.effective_rights(&staff)
        );
    }

    #[test]
    fn clone_next_to_source_keeps_inheritance_live() {
        let tmp = TempDir::new().expect("tempdir");
        let share = tmp.path().join("share");
        let src = share.join("template");
        let dst = share.join("bob");
        fs::create_dir_all(&src).expect("mkdir");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);
        let descriptor = rep.adapter().read(&share).expect("read share");
        rep.engine()
            .grant_rights(
                EnumAbstractRight::Read,
                &Principal::from_unix_gid(100),
                &share,
                descriptor,
                true,
                true,
                true,
            )
            .expect("grant");

        rep.clone_dir(&src, &dst).expect("clone");
        let desc_src = rep.adapter().read(&src).expect("read src");
        let desc_dst = rep.adapter().read(&dst).expect("read dst");
        assert!(!desc_dst.is_inheritance_blocked());
        assert_eq!(desc_dst.inherited_rules().count(), 2);
        assert_eq!(desc_dst.rules(), desc_src.rules());
    }

    #[test]
    fn clone_materialize_orders_deny_before_allow() {
        let tmp = TempDir::new().expect("tempdir");
        let share = tmp.path().join("share");
        let src = share.join("template");
        let dst = tmp.path().join("elsewhere/alice");
        fs::create_dir_all(&src).expect("mkdir");
        fs::create_dir_all(tmp.path().join("elsewhere")).expect("mkdir");
        let store = MemoryDescriptorStore::new();
        let options = SpecReplicateOptions {
            rule_inherited: EnumInheritedRuleMode::Materialize,
            ..SpecReplicateOptions::default()
        };
        let rep = DirectoryReplicator::new(&store, options).expect("replicator");
        let engine = rep.engine();
        let alice = Principal::from_unix_uid(1001);

        let descriptor = rep.adapter().read(&share).expect("read share");
        engine
            .add_rule(
                &share,
                descriptor,
                SpecAccessRule::deny(
                    alice.clone(),
                    RightFlags::DELETE,
                    EnumInheritance::ContainerInherit,
                ),
                true,
            )
            .expect("deny on share");
        let descriptor = rep.adapter().read(&src).expect("read src");
        engine
            .add_rule(
                &src,
                descriptor,
                SpecAccessRule::allow(alice.clone(), RightFlags::READ, EnumInheritance::None),
                true,
            )
            .expect("allow on template");
        let desc_src = rep.adapter().read(&src).expect("read src");
        assert!(desc_src.is_canonical());

        rep.clone_dir(&src, &dst).expect("clone");
        let desc_dst = rep.adapter().read(&dst).expect("read dst");
        assert!(desc_dst.is_canonical());
        assert_eq!(desc_dst.rules()[0].rule_effect, EnumAccessEffect::Deny);
        assert_eq!(desc_dst.rules(), materialized(&desc_src).as_slice());
        assert_eq!(desc_dst.effective_rights(&alice), desc_src.effective_rights(&alice));
        engine
            .block_inheritance(&dst, desc_dst, true, true)
            .expect("block on clone");
    }

    #[test]
    fn clone_rejects_missing_or_file_source() {
        let tmp = TempDir::new().expect("tempdir");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);

        let err = rep
            .clone_dir(tmp.path().join("missing"), tmp.path().join("dst"))
            .expect_err("missing");
        assert_eq!(err.kind(), EnumErrorKind::NotFound);

        write_text(&tmp.path().join("file.txt"), "x");
        let err = rep
            .clone_dir(tmp.path().join("file.txt"), tmp.path().join("dst"))
            .expect_err("file");
        assert_eq!(err.kind(), EnumErrorKind::InvalidArgument);
        assert!(!tmp.path().join("dst").exists());
    }

    #[test]
    fn copy_replicates_tree_and_rerun_with_overwrite_is_stable() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("root.txt"), "root");
        write_text(&src.join("a/file1.txt"), "a");
        write_text(&src.join("b/sub/file2.txt"), "bb");
        fs::create_dir_all(src.join("empty")).expect("mkdir");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);
        decorate(&rep, &src.join("a"), 1001);

        let report = rep.copy_dir(&src, &dst, false).expect("copy");
        assert_eq!(report.cnt_files_copied, 3);
        assert_eq!(report.cnt_dirs_created, 5);
        assert_eq!(report.n_bytes_copied, 7);
        for rel in ["root.txt", "a/file1.txt", "b/sub/file2.txt"] {
            assert_eq!(
                fs::read(src.join(rel)).expect("src"),
                fs::read(dst.join(rel)).expect("dst"),
                "{rel}"
            );
        }
        assert!(dst.join("empty").is_dir());
        assert_eq!(
            rep.adapter().read(&dst.join("a")).expect("read").rules(),
            rep.adapter().read(&src.join("a")).expect("read").rules()
        );

        let report = rep.copy_dir(&src, &dst, true).expect("rerun");
        assert_eq!(report.cnt_dirs_created, 0);
        assert_eq!(report.cnt_files_copied, 3);
        assert_eq!(fs::read_to_string(dst.join("b/sub/file2.txt")).expect("read"), "bb");
    }

    #[test]
    fn copy_visits_subdirectories_before_files() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("a.txt"), "a");
        write_text(&src.join("d/b.txt"), "b");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);

        let report = rep.copy_dir(&src, &dst, false).expect("copy");
        let l_copied: Vec<_> = report
            .l_steps
            .iter()
            .filter_map(|s| match s {
                EnumReplicateStep::CopiedFile { destination, .. } => {
                    destination.file_name().map(|n| n.to_string_lossy().to_string())
                }
                _ => None,
            })
            .collect();
        assert_eq!(l_copied, vec!["b.txt", "a.txt"]);
    }

    #[test]
    fn copy_without_overwrite_stops_with_partial_journal() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("a/one.txt"), "1");
        write_text(&src.join("z.txt"), "z");
        write_text(&dst.join("z.txt"), "old");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);

        let err = rep.copy_dir(&src, &dst, false).expect_err("conflict");
        assert_eq!(err.root_kind(), EnumErrorKind::AlreadyExists);
        let DirSecurityError::PartialReplicate { report, .. } = err else {
            panic!("expected partial replicate");
        };
        assert_eq!(report.cnt_files_copied, 1);
        assert!(dst.join("a/one.txt").exists());
        assert_eq!(fs::read_to_string(dst.join("z.txt")).expect("read"), "old");
    }

    #[test]
    fn copy_honors_exclude_patterns() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("skel");
        let dst = tmp.path().join("home");
        write_text(&src.join(".profile"), "p");
        write_text(&src.join("cache.tmp"), "t");
        write_text(&src.join(".cache/x"), "x");
        let store = MemoryDescriptorStore::new();
        let options = SpecReplicateOptions {
            patterns_exclude_files: Some(vec!["*.tmp".to_string()]),
            patterns_exclude_dirs: Some(vec![".cache".to_string()]),
            rule_pattern: EnumCopyPatternMode::Literal,
            ..SpecReplicateOptions::default()
        };
        // Literal: "*.tmp" is a plain substring here.
        let rep = DirectoryReplicator::new(&store, options).expect("replicator");
        let report = rep.copy_dir(&src, &dst, false).expect("copy");
        assert!(dst.join(".profile").exists());
        assert!(dst.join("cache.tmp").exists());
        assert!(!dst.join(".cache").exists());
        assert_eq!(report.cnt_skipped, 1);

        let dst_glob = tmp.path().join("home_glob");
        let options = SpecReplicateOptions {
            patterns_exclude_files: Some(vec!["*.tmp".to_string()]),
            rule_pattern: EnumCopyPatternMode::Glob,
            ..SpecReplicateOptions::default()
        };
        let rep = DirectoryReplicator::new(&store, options).expect("replicator");
        rep.copy_dir(&src, &dst_glob, false).expect("copy");
        assert!(!dst_glob.join("cache.tmp").exists());
        assert!(dst_glob.join(".cache/x").exists());
    }

    #[test]
    fn copy_rejects_overlap_and_bad_patterns() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).expect("mkdir");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);
        let err = rep
            .copy_dir(&src, src.join("nested"), false)
            .expect_err("overlap");
        assert_eq!(err.kind(), EnumErrorKind::InvalidArgument);

        let options = SpecReplicateOptions {
            patterns_exclude_files: Some(vec!["(".to_string()]),
            rule_pattern: EnumCopyPatternMode::Regex,
            ..SpecReplicateOptions::default()
        };
        assert!(DirectoryReplicator::new(&store, options).is_err());
    }

    #[test]
    fn move_two_level_tree() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("root");
        let new_root = tmp.path().join("new_root");
        write_text(&root.join("sub/file.txt"), "twelve bytes");
        fs::create_dir_all(root.join("emptyDir")).expect("mkdir");
        let n_size = fs::metadata(root.join("sub/file.txt")).expect("stat").len();
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);
        decorate(&rep, &root.join("sub"), 1001);
        let desc_sub_before = rep.adapter().read(&root.join("sub")).expect("read");

        let report = rep.move_dir(&root, &new_root).expect("move");
        assert!(!root.exists());
        assert_eq!(
            fs::metadata(new_root.join("sub/file.txt")).expect("stat").len(),
            n_size
        );
        assert!(new_root.join("emptyDir").is_dir());
        assert_eq!(report.cnt_files_moved, 1);
        assert_eq!(report.cnt_dirs_created, 3);
        assert!(matches!(
            report.l_steps.last(),
            Some(EnumReplicateStep::RemovedTree(_))
        ));
        assert_eq!(
            rep.adapter().read(&new_root.join("sub")).expect("read").rules(),
            desc_sub_before.rules()
        );
    }

    #[test]
    fn move_visits_each_entry_once() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("root");
        let new_root = tmp.path().join("new_root");
        write_text(&root.join("a.txt"), "a");
        write_text(&root.join("d1/b.txt"), "b");
        write_text(&root.join("d1/d2/c.txt"), "c");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);

        let report = rep.move_dir(&root, &new_root).expect("move");
        assert_eq!(report.cnt_files_moved, 3);
        assert_eq!(report.cnt_descriptors_committed, 3);
        for rel in ["a.txt", "d1/b.txt", "d1/d2/c.txt"] {
            assert!(new_root.join(rel).is_file(), "{rel}");
        }
        assert!(!new_root.join("b.txt").exists());
        assert!(!new_root.join("c.txt").exists());
    }

    #[test]
    fn move_conflict_leaves_both_trees() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("root");
        let new_root = tmp.path().join("new_root");
        write_text(&root.join("a.txt"), "a");
        write_text(&root.join("b.txt"), "b");
        write_text(&new_root.join("b.txt"), "existing");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);

        let err = rep.move_dir(&root, &new_root).expect_err("conflict");
        assert_eq!(err.kind(), EnumErrorKind::PartialFailure);
        assert_eq!(err.root_kind(), EnumErrorKind::AlreadyExists);
        assert!(root.join("b.txt").exists());
        assert!(new_root.join("a.txt").exists());
        assert!(!root.join("a.txt").exists());
    }

    #[test]
    fn size_sums_nested_files() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("sub")).expect("mkdir");
        fs::write(tmp.path().join("sub/ten.bin"), [0u8; 10]).expect("write");
        fs::write(tmp.path().join("sub/twenty.bin"), [0u8; 20]).expect("write");
        assert_eq!(size_in_bytes(tmp.path()), 30);
        assert!(size_in_bytes(tmp.path().join("missing")) < 0);
        assert!(size_in_bytes(tmp.path().join("sub/ten.bin")) < 0);
    }

    #[test]
    fn event_log_records_outcomes() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).expect("mkdir");
        let store = MemoryDescriptorStore::new();
        let event_log = Arc::new(MemoryEventLog::new());
        let rep = replicator(&store).with_event_log(event_log.clone());

        rep.clone_dir(&src, tmp.path().join("dst")).expect("clone");
        assert!(rep.clone_dir(tmp.path().join("missing"), tmp.path().join("x")).is_err());

        let l_events = event_log.find(&SpecEventFilter::default());
        assert_eq!(l_events.len(), 2);
        assert_eq!(l_events[0].severity, EnumEventSeverity::Info);
        assert_eq!(l_events[0].category, "clone");
        let filter = SpecEventFilter {
            severity: Some(EnumEventSeverity::Error),
            ..SpecEventFilter::default()
        };
        assert_eq!(event_log.find(&filter).len(), 1);
    }

    #[test]
    fn cloned_rules_keep_grant_shape() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).expect("mkdir");
        let store = MemoryDescriptorStore::new();
        let rep = replicator(&store);
        decorate(&rep, &src, 1001);

        rep.clone_dir(&src, tmp.path().join("dst")).expect("clone");
        let desc_dst = rep.adapter().read(&tmp.path().join("dst")).expect("read");
        let l_explicit: Vec<_> = desc_dst.explicit_rules().collect();
        assert_eq!(l_explicit.len(), 2);
        assert_eq!(l_explicit[0].rights, RightFlags::MODIFY);
        assert_eq!(l_explicit[0].rule_inheritance, EnumInheritance::ContainerInherit);
        assert_eq!(l_explicit[1].rule_inheritance, EnumInheritance::ObjectInherit);
    }
}
