use std::fs;
use std::io;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use globset::{Glob, GlobMatcher};
use regex::Regex;
use tracing::warn;

use crate::spec::{DirSecurityError, EnumCopyPatternMode};

////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

#[derive(Debug, Clone)]
pub(crate) enum TypeCopyPatternSeq {
    Literal(Vec<String>),
    Glob(Vec<GlobMatcher>),
    Regex(Vec<Regex>),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SpecCopyPatterns {
    pub(crate) patterns_exclude_files: Option<TypeCopyPatternSeq>,
    pub(crate) patterns_exclude_dirs: Option<TypeCopyPatternSeq>,
}

impl SpecCopyPatterns {
    pub(crate) fn from_raw(
        patterns_exclude_files: Option<&[String]>,
        patterns_exclude_dirs: Option<&[String]>,
        rule_pattern: EnumCopyPatternMode,
    ) -> Result<Self, DirSecurityError> {
        Ok(Self {
            patterns_exclude_files: _compile(patterns_exclude_files, rule_pattern)?,
            patterns_exclude_dirs: _compile(patterns_exclude_dirs, rule_pattern)?,
        })
    }

    pub(crate) fn should_exclude_file(&self, name_file: &str) -> bool {
        _is_pattern_matching(name_file, self.patterns_exclude_files.as_ref())
    }

    pub(crate) fn should_exclude_dir(&self, name_dir: &str) -> bool {
        _is_pattern_matching(name_dir, self.patterns_exclude_dirs.as_ref())
    }
}

fn _compile(
    patterns: Option<&[String]>,
    rule_pattern: EnumCopyPatternMode,
) -> Result<Option<TypeCopyPatternSeq>, DirSecurityError> {
    let Some(patterns) = patterns else {
        return Ok(None);
    };
    if patterns.is_empty() {
        return Ok(None);
    }

    match rule_pattern {
        EnumCopyPatternMode::Literal => Ok(Some(TypeCopyPatternSeq::Literal(patterns.to_vec()))),
        EnumCopyPatternMode::Glob => {
            let mut l_glob = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let matcher = Glob::new(pattern)
                    .map_err(|e| {
                        DirSecurityError::InvalidArgument(format!("Invalid exclude pattern: {e}"))
                    })?
                    .compile_matcher();
                l_glob.push(matcher);
            }
            Ok(Some(TypeCopyPatternSeq::Glob(l_glob)))
        }
        EnumCopyPatternMode::Regex => {
            let mut l_regex = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let regex = Regex::new(pattern).map_err(|e| {
                    DirSecurityError::InvalidArgument(format!("Invalid exclude pattern: {e}"))
                })?;
                l_regex.push(regex);
            }
            Ok(Some(TypeCopyPatternSeq::Regex(l_regex)))
        }
    }
}

fn _is_pattern_matching(value: &str, patterns: Option<&TypeCopyPatternSeq>) -> bool {
    match patterns {
        None => false,
        Some(TypeCopyPatternSeq::Literal(v)) => v.iter().any(|p| value.contains(p.as_str())),
        Some(TypeCopyPatternSeq::Glob(v)) => v.iter().any(|p| p.is_match(value)),
        Some(TypeCopyPatternSeq::Regex(v)) => v.iter().any(|p| p.is_match(value)),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

fn _normalize_path(path: &Path) -> io::Result<PathBuf> {
    if let Ok(resolved) = fs::canonicalize(path) {
        return Ok(resolved);
    }
    absolutize_path(path)
}

/// Absolute form of `path`. Fails for a relative path when the working
/// directory cannot be read.
pub(crate) fn absolutize_path(path: &Path) -> io::Result<PathBuf> {
    _absolutize_with(path, std::env::current_dir)
}

fn _absolutize_with(
    path: &Path,
    fn_current_dir: impl FnOnce() -> io::Result<PathBuf>,
) -> io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(fn_current_dir()?.join(path))
}

/// Whether one tree contains the other.
pub(crate) fn is_overlap(src: &Path, dst: &Path) -> io::Result<bool> {
    let src_resolved = _normalize_path(src)?;
    let dst_resolved = _normalize_path(dst)?;
    Ok(dst_resolved.starts_with(&src_resolved) || src_resolved.starts_with(&dst_resolved))
}

/// Append a trailing separator unless one is already present.
pub(crate) fn normalize_dir_path(path: &Path) -> PathBuf {
    let mut c_path = path.as_os_str().to_os_string();
    if !path.as_os_str().to_string_lossy().ends_with(MAIN_SEPARATOR) {
        c_path.push(MAIN_SEPARATOR.to_string());
    }
    PathBuf::from(c_path)
}

pub(crate) fn validate_path_arg(path: &Path) -> Result<(), DirSecurityError> {
    if path.as_os_str().is_empty() {
        return Err(DirSecurityError::InvalidArgument(
            "Path must not be empty".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_exists(path: &Path) -> Result<(), DirSecurityError> {
    fs::symlink_metadata(path)
        .map(|_| ())
        .map_err(|e| DirSecurityError::from_io(path, e))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FilePrimitives

/// Copy bytes, permissions, timestamps and user xattrs (except
/// `name_xattr_reserved`). Returns the number of bytes copied.
pub(crate) fn copy_file_with_metadata(
    path_file_src: &Path,
    path_file_dst: &Path,
    name_xattr_reserved: Option<&str>,
) -> Result<u64, io::Error> {
    let n_bytes = fs::copy(path_file_src, path_file_dst)?;
    #[cfg(unix)]
    {
        apply_metadata_unix(path_file_src, path_file_dst, name_xattr_reserved)?;
    }
    #[cfg(not(unix))]
    {
        let _ = name_xattr_reserved;
    }
    Ok(n_bytes)
}

#[cfg(unix)]
fn apply_metadata_unix(
    path_file_src: &Path,
    path_file_dst: &Path,
    name_xattr_reserved: Option<&str>,
) -> Result<(), io::Error> {
    use filetime::{FileTime, set_file_times};

    // xattrs first: a read-only mode would block setxattr afterwards.
    copy_xattrs_unix(path_file_src, path_file_dst, name_xattr_reserved);

    let stat_src = fs::metadata(path_file_src)?;
    fs::set_permissions(path_file_dst, stat_src.permissions())?;

    let file_time_access = FileTime::from_last_access_time(&stat_src);
    let file_time_modify = FileTime::from_last_modification_time(&stat_src);
    set_file_times(path_file_dst, file_time_access, file_time_modify)?;
    Ok(())
}

#[cfg(unix)]
fn copy_xattrs_unix(path_file_src: &Path, path_file_dst: &Path, name_xattr_reserved: Option<&str>) {
    let iter_xattr_names = match xattr::list(path_file_src) {
        Ok(v) => v,
        Err(_) => return,
    };

    for name in iter_xattr_names {
        if name_xattr_reserved.is_some_and(|reserved| name == reserved) {
            continue;
        }
        let Some(raw_value) = xattr::get(path_file_src, &name).ok().flatten() else {
            continue;
        };
        if let Err(e) = xattr::set(path_file_dst, &name, &raw_value) {
            warn!(path = %path_file_dst.display(), error = %e, "xattr not copied");
        }
    }
}

/// Rename `path_src` to `path_dst`, falling back to copy + remove when the
/// two live on different filesystems. Refuses to replace an existing entry.
pub(crate) fn move_file(path_src: &Path, path_dst: &Path) -> Result<(), io::Error> {
    if fs::symlink_metadata(path_dst).is_ok() {
        return Err(io::Error::from(io::ErrorKind::AlreadyExists));
    }
    match fs::rename(path_src, path_dst) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            warn!(
                source = %path_src.display(),
                destination = %path_dst.display(),
                "cross-device move, falling back to copy"
            );
            let meta_src = fs::symlink_metadata(path_src)?;
            if meta_src.file_type().is_symlink() {
                recreate_symlink(path_src, path_dst)?;
            } else {
                copy_file_with_metadata(path_src, path_dst, None)?;
            }
            fs::remove_file(path_src)
        }
        Err(e) => Err(e),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(not(unix))]
    {
        err.kind() == io::ErrorKind::CrossesDevices
    }
}

fn recreate_symlink(path_src: &Path, path_dst: &Path) -> Result<(), io::Error> {
    let target = fs::read_link(path_src)?;
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&target, path_dst)
    }
    #[cfg(windows)]
    {
        if path_src.is_dir() {
            std::os::windows::fs::symlink_dir(&target, path_dst)
        } else {
            std::os::windows::fs::symlink_file(&target, path_dst)
        }
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (target, path_dst);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Symbolic links are unsupported on this platform",
        ))
    }
}

/// Size of a regular file, `-1` when it cannot be read.
pub(crate) fn file_size(path: &Path) -> i64 {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => i64::try_from(meta.len()).unwrap_or(i64::MAX),
        _ => -1,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
