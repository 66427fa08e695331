//! Executable resolution on the search path.
//!
//! When the tool masquerades as the compiler (a symlink named `gcc` pointing
//! at it, or a copy of it installed under that name), a naive `PATH` lookup
//! finds the tool again and loops forever. Every candidate is therefore
//! canonicalized and rejected if it is the excluded path or any executable
//! whose name marks it as one of ours.

use crate::context::ExecContext;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Finds `name` on the configured search path, skipping `exclude_path`.
///
/// An absolute `name` is returned unchanged without touching the
/// filesystem. Returns `None` when there is no search path at all or no
/// acceptable candidate.
pub fn find_executable(
    ctx: &ExecContext,
    name: &str,
    exclude_path: Option<&Path>,
) -> Option<PathBuf> {
    find_executable_with_env(ctx, name, exclude_path, |key| std::env::var_os(key))
}

/// [`find_executable`] with `PATH` read through `lookup`.
pub fn find_executable_with_env<F>(
    ctx: &ExecContext,
    name: &str,
    exclude_path: Option<&Path>,
    lookup: F,
) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    if Path::new(name).is_absolute() {
        return Some(PathBuf::from(name));
    }

    let Some(path_list) = ctx.config.path_list_from(lookup) else {
        debug!("No PATH variable");
        return None;
    };

    find_executable_in_path(name, &path_list, exclude_path, &ctx.config.tool_name)
}

/// Scans `path_list` left to right for the first acceptable `name`.
///
/// A candidate is accepted when it exists and is executable, its canonical
/// form differs from the canonical `exclude_path`, and its canonical form is
/// not an executable recognized by [`is_self_executable`].
pub fn find_executable_in_path(
    name: &str,
    path_list: &str,
    exclude_path: Option<&Path>,
    tool_name: &str,
) -> Option<PathBuf> {
    if path_list.is_empty() {
        return None;
    }

    let real_exclude_path = exclude_path.and_then(|p| p.canonicalize().ok());

    for dir in std::env::split_paths(path_list) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        for candidate in candidates(&dir, name) {
            if !is_executable(&candidate) {
                continue;
            }
            let Ok(real_candidate) = candidate.canonicalize() else {
                continue;
            };
            if real_exclude_path.as_ref() == Some(&real_candidate) {
                trace!("Skipping {}: same as excluded path", candidate.display());
                continue;
            }
            if is_self_executable(&real_candidate, tool_name) {
                trace!("Skipping {}: resolves to {}", candidate.display(), real_candidate.display());
                continue;
            }
            return Some(candidate);
        }
    }

    None
}

fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    #[cfg(windows)]
    {
        vec![dir.join(name), dir.join(format!("{}.exe", name))]
    }

    #[cfg(not(windows))]
    {
        vec![dir.join(name)]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};
    access(path, AccessFlags::X_OK).is_ok()
}

#[cfg(windows)]
fn is_executable(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

/// True if `path` names one of our own executables.
///
/// The file name must start with `tool_name`. On Windows the comparison
/// ignores case and a trailing `.exe`.
pub fn is_self_executable(path: &Path, tool_name: &str) -> bool {
    let Some(file_name) = path.file_name() else {
        return false;
    };
    let name = file_name.to_string_lossy();
    if cfg!(windows) {
        let name = name.to_lowercase();
        let name = name.strip_suffix(".exe").unwrap_or(&name);
        name.starts_with(&tool_name.to_lowercase())
    } else {
        name.starts_with(tool_name)
    }
}
