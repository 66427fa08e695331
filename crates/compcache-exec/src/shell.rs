//! Detection of targets that must run through a POSIX shell.
//!
//! Windows cannot execute shell scripts directly, so a `.sh` target (or,
//! when enabled, a file starting with `#!/bin/sh`) is handed to `sh.exe`
//! found on the search path.

use crate::config::ExecConfig;
use crate::find::find_executable_in_path;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SHELL_EXECUTABLE: &str = "sh.exe";
pub const SHEBANG: &[u8] = b"#!/bin/sh";

/// Returns the shell that must interpret `path`, or `None` to run it directly.
pub fn win32_shell(path: &Path, config: &ExecConfig) -> Option<PathBuf> {
    let path_list = config.path_list()?;

    let mut shell = None;
    if has_sh_extension(path) {
        shell = find_executable_in_path(SHELL_EXECUTABLE, &path_list, None, &config.tool_name);
    }
    if shell.is_none() && config.detect_shebang && starts_with_shebang(path) {
        shell = find_executable_in_path(SHELL_EXECUTABLE, &path_list, None, &config.tool_name);
    }

    if let Some(ref sh) = shell {
        debug!("Running {} through {}", path.display(), sh.display());
    }
    shell
}

fn has_sh_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("sh"))
}

/// True if the first line of the file is exactly the shebang marker.
///
/// Only the first `SHEBANG.len()` bytes are read.
fn starts_with_shebang(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };

    let mut head = Vec::with_capacity(SHEBANG.len());
    if file.take(SHEBANG.len() as u64).read_to_end(&mut head).is_err() {
        return false;
    }
    if let Some(newline) = head.iter().position(|&b| b == b'\n') {
        head.truncate(newline);
    }
    head == SHEBANG
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// A search directory holding an `sh.exe` and a config pointing at it.
    fn shell_fixture() -> (TempDir, PathBuf, ExecConfig) {
        let dir = TempDir::new().unwrap();
        let sh = dir.path().join(SHELL_EXECUTABLE);
        fs::write(&sh, b"").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&sh, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let config = ExecConfig {
            path: Some(dir.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        (dir, sh, config)
    }

    #[test]
    fn test_sh_extension_uses_shell() {
        let (_dir, sh, config) = shell_fixture();
        let found = win32_shell(Path::new("C:/project/configure.SH"), &config);
        assert_eq!(found, Some(sh));
    }

    #[test]
    fn test_plain_executable_needs_no_shell() {
        let (dir, _sh, config) = shell_fixture();
        let target = dir.path().join("gcc.exe");
        fs::write(&target, b"MZ\x90\x00").unwrap();
        assert_eq!(win32_shell(&target, &config), None);
    }

    #[test]
    fn test_shebang_only_when_enabled() {
        let (dir, sh, mut config) = shell_fixture();
        let script = dir.path().join("cc-wrapper");
        fs::write(&script, b"#!/bin/sh\nexec gcc \"$@\"\n").unwrap();

        assert_eq!(win32_shell(&script, &config), None);

        config.detect_shebang = true;
        assert_eq!(win32_shell(&script, &config), Some(sh));
    }

    #[test]
    fn test_other_interpreters_are_not_shell() {
        let (dir, _sh, mut config) = shell_fixture();
        config.detect_shebang = true;

        let script = dir.path().join("wrapper");
        fs::write(&script, b"#!/usr/bin/env python3\n").unwrap();
        assert_eq!(win32_shell(&script, &config), None);

        let short = dir.path().join("short");
        fs::write(&short, b"#!/bin/\n").unwrap();
        assert_eq!(win32_shell(&short, &config), None);
    }

    #[test]
    fn test_missing_file_is_not_shell() {
        let (dir, _sh, mut config) = shell_fixture();
        config.detect_shebang = true;
        assert_eq!(win32_shell(&dir.path().join("absent"), &config), None);
    }

    #[test]
    fn test_no_shell_on_path() {
        let dir = TempDir::new().unwrap();
        let config = ExecConfig {
            path: Some(dir.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        assert_eq!(win32_shell(Path::new("build.sh"), &config), None);
    }
}
