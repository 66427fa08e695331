use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Default name used to recognize our own executable on the search path.
pub const DEFAULT_TOOL_NAME: &str = "compcache";

pub const ENV_PATH: &str = "COMPCACHE_PATH";
pub const ENV_TEMPORARY_DIR: &str = "COMPCACHE_TEMPDIR";
pub const ENV_DETECT_SHEBANG: &str = "COMPCACHE_DETECT_SHEBANG";

/// Execution settings consumed read-only by the resolver and the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Search path used instead of `PATH` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Directory for oversized-argument response files
    #[serde(default = "default_temporary_dir")]
    pub temporary_dir: PathBuf,

    /// Sniff `#!/bin/sh` in targets without a `.sh` extension (Windows)
    #[serde(default)]
    pub detect_shebang: bool,

    /// Executables whose file name starts with this are never resolved
    #[serde(default = "default_tool_name")]
    pub tool_name: String,
}

fn default_temporary_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_tool_name() -> String {
    DEFAULT_TOOL_NAME.to_string()
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            path: None,
            temporary_dir: default_temporary_dir(),
            detect_shebang: false,
            tool_name: default_tool_name(),
        }
    }
}

impl ExecConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var_os(key));
        config
    }

    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: ExecConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tool_name.trim().is_empty() {
            return Err(anyhow!("tool_name cannot be empty"));
        }
        if self.temporary_dir.as_os_str().is_empty() {
            return Err(anyhow!("temporary_dir cannot be empty"));
        }
        Ok(())
    }

    /// Apply `COMPCACHE_*` overrides using `lookup` to read variables.
    ///
    /// `COMPCACHE_DETECT_SHEBANG` enables detection by its presence alone.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<OsString>,
    {
        if let Some(path) = lookup(ENV_PATH) {
            self.path = Some(path.to_string_lossy().into_owned());
        }
        if let Some(dir) = lookup(ENV_TEMPORARY_DIR).filter(|d| !d.is_empty()) {
            self.temporary_dir = PathBuf::from(dir);
        }
        if lookup(ENV_DETECT_SHEBANG).is_some() {
            self.detect_shebang = true;
        }
    }

    /// The search path: the configured value, else `PATH`, else nothing.
    pub fn path_list(&self) -> Option<String> {
        self.path_list_from(|key| std::env::var_os(key))
    }

    /// Like [`ExecConfig::path_list`], reading `PATH` through `lookup`.
    pub fn path_list_from<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        self.path.clone().filter(|p| !p.is_empty()).or_else(|| {
            lookup("PATH")
                .and_then(|p| p.into_string().ok())
                .filter(|p| !p.is_empty())
        })
    }
}
