//! Locating ffmpeg and ffprobe.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use rc_core::config::ToolsConfig;
use serde::Serialize;

/// The external binaries reelcast drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Required: transcodes, thumbnails, subtitles and the banner fallback
    /// prober.
    Ffmpeg,
    /// Optional: preferred prober when installed.
    Ffprobe,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::Ffmpeg, Tool::Ffprobe];

    /// Executable name searched for in `PATH`.
    pub fn binary(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }

    fn configured(self, config: &ToolsConfig) -> Option<&Path> {
        match self {
            Tool::Ffmpeg => config.ffmpeg_path.as_deref(),
            Tool::Ffprobe => config.ffprobe_path.as_deref(),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// One row of `reelcast check-tools`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub tool: Tool,
    pub available: bool,
    /// First line of `-version` output.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolved executable paths.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    paths: HashMap<Tool, PathBuf>,
}

impl ToolRegistry {
    /// A configured path wins when it exists; otherwise `PATH` is searched.
    /// Tools found nowhere are left out.
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut paths = HashMap::new();
        for tool in Tool::ALL {
            let resolved = match tool.configured(config) {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!("configured {tool} path {} does not exist", p.display());
                    which::which(tool.binary()).ok()
                }
                None => which::which(tool.binary()).ok(),
            };
            match resolved {
                Some(path) => {
                    tracing::debug!(%tool, path = %path.display(), "found tool");
                    paths.insert(tool, path);
                }
                None => tracing::debug!(%tool, "tool not found"),
            }
        }
        Self { paths }
    }

    /// Path to `tool`, or [`rc_core::Error::Tool`] when it was not found.
    pub fn require(&self, tool: Tool) -> rc_core::Result<&Path> {
        self.paths
            .get(&tool)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                rc_core::Error::tool(
                    tool.binary(),
                    format!("{tool} not found; is it installed and in PATH?"),
                )
            })
    }

    pub fn get(&self, tool: Tool) -> Option<&Path> {
        self.paths.get(&tool).map(PathBuf::as_path)
    }

    /// Availability and version of every tool, running `-version` on the
    /// ones that were found.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        Tool::ALL
            .into_iter()
            .map(|tool| {
                let path = self.paths.get(&tool).cloned();
                ToolInfo {
                    tool,
                    available: path.is_some(),
                    version: path.as_deref().and_then(detect_version),
                    path,
                }
            })
            .collect()
    }
}

fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_a_tool_error() {
        let registry = ToolRegistry::default();
        let err = registry.require(Tool::Ffmpeg).unwrap_err();
        assert!(matches!(err, rc_core::Error::Tool { .. }));
        assert!(err.to_string().contains("ffmpeg not found"), "{err}");
        assert!(registry.get(Tool::Ffprobe).is_none());
    }

    #[test]
    fn check_all_lists_every_tool_in_order() {
        let infos = ToolRegistry::default().check_all();
        let tools: Vec<Tool> = infos.iter().map(|i| i.tool).collect();
        assert_eq!(tools, Tool::ALL);
        assert!(infos.iter().all(|i| !i.available && i.version.is_none()));
    }

    #[test]
    fn configured_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("my-ffmpeg");
        std::fs::write(&fake, b"").unwrap();

        let cfg = ToolsConfig {
            ffmpeg_path: Some(fake.clone()),
            ffprobe_path: None,
        };
        let registry = ToolRegistry::discover(&cfg);
        assert_eq!(registry.require(Tool::Ffmpeg).unwrap(), fake.as_path());
    }

    #[cfg(unix)]
    #[test]
    fn version_is_first_line_of_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("ffprobe");
        std::fs::write(
            &fake,
            "#!/bin/sh\necho 'ffprobe version 6.1.1 Copyright (c) 2007-2023'\necho 'built with gcc'\n",
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cfg = ToolsConfig {
            ffmpeg_path: None,
            ffprobe_path: Some(fake),
        };
        let info = ToolRegistry::discover(&cfg)
            .check_all()
            .into_iter()
            .find(|i| i.tool == Tool::Ffprobe)
            .unwrap();
        assert!(info.available);
        assert_eq!(
            info.version.as_deref(),
            Some("ffprobe version 6.1.1 Copyright (c) 2007-2023")
        );
    }
}
