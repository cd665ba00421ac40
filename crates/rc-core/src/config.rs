//! Settings for every pipeline stage, read from one TOML file.
//!
//! Each table is optional and each key inside it too, so an empty file
//! gives the same result as [`Config::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::Error;

/// Overrides `server.port` when set to a valid port number.
pub const HTTP_PORT_ENV: &str = "REELCAST_HTTP_PORT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub probe: ProbeConfig,
    pub transcode: TranscodeConfig,
    pub queue: QueueConfig,
    pub streaming: StreamingConfig,
    pub device: DeviceConfig,
    pub player: PlayerConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    pub fn apply_env(&mut self) {
        self.apply_port_override(std::env::var(HTTP_PORT_ENV).ok().as_deref());
    }

    fn apply_port_override(&mut self, value: Option<&str>) {
        let Some(raw) = value else { return };
        match raw.trim().parse::<u16>() {
            Ok(port) => self.server.port = port,
            Err(_) => tracing::warn!("ignoring {HTTP_PORT_ENV}={raw:?}: not a port number"),
        }
    }

    /// Settings that parse but are probably mistakes.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut warn = |cond: bool, message: String| {
            if cond {
                warnings.push(message);
            }
        };

        warn(
            self.probe.timeout_secs == 0,
            "probe.timeout_secs is 0; probes will time out immediately".into(),
        );
        warn(
            self.streaming.range_wait_timeout_secs == 0,
            "streaming.range_wait_timeout_secs is 0; ranges past the written length fail at once"
                .into(),
        );
        warn(
            self.streaming.chunk_size == 0,
            "streaming.chunk_size is 0; using 1 MiB".into(),
        );
        warn(
            self.queue.max_lookahead > 3,
            format!(
                "queue.max_lookahead is {}; each item ahead may run its own ffmpeg process",
                self.queue.max_lookahead
            ),
        );
        match self.player.command.as_deref() {
            Some([]) => warn(true, "player.command is empty".into()),
            Some(argv) => warn(
                !argv.iter().any(|a| a.contains("{url}")),
                "player.command has no {url} placeholder; the URL is appended".into(),
            ),
            None => {}
        }
        if let Some(dir) = &self.transcode.output_dir {
            warn(
                !dir.exists(),
                format!(
                    "transcode.output_dir {} does not exist; it will be created",
                    dir.display()
                ),
            );
        }

        warnings
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// 0 picks a random free port.
    pub port: u16,
    /// Host placed in URLs handed to the receiver. Detected when unset.
    pub advertise_host: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 0,
            advertise_host: None,
        }
    }
}

/// Explicit ffmpeg and ffprobe locations; `PATH` is searched otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
    pub thumbnail_offset_secs: u64,
    pub thumbnail_width: u32,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            thumbnail_offset_secs: 30,
            thumbnail_width: 600,
        }
    }
}

/// Hardware H.264 encoder family; `none` is software x264.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    #[default]
    None,
    Videotoolbox,
    Nvenc,
    Vaapi,
    Qsv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Where transcoded files, thumbnails and subtitles go. Unset means
    /// `/var/tmp` when it exists, else the system temp dir.
    pub output_dir: Option<PathBuf>,
    pub video_crf: u32,
    pub video_preset: String,
    pub audio_bitrate: String,
    pub hw_accel: HwAccel,
    /// Seconds ffmpeg gets to exit after SIGTERM before SIGKILL.
    pub kill_grace_secs: u64,
    /// Longest a single ffmpeg run may take before it is killed.
    pub max_runtime_secs: u64,
}

impl TranscodeConfig {
    pub fn resolved_output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None if Path::new("/var/tmp").is_dir() => PathBuf::from("/var/tmp"),
            None => std::env::temp_dir(),
        }
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    pub fn max_runtime(&self) -> Duration {
        Duration::from_secs(self.max_runtime_secs.max(1))
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            video_crf: 20,
            video_preset: "veryfast".into(),
            audio_bitrate: "256k".into(),
            hw_accel: HwAccel::None,
            kill_grace_secs: 5,
            max_runtime_secs: 24 * 60 * 60,
        }
    }
}

/// Queue controller behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Start playback as soon as the current item is ready.
    pub autoplay: bool,
    /// Hold the next item's transcode until the current one is done.
    pub prefetch_after_current: bool,
    /// Items beyond the current one that are probed and transcoded ahead.
    pub max_lookahead: usize,
    /// Output seconds that must be buffered before an explicitly selected
    /// item starts playing while its job is still running. 0 waits for the
    /// job to finish.
    pub start_lead_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            autoplay: true,
            prefetch_after_current: true,
            max_lookahead: 1,
            start_lead_secs: 10,
        }
    }
}

/// Streaming server behaviour for files still being written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Upper bound on how long a range request waits for bytes.
    pub range_wait_timeout_secs: u64,
    /// Largest slice served for an open-ended range on a running job.
    pub chunk_size: u64,
    /// How often the on-disk length is re-checked while waiting.
    pub poll_interval_ms: u64,
}

impl StreamingConfig {
    pub fn range_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.range_wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn effective_chunk_size(&self) -> u64 {
        if self.chunk_size == 0 {
            1024 * 1024
        } else {
            self.chunk_size
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            range_wait_timeout_secs: 30,
            chunk_size: 8 * 1024 * 1024,
            poll_interval_ms: 250,
        }
    }
}

/// Target receiver description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    /// Audio-only receivers (speakers, groups).
    pub audio_only: bool,
    /// Replace the profile's supported video codecs.
    pub video_codecs: Option<Vec<String>>,
    /// Replace the profile's supported audio codecs.
    pub audio_codecs: Option<Vec<String>>,
    /// Replace the profile's supported containers.
    pub containers: Option<Vec<String>>,
}

/// External player used by the CLI receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Program and arguments; `{url}` is replaced with the media URL.
    pub command: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!((cfg.server.host.as_str(), cfg.server.port), ("0.0.0.0", 0));
        assert_eq!(cfg.probe.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.transcode.hw_accel, HwAccel::None);
        assert!(cfg.queue.autoplay && cfg.queue.prefetch_after_current);
        assert_eq!(cfg.queue.max_lookahead, 1);
        assert_eq!(cfg.queue.start_lead_secs, 10);
        assert_eq!(cfg.streaming.chunk_size, 8 * 1024 * 1024);
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let cfg = Config::from_toml(
            r#"
            [server]
            port = 9090

            [device]
            model = "Chromecast Ultra"

            [queue]
            autoplay = false

            [transcode]
            hw_accel = "vaapi"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.device.model.as_deref(), Some("Chromecast Ultra"));
        assert!(!cfg.queue.autoplay);
        assert!(cfg.queue.prefetch_after_current);
        assert_eq!(cfg.transcode.hw_accel, HwAccel::Vaapi);
        assert_eq!(cfg.transcode.audio_bitrate, "256k");
    }

    #[test]
    fn empty_document_is_default() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.streaming.range_wait_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.transcode.kill_grace(), Duration::from_secs(5));
        assert_eq!(cfg.transcode.max_runtime(), Duration::from_secs(86_400));
    }

    #[test]
    fn bad_documents_are_rejected() {
        for text in ["[server\nport = ", "[transcode]\nhw_accel = \"voodoo\"\n"] {
            let err = Config::from_toml(text).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{text}: {err}");
        }
    }

    #[test]
    fn defaults_survive_a_toml_round_trip() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back.queue.start_lead_secs, 10);
        assert_eq!(back.transcode.video_preset, "veryfast");
    }

    #[test]
    fn port_override_ignores_garbage() {
        let mut cfg = Config::default();
        cfg.apply_port_override(Some(" 8123 "));
        assert_eq!(cfg.server.port, 8123);
        cfg.apply_port_override(Some("not-a-port"));
        cfg.apply_port_override(Some("70000"));
        cfg.apply_port_override(None);
        assert_eq!(cfg.server.port, 8123);
    }

    #[test]
    fn player_command_warnings() {
        let mut cfg = Config::default();
        cfg.player.command = Some(vec!["mpv".into()]);
        assert!(cfg.validate().iter().any(|w| w.contains("{url}")));

        cfg.player.command = Some(vec![]);
        assert_eq!(cfg.validate(), ["player.command is empty"]);

        cfg.player.command = Some(vec!["mpv".into(), "{url}".into()]);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn zero_chunk_size_warns_and_falls_back() {
        let mut cfg = Config::default();
        cfg.streaming.chunk_size = 0;
        assert_eq!(cfg.streaming.effective_chunk_size(), 1024 * 1024);
        assert!(cfg.validate()[0].starts_with("streaming.chunk_size"));
    }

    #[test]
    fn explicit_output_dir_wins() {
        let cfg = TranscodeConfig {
            output_dir: Some(PathBuf::from("/srv/reelcast")),
            ..TranscodeConfig::default()
        };
        assert_eq!(cfg.resolved_output_dir(), Path::new("/srv/reelcast"));
    }
}
