//! Receiver capability profiles.
//!
//! Every receiver plays H.264 video with AAC or MP3 audio from MP4, MP3, AAC
//! or WAV files. Some models additionally decode H.265 and AC-3; those are
//! listed in [`KNOWN_DEVICES`]. Unknown models get the baseline profile.

use rc_core::config::DeviceConfig;
use serde::Serialize;

/// A known receiver model and its optional decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub h265: bool,
    pub ac3: bool,
}

const fn device(manufacturer: &'static str, model: &'static str, h265: bool, ac3: bool) -> KnownDevice {
    KnownDevice {
        manufacturer,
        model,
        h265,
        ac3,
    }
}

/// Receivers with known decoder support.
pub const KNOWN_DEVICES: &[KnownDevice] = &[
    device("Unknown manufacturer", "Chromecast", false, false),
    device("Unknown manufacturer", "Chromecast Ultra", true, true),
    device("Unknown manufacturer", "Google Home Mini", false, false),
    device("Google Inc.", "Chromecast", false, false),
    device("Google Inc.", "Chromecast Ultra", true, true),
    device("Google", "Google TV Streamer", true, true),
    device("Sony", "BRAVIA 4K GB", true, true),
    device("TCL", "Chromecast", true, true),
    device("Philips", "Chromecast", true, true),
    device("Sharp", "Chromecast", true, true),
    device("Toshiba", "Chromecast", true, true),
    device("Hisense", "Chromecast", true, true),
    device("Xiaomi", "Mi TV", true, true),
    device("VIZIO", "P75-F1", true, true),
];

const BASE_VIDEO: &[&str] = &["h264"];
const BASE_AUDIO: &[&str] = &["aac", "mp3"];
const BASE_CONTAINERS: &[&str] = &["mp4", "mp3", "aac", "wav"];

/// Effective capabilities of the target receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    pub name: String,
    pub h265: bool,
    pub ac3: bool,
    pub audio_only: bool,
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
    pub containers: Vec<String>,
}

impl DeviceProfile {
    /// The profile every receiver satisfies.
    pub fn baseline() -> Self {
        Self::from_flags("Default", false, false, false)
    }

    fn from_flags(name: &str, h265: bool, ac3: bool, audio_only: bool) -> Self {
        // Audio-only receivers never decode H.265, whatever the table says.
        let h265 = h265 && !audio_only;
        let mut video_codecs: Vec<String> = BASE_VIDEO.iter().map(|s| s.to_string()).collect();
        if h265 {
            video_codecs.extend(["hevc".to_string(), "h265".to_string()]);
        }
        let mut audio_codecs: Vec<String> = BASE_AUDIO.iter().map(|s| s.to_string()).collect();
        if ac3 {
            audio_codecs.push("ac3".into());
        }
        Self {
            name: name.to_string(),
            h265,
            ac3,
            audio_only,
            video_codecs,
            audio_codecs,
            containers: BASE_CONTAINERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Look up a model in [`KNOWN_DEVICES`].
    ///
    /// An exact manufacturer match wins; with no manufacturer given the first
    /// entry for the model is used.
    pub fn lookup(manufacturer: Option<&str>, model: &str) -> Option<Self> {
        let found = KNOWN_DEVICES
            .iter()
            .find(|d| d.model == model && Some(d.manufacturer) == manufacturer)
            .or_else(|| {
                manufacturer
                    .is_none()
                    .then(|| KNOWN_DEVICES.iter().find(|d| d.model == model))
                    .flatten()
            })?;
        Some(Self::from_flags(found.model, found.h265, found.ac3, false))
    }

    /// Build the profile for a configured receiver, applying overrides.
    pub fn resolve(config: &DeviceConfig) -> Self {
        let mut profile = match config.model.as_deref() {
            Some(model) => Self::lookup(config.manufacturer.as_deref(), model).unwrap_or_else(|| {
                tracing::info!(model, "unknown receiver model, using baseline profile");
                Self::baseline()
            }),
            None => Self::baseline(),
        };

        if config.audio_only {
            profile = Self::from_flags(&profile.name, profile.h265, profile.ac3, true);
        }
        if let Some(ref codecs) = config.video_codecs {
            profile.video_codecs = normalize_all(codecs, rc_core::normalize_codec);
        }
        if let Some(ref codecs) = config.audio_codecs {
            profile.audio_codecs = normalize_all(codecs, rc_core::normalize_codec);
            profile.ac3 = profile.audio_codecs.iter().any(|c| c == "ac3");
        }
        if let Some(ref containers) = config.containers {
            profile.containers = normalize_all(containers, rc_core::normalize_container);
        }
        profile
    }

    pub fn supports_video(&self, codec: &str) -> bool {
        !self.audio_only && self.video_codecs.iter().any(|c| c == codec)
    }

    pub fn supports_audio(&self, codec: &str) -> bool {
        self.audio_codecs.iter().any(|c| c == codec)
    }

    pub fn supports_container(&self, container: &str) -> bool {
        self.containers.iter().any(|c| c == container)
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::baseline()
    }
}

fn normalize_all(values: &[String], normalize: fn(&str) -> String) -> Vec<String> {
    values.iter().map(|v| normalize(v)).collect()
}
