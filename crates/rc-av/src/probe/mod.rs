//! Probe backends implementing [`rc_probe::Prober`].
//!
//! - [`FfprobeProber`] parses `ffprobe -print_format json` output.
//! - [`BannerProber`] parses the stream banner ffmpeg prints for `-i`, for
//!   hosts without ffprobe.

mod banner;
mod ffprobe;

pub use banner::{parse_banner, BannerProber};
pub use ffprobe::{parse_ffprobe_json, FfprobeProber};
