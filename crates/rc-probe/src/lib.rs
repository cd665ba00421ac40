//! # rc-probe
//!
//! Stream inventory types and the probing interface.
//!
//! Probe backends live in `rc-av` (they shell out to ffprobe/ffmpeg); this
//! crate only defines what a probe returns and how backends compose:
//!
//! - [`StreamIndex`]: the typed `{track, slot, hex_tag}` form of the index
//!   tokens printed by media tools (`0:1`, `0:0[0x1]`, `3`).
//! - [`StreamInfo`] / [`MediaInfo`]: one stream, and a file's full inventory.
//! - [`Prober`]: the async probing trait, and [`CompositeProber`] which tries
//!   several backends in order.

pub mod composite;
pub mod index;
pub mod prober;
pub mod types;

pub use composite::CompositeProber;
pub use index::{StreamIndex, StreamIndexError};
pub use prober::Prober;
pub use types::{MediaInfo, StreamInfo};
