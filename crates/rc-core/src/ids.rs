//! Typed IDs for queue items and transcode jobs.
//!
//! Item IDs double as the opaque path segment of every streaming URL and
//! as part of temporary file names, so they print in the compact 32-digit
//! hex form. Parsing accepts that form and the hyphenated one, nothing
//! else, which keeps path-like input out of URL lookups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0.simple(), f)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::try_parse(s).map(Self)
                }
            }
        )+
    };
}

typed_id! {
    /// One queue entry; also the key of its streaming URLs.
    ItemId,
    /// One transcode job run.
    JobId,
}
