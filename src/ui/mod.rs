//! Discord presentation: embeds for command replies and session notices.

pub mod embeds;
