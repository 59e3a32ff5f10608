//! # Audio Module
//!
//! Per-guild playback sessions for Open Music Bot.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! ### [`resolver`] - Audio Resolution
//! - Turns a normalized query into a playable source
//! - Primary extractor, fallback downloader, shared TTL cache
//!
//! ### [`queue`] - Session Queue
//! - Bounded FIFO of pending requests, insertion order is play order
//!
//! ### [`supervisor`] - Encoder Supervision
//! - One ffmpeg process per stream, frames batched into the voice sink
//! - Exit codes become `Ended` / `Failed` events
//!
//! ### [`connection`] - Voice Connection
//! - Handshake, drop detection, capped exponential reconnect, idle timer
//!
//! ### [`controller`] / [`session`] - Session Lane
//! - One actor task per guild; the registry only stores handles
//!
//! [`transport`] adapts songbird to the frame sink the connection expects.

pub mod connection;
pub mod controller;
pub mod queue;
pub mod resolver;
pub mod session;
pub mod supervisor;
pub mod transport;
