// SPDX-License-Identifier: GPL-3.0-or-later

//! Media handling for the recognition pipeline.
//!
//! This crate provides:
//! - Audio extraction from uploaded video containers
//! - Splitting extracted audio into fixed-length, indexed fragments
//! - Scoped temporary files that are removed on every exit path
//!
//! All decoding is delegated to an external toolkit behind [`MediaToolkit`];
//! [`FfmpegToolkit`] drives the `ffmpeg`/`ffprobe` binaries.

pub mod asset;
pub mod error;
pub mod extract;
pub mod fragment;
pub mod toolkit;

pub use asset::{CleanupFailure, CleanupLedger, MediaAsset, ScopedFile};
pub use error::{MediaError, Result};
pub use extract::AudioExtractor;
pub use fragment::{plan_fragments, Fragment, FragmentSpan, Fragmenter};
pub use toolkit::{FfmpegToolkit, MediaToolkit};
