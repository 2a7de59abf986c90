//! Asynchronous media compression service.
//!
//! Jobs describing a video asset, an image asset, or both are persisted to a
//! SQL job store, queued by priority in Redis, and driven to completion by a
//! bounded worker pool that shells out to ffmpeg and ImageMagick and uploads
//! the outputs to a WordPress media library.

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod pipelines;
pub mod services;
pub mod transport;
