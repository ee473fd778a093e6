//! Rectangle and TN-measurement annotation of ultrasound frames.
//!
//! The interactive core ([`session::AnnotationSession`]) is independent of any
//! GUI: it consumes pointer events in image-pixel space and writes a
//! [`snapshot::Snapshot`] to an injected [`store::SnapshotStore`] after every
//! completed mutation. The binary wraps it in an `eframe` window.

pub mod catalog;
pub mod config;
pub mod geometry;
pub mod measurement;
pub mod overlay;
pub mod palette;
pub mod reconcile;
pub mod rectangle;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod view;
