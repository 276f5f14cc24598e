//! OCR Lane - asynchronous OCR sessions on a background worker
//!
//! The OCR engine lives on a worker thread and is driven through the
//! `ocr-rpc` proxy protocol. This crate is the host side:
//!
//! - [`OcrClient`]: the session client that owns the worker
//! - [`config`]: layered client configuration
//! - [`ModelSource`] / [`ImageSource`]: inputs resolved on the host
//! - [`logging`]: subscriber setup for applications

pub mod client;
pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod model;
pub mod worker;

pub use client::{OcrClient, ProgressCallback, ProgressListeners, SessionProxy};
pub use config::{ClientConfig, ConfigError};
pub use error::ClientError;
pub use image::ImageSource;
pub use model::ModelSource;
pub use worker::Worker;

pub use ocr_worker::{
    BoxItem, EngineFactory, ImageData, IntRect, Orientation, SessionError, TextItem, TextUnit,
    END_OF_LINE, START_OF_LINE,
};
