//! OCR Lane Worker
//!
//! Worker-side half of OCR Lane. Owns the OCR engine and exposes an
//! [`EngineSession`] over an `ocr-rpc` port so the host can drive it
//! asynchronously from another thread.
//!
//! This crate can be used in two modes:
//! - **Worker thread**: [`runtime::spawn`] serves the [`WorkerApi`] on a port
//! - **In-process library**: [`EngineSession`] used directly, for tests

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod hocr;
pub mod progress;
pub mod runtime;
pub mod session;

pub use api::WorkerApi;
pub use config::WorkerConfig;
pub use engine::mock::{EngineCall, MockEngine, MockEngineFactory, MockFailures, PageScript};
pub use engine::{
    BoxItem, EngineError, EngineFactory, ImageData, IntRect, OcrEngine, Orientation, TextItem,
    TextUnit, END_OF_LINE, START_OF_LINE,
};
pub use error::SessionError;
pub use progress::ProgressReporter;
pub use session::EngineSession;
