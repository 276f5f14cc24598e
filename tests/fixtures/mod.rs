//! Shared fixtures for the integration suites.
//!
//! - A scripted document page (pixels plus the words the engine reports)
//! - Engine factories with that page registered
//! - Progress recorders

#![allow(dead_code)]

use std::sync::{Arc, Once};

use image::{Rgba, RgbaImage};
use ocr_lane::{ClientConfig, ImageData, IntRect, OcrClient, ProgressCallback};
use ocr_worker::{MockEngineFactory, PageScript};
use parking_lot::Mutex;

pub const PAGE_WIDTH: u32 = 120;
pub const PAGE_HEIGHT: u32 = 80;

/// Model bytes accepted by the scripted engine.
pub const MODEL: &[u8] = b"eng.traineddata";

pub const FIRST_LINE: &str = "The quick brown fox";
pub const SECOND_LINE: &str = "jumps over the lazy dog";

static INIT: Once = Once::new();

/// Install a test subscriber once, filtered by `RUST_LOG`.
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn word(
    text: &'static str,
    left: i32,
    top: i32,
    right: i32,
    confidence: f32,
) -> (&'static str, IntRect, f32) {
    (text, IntRect::new(left, top, right, top + 12), confidence)
}

/// Words on the document page, line by line.
pub fn document_script() -> PageScript {
    PageScript::from_lines(vec![
        vec![
            word("The", 10, 10, 28, 0.96),
            word("quick", 32, 10, 58, 0.93),
            word("brown", 62, 10, 90, 0.91),
            word("fox", 94, 10, 110, 0.95),
        ],
        vec![
            word("jumps", 10, 30, 38, 0.9),
            word("over", 42, 30, 62, 0.94),
            word("the", 66, 30, 80, 0.97),
            word("lazy", 84, 30, 102, 0.89),
            word("dog", 106, 30, 118, 0.92),
        ],
    ])
}

/// The document page: dark word blocks on a faintly shaded background.
pub fn document_page() -> RgbaImage {
    let mut page = RgbaImage::from_fn(PAGE_WIDTH, PAGE_HEIGHT, |x, y| {
        Rgba([255, 255 - (x % 16) as u8, 255 - (y % 8) as u8, 255])
    });
    for rect in document_script().words().iter().map(|w| w.rect) {
        for y in rect.top..rect.bottom {
            for x in rect.left..rect.right {
                page.put_pixel(x as u32, y as u32, Rgba([20, 20, 20, 255]));
            }
        }
    }
    page
}

pub fn document_image_data() -> ImageData {
    rgba_to_image_data(document_page())
}

pub fn blank_page(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
}

pub fn rgba_to_image_data(image: RgbaImage) -> ImageData {
    let (width, height) = image.dimensions();
    ImageData::new(image.into_raw(), width as i32, height as i32)
}

/// Factory whose engines know the document page in all four rotations.
pub fn scripted_factory() -> MockEngineFactory {
    let factory = MockEngineFactory::new();
    factory.register_page(&document_image_data(), document_script());
    factory
}

pub fn client_with(factory: &MockEngineFactory, config: ClientConfig) -> OcrClient {
    init_test_logger();
    OcrClient::new(config, Arc::new(factory.clone())).expect("client starts")
}

/// Client whose engine is created from an in-memory `binary`.
pub fn client_with_binary(
    factory: &MockEngineFactory,
    config: ClientConfig,
    binary: Vec<u8>,
) -> OcrClient {
    init_test_logger();
    OcrClient::with_engine_binary(config, Arc::new(factory.clone()), Some(binary))
        .expect("client starts")
}

pub fn client(factory: &MockEngineFactory) -> OcrClient {
    client_with(factory, ClientConfig::default())
}

/// Client with the model and the document page already loaded.
pub async fn ready_client(factory: &MockEngineFactory) -> OcrClient {
    let client = client(factory);
    client.load_model(MODEL.to_vec()).await.expect("model loads");
    client
        .load_image(document_page())
        .await
        .expect("image loads");
    client
}

/// A progress callback and the values it has seen.
pub fn progress_recorder() -> (ProgressCallback, Arc<Mutex<Vec<u8>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (Box::new(move |p| sink.lock().push(p)), seen)
}
