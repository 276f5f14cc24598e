//! Scripted engine.
//!
//! Stands in for the compiled engine in tests and demos. Results are scripted
//! per page: a page is registered together with the words it contains, keyed
//! by the SHA-256 of its pixels, and loading those exact pixels later makes
//! the engine "recognize" the scripted words.
//!
//! Registering a page also registers its 90, 180 and 270 degree clockwise
//! rotations, with rotated word boxes and a matching orientation. Pixels that
//! match no registered page behave like a blank page: no layout boxes, one
//! empty text box and an undetermined orientation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{
    BoxItem, EngineError, EngineFactory, ImageData, IntRect, OcrEngine, Orientation, TextItem,
    TextUnit, END_OF_LINE, START_OF_LINE,
};
use crate::hocr;

/// Progress values reported by a recognition pass unless overridden.
pub const DEFAULT_PROGRESS_RAMP: [i32; 7] = [0, 10, 25, 50, 75, 90, 100];

/// Scripted contents of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageScript {
    words: Vec<TextItem>,
    layout: Option<Vec<BoxItem>>,
}

impl PageScript {
    /// Build a page from lines of `(text, rect, confidence)` words. Line
    /// flags are derived from each word's position in its line.
    pub fn from_lines(lines: Vec<Vec<(&str, IntRect, f32)>>) -> Self {
        let mut words = Vec::new();
        for line in lines {
            let last = line.len().saturating_sub(1);
            for (index, (text, rect, confidence)) in line.into_iter().enumerate() {
                let mut flags = 0;
                if index == 0 {
                    flags |= START_OF_LINE;
                }
                if index == last {
                    flags |= END_OF_LINE;
                }
                words.push(TextItem {
                    rect,
                    flags,
                    confidence,
                    text: text.to_string(),
                });
            }
        }
        Self {
            words,
            layout: None,
        }
    }

    /// Word boxes reported by layout analysis before recognition has run.
    /// Defaults to the recognized words' boxes.
    pub fn with_layout(mut self, layout: Vec<BoxItem>) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn words(&self) -> &[TextItem] {
        &self.words
    }

    /// Page text: one line per text line, words separated by spaces.
    pub fn text(&self) -> String {
        self.lines()
            .into_iter()
            .map(|line| line.text + "\n")
            .collect()
    }

    fn lines(&self) -> Vec<TextItem> {
        let mut lines: Vec<Vec<&TextItem>> = Vec::new();
        for word in &self.words {
            let starts = word.flags & START_OF_LINE != 0;
            match lines.last_mut() {
                Some(line) if !starts => line.push(word),
                _ => lines.push(vec![word]),
            }
        }

        lines
            .into_iter()
            .filter_map(|line| {
                let rect = line.iter().map(|w| w.rect).reduce(|a, b| a.union(&b))?;
                let confidence =
                    line.iter().map(|w| w.confidence).sum::<f32>() / line.len() as f32;
                let text = line
                    .iter()
                    .map(|w| w.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(TextItem {
                    rect,
                    flags: 0,
                    confidence,
                    text,
                })
            })
            .collect()
    }

    /// Script for this page rotated 90 degrees clockwise.
    fn rotated_cw(&self, height: i32) -> PageScript {
        let rotate = |rect: IntRect| rotate_rect_cw(rect, height);
        PageScript {
            words: self
                .words
                .iter()
                .map(|w| TextItem {
                    rect: rotate(w.rect),
                    ..w.clone()
                })
                .collect(),
            layout: self.layout.as_ref().map(|layout| {
                layout
                    .iter()
                    .map(|b| BoxItem {
                        rect: rotate(b.rect),
                        flags: b.flags,
                    })
                    .collect()
            }),
        }
    }
}

/// Rotate a rectangle on a page of height `height` by 90 degrees clockwise.
fn rotate_rect_cw(rect: IntRect, height: i32) -> IntRect {
    IntRect {
        left: height - rect.bottom,
        top: rect.left,
        right: height - rect.top,
        bottom: rect.right,
    }
}

/// Rotate RGBA pixels clockwise by `quarter_turns` * 90 degrees.
pub fn rotate_image(image: &ImageData, quarter_turns: u32) -> ImageData {
    let mut current = image.clone();
    for _ in 0..quarter_turns % 4 {
        current = rotate_image_cw(&current);
    }
    current
}

fn rotate_image_cw(image: &ImageData) -> ImageData {
    let (w, h) = (image.width.max(0) as usize, image.height.max(0) as usize);
    let mut data = vec![0u8; w * h * 4];
    for y in 0..h {
        for x in 0..w {
            let src = (y * w + x) * 4;
            let (dx, dy) = (h - 1 - y, x);
            let dst = (dy * h + dx) * 4;
            if let (Some(pixel), Some(out)) = (image.data.get(src..src + 4), data.get_mut(dst..dst + 4)) {
                out.copy_from_slice(pixel);
            }
        }
    }
    ImageData::new(data, image.height, image.width)
}

/// SHA-256 of the pixel bytes covered by the image's dimensions.
pub fn pixel_digest(image: &ImageData) -> String {
    let len = image.required_len().unwrap_or(0).min(image.data.len());
    hex::encode(Sha256::digest(&image.data[..len]))
}

/// Engine operations recorded by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineCall {
    Create,
    LoadModel,
    LoadImage,
    ClearImage,
    AnalyseLayout,
    Recognize,
    Delete,
}

/// Failures the mock should inject.
#[derive(Debug, Clone, Default)]
pub struct MockFailures {
    /// Reject every model, even non-empty ones.
    pub reject_model: bool,
    /// Reject every image at the engine boundary.
    pub reject_image: bool,
    /// Fail engine creation.
    pub fail_create: bool,
    /// Block engine creation this long before answering.
    pub create_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
struct RegisteredPage {
    script: PageScript,
    rotation: u32,
}

#[derive(Debug)]
struct MockState {
    pages: HashMap<String, RegisteredPage>,
    progress_ramp: Vec<i32>,
    failures: MockFailures,
    calls: Vec<EngineCall>,
    binaries: Vec<Option<Vec<u8>>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            pages: HashMap::new(),
            progress_ramp: DEFAULT_PROGRESS_RAMP.to_vec(),
            failures: MockFailures::default(),
            calls: Vec::new(),
            binaries: Vec::new(),
        }
    }
}

/// Factory for [`MockEngine`]s sharing one script and call log.
#[derive(Debug, Clone, Default)]
pub struct MockEngineFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `image` and its three rotations.
    pub fn register_page(&self, image: &ImageData, script: PageScript) {
        let mut state = self.state.lock();
        let mut pixels = image.clone();
        let mut page = script;
        for rotation in [0, 90, 180, 270] {
            let digest = pixel_digest(&pixels);
            debug!(%digest, rotation, "registered mock page");
            state.pages.insert(
                digest,
                RegisteredPage {
                    script: page.clone(),
                    rotation,
                },
            );
            page = page.rotated_cw(pixels.height);
            pixels = rotate_image_cw(&pixels);
        }
    }

    pub fn set_progress_ramp(&self, ramp: Vec<i32>) {
        self.state.lock().progress_ramp = ramp;
    }

    pub fn set_failures(&self, failures: MockFailures) {
        self.state.lock().failures = failures;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, call: EngineCall) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    /// Engine binaries passed to `create`, in order.
    pub fn binaries(&self) -> Vec<Option<Vec<u8>>> {
        self.state.lock().binaries.clone()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self, binary: Option<Vec<u8>>) -> Result<Box<dyn OcrEngine>, EngineError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(EngineCall::Create);
            state.failures.create_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if state.failures.fail_create {
            return Err(EngineError::Init("engine creation disabled".to_string()));
        }
        if binary.as_ref().is_some_and(|b| b.is_empty()) {
            return Err(EngineError::Init("engine binary is empty".to_string()));
        }
        state.binaries.push(binary);
        Ok(Box::new(MockEngine::new(Arc::clone(&self.state))))
    }
}

#[derive(Debug)]
struct LoadedImage {
    width: i32,
    height: i32,
    page: Option<RegisteredPage>,
}

/// Engine instance driven by a [`MockEngineFactory`]'s script.
#[derive(Debug)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
    model_loaded: bool,
    image: Option<LoadedImage>,
    recognized: bool,
    variables: HashMap<String, String>,
}

impl MockEngine {
    fn new(state: Arc<Mutex<MockState>>) -> Self {
        let variables = [
            ("tessedit_pageseg_mode", "3"),
            ("tessedit_char_whitelist", ""),
            ("tessedit_char_blacklist", ""),
            ("preserve_interword_spaces", "0"),
            ("user_defined_dpi", "0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            state,
            model_loaded: false,
            image: None,
            recognized: false,
            variables,
        }
    }

    fn record(&self, call: EngineCall) {
        self.state.lock().calls.push(call);
    }

    fn loaded(&self) -> Result<&LoadedImage, EngineError> {
        self.image.as_ref().ok_or(EngineError::NoImage)
    }

    fn blank_box(image: &LoadedImage, unit: TextUnit) -> TextItem {
        TextItem {
            rect: IntRect::new(0, 0, image.width, image.height),
            flags: match unit {
                TextUnit::Word => START_OF_LINE | END_OF_LINE,
                TextUnit::Line => 0,
            },
            confidence: 0.0,
            text: String::new(),
        }
    }
}

impl OcrEngine for MockEngine {
    fn load_model(&mut self, model: &[u8]) -> Result<(), EngineError> {
        self.record(EngineCall::LoadModel);
        if self.state.lock().failures.reject_model {
            return Err(EngineError::ModelRejected("model rejected by script".to_string()));
        }
        if model.is_empty() {
            return Err(EngineError::ModelRejected("model data is empty".to_string()));
        }
        self.model_loaded = true;
        Ok(())
    }

    fn load_image(&mut self, image: &ImageData) -> Result<(), EngineError> {
        self.record(EngineCall::LoadImage);
        let state = self.state.lock();
        if state.failures.reject_image {
            return Err(EngineError::ImageRejected("image rejected by script".to_string()));
        }
        let page = state.pages.get(&pixel_digest(image)).cloned();
        drop(state);

        self.image = Some(LoadedImage {
            width: image.width,
            height: image.height,
            page,
        });
        self.recognized = false;
        Ok(())
    }

    fn clear_image(&mut self) {
        self.record(EngineCall::ClearImage);
        self.image = None;
        self.recognized = false;
    }

    fn analyse_layout(&mut self) -> Result<(), EngineError> {
        self.record(EngineCall::AnalyseLayout);
        self.loaded().map(drop)
    }

    fn bounding_boxes(&mut self, unit: TextUnit) -> Result<Vec<BoxItem>, EngineError> {
        let image = self.loaded()?;
        let Some(page) = &image.page else {
            return Ok(Vec::new());
        };
        let boxes = match (unit, &page.script.layout) {
            (TextUnit::Word, Some(layout)) if !self.recognized => layout.clone(),
            (TextUnit::Word, _) => page.script.words.iter().map(TextItem::to_box).collect(),
            (TextUnit::Line, _) => page.script.lines().iter().map(TextItem::to_box).collect(),
        };
        Ok(boxes)
    }

    fn recognize(&mut self, on_progress: &mut dyn FnMut(i32)) -> Result<(), EngineError> {
        self.record(EngineCall::Recognize);
        self.loaded()?;
        let ramp = self.state.lock().progress_ramp.clone();
        for value in ramp {
            on_progress(value);
        }
        self.recognized = true;
        Ok(())
    }

    fn text_boxes(&mut self, unit: TextUnit) -> Result<Vec<TextItem>, EngineError> {
        let image = self.loaded()?;
        let items = match &image.page {
            None => vec![Self::blank_box(image, unit)],
            Some(page) => match unit {
                TextUnit::Word => page.script.words.clone(),
                TextUnit::Line => page.script.lines(),
            },
        };
        Ok(items)
    }

    fn text(&mut self) -> Result<String, EngineError> {
        let image = self.loaded()?;
        Ok(image
            .page
            .as_ref()
            .map(|page| page.script.text())
            .unwrap_or_default())
    }

    fn hocr(&mut self) -> Result<String, EngineError> {
        let words = self.text_boxes(TextUnit::Word)?;
        let image = self.loaded()?;
        Ok(hocr::render(image.width, image.height, &words))
    }

    fn orientation(&mut self) -> Result<Orientation, EngineError> {
        let image = self.loaded()?;
        Ok(match &image.page {
            Some(page) => Orientation {
                rotation: page.rotation,
                confidence: 1.0,
            },
            None => Orientation::undetermined(),
        })
    }

    fn variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        match self.variables.get_mut(name) {
            Some(slot) => {
                *slot = value.to_string();
                Ok(())
            }
            None => Err(EngineError::UnknownVariable(name.to_string())),
        }
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.state.lock().calls.push(EngineCall::Delete);
    }
}
