//! Engine Session
//!
//! Stateful wrapper around one engine instance. Enforces the usage order
//! (model and image before recognition, image before layout) and caches
//! layout/recognition per loaded image:
//!
//! ```text
//! Created -> loadModel -> ModelReady -> loadImage -> ImageReady -> destroy -> Destroyed
//! ```
//!
//! `loadImage` and `clearImage` invalidate cached results. Recognition runs
//! at most once per image; later calls reuse it and report only a final 100.
//!
//! The session is also a [`RemoteObject`], so it can be driven from the host
//! through a remote proxy. Method and property names on that surface follow
//! the client-facing API (`getText`, `modelLoaded`, ...).

use ocr_rpc::{Arguments, Endpoint, MessagePort, RemoteObject, RpcValue, Thrown};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::engine::{BoxItem, EngineError, ImageData, OcrEngine, Orientation, TextItem, TextUnit};
use crate::error::SessionError;
use crate::progress::ProgressReporter;

/// Optional local progress callback.
pub type OnProgress<'a> = Option<&'a mut dyn FnMut(u8)>;

pub struct EngineSession {
    engine: Option<Box<dyn OcrEngine>>,
    model_loaded: bool,
    image_loaded: bool,
    layout_done: bool,
    recognized: bool,
    progress_port: Option<MessagePort>,
}

impl EngineSession {
    /// Wrap `engine`. Progress of recognition passes is streamed to
    /// `progress_port` when one is given.
    pub fn new(engine: Box<dyn OcrEngine>, progress_port: Option<MessagePort>) -> Self {
        Self {
            engine: Some(engine),
            model_loaded: false,
            image_loaded: false,
            layout_done: false,
            recognized: false,
            progress_port,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.model_loaded
    }

    pub fn image_loaded(&self) -> bool {
        self.image_loaded
    }

    pub fn is_destroyed(&self) -> bool {
        self.engine.is_none()
    }

    fn engine(&mut self) -> Result<&mut (dyn OcrEngine + 'static), SessionError> {
        self.engine.as_deref_mut().ok_or(SessionError::Destroyed)
    }

    fn require_image(&self) -> Result<(), SessionError> {
        if self.is_destroyed() {
            return Err(SessionError::Destroyed);
        }
        if !self.image_loaded {
            return Err(SessionError::NoImageLoaded);
        }
        Ok(())
    }

    fn require_image_and_model(&self) -> Result<(), SessionError> {
        self.require_image()?;
        if !self.model_loaded {
            return Err(SessionError::ModelNotLoaded);
        }
        Ok(())
    }

    /// Load a trained recognition model. May be called again to swap models.
    pub fn load_model(&mut self, model: &[u8]) -> Result<(), SessionError> {
        self.engine()?.load_model(model).map_err(|e| {
            debug!(error = %e, "model rejected");
            SessionError::ModelLoad
        })?;
        self.model_loaded = true;
        info!(bytes = model.len(), "model loaded");
        Ok(())
    }

    /// Load an RGBA image, replacing the previous one and its results.
    pub fn load_image(&mut self, image: &ImageData) -> Result<(), SessionError> {
        let engine = self.engine.as_deref_mut().ok_or(SessionError::Destroyed)?;
        let required = image.required_len().ok_or_else(|| {
            SessionError::ImageLoad("Image width or height is zero".to_string())
        })?;
        if image.data.len() < required {
            return Err(SessionError::ImageLoad(
                "Image data length does not match width/height".to_string(),
            ));
        }

        // Release the previous image before handing over the new one.
        engine.clear_image();
        self.image_loaded = false;
        self.layout_done = false;
        self.recognized = false;

        engine.load_image(image).map_err(|e| {
            debug!(error = %e, "image rejected");
            SessionError::ImageLoad("Failed to load image".to_string())
        })?;
        self.image_loaded = true;
        debug!(width = image.width, height = image.height, "image loaded");
        Ok(())
    }

    /// Release the current image. The model stays loaded.
    pub fn clear_image(&mut self) -> Result<(), SessionError> {
        self.engine()?.clear_image();
        self.image_loaded = false;
        self.layout_done = false;
        self.recognized = false;
        Ok(())
    }

    /// Layout-only boxes. Does not need a model.
    pub fn bounding_boxes(&mut self, unit: TextUnit) -> Result<Vec<BoxItem>, SessionError> {
        self.require_image()?;
        let engine = self.engine.as_deref_mut().ok_or(SessionError::Destroyed)?;
        if !self.layout_done {
            engine.analyse_layout().map_err(engine_error)?;
            self.layout_done = true;
        }
        engine.bounding_boxes(unit).map_err(engine_error)
    }

    pub fn text_boxes(
        &mut self,
        unit: TextUnit,
        on_progress: OnProgress<'_>,
    ) -> Result<Vec<TextItem>, SessionError> {
        self.recognize(on_progress)?;
        self.engine()?.text_boxes(unit).map_err(engine_error)
    }

    pub fn text(&mut self, on_progress: OnProgress<'_>) -> Result<String, SessionError> {
        self.recognize(on_progress)?;
        self.engine()?.text().map_err(engine_error)
    }

    pub fn hocr(&mut self, on_progress: OnProgress<'_>) -> Result<String, SessionError> {
        self.recognize(on_progress)?;
        self.engine()?.hocr().map_err(engine_error)
    }

    /// Page rotation. Does not need a model.
    pub fn orientation(&mut self) -> Result<Orientation, SessionError> {
        self.require_image()?;
        self.engine()?.orientation().map_err(engine_error)
    }

    pub fn variable(&self, name: &str) -> Result<String, SessionError> {
        let engine = self.engine.as_deref().ok_or(SessionError::Destroyed)?;
        engine
            .variable(name)
            .ok_or_else(|| SessionError::GetVariable(name.to_string()))
    }

    pub fn set_variable(&mut self, name: &str, value: &str) -> Result<(), SessionError> {
        self.engine()?.set_variable(name, value).map_err(|e| {
            debug!(error = %e, "set variable failed");
            SessionError::SetVariable(name.to_string())
        })
    }

    /// Release the engine. Every later call fails with [`SessionError::Destroyed`].
    pub fn destroy(&mut self) -> Result<(), SessionError> {
        let engine = self.engine.take().ok_or(SessionError::Destroyed)?;
        drop(engine);
        self.model_loaded = false;
        self.image_loaded = false;
        if let Some(port) = self.progress_port.take() {
            port.close();
        }
        info!("engine session destroyed");
        Ok(())
    }

    /// Run recognition unless it already ran for the current image.
    fn recognize(&mut self, on_progress: OnProgress<'_>) -> Result<(), SessionError> {
        self.require_image_and_model()?;
        let engine = self.engine.as_deref_mut().ok_or(SessionError::Destroyed)?;
        let mut reporter = ProgressReporter::new(on_progress, self.progress_port.as_ref());
        if !self.recognized {
            engine
                .recognize(&mut |raw| reporter.report(raw))
                .map_err(engine_error)?;
            self.recognized = true;
            self.layout_done = true;
        }
        reporter.finish();
        Ok(())
    }

    fn apply_method(&mut self, name: &str, mut args: Arguments) -> Result<RpcValue, Thrown> {
        match name {
            "loadModel" => {
                let model = args.bytes(0, "model")?;
                self.load_model(&model)?;
                Ok(RpcValue::null())
            }
            "loadImage" => {
                let data = args.bytes(0, "data")?;
                let width: i32 = args.json(1, "width")?;
                let height: i32 = args.json(2, "height")?;
                self.load_image(&ImageData::new(data, width, height))?;
                Ok(RpcValue::null())
            }
            "clearImage" => {
                self.clear_image()?;
                Ok(RpcValue::null())
            }
            "getBoundingBoxes" => {
                let unit = text_unit(&mut args)?;
                plain(&self.bounding_boxes(unit)?)
            }
            "getTextBoxes" => {
                let unit = text_unit(&mut args)?;
                plain(&self.text_boxes(unit, None)?)
            }
            "getText" => plain(&self.text(None)?),
            "getHOCR" => plain(&self.hocr(None)?),
            "getOrientation" => plain(&self.orientation()?),
            "getVariable" => {
                let name: String = args.json(0, "name")?;
                plain(&self.variable(&name)?)
            }
            "setVariable" => {
                let name: String = args.json(0, "name")?;
                let value: String = args.json(1, "value")?;
                self.set_variable(&name, &value)?;
                Ok(RpcValue::null())
            }
            "destroy" => {
                self.destroy()?;
                Ok(RpcValue::null())
            }
            other => Err(Thrown::type_error(format!("{} is not a function", other))),
        }
    }
}

fn engine_error(error: EngineError) -> SessionError {
    match error {
        EngineError::NoImage => SessionError::NoImageLoaded,
        other => SessionError::Engine(other.to_string()),
    }
}

fn text_unit(args: &mut Arguments) -> Result<TextUnit, Thrown> {
    let unit: String = args.json(0, "unit")?;
    Ok(unit.parse::<TextUnit>()?)
}

fn plain<T: Serialize>(value: &T) -> Result<RpcValue, Thrown> {
    Ok(RpcValue::plain(value)?)
}

impl RemoteObject for EngineSession {
    fn get(&self, name: &str) -> Result<RpcValue, Thrown> {
        match name {
            "modelLoaded" => Ok(json!(self.model_loaded).into()),
            "imageLoaded" => Ok(json!(self.image_loaded).into()),
            _ => Err(Thrown::type_error(format!(
                "EngineSession has no property {}",
                name
            ))),
        }
    }

    fn apply(&mut self, name: &str, args: Arguments) -> Result<RpcValue, Thrown> {
        self.apply_method(name, args)
    }

    fn describe(&self) -> Result<Value, Thrown> {
        Ok(json!({
            "modelLoaded": self.model_loaded,
            "imageLoaded": self.image_loaded,
            "destroyed": self.is_destroyed(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{EngineCall, MockEngineFactory, PageScript};
    use crate::engine::{EngineFactory, IntRect};
    use ocr_rpc::MessageChannel;

    fn page() -> ImageData {
        let mut data = vec![255u8; 8 * 4 * 4];
        data[0] = 0;
        ImageData::new(data, 8, 4)
    }

    fn setup() -> (MockEngineFactory, EngineSession) {
        let factory = MockEngineFactory::new();
        factory.register_page(
            &page(),
            PageScript::from_lines(vec![vec![
                ("Hello", IntRect::new(0, 0, 4, 2), 0.9),
                ("there", IntRect::new(4, 0, 8, 2), 0.8),
            ]]),
        );
        let engine = factory.create(None).unwrap();
        (factory, EngineSession::new(engine, None))
    }

    fn progress_of(session: &mut EngineSession) -> Vec<u8> {
        let mut seen = Vec::new();
        let mut push = |p: u8| seen.push(p);
        session.text(Some(&mut push as &mut dyn FnMut(u8))).unwrap();
        seen
    }

    #[test]
    fn test_fresh_session_requires_image() {
        let (_factory, mut session) = setup();
        assert_eq!(
            session.bounding_boxes(TextUnit::Word),
            Err(SessionError::NoImageLoaded)
        );
        assert_eq!(session.text(None), Err(SessionError::NoImageLoaded));
        assert_eq!(session.orientation(), Err(SessionError::NoImageLoaded));
    }

    #[test]
    fn test_recognition_requires_model_but_layout_does_not() {
        let (_factory, mut session) = setup();
        session.load_image(&page()).unwrap();
        assert_eq!(session.bounding_boxes(TextUnit::Word).unwrap().len(), 2);
        assert_eq!(
            session.text_boxes(TextUnit::Word, None),
            Err(SessionError::ModelNotLoaded)
        );
        assert_eq!(session.text(None), Err(SessionError::ModelNotLoaded));
    }

    #[test]
    fn test_load_image_validation() {
        let (_factory, mut session) = setup();
        let zero = ImageData::new(vec![], 0, 10);
        assert_eq!(
            session.load_image(&zero),
            Err(SessionError::ImageLoad("Image width or height is zero".into()))
        );
        let short = ImageData::new(vec![0; 10], 2, 2);
        assert_eq!(
            session.load_image(&short),
            Err(SessionError::ImageLoad(
                "Image data length does not match width/height".into()
            ))
        );
        assert!(!session.image_loaded());

        session.load_image(&page()).unwrap();
        assert!(session.image_loaded());
    }

    #[test]
    fn test_recognition_runs_once_per_image() {
        let (factory, mut session) = setup();
        session.load_model(b"eng").unwrap();
        session.load_image(&page()).unwrap();

        let first = progress_of(&mut session);
        assert_eq!(first.last(), Some(&100));
        assert!(first.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(progress_of(&mut session), vec![100]);
        assert_eq!(session.text_boxes(TextUnit::Word, None).unwrap().len(), 2);
        assert_eq!(factory.call_count(EngineCall::Recognize), 1);

        session.load_image(&page()).unwrap();
        progress_of(&mut session);
        assert_eq!(factory.call_count(EngineCall::Recognize), 2);
    }

    #[test]
    fn test_clear_image_keeps_model() {
        let (_factory, mut session) = setup();
        session.load_model(b"eng").unwrap();
        session.load_image(&page()).unwrap();
        session.clear_image().unwrap();

        assert!(session.model_loaded());
        assert!(!session.image_loaded());
        assert_eq!(session.text(None), Err(SessionError::NoImageLoaded));

        session.load_image(&page()).unwrap();
        assert_eq!(session.text(None).unwrap(), "Hello there\n");
    }

    #[test]
    fn test_model_rejection() {
        let (_factory, mut session) = setup();
        assert_eq!(session.load_model(b""), Err(SessionError::ModelLoad));
        assert!(!session.model_loaded());
    }

    #[test]
    fn test_variables() {
        let (_factory, mut session) = setup();
        session.set_variable("tessedit_char_whitelist", "abc").unwrap();
        assert_eq!(session.variable("tessedit_char_whitelist").unwrap(), "abc");
        assert_eq!(
            session.variable("bogus"),
            Err(SessionError::GetVariable("bogus".into()))
        );
        assert_eq!(
            session.set_variable("bogus", "1"),
            Err(SessionError::SetVariable("bogus".into()))
        );
    }

    #[test]
    fn test_destroy_is_terminal() {
        let (factory, mut session) = setup();
        session.destroy().unwrap();
        assert!(session.is_destroyed());
        assert_eq!(factory.call_count(EngineCall::Delete), 1);
        assert_eq!(session.load_model(b"eng"), Err(SessionError::Destroyed));
        assert_eq!(session.text(None), Err(SessionError::Destroyed));
        assert_eq!(session.destroy(), Err(SessionError::Destroyed));
    }

    #[test]
    fn test_progress_port_receives_events() {
        let factory = MockEngineFactory::new();
        let (worker_end, client_end) = MessageChannel::new();
        let mut session = EngineSession::new(factory.create(None).unwrap(), Some(worker_end));
        session.load_model(b"eng").unwrap();
        session.load_image(&page()).unwrap();
        session.text(None).unwrap();

        let values: Vec<u8> = client_end
            .receiver()
            .try_iter()
            .filter_map(|envelope| match envelope.message {
                ocr_rpc::Message::Progress(event) => Some(event.progress),
                _ => None,
            })
            .collect();
        assert_eq!(values.last(), Some(&100));
        assert!(values.len() > 1);
    }

    #[test]
    fn test_remote_surface_maps_errors_to_named_thrown_values() {
        let (_factory, mut session) = setup();
        let thrown = session
            .apply("getText", Arguments::new(vec![]))
            .unwrap_err();
        assert_eq!(thrown.name(), Some("NoImageLoadedError"));
        assert_eq!(thrown.message(), Some("No image loaded"));

        let thrown = session
            .apply("getBoundingBoxes", Arguments::new(vec![json!("glyph").into()]))
            .unwrap_err();
        assert_eq!(thrown.name(), Some("InvalidTextUnitError"));

        let loaded = session.get("modelLoaded").unwrap().into_json::<bool>().unwrap();
        assert!(!loaded);
        assert_eq!(session.apply("fly", Arguments::new(vec![])).unwrap_err().name(), Some("TypeError"));
    }
}
