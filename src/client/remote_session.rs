//! Typed proxy for an engine session living on the worker.
//!
//! One method per remote operation. Arguments are encoded the way the
//! session's remote surface expects them and replies are decoded into the
//! engine types.

use ocr_rpc::{RemoteProxy, RpcValue};
use ocr_worker::{BoxItem, ImageData, Orientation, TextItem, TextUnit};
use serde::de::DeserializeOwned;

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct SessionProxy {
    remote: RemoteProxy,
}

impl SessionProxy {
    pub fn new(remote: RemoteProxy) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &RemoteProxy {
        &self.remote
    }

    pub async fn model_loaded(&self) -> Result<bool, ClientError> {
        Ok(self.remote.member("modelLoaded").get().await?.into_json()?)
    }

    pub async fn image_loaded(&self) -> Result<bool, ClientError> {
        Ok(self.remote.member("imageLoaded").get().await?.into_json()?)
    }

    pub async fn load_model(&self, model: Vec<u8>) -> Result<(), ClientError> {
        self.call_unit("loadModel", vec![RpcValue::bytes(model)]).await
    }

    /// The pixel buffer is transferred, not copied.
    pub async fn load_image(&self, image: ImageData) -> Result<(), ClientError> {
        let ImageData {
            data,
            width,
            height,
        } = image;
        let arguments = vec![
            RpcValue::bytes(data),
            RpcValue::plain(&width)?,
            RpcValue::plain(&height)?,
        ];
        self.call_unit("loadImage", arguments).await
    }

    pub async fn clear_image(&self) -> Result<(), ClientError> {
        self.call_unit("clearImage", Vec::new()).await
    }

    pub async fn bounding_boxes(&self, unit: TextUnit) -> Result<Vec<BoxItem>, ClientError> {
        self.call_json("getBoundingBoxes", vec![RpcValue::plain(&unit)?])
            .await
    }

    pub async fn text_boxes(&self, unit: TextUnit) -> Result<Vec<TextItem>, ClientError> {
        self.call_json("getTextBoxes", vec![RpcValue::plain(&unit)?])
            .await
    }

    pub async fn text(&self) -> Result<String, ClientError> {
        self.call_json("getText", Vec::new()).await
    }

    pub async fn hocr(&self) -> Result<String, ClientError> {
        self.call_json("getHOCR", Vec::new()).await
    }

    pub async fn orientation(&self) -> Result<Orientation, ClientError> {
        self.call_json("getOrientation", Vec::new()).await
    }

    pub async fn variable(&self, name: &str) -> Result<String, ClientError> {
        self.call_json("getVariable", vec![RpcValue::plain(&name)?])
            .await
    }

    pub async fn set_variable(&self, name: &str, value: &str) -> Result<(), ClientError> {
        let arguments = vec![RpcValue::plain(&name)?, RpcValue::plain(&value)?];
        self.call_unit("setVariable", arguments).await
    }

    /// Free the engine. The session object stays exposed until released.
    pub async fn destroy(&self) -> Result<(), ClientError> {
        self.call_unit("destroy", Vec::new()).await
    }

    /// Stop the worker from serving this session.
    pub async fn release(&self) -> Result<(), ClientError> {
        Ok(self.remote.release().await?)
    }

    async fn call_unit(&self, name: &str, arguments: Vec<RpcValue>) -> Result<(), ClientError> {
        self.remote.call(name, arguments).await?;
        Ok(())
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        name: &str,
        arguments: Vec<RpcValue>,
    ) -> Result<T, ClientError> {
        Ok(self.remote.call(name, arguments).await?.into_json()?)
    }
}
