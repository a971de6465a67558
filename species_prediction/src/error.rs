use crate::{model_service::ModelError, preprocess::PreprocessError, registry::ClassifyError};
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Everything a request to the service can fail with. Internal details are
/// logged and never returned to the client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid model type `{0}`")]
    InvalidType(String),
    #[error("no file uploaded")]
    NoFile,
    #[error("empty filename")]
    EmptyFilename,
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("image decoding failed: {0}")]
    Decode(#[from] PreprocessError),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model output has shape {0:?}")]
    OutputShape(Vec<usize>),
}

impl From<ClassifyError> for ApiError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::Preprocess(e) => ApiError::Decode(e),
            ClassifyError::Model(ModelError::OutputShape(shape)) => ApiError::OutputShape(shape),
            ClassifyError::Model(e) => ApiError::Inference(e.to_string()),
            ClassifyError::MissingModel(domain) => {
                ApiError::Inference(format!("no model loaded for {}", domain))
            }
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidType(_)
            | ApiError::NoFile
            | ApiError::EmptyFilename => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::OutputShape(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Unauthorized => json!({
                "error": "Unauthorized",
                "message": "Do you even have our secret key?",
            }),
            ApiError::InvalidType(_) => json!({
                "error": "Invalid type. Use \"plant\", \"animal\", or \"mushroom\".",
            }),
            ApiError::NoFile => json!({ "error": "No file uploaded" }),
            ApiError::EmptyFilename => json!({ "error": "Empty filename" }),
            ApiError::Multipart(_) if status == StatusCode::PAYLOAD_TOO_LARGE => {
                json!({ "error": "File too large" })
            }
            ApiError::Multipart(_) => json!({ "error": "Malformed multipart body" }),
            ApiError::Decode(_) => json!({
                "error": "Could not decode image",
                "success": false,
            }),
            ApiError::Inference(_) => json!({
                "error": "Inference failed",
                "success": false,
            }),
            ApiError::OutputShape(_) => json!({
                "error": "Model returned an unexpected output shape",
                "success": false,
            }),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(body)).into_response()
    }
}
