use crate::{
    domain::{Domain, UnknownDomain},
    error::ApiError,
    model_service::ModelService,
    registry::Prediction,
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    response::Json,
};
use serde::Serialize;
use std::time::Instant;
use tracing::instrument;

const FILE_FIELD: &str = "file";
const TYPE_PARAM: &str = "type";

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub success: bool,
}

struct Upload {
    file_name: String,
    data: Bytes,
}

/// First `type` value in the query string. Repeats are ignored.
fn model_type_param(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(key, _)| key == TYPE_PARAM)
        .map(|(_, value)| value.as_str())
}

fn resolve_domain(model_type: Option<&str>) -> Result<Domain, ApiError> {
    match model_type {
        None => Ok(Domain::default()),
        Some(model_type) => model_type
            .parse()
            .map_err(|UnknownDomain(model_type)| ApiError::InvalidType(model_type)),
    }
}

/// Finds the `file` part. Parts without a filename are plain form fields and
/// do not count as an upload.
async fn read_upload(mut multipart: Multipart) -> Result<Option<Upload>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };

        let data = field.bytes().await?;
        return Ok(Some(Upload { file_name, data }));
    }

    Ok(None)
}

#[instrument(skip(state, multipart))]
pub async fn predict_image<M: ModelService>(
    State(state): State<SharedState<M>>,
    Query(params): Query<Vec<(String, String)>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let domain = resolve_domain(model_type_param(&params))?;

    let upload = match multipart {
        Ok(multipart) => read_upload(multipart).await?,
        Err(rejection) => {
            tracing::debug!("Request body is not multipart: {}", rejection);
            None
        }
    };
    let upload = upload.ok_or(ApiError::NoFile)?;
    if upload.file_name.is_empty() {
        return Err(ApiError::EmptyFilename);
    }

    let registry = state.registry.clone();
    let started = Instant::now();
    let result =
        tokio::task::spawn_blocking(move || registry.classify(domain, &upload.data)).await;
    state
        .metrics
        .record_inference_duration(domain, started.elapsed().as_millis() as u64);

    let prediction = match result {
        Ok(Ok(prediction)) => prediction,
        Ok(Err(err)) => {
            state.metrics.record_prediction(domain, "failure");
            return Err(err.into());
        }
        Err(err) => {
            state.metrics.record_prediction(domain, "failure");
            return Err(ApiError::Inference(format!("inference task failed: {}", err)));
        }
    };
    state.metrics.record_prediction(domain, "success");

    tracing::info!(
        domain = %prediction.domain,
        class_idx = prediction.class_idx,
        species_name = %prediction.species_name,
        confidence = prediction.confidence,
        "Prediction served"
    );

    Ok(Json(PredictionResponse {
        prediction,
        success: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_domain_defaults_to_plant() {
        assert_eq!(resolve_domain(None).unwrap(), Domain::Plant);
        assert_eq!(resolve_domain(Some("animal")).unwrap(), Domain::Animal);
    }

    #[test]
    fn test_first_type_param_wins() {
        let params = vec![
            ("debug".to_string(), "1".to_string()),
            ("type".to_string(), "mushroom".to_string()),
            ("type".to_string(), "bird".to_string()),
        ];

        assert_eq!(model_type_param(&params), Some("mushroom"));
        assert_eq!(model_type_param(&params[..1]), None);
    }

    #[test]
    fn test_resolve_domain_rejects_unknown_and_empty() {
        assert!(matches!(
            resolve_domain(Some("bird")),
            Err(ApiError::InvalidType(model_type)) if model_type == "bird"
        ));
        assert!(matches!(
            resolve_domain(Some("")),
            Err(ApiError::InvalidType(_))
        ));
    }
}
