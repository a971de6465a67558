use axum::{response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    #[serde(rename = "do-i-love-butterflies")]
    loves_butterflies: String,
}

pub async fn healthcheck() -> impl IntoResponse {
    Json(Status {
        status: "ok".into(),
        loves_butterflies: "yes".into(),
    })
}
