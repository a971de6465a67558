use crate::domain::Domain;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use thiserror::Error;

const DURATION_BOUNDARIES_MS: [f64; 12] = [
    5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 150.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to build prometheus exporter: {0}")]
    Exporter(String),
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
    #[error("metrics are not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub struct Metrics {
    provider: SdkMeterProvider,
    prediction_counter: Counter<u64>,
    inference_duration: Histogram<u64>,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("species_prediction");

        let prediction_counter = meter
            .u64_counter("predictions_total")
            .with_description("Prediction requests by domain and outcome")
            .build();

        let inference_duration = meter
            .u64_histogram("inference_duration_ms")
            .with_boundaries(DURATION_BOUNDARIES_MS.to_vec())
            .with_description("Duration of decode, preprocessing and inference in milliseconds")
            .build();

        Ok(Metrics {
            provider,
            prediction_counter,
            inference_duration,
            registry,
        })
    }

    /// Makes this provider the global one so the HTTP metrics layer reports
    /// into the same registry. Call before building the router.
    pub fn install_global(&self) {
        global::set_meter_provider(self.provider.clone());
    }

    pub fn record_prediction(&self, domain: Domain, outcome: &'static str) {
        let attributes = [
            KeyValue::new("domain", domain.as_str()),
            KeyValue::new("outcome", outcome),
        ];
        self.prediction_counter.add(1, &attributes);
    }

    pub fn record_inference_duration(&self, domain: Domain, duration_ms: u64) {
        let attributes = [KeyValue::new("domain", domain.as_str())];
        self.inference_duration.record(duration_ms, &attributes);
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> Result<String, TelemetryError> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_predictions_are_rendered() {
        let metrics = Metrics::new().unwrap();

        metrics.record_prediction(Domain::Mushroom, "success");
        metrics.record_inference_duration(Domain::Mushroom, 42);
        let rendered = metrics.render().unwrap();

        assert!(rendered.contains("predictions_total"));
        assert!(rendered.contains("domain=\"mushroom\""));
        assert!(rendered.contains("inference_duration_ms"));
    }
}
