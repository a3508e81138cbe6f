// HydrAI model client - PredictionService over the classifier and predictor HTTP APIs
use crate::application::prediction_service::PredictionService;
use crate::domain::telemetry::{ClassifierFeatures, Granularity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

const CLASSIFY_PATH: &str = "/api/hydrai/classify";
const PREDICT_PATH: &str = "/api/hydrai/predict";

#[derive(Debug, Clone)]
pub struct HydraiClient {
    http: reqwest::Client,
    classifier_url: String,
    predictor_url: String,
    token: String,
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    rango: Granularity,
    features: &'a ClassifierFeatures,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    cluster: i64,
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    sequence: &'a [[f64; 7]],
    modo: Granularity,
    rango: Granularity,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    prediction: f64,
}

impl HydraiClient {
    pub fn new(classifier_url: String, predictor_url: String, token: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            classifier_url: classifier_url.trim_end_matches('/').to_string(),
            predictor_url: predictor_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn post<B, T>(&self, url: String, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} failed with status {}: {}", url, status, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[async_trait]
impl PredictionService for HydraiClient {
    async fn classify(&self, range: Granularity, features: &ClassifierFeatures) -> Result<i64> {
        let url = format!("{}{}", self.classifier_url, CLASSIFY_PATH);
        let request = ClassifyRequest {
            rango: range,
            features,
        };

        let response: ClassifyResponse = self.post(url, &request).await?;
        tracing::debug!(cluster = response.cluster, "Classifier answered");
        Ok(response.cluster)
    }

    async fn predict_sequence(&self, range: Granularity, sequence: &[[f64; 7]]) -> Result<f64> {
        let url = format!("{}{}", self.predictor_url, PREDICT_PATH);
        // The predictor only serves the hourly model.
        let request = PredictRequest {
            sequence,
            modo: Granularity::Hour,
            rango: range,
        };

        let response: PredictResponse = self.post(url, &request).await?;
        tracing::debug!(prediction = response.prediction, rows = sequence.len(), "Predictor answered");
        Ok(response.prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_bodies() {
        let features = ClassifierFeatures {
            active_seconds: 30.0,
            volume_liters: 2.0,
            persons: 3.0,
            avg_temperature: 20.0,
            avg_perceived_temperature: 19.0,
            avg_humidity: 70.0,
            day_of_month: 3,
            hour_of_day: 0,
            month: 11,
        };
        let classify = serde_json::to_value(ClassifyRequest {
            rango: Granularity::Day,
            features: &features,
        })
        .unwrap();
        assert_eq!(classify["rango"], "dia");
        assert_eq!(classify["features"]["consumo"], 2.0);
        assert_eq!(classify["features"]["mes"], 11);

        let rows = [[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]];
        let predict = serde_json::to_value(PredictRequest {
            sequence: &rows,
            modo: Granularity::Hour,
            rango: Granularity::Day,
        })
        .unwrap();
        assert_eq!(predict["modo"], "hora");
        assert_eq!(predict["rango"], "dia");
        assert_eq!(predict["sequence"][0][6], 7.0);
    }

    #[test]
    fn test_base_urls_are_trimmed() {
        let client = HydraiClient::new(
            "https://hydrai.example/".to_string(),
            "https://lstm.hydrai.example//".to_string(),
            "t".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(client.classifier_url, "https://hydrai.example");
        assert_eq!(client.predictor_url, "https://lstm.hydrai.example");
    }
}
