//! HTTP adapters for the embedding and generation services.
//!
//! Both services speak a small JSON protocol: POST `{"text": ...}` to the
//! embedding endpoint and get `{"vector": [...]}` back; POST
//! `{"question": ..., "context": ...}` to the generation endpoint and get
//! `{"answer": ...}` back. Responses are deserialized into typed structs
//! at this boundary; anything off-shape becomes
//! [`ServiceError::InvalidResponse`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Embedder, Generator, ServiceError};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    question: &'a str,
    context: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    answer: String,
}

fn join_endpoint(base: &Url, path: &str) -> Result<Url, ServiceError> {
    base.join(path).map_err(|err| ServiceError::InvalidResponse {
        service: "http",
        message: format!("invalid endpoint url: {err}"),
    })
}

/// Remote embedding service client.
#[derive(Clone, Debug)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: Url,
    dimensions: usize,
}

impl HttpEmbedder {
    /// `base_url` is the service root; the embedding endpoint is
    /// `<base>/embedding`.
    pub fn new(client: reqwest::Client, base_url: &Url, dimensions: usize) -> Result<Self, ServiceError> {
        Ok(Self {
            client,
            endpoint: join_endpoint(base_url, "embedding")?,
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|err| ServiceError::Unavailable {
                service: "embedding",
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Unavailable {
                service: "embedding",
                message: format!("status {status}"),
            });
        }

        let body: EmbedResponse =
            response
                .json()
                .await
                .map_err(|err| ServiceError::InvalidResponse {
                    service: "embedding",
                    message: err.to_string(),
                })?;

        if body.vector.len() != self.dimensions {
            return Err(ServiceError::InvalidResponse {
                service: "embedding",
                message: format!(
                    "expected {} dimensions, got {}",
                    self.dimensions,
                    body.vector.len()
                ),
            });
        }
        Ok(body.vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Remote generation service client.
#[derive(Clone, Debug)]
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpGenerator {
    /// `base_url` is the service root; the generation endpoint is
    /// `<base>/generate`.
    pub fn new(client: reqwest::Client, base_url: &Url) -> Result<Self, ServiceError> {
        Ok(Self {
            client,
            endpoint: join_endpoint(base_url, "generate")?,
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, question: &str, context: &str) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&GenerateRequest { question, context })
            .send()
            .await
            .map_err(|err| ServiceError::Unavailable {
                service: "generation",
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Unavailable {
                service: "generation",
                message: format!("status {status}"),
            });
        }

        let body: GenerateResponse =
            response
                .json()
                .await
                .map_err(|err| ServiceError::InvalidResponse {
                    service: "generation",
                    message: err.to_string(),
                })?;
        Ok(body.answer)
    }
}
