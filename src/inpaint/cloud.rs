//! Gemini image-editing client
//!
//! Sends the encoded source image as inline base64 data together with a text
//! prompt naming the watermark rectangle, and takes the first inline image
//! part of the first candidate as the result. Failures are classified into
//! [`CloudErrorKind`](crate::error::CloudErrorKind) and never retried.

use super::CloudInpaint;
use crate::{
    config::CloudConfig,
    error::{CloudError, RemovalError, Result},
    types::Region,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    InlineData { inline_data: InlineData },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
struct ResponseInlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

/// Cloud inpainter backed by the Gemini `generateContent` API
#[derive(Debug, Clone)]
pub struct GeminiInpainter {
    client: Client,
    config: CloudConfig,
}

impl GeminiInpainter {
    /// Create a client with the configured timeout
    ///
    /// # Errors
    /// Returns `RemovalError::Internal` when the HTTP client cannot be built
    pub fn new(config: CloudConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemovalError::internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.endpoint.trim_end_matches('/'))
    }

    fn prompt(region: Region) -> String {
        format!(
            "Remove the watermark or unwanted element from this image. \
             The watermark is located at position x={}, y={} with width={} and height={}. \
             Seamlessly fill the area with appropriate background content that matches the surrounding pixels. \
             Return only the edited image without any text response.",
            region.x, region.y, region.width, region.height
        )
    }

    fn build_request(image: &[u8], mime_type: &str, region: Region) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: BASE64.encode(image),
                        },
                    },
                    RequestPart::Text {
                        text: Self::prompt(region),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            },
        }
    }

    /// Map a non-success HTTP status to a cloud error
    fn classify_status(status: StatusCode, body: &str) -> CloudError {
        let detail = serde_json::from_str::<GenerateResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .map_or_else(|| body.trim().to_string(), |e| e.message);
        let message = format!("HTTP {}: {}", status.as_u16(), detail);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CloudError::unauthorized(message),
            StatusCode::TOO_MANY_REQUESTS => CloudError::rate_limited(message),
            _ => CloudError::service(message),
        }
    }

    fn transport_error(context: &str, error: reqwest::Error) -> CloudError {
        // The URL carries the API key
        CloudError::network(format!("{}: {}", context, error.without_url()))
    }

    /// Extract the first inline image from a response body
    fn parse_image(body: &str) -> std::result::Result<Vec<u8>, CloudError> {
        let response: GenerateResponse = serde_json::from_str(body)
            .map_err(|e| CloudError::service(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(CloudError::service(format!(
                "{} (status: {})",
                error.message,
                error.status.unwrap_or_default()
            )));
        }

        let data = response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .find_map(|p| p.inline_data)
            .ok_or_else(|| CloudError::service("No image found in response"))?;

        BASE64
            .decode(data.data.as_bytes())
            .map_err(|e| CloudError::service(format!("Failed to decode response image: {}", e)))
    }

    fn image_model_names(body: &str) -> std::result::Result<Vec<String>, CloudError> {
        let list: ModelList = serde_json::from_str(body)
            .map_err(|e| CloudError::service(format!("Failed to parse model list: {}", e)))?;
        Ok(list
            .models
            .into_iter()
            .map(|m| m.name)
            .filter(|name| name.contains("gemini") || name.contains("imagen"))
            .collect())
    }

    async fn get_models(&self, api_key: &str) -> std::result::Result<String, CloudError> {
        let response = self
            .client
            .get(self.models_url())
            .query(&[("key", api_key)])
            .send()
            .await
            .map_err(|e| Self::transport_error("Model listing failed", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::transport_error("Failed to read response", e))?;
        if !status.is_success() {
            return Err(Self::classify_status(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl CloudInpaint for GeminiInpainter {
    #[instrument(skip(self, image, api_key), fields(model = %self.config.model, bytes = image.len()))]
    async fn inpaint(
        &self,
        image: &[u8],
        mime_type: &str,
        region: Region,
        api_key: &str,
    ) -> std::result::Result<Vec<u8>, CloudError> {
        let request = Self::build_request(image, mime_type, region);
        debug!("Sending inpainting request");

        let response = self
            .client
            .post(self.generate_url())
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::transport_error("API request failed", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::transport_error("Failed to read response", e))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &body));
        }

        let bytes = Self::parse_image(&body)?;
        debug!(bytes = bytes.len(), "Received inpainted image");
        Ok(bytes)
    }

    async fn test_connection(&self, api_key: &str) -> std::result::Result<bool, CloudError> {
        self.get_models(api_key).await.map(|_| true)
    }

    async fn list_models(&self, api_key: &str) -> std::result::Result<Vec<String>, CloudError> {
        let body = self.get_models(api_key).await?;
        Self::image_model_names(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudErrorKind;

    #[test]
    fn test_request_shape() {
        let request = GeminiInpainter::build_request(&[1, 2, 3], "image/png", Region::new(5, 6, 7, 8));
        let json = serde_json::to_value(&request).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[0]["inline_data"]["data"], "AQID");
        let text = parts[1]["text"].as_str().unwrap();
        assert!(text.contains("x=5, y=6 with width=7 and height=8"));
        assert_eq!(json["generationConfig"]["responseModalities"][1], "IMAGE");
    }

    #[test]
    fn test_urls() {
        let client = GeminiInpainter::new(CloudConfig {
            endpoint: "https://example.test/v1beta/".to_string(),
            model: "image-model".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            client.generate_url(),
            "https://example.test/v1beta/models/image-model:generateContent"
        );
        assert_eq!(client.models_url(), "https://example.test/v1beta/models");
    }

    #[test]
    fn test_classify_status() {
        let body = r#"{"error":{"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = GeminiInpainter::classify_status(StatusCode::FORBIDDEN, body);
        assert_eq!(err.kind, CloudErrorKind::Unauthorized);
        assert!(err.message.contains("API key not valid"));

        let err = GeminiInpainter::classify_status(StatusCode::TOO_MANY_REQUESTS, "quota");
        assert_eq!(err.kind, CloudErrorKind::RateLimited);

        let err = GeminiInpainter::classify_status(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(err.kind, CloudErrorKind::Service);
    }

    #[test]
    fn test_parse_image() {
        let body = r#"{"candidates":[{"content":{"parts":[
            {"text":"here you go"},
            {"inlineData":{"mimeType":"image/png","data":"AQID"}}
        ]}}]}"#;
        assert_eq!(GeminiInpainter::parse_image(body).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_image_without_image() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"sorry"}]}}]}"#;
        let err = GeminiInpainter::parse_image(body).unwrap_err();
        assert_eq!(err.kind, CloudErrorKind::Service);

        let body = r#"{"error":{"message":"blocked"}}"#;
        assert!(GeminiInpainter::parse_image(body).unwrap_err().message.contains("blocked"));
    }

    #[test]
    fn test_image_model_names() {
        let body = r#"{"models":[
            {"name":"models/gemini-2.5-flash-image"},
            {"name":"models/text-embedding-004"},
            {"name":"models/imagen-3.0"}
        ]}"#;
        let names = GeminiInpainter::image_model_names(body).unwrap();
        assert_eq!(names, vec!["models/gemini-2.5-flash-image", "models/imagen-3.0"]);
    }
}
