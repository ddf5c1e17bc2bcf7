//! Gemini `generateContent` transport. One HTTP call per `generate`; the
//! invoker owns timeouts, retries and fallback.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ModelTransport, RawCompletion, TransportError, Usage};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl From<UsageMetadata> for Usage {
    fn from(m: UsageMetadata) -> Self {
        Usage {
            input_tokens: m.prompt_token_count,
            output_tokens: m.candidates_token_count,
            total_tokens: m.total_token_count,
        }
    }
}

#[derive(Clone)]
pub struct GeminiTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiTransport {
    pub fn new(api_key: String, base_url: String) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            api_key,
            base_url,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl ModelTransport for GeminiTransport {
    async fn generate(
        &self,
        backend: &str,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<RawCompletion, TransportError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![RequestPart { text: prompt }],
            }],
            system_instruction: system.map(|text| Content {
                role: None,
                parts: vec![RequestPart { text }],
            }),
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.4,
            },
        };

        let response = self
            .client
            .post(self.endpoint(backend))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        parse_generate_content(&text)
    }
}

fn parse_generate_content(body: &str) -> Result<RawCompletion, TransportError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| TransportError::Malformed(e.to_string()))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(TransportError::Malformed(
            "no candidate text in response".to_string(),
        ));
    }

    Ok(RawCompletion {
        text,
        usage: parsed.usage_metadata.map(Usage::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> GeminiTransport {
        GeminiTransport::new("test-key".to_string(), server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_success_extracts_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3, "totalTokenCount": 15}
            })))
            .mount(&server)
            .await;

        let completion = transport(&server)
            .generate("gemini-test", "hello", Some("be terse"))
            .await
            .unwrap();

        assert_eq!(completion.text, "{\"a\":1}");
        assert_eq!(
            completion.usage,
            Some(Usage {
                input_tokens: 12,
                output_tokens: 3,
                total_tokens: 15
            })
        );
    }

    #[tokio::test]
    async fn test_missing_usage_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{}"}]}}]
            })))
            .mount(&server)
            .await;

        let completion = transport(&server).generate("m", "p", None).await.unwrap();
        assert!(completion.usage.is_none());
    }

    #[tokio::test]
    async fn test_quota_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("RESOURCE_EXHAUSTED"))
            .mount(&server)
            .await;

        let err = transport(&server).generate("m", "p", None).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 429, .. }));
    }

    #[test]
    fn test_no_candidates_is_malformed() {
        let err = parse_generate_content(r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[test]
    fn test_non_json_body_is_malformed() {
        let err = parse_generate_content("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }
}
