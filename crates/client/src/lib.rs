use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::runtime::Runtime;

use needlebench_core::{HarnessError, InferenceClient, Result, Tokenizer};

/// Blocking client for a Megatron-style model service. Every endpoint is a
/// PUT under one base URL; any non-success status or malformed body is a
/// fatal `Inference` error carrying the raw payload. There is deliberately
/// no timeout or retry layer: an unresponsive endpoint blocks the sweep,
/// and flaky infrastructure surfaces instead of being masked.
pub struct ServiceClient {
    http: Client,
    runtime: Runtime,
    base_url: String,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let runtime = Runtime::new()
            .map_err(|e| HarnessError::Inference(format!("failed to start tokio runtime: {e}")))?;
        Ok(Self {
            http: Client::new(),
            runtime,
            base_url: base_url.into().trim().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Greedy, seeded generation: one prompt in, one completion out.
    pub fn generate(&self, prompt: &str, tokens_to_generate: usize) -> Result<String> {
        let body = json!({
            "prompts": [prompt],
            "tokens_to_generate": tokens_to_generate,
            "add_BOS": false,
            "random_seed": 0,
            "top_k": 1,
        });
        let response: GenerateResponse = self.put(&self.endpoint(""), &body)?;
        response
            .text
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::Inference("generate response carried no text".to_string()))
    }

    pub fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let body = json!({ "texts": [text], "add_BOS": false });
        let response: TokenizeResponse = self.put(&self.endpoint("tokenize"), &body)?;
        response.token_ids.into_iter().next().ok_or_else(|| {
            HarnessError::Inference("tokenize response carried no token ids".to_string())
        })
    }

    pub fn detokenize(&self, tokens: &[u32]) -> Result<String> {
        let body = json!({ "tokens": [tokens] });
        let response: DetokenizeResponse = self.put(&self.endpoint("detokenize"), &body)?;
        response
            .texts
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::Inference("detokenize response carried no text".to_string()))
    }

    /// Configures the server-side attention window before a run. `None`
    /// restores the service default.
    pub fn modify_window_size(&self, window_size: Option<u32>) -> Result<()> {
        let body = match window_size {
            Some(size) => json!({ "window_size": [size, 0] }),
            None => json!({ "window_size": null }),
        };
        let url = self.endpoint("modify_window_size");
        self.raw_put(&url, &body).map(|_| ())
    }

    fn endpoint(&self, route: &str) -> String {
        if route.is_empty() {
            format!("http://{}/api", self.base_url)
        } else {
            format!("http://{}/api/{}", self.base_url, route)
        }
    }

    fn put<R: for<'de> Deserialize<'de>>(&self, url: &str, body: &Value) -> Result<R> {
        let raw = self.raw_put(url, body)?;
        serde_json::from_str(&raw)
            .map_err(|e| HarnessError::Inference(format!("malformed response from {url}: {e}: {raw}")))
    }

    fn raw_put(&self, url: &str, body: &Value) -> Result<String> {
        self.runtime.block_on(async {
            let response = self
                .http
                .put(url)
                .json(body)
                .send()
                .await
                .map_err(|e| HarnessError::Inference(format!("request to {url} failed: {e}")))?;
            let status = response.status();
            let raw = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(HarnessError::Inference(format!(
                    "service returned {status} from {url}: {raw}"
                )));
            }
            Ok(raw)
        })
    }
}

impl Tokenizer for ServiceClient {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        ServiceClient::tokenize(self, text)
    }

    fn detokenize(&self, tokens: &[u32]) -> Result<String> {
        ServiceClient::detokenize(self, tokens)
    }
}

impl InferenceClient for ServiceClient {
    fn generate(&self, prompt: &str, tokens_to_generate: usize) -> Result<String> {
        ServiceClient::generate(self, prompt, tokens_to_generate)
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: Vec<String>,
}

#[derive(Deserialize)]
struct TokenizeResponse {
    token_ids: Vec<Vec<u32>>,
}

#[derive(Deserialize)]
struct DetokenizeResponse {
    texts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_route_under_one_base() {
        let client = ServiceClient::new(" localhost:5000 ").unwrap();
        assert_eq!(client.endpoint(""), "http://localhost:5000/api");
        assert_eq!(
            client.endpoint("detokenize"),
            "http://localhost:5000/api/detokenize"
        );
    }

    #[test]
    fn response_bodies_deserialize() {
        let generate: GenerateResponse =
            serde_json::from_str(r#"{"text": ["the completion"]}"#).unwrap();
        assert_eq!(generate.text[0], "the completion");
        let tokenize: TokenizeResponse =
            serde_json::from_str(r#"{"token_ids": [[1, 29889, 3]]}"#).unwrap();
        assert_eq!(tokenize.token_ids[0], vec![1, 29889, 3]);
        let detokenize: DetokenizeResponse =
            serde_json::from_str(r#"{"texts": ["Hi."]}"#).unwrap();
        assert_eq!(detokenize.texts[0], "Hi.");
    }
}
