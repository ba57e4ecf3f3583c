// LLM verification of candidate matches
//
// Sends the input plus the top retrieval candidates to a chat completion
// service and parses a strict key/value response into a verdict. Any failure
// here (transport, auth, timeout, unparseable body) surfaces as
// `LlmUnavailable`; the engine falls back to the heuristic.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::error::DetectError;
use crate::types::{Candidate, MatchType};

const VERIFIER_TEMPERATURE: f64 = 0.1;
const VERIFIER_MAX_TOKENS: u64 = 1024;
/// Number of candidates rendered into the prompt.
const PROMPT_CANDIDATES: usize = 5;

const SYSTEM_PROMPT: &str = "You are an expert in biblical Greek and textual analysis. \
Your task is to determine whether a given Greek text is a quotation from the New Testament.";

/// One completion request, already shaped for a chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

/// Chat transport seam. The production implementation talks to the Anthropic
/// messages API; tests script the response body.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(AnthropicBackend {
            client,
            api_key,
            model,
            base_url,
        })
    }

    fn messages_url(&self) -> String {
        // Base URL is https://api.anthropic.com; /v1 belongs to the endpoint
        // path, but tolerate a base that already carries it.
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/messages", base)
        } else {
            format!("{}/v1/messages", base)
        }
    }
}

#[async_trait::async_trait]
impl ChatBackend for AnthropicBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system,
            "messages": [
                {
                    "role": "user",
                    "content": request.user
                }
            ]
        });

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Provider error ({}): {}", status, error_text);
        }

        let json: Value = response.json().await?;
        let content = json["content"]
            .as_array()
            .and_then(|c| c.first())
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow::anyhow!("No content in response"))?;

        Ok(content.to_string())
    }
}

/// Outcome of LLM verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub is_quotation: bool,
    pub match_type: MatchType,
    /// 0-100, clamped at parse time.
    pub confidence: u8,
    pub explanation: String,
    pub best_reference: Option<String>,
}

pub struct LlmVerifier {
    backend: Arc<dyn ChatBackend>,
    /// Bounds concurrent upstream calls; extra callers queue rather than fail.
    limiter: Semaphore,
}

impl LlmVerifier {
    pub fn new(backend: Arc<dyn ChatBackend>, max_concurrent: usize) -> Self {
        LlmVerifier {
            backend,
            limiter: Semaphore::new(max_concurrent.max(1)),
        }
    }

    /// Verify `text` against retrieval candidates.
    pub async fn verify(
        &self,
        text: &str,
        candidates: &[Candidate],
    ) -> Result<Verdict, DetectError> {
        if candidates.is_empty() {
            return Ok(Verdict {
                is_quotation: false,
                match_type: MatchType::NonBiblical,
                confidence: 90,
                explanation: "No candidate matches found in vector search.".to_string(),
                best_reference: None,
            });
        }

        let request = ChatRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_prompt(text, candidates),
            temperature: VERIFIER_TEMPERATURE,
            max_tokens: VERIFIER_MAX_TOKENS,
        };

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| DetectError::LlmUnavailable(format!("verifier shut down: {}", e)))?;

        let body = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| DetectError::LlmUnavailable(format!("{:#}", e)))?;

        let verdict = parse_verdict(&body);
        tracing::debug!(
            match_type = verdict.match_type.as_str(),
            confidence = verdict.confidence,
            "llm verification complete"
        );
        Ok(verdict)
    }
}

fn build_prompt(text: &str, candidates: &[Candidate]) -> String {
    let mut candidates_block = String::new();
    for (i, c) in candidates.iter().take(PROMPT_CANDIDATES).enumerate() {
        candidates_block.push_str(&format!(
            "\nCandidate {}:\n- Reference: {}\n- Greek Text: {}\n- Similarity Score: {:.3}\n",
            i + 1,
            c.verse.reference,
            c.verse.greek_normalized,
            c.similarity_score
        ));
    }

    format!(
        "## Input Text to Analyze\n{text}\n\n\
## Candidate Biblical Matches (from semantic search)\n{candidates_block}\n\
## Your Task\n\
Analyze the input text and determine:\n\
1. Is this a biblical quotation? (yes/no)\n\
2. What type of match is it?\n\
   - exact: Word-for-word or near word-for-word match\n\
   - close_paraphrase: Same meaning with minor word changes or reordering\n\
   - loose_paraphrase: Same core idea but significantly reworded\n\
   - allusion: Reference to biblical concepts without direct quotation\n\
   - non_biblical: Not a biblical quotation\n\
3. Confidence level (0-100%)\n\
4. Best matching reference (if applicable)\n\n\
## Response Format\n\
Respond in exactly this format:\n\n\
IS_QUOTATION: [yes/no]\n\
MATCH_TYPE: [exact/close_paraphrase/loose_paraphrase/allusion/non_biblical]\n\
CONFIDENCE: [0-100]\n\
BEST_REFERENCE: [reference or \"none\"]\n\
EXPLANATION: [1-2 sentence explanation of your analysis]\n\n\
Consider:\n\
- Greek word forms and inflections (same lemma = similar meaning)\n\
- Word order flexibility in Greek\n\
- Common textual variants between manuscripts\n\
- Whether the semantic content matches, not just surface words"
    )
}

/// Parse the strict key/value response body.
///
/// One pass over the lines: split on the first colon, normalize the key,
/// dispatch by known key set. Unknown keys are logged and ignored; missing
/// keys take the documented defaults; confidence is clamped here and nowhere
/// else. A MATCH_TYPE outside the enumerated set collapses the whole verdict
/// to the uncertain form: non-biblical with confidence 0.
fn parse_verdict(body: &str) -> Verdict {
    let mut is_quotation = false;
    let mut match_type_raw: Option<String> = None;
    let mut confidence: Option<i64> = None;
    let mut explanation: Option<String> = None;
    let mut best_reference: Option<String> = None;

    for line in body.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim();

        match key.as_str() {
            "IS_QUOTATION" => is_quotation = value.eq_ignore_ascii_case("yes"),
            "MATCH_TYPE" => match_type_raw = Some(value.to_ascii_lowercase()),
            "CONFIDENCE" => confidence = value.parse().ok(),
            "BEST_REFERENCE" => {
                if !value.is_empty() && !value.eq_ignore_ascii_case("none") {
                    best_reference = Some(value.to_string());
                }
            }
            "EXPLANATION" => explanation = Some(value.to_string()),
            other => tracing::debug!(key = other, "ignoring unrecognized verifier response key"),
        }
    }

    let explanation =
        explanation.unwrap_or_else(|| "No explanation provided.".to_string());
    let confidence = confidence.map(|c| c.clamp(0, 100) as u8).unwrap_or(50);

    let match_type = match match_type_raw {
        None => MatchType::NonBiblical,
        Some(raw) => match MatchType::parse(&raw) {
            Some(mt) => mt,
            None => {
                // Uncertain: the model answered outside the schema.
                tracing::debug!(value = %raw, "unrecognized MATCH_TYPE in verifier response");
                return Verdict {
                    is_quotation: false,
                    match_type: MatchType::NonBiblical,
                    confidence: 0,
                    explanation,
                    best_reference,
                };
            }
        },
    };

    Verdict {
        is_quotation,
        match_type,
        confidence,
        explanation,
        best_reference,
    }
}
