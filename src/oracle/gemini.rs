use std::time::Duration;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::ingest::parse_candidates;
use super::{ChunkRequest, TitleOracle};
use crate::model::TocCandidate;
use crate::pdf::extract_text;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const INLINE_PDF_LIMIT_BYTES: usize = 20 * 1024 * 1024;

const SYSTEM_INSTRUCTION: &str = "\
You extract the table of contents from PDF pages. Only return real chapter and section headings, \
never descriptive sentences.

Rules:
- Only headings with explicit numbering (for example 1., 1.1, 第一章)
- At most 3 heading levels
- Titles between 2 and 40 characters
- Ignore dates, captions, descriptions and URLs

Output JSON: [{\"title\": \"heading\", \"level\": 1, \"page\": 1}]";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

/// Title oracle backed by the Gemini `generateContent` endpoint.
pub struct GeminiOracle {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiOracle {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("a Gemini API key is required (set GOOGLE_AI_API_KEY or pass --api-key)");
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;

        Ok(Self {
            api_key: config.api_key,
            model: config.model,
            client,
        })
    }

    fn extract_inline(&self, request: &ChunkRequest<'_>) -> Result<Vec<TocCandidate>> {
        let chunk = request.chunk;
        let prompt = inline_prompt(chunk.start_page, chunk.end_page);
        let encoded = STANDARD.encode(&chunk.bytes);

        let parts = vec![
            Part::InlineData {
                inline_data: Blob {
                    mime_type: "application/pdf",
                    data: encoded,
                },
            },
            Part::Text { text: prompt },
        ];

        let response = self.generate(parts)?;
        Ok(parse_candidates(&response, chunk.start_page, chunk.end_page))
    }

    fn extract_from_text(&self, request: &ChunkRequest<'_>) -> Result<Vec<TocCandidate>> {
        let chunk = request.chunk;
        let text = extract_text(request.source, chunk.start_page, chunk.end_page)?;
        if text.trim().is_empty() {
            warn!(
                start_page = chunk.start_page,
                end_page = chunk.end_page,
                "chunk has no text layer; nothing to send"
            );
            return Ok(Vec::new());
        }

        let prompt = text_prompt(&text, chunk.start_page, chunk.end_page);
        let response = self.generate(vec![Part::Text { text: prompt }])?;
        Ok(parse_candidates(&response, chunk.start_page, chunk.end_page))
    }

    fn generate(&self, parts: Vec<Part>) -> Result<String> {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts,
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        };

        let url = format!("{API_BASE}/models/{}:generateContent", self.model);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.trim())
            .json(&body)
            .send()
            .context("failed to call Gemini generateContent")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Gemini returned {}: {}", status, text);
        }

        let parsed: GenerateResponse = resp.json().context("failed to parse Gemini response")?;
        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect::<String>();

        debug!(model = %self.model, chars = text.len(), "received oracle response");
        Ok(text)
    }
}

impl TitleOracle for GeminiOracle {
    fn extract_titles(&self, request: &ChunkRequest<'_>) -> Result<Vec<TocCandidate>> {
        let chunk = request.chunk;

        if chunk.bytes.len() > INLINE_PDF_LIMIT_BYTES {
            info!(
                start_page = chunk.start_page,
                end_page = chunk.end_page,
                bytes = chunk.bytes.len(),
                "chunk exceeds inline limit; sending extracted text"
            );
            return self.extract_from_text(request);
        }

        match self.extract_inline(request) {
            Ok(candidates) => Ok(candidates),
            Err(err) => {
                warn!(
                    start_page = chunk.start_page,
                    end_page = chunk.end_page,
                    error = %err,
                    "inline PDF request failed; retrying with extracted text"
                );
                self.extract_from_text(request)
            }
        }
    }
}

fn inline_prompt(start_page: u32, end_page: u32) -> String {
    format!(
        "Analyze PDF pages {start_page}-{end_page} and extract the section headings.\n\n\
         The attached file holds pages {start_page}-{end_page} of the original PDF. Report each \
         heading's page as the original PDF page index, not the printed page label: a heading on \
         the first attached page is page {start_page}, on the second page {second}, and so on.\n\n\
         Only numbered headings (1., 1.1, 第一章 ...), at most 3 levels, 2-40 characters, no \
         descriptions, dates or URLs.\n\n\
         Output JSON only: [{{\"title\": \"heading\", \"level\": 1, \"page\": {start_page}}}]",
        second = start_page + 1,
    )
}

fn text_prompt(text: &str, start_page: u32, end_page: u32) -> String {
    format!(
        "Extract the heading structure from the PDF text below (pages {start_page}-{end_page}).\n\n\
         Each page starts with a \"--- page N ---\" marker carrying the absolute page number; \
         use it for the page field. Output JSON only, without commentary:\n\
         [{{\"title\": \"heading\", \"level\": 1, \"page\": {start_page}}}]\n\n\
         Document text:\n{text}"
    )
}

fn response_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "level": { "type": "integer" },
                "page": { "type": "integer" }
            },
            "required": ["title", "level", "page"]
        }
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_gemini_field_names() {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: "system".to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part::InlineData {
                    inline_data: Blob {
                        mime_type: "application/pdf",
                        data: STANDARD.encode(b"%PDF"),
                    },
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        };

        let value = serde_json::to_value(&body).expect("request should serialize");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "system");
        assert!(value["systemInstruction"].get("role").is_none());
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(
            value["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "application/pdf"
        );
        assert_eq!(
            value["contents"][0]["parts"][0]["inlineData"]["data"],
            "JVBERg=="
        );
        assert_eq!(
            value["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            value["generationConfig"]["responseSchema"]["items"]["required"][2],
            "page"
        );
    }

    #[test]
    fn response_text_parts_deserialize() {
        let raw = r#"{
          "candidates": [
            { "content": { "parts": [ { "text": "[{\"title\": \"第一章 概述\"," }, { "text": " \"level\": 1, \"page\": 3}]" } ] } }
          ]
        }"#;

        let parsed: GenerateResponse = serde_json::from_str(raw).expect("response should parse");
        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect::<String>();

        let candidates = parse_candidates(&text, 1, 50);
        assert_eq!(candidates, vec![TocCandidate::new("第一章 概述", 1, 3)]);
    }

    #[test]
    fn prompts_name_the_absolute_page_range() {
        let inline = inline_prompt(101, 200);
        assert!(inline.contains("pages 101-200"));
        assert!(inline.contains("page 102"));

        let text = text_prompt("--- page 101 ---\n第一章 概述", 101, 200);
        assert!(text.contains("--- page 101 ---"));
        assert!(text.contains("\"page\": 101"));
    }

    #[test]
    fn new_rejects_blank_api_key() {
        let result = GeminiOracle::new(GeminiConfig {
            api_key: "   ".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout: Duration::from_secs(5),
        });
        assert!(result.is_err());
    }
}
