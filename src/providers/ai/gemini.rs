//! Gemini API classifier implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Classifier;
use crate::config::ClassifierSettings;
use crate::domain::Category;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API request format.
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

/// Gemini API response format.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .map(|p| p.text.as_str())
    }
}

/// Classifier backed by the Gemini `generateContent` endpoint.
///
/// Every failure mode (transport error, non-success status, unparseable
/// response, unknown category text) is logged and absorbed into
/// [`Category::Uncategorized`].
pub struct GeminiClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_body_chars: usize,
}

impl GeminiClassifier {
    /// Creates a classifier from settings.
    pub fn new(settings: &ClassifierSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_body_chars: settings.max_body_chars,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_URL, self.model, self.api_key
        )
    }

    fn prompt(&self, subject: &str, body: &str) -> String {
        let body = truncate_chars(body, self.max_body_chars);
        format!(
            "You are an expert email classifier. Categorize the following email \
             into exactly one of these categories:\n\
             1. Interested\n\
             2. Not Interested\n\
             3. Meeting Booked\n\
             4. Spam\n\
             5. Out of Office\n\n\
             Return ONLY the category name and nothing else.\n\n\
             Subject: \"{}\"\n\n\
             Body:\n\"\"\"\n{}\n\"\"\"",
            subject, body
        )
    }

    async fn request_category(&self, subject: &str, body: &str) -> Result<Category, String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: self.prompt(subject, body),
                }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(format!("API error {}: {}", status, detail));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response: {}", e))?;

        let text = parsed.text().ok_or("response carried no text")?;
        text.parse::<Category>().map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, subject: &str, body: &str) -> Category {
        match self.request_category(subject, body).await {
            Ok(category) => category,
            Err(e) => {
                tracing::error!(subject, "classification failed, using safe default: {}", e);
                Category::Uncategorized
            }
        }
    }
}

/// Truncates to at most `max` characters on a char boundary.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
