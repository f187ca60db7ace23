use crate::errors::AppError;
use reqwest::multipart;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Backend routes consumed by the client.
pub mod endpoints {
    pub const VERIFY_IDENTITY: &str = "/verify_identity";
    pub const SAVE_REGISTRATION: &str = "/save_registration";
    pub const GENERATE_PDF: &str = "/generate_pdf";
    pub const OCR_EXTRACT: &str = "/ocr_and_interpret";
    pub const PREPARE_PRADO_URL: &str = "/prepare_prado_url";
    pub const CHAT_WITH_AI: &str = "/chat_with_ai";
}

/// One multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

impl FormPart {
    pub fn name(&self) -> &str {
        match self {
            FormPart::Text { name, .. } | FormPart::File { name, .. } => name,
        }
    }
}

/// Ordered multipart accumulator.
///
/// Kept separate from `reqwest::multipart::Form` so payloads can be inspected
/// and logged before they are sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormPayload {
    parts: Vec<FormPart>,
}

impl FormPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        &mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> &mut Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// First text value stored under `name`.
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            FormPart::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.iter().any(|part| part.name() == name)
    }

    fn into_multipart(self) -> Result<multipart::Form, AppError> {
        let mut form = multipart::Form::new();
        for part in self.parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name, value),
                FormPart::File {
                    name,
                    file_name,
                    content_type,
                    bytes,
                } => {
                    let part = multipart::Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str(&content_type)
                        .map_err(|e| {
                            AppError::InvalidInput(format!(
                                "invalid content type '{}': {}",
                                content_type, e
                            ))
                        })?;
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }

    /// Short description for logs; binary parts are summarized by size.
    pub fn describe(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                FormPart::Text { name, value } if value.len() > 64 => {
                    format!("{}=[{} chars]", name, value.len())
                }
                FormPart::Text { name, value } => format!("{}={}", name, value),
                FormPart::File {
                    name,
                    file_name,
                    bytes,
                    ..
                } => format!("{}=[file {}, {} bytes]", name, file_name, bytes.len()),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Decoded body of a POST: JSON, or raw bytes when the backend streams a PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiPayload {
    Json(Value),
    Pdf(Vec<u8>),
}

impl ApiPayload {
    /// Deserializes a JSON payload; a PDF where JSON was expected is an error.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, AppError> {
        match self {
            ApiPayload::Json(value) => Ok(serde_json::from_value(value)?),
            ApiPayload::Pdf(_) => Err(AppError::Decode(
                "expected a JSON response but received a PDF".to_string(),
            )),
        }
    }
}

/// Client for the compliance backend.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Backend root, e.g. `http://127.0.0.1:8000`.
    /// * `timeout` - Per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Network(format!("Failed to create API client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues a GET and decodes the JSON body.
    ///
    /// Parameters whose value is `None` are left out of the query string.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<T, AppError> {
        let present: Vec<(&str, &str)> = params
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (*k, v)))
            .collect();

        let url = url::Url::parse_with_params(&format!("{}{}", self.base_url, endpoint), &present)
            .map_err(|e| AppError::InvalidInput(format!("Failed to build URL: {}", e)))?;

        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| AppError::Network(format!("API request failed: {}", e)))?;

        let response = Self::ensure_success(response).await?;

        let data = response
            .json()
            .await
            .map_err(|e| AppError::Decode(format!("Failed to parse API response: {}", e)))?;

        Ok(data)
    }

    /// Issues a multipart POST.
    ///
    /// A response declared as `application/pdf` is returned as bytes without
    /// attempting JSON decoding.
    pub async fn post_form(&self, endpoint: &str, form: FormPayload) -> Result<ApiPayload, AppError> {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!("POST {} ({})", url, form.describe());

        let response = self
            .client
            .post(&url)
            .multipart(form.into_multipart()?)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("API request failed: {}", e)))?;

        let is_pdf = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/pdf"))
            .unwrap_or(false);

        let response = Self::ensure_success(response).await?;

        if is_pdf {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| AppError::Network(format!("Failed to read PDF body: {}", e)))?;
            tracing::debug!("Received PDF, {} bytes", bytes.len());
            return Ok(ApiPayload::Pdf(bytes.to_vec()));
        }

        let data = response
            .json()
            .await
            .map_err(|e| AppError::Decode(format!("Failed to parse API response: {}", e)))?;

        Ok(ApiPayload::Json(data))
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::error!("API returned error {}: {}", status, error_text);

        Err(AppError::Http {
            status: status.as_u16(),
            body: error_text,
        })
    }
}
