use crate::config::Config;
use crate::documents::DocumentFile;
use crate::errors::AppError;
use crate::http_client::{endpoints, ApiClient, ApiPayload, FormPayload};
use crate::models::*;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Sanctions-list screening.
#[derive(Clone)]
pub struct SanctionsService {
    api: ApiClient,
}

impl SanctionsService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Screen a name against the sanctions lists.
    pub async fn verify_identity(
        &self,
        query: &SearchQuery,
    ) -> Result<VerifyIdentityResponse, AppError> {
        tracing::info!(
            "Screening '{} {}' (threshold {}, top_n {})",
            query.name,
            query.surname,
            query.threshold,
            query.top_n
        );

        let response: VerifyIdentityResponse = self
            .api
            .get(
                endpoints::VERIFY_IDENTITY,
                &[
                    ("name", Some(query.name.clone())),
                    ("surname", Some(query.surname.clone())),
                    ("threshold", Some(query.threshold.to_string())),
                    ("top_n", Some(query.top_n.to_string())),
                ],
            )
            .await?;

        Ok(response)
    }
}

/// Field-keyed validation messages; empty means the form may be submitted.
pub type ValidationErrors = BTreeMap<FormField, String>;

const REQUIRED_FIELDS: [FormField; 5] = [
    FormField::Name,
    FormField::Surname,
    FormField::TransactionNumber,
    FormField::TransactionAmount,
    FormField::TransactionNature,
];

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

fn amount_regex() -> &'static Regex {
    // Accepts a leading decimal number, the way form inputs are usually parsed.
    static AMOUNT: OnceLock<Regex> = OnceLock::new();
    AMOUNT.get_or_init(|| {
        Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)").expect("valid amount pattern")
    })
}

/// Check a registration form before it is sent anywhere.
pub fn validate_registration(form: &RegistrationForm) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    for field in REQUIRED_FIELDS {
        if form.get(field).is_empty() {
            errors.insert(field, "This field is required".to_string());
        }
    }

    if !form.email.is_empty() && !email_regex().is_match(&form.email) {
        errors.insert(
            FormField::Email,
            "Please enter a valid email address".to_string(),
        );
    }

    if !form.transaction_amount.is_empty() && !amount_regex().is_match(&form.transaction_amount) {
        errors.insert(
            FormField::TransactionAmount,
            "Please enter a valid amount".to_string(),
        );
    }

    errors
}

/// Registration persistence and PDF reports.
#[derive(Clone)]
pub struct RegistrationService {
    api: ApiClient,
}

impl RegistrationService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn save_registration(
        &self,
        form: FormPayload,
    ) -> Result<RegistrationReceipt, AppError> {
        tracing::info!("Saving registration ({} parts)", form.len());

        let receipt: RegistrationReceipt = self
            .api
            .post_form(endpoints::SAVE_REGISTRATION, form)
            .await?
            .into_json()?;

        match receipt.id() {
            Some(id) => tracing::info!("✓ Registration saved: {}", id),
            None => tracing::warn!("Registration saved but no registration_id was returned"),
        }

        Ok(receipt)
    }

    /// Render the PDF report. `registration_id` is attached when known.
    pub async fn generate_pdf(
        &self,
        mut form: FormPayload,
        registration_id: Option<&str>,
    ) -> Result<PdfDocument, AppError> {
        if let Some(id) = registration_id {
            form.text("registration_id", id);
        }

        tracing::info!("Requesting PDF report (registration_id={:?})", registration_id);

        match self.api.post_form(endpoints::GENERATE_PDF, form).await? {
            ApiPayload::Pdf(bytes) => {
                tracing::info!("✓ PDF report received, {} bytes", bytes.len());
                Ok(PdfDocument { bytes })
            }
            ApiPayload::Json(body) => {
                tracing::warn!("PDF endpoint answered with JSON: {}", body);
                Err(AppError::Decode(
                    "PDF endpoint did not return a PDF document".to_string(),
                ))
            }
        }
    }
}

/// OCR plus AI interpretation of identity documents.
#[derive(Clone)]
pub struct OcrService {
    api: ApiClient,
}

impl OcrService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Send one page, or a front/back pair, for extraction.
    pub async fn ocr_and_interpret(
        &self,
        front: &DocumentFile,
        back: Option<&DocumentFile>,
    ) -> Result<OcrResponse, AppError> {
        let mut form = FormPayload::new();
        front.append_to(&mut form, "file");
        if let Some(back) = back {
            back.append_to(&mut form, "file2");
        }

        tracing::info!(
            "Sending {} page(s) for OCR: {}",
            if back.is_some() { 2 } else { 1 },
            front.file_name
        );

        let response: OcrResponse = self
            .api
            .post_form(endpoints::OCR_EXTRACT, form)
            .await?
            .into_json()?;

        tracing::info!("OCR finished with status {:?}", response.status);
        Ok(response)
    }
}

/// Preparation of PRADO lookup URLs.
#[derive(Clone)]
pub struct PradoService {
    api: ApiClient,
}

impl PradoService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Let the backend derive a URL from OCR output.
    pub async fn prepare_from_extracted(
        &self,
        extracted: &Map<String, Value>,
    ) -> Result<Option<String>, AppError> {
        let mut form = FormPayload::new();
        form.text("extracted_data", serde_json::to_string(extracted)?);
        self.prepare(form).await
    }

    pub async fn prepare_for_country(
        &self,
        country: &str,
        document_type: &str,
    ) -> Result<Option<String>, AppError> {
        let mut form = FormPayload::new();
        form.text("country", country)
            .text("document_type", document_type);
        self.prepare(form).await
    }

    async fn prepare(&self, form: FormPayload) -> Result<Option<String>, AppError> {
        let response: PradoUrlResponse = self
            .api
            .post_form(endpoints::PREPARE_PRADO_URL, form)
            .await?
            .into_json()?;

        Ok(response.url.filter(|url| !url.trim().is_empty()))
    }
}

/// The document-verification chat assistant.
#[derive(Clone)]
pub struct AiChatService {
    api: ApiClient,
}

impl AiChatService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Ask the assistant. `context` is sent only when it has entries.
    pub async fn send_chat_query(
        &self,
        query: &str,
        context: &Map<String, Value>,
    ) -> Result<ChatReply, AppError> {
        let mut form = FormPayload::new();
        form.text("query", query);
        if !context.is_empty() {
            form.text("context", serde_json::to_string(context)?);
        }

        tracing::info!("Sending chat query ({} chars)", query.len());

        let reply: ChatReply = self
            .api
            .post_form(endpoints::CHAT_WITH_AI, form)
            .await?
            .into_json()?;

        if let Some(ref prado) = reply.prado_context {
            tracing::info!(
                "Assistant suggested PRADO lookup: country={:?}, document_type={:?}",
                prado.country,
                prado.document_type
            );
        }

        Ok(reply)
    }
}

/// Every backend service, sharing one HTTP client.
#[derive(Clone)]
pub struct Services {
    pub sanctions: SanctionsService,
    pub registration: RegistrationService,
    pub ocr: OcrService,
    pub prado: PradoService,
    pub chat: AiChatService,
}

impl Services {
    pub fn new(api: ApiClient) -> Self {
        Self {
            sanctions: SanctionsService::new(api.clone()),
            registration: RegistrationService::new(api.clone()),
            ocr: OcrService::new(api.clone()),
            prado: PradoService::new(api.clone()),
            chat: AiChatService::new(api),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let api = ApiClient::new(
            config.api_base_url.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )?;
        Ok(Self::new(api))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_form() -> RegistrationForm {
        let mut form = RegistrationForm::for_customer("Jane", "Doe");
        form.set(FormField::TransactionNumber, "TX-1");
        form.set(FormField::TransactionAmount, "1500.50");
        form.set(FormField::TransactionNature, "transfer");
        form
    }

    #[test]
    fn complete_form_is_valid() {
        assert!(validate_registration(&complete_form()).is_empty());
    }

    #[test]
    fn required_fields_are_reported_individually() {
        let errors = validate_registration(&RegistrationForm::default());
        assert_eq!(errors.len(), REQUIRED_FIELDS.len());
        assert_eq!(
            errors.get(&FormField::TransactionNature).map(String::as_str),
            Some("This field is required")
        );
    }

    #[test]
    fn malformed_email_is_rejected() {
        let mut form = complete_form();
        form.set(FormField::Email, "jane.doe@example");
        let errors = validate_registration(&form);
        assert!(errors.contains_key(&FormField::Email));

        form.set(FormField::Email, "jane.doe@example.com");
        assert!(validate_registration(&form).is_empty());
    }

    #[test]
    fn amount_needs_a_leading_number() {
        let mut form = complete_form();
        form.set(FormField::TransactionAmount, "about a thousand");
        assert!(validate_registration(&form).contains_key(&FormField::TransactionAmount));

        form.set(FormField::TransactionAmount, "1200 EUR");
        assert!(validate_registration(&form).is_empty());
    }
}
