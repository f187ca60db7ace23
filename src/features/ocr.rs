use serde_json::{Map, Value};

use super::{ActionState, Liveness};
use crate::documents::DocumentFile;
use crate::models::{OcrResponse, OcrStatus, StatusLine};
use crate::reconcile::{apply_to_form, format_extracted_fields, FieldUpdater};
use crate::services::OcrService;

/// Extraction of identity data from uploaded documents.
pub struct OcrController {
    service: OcrService,
    extracted: Option<Map<String, Value>>,
    ocr_text: String,
    status: Option<StatusLine>,
    state: ActionState,
    liveness: Liveness,
}

fn non_empty_count(data: &Map<String, Value>) -> usize {
    data.values()
        .filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
        .count()
}

impl OcrController {
    pub fn new(service: OcrService) -> Self {
        Self {
            service,
            extracted: None,
            ocr_text: String::new(),
            status: None,
            state: ActionState::Idle,
            liveness: Liveness::new(),
        }
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn extracted_data(&self) -> Option<&Map<String, Value>> {
        self.extracted.as_ref()
    }

    pub fn ocr_text(&self) -> &str {
        &self.ocr_text
    }

    pub fn status(&self) -> Option<&StatusLine> {
        self.status.as_ref()
    }

    pub fn state(&self) -> &ActionState {
        &self.state
    }

    /// Display lines for the current extraction.
    pub fn extracted_lines(&self) -> Vec<String> {
        self.extracted
            .as_ref()
            .map(format_extracted_fields)
            .unwrap_or_default()
    }

    /// Request context for the chat assistant describing what OCR has seen.
    pub fn ai_context(&self, document_count: usize) -> Map<String, Value> {
        let mut ctx = Map::new();
        ctx.insert("documentCount".to_string(), Value::from(document_count));
        ctx.insert("hasDocuments".to_string(), Value::Bool(document_count > 0));
        if let Some(ref data) = self.extracted {
            ctx.insert("extractedData".to_string(), Value::Object(data.clone()));
        }
        if !self.ocr_text.is_empty() {
            ctx.insert("ocrText".to_string(), Value::String(self.ocr_text.clone()));
        }
        ctx
    }

    pub fn clear_ocr_data(&mut self) {
        self.extracted = None;
        self.ocr_text.clear();
        self.status = None;
        self.state = ActionState::Idle;
    }

    /// Sends the selected documents (all when `selection` is `None` or empty)
    /// for extraction. The first goes up as the front page and the second, if
    /// any, as the back. With an `updater`, extracted fields are written into
    /// the form.
    pub async fn process_documents(
        &mut self,
        documents: &[DocumentFile],
        selection: Option<&[usize]>,
        updater: Option<&mut dyn FieldUpdater>,
    ) {
        if documents.is_empty() {
            self.status = Some(StatusLine::warning("No documents available"));
            return;
        }

        let chosen: Vec<&DocumentFile> = match selection {
            Some(indices) if !indices.is_empty() => {
                indices.iter().filter_map(|&i| documents.get(i)).collect()
            }
            _ => documents.iter().collect(),
        };

        let Some(front) = chosen.first().copied() else {
            self.status = Some(StatusLine::warning("No documents selected for processing"));
            return;
        };
        let back = chosen.get(1).copied();

        self.state = ActionState::Loading;
        self.status = Some(StatusLine::info("Processing document with OCR + AI..."));

        let result = self.service.ocr_and_interpret(front, back).await;

        if !self.liveness.is_live() {
            tracing::debug!("OCR controller unmounted, discarding response");
            return;
        }

        match result {
            Ok(response) => self.apply_response(response, updater),
            Err(e) => {
                tracing::error!("OCR processing error: {}", e);
                self.status = Some(StatusLine::error(format!("Error: {}", e)));
                self.state = ActionState::Error(e.to_string());
            }
        }
    }

    fn apply_response(&mut self, response: OcrResponse, updater: Option<&mut dyn FieldUpdater>) {
        match response.status {
            OcrStatus::Success => {
                let data = response.data.unwrap_or_default();
                let count = non_empty_count(&data);
                self.ocr_text = response.ocr_text.unwrap_or_default();
                self.status = Some(StatusLine::success(format!(
                    "Successfully extracted {} fields",
                    count
                )));

                if let Some(updater) = updater {
                    match apply_to_form(Some(&data), Some(updater)) {
                        Ok(_) => {
                            self.status = Some(StatusLine::success(format!(
                                "Successfully extracted and applied {} fields to form",
                                count
                            )));
                        }
                        Err(failure) => {
                            tracing::warn!("Extracted data not applied: {}", failure);
                            self.status = Some(failure.status());
                        }
                    }
                }

                self.extracted = Some(data);
                self.state = ActionState::Success;
            }
            OcrStatus::PartialSuccess => {
                self.ocr_text = response.ocr_text.unwrap_or_default();
                self.extracted = None;
                let text = match (&response.ai_note, &response.message) {
                    (Some(_), Some(message)) => message.clone(),
                    _ => "OCR completed but AI interpretation had issues. Raw text is available below."
                        .to_string(),
                };
                tracing::warn!("Partial OCR result: {}", text);
                self.status = Some(StatusLine::warning(text));
                self.state = ActionState::PartialSuccess;
            }
            OcrStatus::Error => {
                let message = response
                    .message
                    .unwrap_or_else(|| "Processing failed".to_string());
                tracing::error!("OCR failed: {}", message);
                self.status = Some(StatusLine::error(format!("Error: {}", message)));
                self.state = ActionState::Error(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::http_client::ApiClient;
    use crate::models::{FormField, RegistrationForm, StatusLevel};
    use serde_json::json;
    use std::time::Duration;

    fn offline() -> OcrController {
        let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        OcrController::new(OcrService::new(api))
    }

    #[derive(Default)]
    struct Form(RegistrationForm);

    impl FieldUpdater for Form {
        fn update_field(&mut self, field: FormField, value: &str) -> Result<(), AppError> {
            self.0.set(field, value);
            Ok(())
        }
    }

    fn response(value: Value) -> OcrResponse {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn no_documents_is_a_warning() {
        let mut ocr = offline();
        ocr.process_documents(&[], None, None).await;
        assert_eq!(ocr.status().unwrap().text, "No documents available");
        assert_eq!(ocr.state(), &ActionState::Idle);
    }

    #[tokio::test]
    async fn out_of_range_selection_sends_nothing() {
        let mut ocr = offline();
        let docs = vec![DocumentFile::new("a.jpg", "image/jpeg", vec![1])];
        ocr.process_documents(&docs, Some(&[4, 5]), None).await;
        assert_eq!(
            ocr.status().unwrap().text,
            "No documents selected for processing"
        );
    }

    #[test]
    fn success_applies_fields_and_counts_non_empty() {
        let mut ocr = offline();
        let mut form = Form::default();

        ocr.apply_response(
            response(json!({
                "status": "success",
                "data": { "first_name": "Jane", "last_name": "Doe", "document_number": null, "sex": "" },
                "ocr_text": "JANE DOE"
            })),
            Some(&mut form),
        );

        let status = ocr.status().unwrap();
        assert_eq!(status.level, StatusLevel::Success);
        assert_eq!(status.text, "Successfully extracted and applied 2 fields to form");
        assert_eq!(form.0.name, "Jane");
        assert_eq!(form.0.surname, "Doe");
        assert_eq!(ocr.ocr_text(), "JANE DOE");
        assert_eq!(ocr.extracted_data().unwrap().len(), 4);
    }

    #[test]
    fn success_without_mappable_fields_reports_why() {
        let mut ocr = offline();
        let mut form = Form::default();

        ocr.apply_response(
            response(json!({ "status": "success", "data": { "mrz": "P<BEL" } })),
            Some(&mut form),
        );

        let status = ocr.status().unwrap();
        assert_eq!(status.level, StatusLevel::Warning);
        assert_eq!(status.text, "No mappable fields found in extracted data.");
        assert_eq!(ocr.state(), &ActionState::Success);
    }

    #[test]
    fn partial_success_keeps_text_and_drops_structure() {
        let mut ocr = offline();
        ocr.apply_response(
            response(json!({ "status": "success", "data": { "first_name": "Old" } })),
            None,
        );

        ocr.apply_response(
            response(json!({
                "status": "partial_success",
                "ocr_text": "raw text",
                "message": "AI returned invalid JSON",
                "ai_note": "parse error"
            })),
            None,
        );

        assert!(ocr.extracted_data().is_none());
        assert_eq!(ocr.ocr_text(), "raw text");
        assert_eq!(ocr.status().unwrap().text, "AI returned invalid JSON");
        assert_eq!(ocr.state(), &ActionState::PartialSuccess);
    }

    #[test]
    fn partial_success_without_note_uses_generic_warning() {
        let mut ocr = offline();
        ocr.apply_response(
            response(json!({ "status": "partial_success", "message": "ignored" })),
            None,
        );
        assert!(ocr
            .status()
            .unwrap()
            .text
            .starts_with("OCR completed but AI interpretation had issues."));
    }

    #[test]
    fn error_leaves_previous_extraction_alone() {
        let mut ocr = offline();
        ocr.apply_response(
            response(json!({ "status": "success", "data": { "first_name": "Jane" }, "ocr_text": "JANE" })),
            None,
        );

        ocr.apply_response(response(json!({ "status": "error", "message": "blurry" })), None);

        assert_eq!(ocr.status().unwrap().text, "Error: blurry");
        assert_eq!(ocr.ocr_text(), "JANE");
        assert!(ocr.extracted_data().is_some());
    }

    #[test]
    fn ai_context_describes_documents_and_text() {
        let mut ocr = offline();
        ocr.apply_response(
            response(json!({ "status": "partial_success", "ocr_text": "raw" })),
            None,
        );

        let ctx = ocr.ai_context(2);
        assert_eq!(ctx.get("documentCount"), Some(&json!(2)));
        assert_eq!(ctx.get("hasDocuments"), Some(&json!(true)));
        assert_eq!(ctx.get("ocrText"), Some(&json!("raw")));
        assert!(!ctx.contains_key("extractedData"));
    }
}
