use std::sync::Arc;

use super::{ActionState, Liveness};
use crate::documents::{DocumentFile, DocumentSet, PreviewRegistry, UploadedDocument};
use crate::errors::AppError;
use crate::field_store::{PersistentField, StorageArea, OCR_FIELDS_KEY, REGISTRATION_FORM_KEY};
use crate::http_client::FormPayload;
use crate::models::{
    FormField, PdfDocument, RegistrationForm, RegistrationReceipt, SearchResultsSession,
};
use crate::phase::PhaseController;
use crate::reconcile::{FieldUpdater, OcrFieldSet};
use crate::screenshot::{append_screenshot, SCREENSHOT_FIELD};
use crate::services::{validate_registration, RegistrationService, ValidationErrors};

/// The customer registration form, its attachments and its submission.
pub struct RegistrationController {
    service: RegistrationService,
    customer: SearchResultsSession,
    form: RegistrationForm,
    saved_form: PersistentField<Option<RegistrationForm>>,
    ocr_fields: OcrFieldSet,
    saved_ocr_fields: PersistentField<OcrFieldSet>,
    documents: DocumentSet,
    validation_errors: ValidationErrors,
    state: ActionState,
    registration_id: Option<String>,
    pdf: Option<PdfDocument>,
    pdf_state: ActionState,
    liveness: Liveness,
}

impl RegistrationController {
    /// Opens the form for the customer in `session`, restoring any snapshot
    /// left in `storage` by an earlier run.
    pub fn new(
        service: RegistrationService,
        storage: Arc<StorageArea>,
        previews: Arc<PreviewRegistry>,
        session: &SearchResultsSession,
    ) -> Self {
        let saved_form: PersistentField<Option<RegistrationForm>> =
            PersistentField::new(Arc::clone(&storage), REGISTRATION_FORM_KEY, None);
        let saved_ocr_fields =
            PersistentField::new(storage, OCR_FIELDS_KEY, OcrFieldSet::default());

        let form = match saved_form.get() {
            Some(saved) => {
                tracing::info!("Restored saved registration form");
                saved.clone()
            }
            None => RegistrationForm::for_customer(&session.name, &session.surname),
        };
        let ocr_fields = saved_ocr_fields.get().clone();

        Self {
            service,
            customer: session.clone(),
            form,
            saved_form,
            ocr_fields,
            saved_ocr_fields,
            documents: DocumentSet::new(previews),
            validation_errors: ValidationErrors::new(),
            state: ActionState::Idle,
            registration_id: None,
            pdf: None,
            pdf_state: ActionState::Idle,
            liveness: Liveness::new(),
        }
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn form(&self) -> &RegistrationForm {
        &self.form
    }

    pub fn ocr_fields(&self) -> &OcrFieldSet {
        &self.ocr_fields
    }

    pub fn is_auto_filled(&self, field: FormField) -> bool {
        self.ocr_fields.is_auto_filled(field, &self.form)
    }

    pub fn validation_errors(&self) -> &ValidationErrors {
        &self.validation_errors
    }

    pub fn state(&self) -> &ActionState {
        &self.state
    }

    pub fn registration_id(&self) -> Option<&str> {
        self.registration_id.as_deref()
    }

    pub fn pdf(&self) -> Option<&PdfDocument> {
        self.pdf.as_ref()
    }

    pub fn pdf_state(&self) -> &ActionState {
        &self.pdf_state
    }

    pub fn documents(&self) -> &[UploadedDocument] {
        self.documents.as_slice()
    }

    /// Copies of the attached files, e.g. to hand to OCR while this
    /// controller receives the results.
    pub fn document_files(&self) -> Vec<DocumentFile> {
        self.documents.iter().map(|doc| doc.file.clone()).collect()
    }

    /// A user edit. The field keeps its OCR flag.
    pub fn handle_change(&mut self, field: FormField, value: impl Into<String>) {
        self.form.set(field, value);
        self.saved_form.set(Some(self.form.clone()));
        self.validation_errors.remove(&field);
    }

    /// Picks up changes another context wrote to the shared storage.
    pub fn sync_storage(&mut self) {
        if self.saved_form.sync() {
            if let Some(form) = self.saved_form.get() {
                self.form = form.clone();
            }
        }
        if self.saved_ocr_fields.sync() {
            self.ocr_fields = self.saved_ocr_fields.get().clone();
        }
    }

    pub fn add_documents(&mut self, files: impl IntoIterator<Item = DocumentFile>) {
        self.documents.add_files(files);
    }

    pub fn remove_document(&mut self, index: usize) -> bool {
        self.documents.remove(index)
    }

    fn field_payload(&self) -> FormPayload {
        let mut payload = FormPayload::new();
        for (field, value) in self.form.entries() {
            payload.text(field.as_str(), value);
        }
        payload
    }

    fn append_attachments(&self, payload: &mut FormPayload) {
        for (index, doc) in self.documents.iter().enumerate() {
            doc.file.append_to(payload, &format!("document_{}", index));
        }

        let screenshot = self.customer.screenshot_url.as_str();
        if !screenshot.is_empty() {
            if let Err(e) = append_screenshot(payload, SCREENSHOT_FIELD, screenshot) {
                tracing::warn!("Screenshot not attached as a file ({}), sending it as text", e);
                payload.text("screenshot", screenshot);
            }
        }

        if !self.ocr_fields.is_empty() {
            payload.text("ocr_fields", self.ocr_fields.to_json());
        }
    }

    /// Validates and saves the registration.
    pub async fn submit(&mut self) -> Option<RegistrationReceipt> {
        let errors = validate_registration(&self.form);
        if !errors.is_empty() {
            tracing::info!("Registration form has {} invalid fields", errors.len());
            self.validation_errors = errors;
            self.state = ActionState::Idle;
            return None;
        }

        let mut payload = self.field_payload();
        if !self.customer.user_decision.is_empty() {
            payload.text("user_decision", self.customer.user_decision.as_str());
        }
        if let Some(ref id) = self.customer.search_log_id {
            payload.text("search_log_id", id.as_str());
        }
        self.append_attachments(&mut payload);

        self.state = ActionState::Loading;
        let result = self.service.save_registration(payload).await;

        if !self.liveness.is_live() {
            tracing::debug!("Registration controller unmounted, discarding response");
            return None;
        }

        match result {
            Ok(receipt) => {
                self.registration_id = receipt.id();
                self.state = ActionState::Success;
                self.saved_form.set(None);
                self.saved_ocr_fields.set(OcrFieldSet::default());
                self.validation_errors.clear();
                Some(receipt)
            }
            Err(e) => {
                tracing::error!("Registration error: {}", e);
                self.state = ActionState::Error(format!("Registration failed: {}", e));
                None
            }
        }
    }

    /// Renders the PDF report and keeps it.
    pub async fn generate_pdf(&mut self) -> Option<&PdfDocument> {
        let mut payload = self.field_payload();
        self.append_attachments(&mut payload);

        self.pdf_state = ActionState::Loading;
        self.pdf = None;

        let result = self
            .service
            .generate_pdf(payload, self.registration_id.as_deref())
            .await;

        if !self.liveness.is_live() {
            tracing::debug!("Registration controller unmounted, discarding PDF");
            return None;
        }

        match result {
            Ok(pdf) => {
                self.pdf = Some(pdf);
                self.pdf_state = ActionState::Success;
                self.pdf.as_ref()
            }
            Err(e) => {
                tracing::error!("PDF generation error: {}", e);
                self.pdf_state = ActionState::Error(format!("PDF generation failed: {}", e));
                None
            }
        }
    }

    /// Clears the form, attachments and snapshot, then goes back to search.
    pub fn reset(&mut self, phases: &mut PhaseController) {
        self.form = RegistrationForm::default();
        self.ocr_fields = OcrFieldSet::default();
        self.documents.clear();
        self.validation_errors.clear();
        self.state = ActionState::Idle;
        self.registration_id = None;
        self.pdf = None;
        self.pdf_state = ActionState::Idle;

        self.saved_form.set(None);
        self.saved_ocr_fields.set(OcrFieldSet::default());

        phases.return_to_search();
    }
}

impl FieldUpdater for RegistrationController {
    fn update_field(&mut self, field: FormField, value: &str) -> Result<(), AppError> {
        self.form.set(field, value);
        self.saved_form.set(Some(self.form.clone()));

        if self.ocr_fields.insert(field) {
            self.saved_ocr_fields.set(self.ocr_fields.clone());
        }
        self.validation_errors.remove(&field);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ApiClient;
    use crate::models::SessionUpdate;
    use crate::phase::Phase;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        storage: Arc<StorageArea>,
        previews: Arc<PreviewRegistry>,
        service: RegistrationService,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageArea::open(dir.path()).unwrap();
        let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        Fixture {
            _dir: dir,
            storage,
            previews: PreviewRegistry::new(),
            service: RegistrationService::new(api),
        }
    }

    fn session() -> SearchResultsSession {
        SearchResultsSession {
            name: "Jane".to_string(),
            surname: "Doe".to_string(),
            ..SearchResultsSession::default()
        }
    }

    fn open(fx: &Fixture) -> RegistrationController {
        RegistrationController::new(
            fx.service.clone(),
            Arc::clone(&fx.storage),
            Arc::clone(&fx.previews),
            &session(),
        )
    }

    #[test]
    fn new_form_is_seeded_from_session() {
        let fx = fixture();
        let controller = open(&fx);
        assert_eq!(controller.form().name, "Jane");
        assert_eq!(controller.form().surname, "Doe");
        assert_eq!(controller.form().suspicious, "N");
    }

    #[test]
    fn saved_snapshot_is_restored() {
        let fx = fixture();
        {
            let mut first = open(&fx);
            first.handle_change(FormField::TransactionNumber, "TX-9");
            first.update_field(FormField::DocumentNumber, "AB123").unwrap();
        }

        let restored = open(&fx);
        assert_eq!(restored.form().transaction_number, "TX-9");
        assert_eq!(restored.form().document_number, "AB123");
        assert!(restored.ocr_fields().contains(FormField::DocumentNumber));
    }

    #[test]
    fn user_edit_keeps_ocr_flag() {
        let fx = fixture();
        let mut controller = open(&fx);
        controller.update_field(FormField::Nationality, "BEL").unwrap();
        controller.handle_change(FormField::Nationality, "FRA");

        assert!(controller.ocr_fields().contains(FormField::Nationality));
        assert!(controller.is_auto_filled(FormField::Nationality));

        controller.handle_change(FormField::Nationality, "");
        assert!(!controller.is_auto_filled(FormField::Nationality));
    }

    #[tokio::test]
    async fn invalid_form_is_not_sent() {
        let fx = fixture();
        let mut controller = open(&fx);

        assert!(controller.submit().await.is_none());

        let errors = controller.validation_errors();
        assert!(errors.contains_key(&FormField::TransactionNumber));
        assert!(!errors.contains_key(&FormField::Name));
        assert_eq!(controller.state(), &ActionState::Idle);

        controller.handle_change(FormField::TransactionNumber, "TX-1");
        assert!(!controller
            .validation_errors()
            .contains_key(&FormField::TransactionNumber));
    }

    #[tokio::test]
    async fn failed_submit_reports_and_keeps_snapshot() {
        let fx = fixture();
        let mut controller = open(&fx);
        controller.handle_change(FormField::TransactionNumber, "TX-1");
        controller.handle_change(FormField::TransactionAmount, "100");
        controller.handle_change(FormField::TransactionNature, "cash");

        assert!(controller.submit().await.is_none());

        let message = controller.state().error().unwrap();
        assert!(message.starts_with("Registration failed: "));
        assert_eq!(open(&fx).form().transaction_number, "TX-1");
    }

    #[test]
    fn reset_clears_everything_and_returns_to_search() {
        let fx = fixture();
        let mut phases = PhaseController::new();
        phases.enter_registration(Some(SessionUpdate::decision("proceed_anyway")));

        let mut controller = open(&fx);
        controller.add_documents(vec![DocumentFile::new("id.jpg", "image/jpeg", vec![1])]);
        controller.update_field(FormField::Sex, "F").unwrap();
        assert_eq!(fx.previews.live_count(), 1);

        controller.reset(&mut phases);

        assert_eq!(phases.phase(), Phase::Search);
        assert!(controller.documents().is_empty());
        assert_eq!(fx.previews.live_count(), 0);
        assert!(controller.ocr_fields().is_empty());
        assert_eq!(controller.form(), &RegistrationForm::default());

        let reopened = open(&fx);
        assert_eq!(reopened.form().name, "Jane");
        assert!(reopened.ocr_fields().is_empty());
    }

    #[test]
    fn other_context_edits_are_folded_in() {
        let fx = fixture();
        let mut a = open(&fx);
        let mut b = open(&fx);

        a.handle_change(FormField::Telephone, "+32 2 123 45 67");
        b.sync_storage();

        assert_eq!(b.form().telephone, "+32 2 123 45 67");
    }

    #[test]
    fn attachments_are_numbered_and_screenshot_included() {
        let fx = fixture();
        let mut customer = session();
        customer.screenshot_url = "data:image/jpeg;base64,/9j/AA==".to_string();
        let mut controller = RegistrationController::new(
            fx.service.clone(),
            Arc::clone(&fx.storage),
            Arc::clone(&fx.previews),
            &customer,
        );
        controller.add_documents(vec![
            DocumentFile::new("front.jpg", "image/jpeg", vec![1]),
            DocumentFile::new("back.jpg", "image/jpeg", vec![2]),
        ]);
        controller.update_field(FormField::Name, "Jane").unwrap();

        let mut payload = controller.field_payload();
        controller.append_attachments(&mut payload);

        assert_eq!(payload.text_value("name"), Some("Jane"));
        assert!(payload.contains("document_0"));
        assert!(payload.contains("document_1"));
        assert!(payload.contains("screenshot_file"));
        assert_eq!(payload.text_value("screenshot"), Some("data:image/jpeg;base64,/9j/AA=="));
        assert_eq!(payload.text_value("ocr_fields"), Some(r#"["name"]"#));
    }
}
