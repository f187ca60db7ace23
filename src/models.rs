use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

// ============ Sanctions Screening ============

/// A sanctions hit normalized from whatever shape the backend returned.
///
/// Absent values stay `None`; placeholders are applied only by the `display_*`
/// accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub country: Option<String>,
    /// Similarity score on a 0-100 scale.
    pub score: Option<f64>,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub nationality: Option<String>,
    pub sanction_type: Option<String>,
    pub sanction_list: Option<String>,
    pub sanction_date: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub addresses: Vec<String>,
    pub aliases: Vec<String>,
    pub additional_info: Option<String>,
    /// Backend payload this record was derived from.
    pub original: Value,
}

impl MatchRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    pub fn display_surname(&self) -> &str {
        self.surname.as_deref().unwrap_or("")
    }

    pub fn display_country(&self) -> &str {
        self.country.as_deref().unwrap_or("N/A")
    }

    /// Renders an optional attribute the way result tables do.
    pub fn display_or_na(value: &Option<String>) -> &str {
        value.as_deref().unwrap_or("N/A")
    }

    pub fn risk(&self) -> RiskLevel {
        RiskLevel::from_score(self.score)
    }
}

/// Coarse risk bucket derived from a match score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    Unknown,
}

impl RiskLevel {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            Some(s) if s.is_nan() => RiskLevel::Unknown,
            Some(s) if s >= 80.0 => RiskLevel::High,
            Some(s) if s >= 50.0 => RiskLevel::Medium,
            Some(_) => RiskLevel::Low,
            None => RiskLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
            RiskLevel::Unknown => "unknown",
        }
    }
}

/// Raw `/verify_identity` payload. `matches` is left untyped because the
/// backend has shipped arrays, single objects and JSON strings over time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyIdentityResponse {
    #[serde(default)]
    pub matches: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, rename = "searchLogId")]
    pub search_log_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Query parameters for a sanctions screening request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub name: String,
    pub surname: String,
    /// Minimum match score, 0-100.
    pub threshold: u8,
    pub top_n: u32,
}

/// Data handed from the search phase to the results and registration phases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultsSession {
    pub matches: Vec<MatchRecord>,
    pub timestamp: String,
    pub search_log_id: Option<String>,
    pub user_decision: String,
    pub name: String,
    pub surname: String,
    pub screenshot_url: String,
}

/// A partial session; `None` means "not provided".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub matches: Option<Vec<MatchRecord>>,
    pub timestamp: Option<String>,
    pub search_log_id: Option<String>,
    pub user_decision: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub screenshot_url: Option<String>,
}

impl SessionUpdate {
    pub fn decision(user_decision: impl Into<String>) -> Self {
        Self {
            user_decision: Some(user_decision.into()),
            ..Self::default()
        }
    }

    /// Overlays the provided fields onto `session`.
    pub fn apply_to(self, session: &mut SearchResultsSession) {
        if let Some(matches) = self.matches {
            session.matches = matches;
        }
        if let Some(timestamp) = self.timestamp {
            session.timestamp = timestamp;
        }
        if let Some(id) = self.search_log_id {
            session.search_log_id = Some(id);
        }
        if let Some(decision) = self.user_decision {
            session.user_decision = decision;
        }
        if let Some(name) = self.name {
            session.name = name;
        }
        if let Some(surname) = self.surname {
            session.surname = surname;
        }
        if let Some(url) = self.screenshot_url {
            session.screenshot_url = url;
        }
    }
}

// ============ Registration ============

/// Every field of the registration form, serialized under its wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    Name,
    Surname,
    TransactionNumber,
    TransactionAmount,
    EuroEquivalent,
    Address,
    DocumentNumber,
    DocumentIssuePlace,
    DocumentIssueDate,
    DocumentValidity,
    ExpiryDate,
    BirthDate,
    BirthPlace,
    Nationality,
    Sex,
    Telephone,
    Email,
    SalaryOrigin,
    TransactionIntent,
    TransactionNature,
    Suspicious,
    AgentObservations,
    DocNotes,
}

impl FormField {
    pub const ALL: [FormField; 23] = [
        FormField::Name,
        FormField::Surname,
        FormField::TransactionNumber,
        FormField::TransactionAmount,
        FormField::EuroEquivalent,
        FormField::Address,
        FormField::DocumentNumber,
        FormField::DocumentIssuePlace,
        FormField::DocumentIssueDate,
        FormField::DocumentValidity,
        FormField::ExpiryDate,
        FormField::BirthDate,
        FormField::BirthPlace,
        FormField::Nationality,
        FormField::Sex,
        FormField::Telephone,
        FormField::Email,
        FormField::SalaryOrigin,
        FormField::TransactionIntent,
        FormField::TransactionNature,
        FormField::Suspicious,
        FormField::AgentObservations,
        FormField::DocNotes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormField::Name => "name",
            FormField::Surname => "surname",
            FormField::TransactionNumber => "transactionNumber",
            FormField::TransactionAmount => "transactionAmount",
            FormField::EuroEquivalent => "euroEquivalent",
            FormField::Address => "address",
            FormField::DocumentNumber => "documentNumber",
            FormField::DocumentIssuePlace => "documentIssuePlace",
            FormField::DocumentIssueDate => "documentIssueDate",
            FormField::DocumentValidity => "documentValidity",
            FormField::ExpiryDate => "expiryDate",
            FormField::BirthDate => "birthDate",
            FormField::BirthPlace => "birthPlace",
            FormField::Nationality => "nationality",
            FormField::Sex => "sex",
            FormField::Telephone => "telephone",
            FormField::Email => "email",
            FormField::SalaryOrigin => "salaryOrigin",
            FormField::TransactionIntent => "transactionIntent",
            FormField::TransactionNature => "transactionNature",
            FormField::Suspicious => "suspicious",
            FormField::AgentObservations => "agentObservations",
            FormField::DocNotes => "docNotes",
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown form field '{}'", s)))
    }
}

/// In-progress registration form. All values are kept as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationForm {
    pub name: String,
    pub surname: String,
    pub transaction_number: String,
    pub transaction_amount: String,
    pub euro_equivalent: String,
    pub address: String,
    pub document_number: String,
    pub document_issue_place: String,
    pub document_issue_date: String,
    pub document_validity: String,
    pub expiry_date: String,
    pub birth_date: String,
    pub birth_place: String,
    pub nationality: String,
    pub sex: String,
    pub telephone: String,
    pub email: String,
    pub salary_origin: String,
    pub transaction_intent: String,
    pub transaction_nature: String,
    pub suspicious: String,
    pub agent_observations: String,
    pub doc_notes: String,
}

impl Default for RegistrationForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            surname: String::new(),
            transaction_number: String::new(),
            transaction_amount: String::new(),
            euro_equivalent: String::new(),
            address: String::new(),
            document_number: String::new(),
            document_issue_place: String::new(),
            document_issue_date: String::new(),
            document_validity: String::new(),
            expiry_date: String::new(),
            birth_date: String::new(),
            birth_place: String::new(),
            nationality: String::new(),
            sex: String::new(),
            telephone: String::new(),
            email: String::new(),
            salary_origin: String::new(),
            transaction_intent: String::new(),
            transaction_nature: String::new(),
            suspicious: "N".to_string(),
            agent_observations: String::new(),
            doc_notes: String::new(),
        }
    }
}

impl RegistrationForm {
    /// Blank form seeded with the searched identity.
    pub fn for_customer(name: &str, surname: &str) -> Self {
        Self {
            name: name.to_string(),
            surname: surname.to_string(),
            ..Self::default()
        }
    }

    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::Name => &self.name,
            FormField::Surname => &self.surname,
            FormField::TransactionNumber => &self.transaction_number,
            FormField::TransactionAmount => &self.transaction_amount,
            FormField::EuroEquivalent => &self.euro_equivalent,
            FormField::Address => &self.address,
            FormField::DocumentNumber => &self.document_number,
            FormField::DocumentIssuePlace => &self.document_issue_place,
            FormField::DocumentIssueDate => &self.document_issue_date,
            FormField::DocumentValidity => &self.document_validity,
            FormField::ExpiryDate => &self.expiry_date,
            FormField::BirthDate => &self.birth_date,
            FormField::BirthPlace => &self.birth_place,
            FormField::Nationality => &self.nationality,
            FormField::Sex => &self.sex,
            FormField::Telephone => &self.telephone,
            FormField::Email => &self.email,
            FormField::SalaryOrigin => &self.salary_origin,
            FormField::TransactionIntent => &self.transaction_intent,
            FormField::TransactionNature => &self.transaction_nature,
            FormField::Suspicious => &self.suspicious,
            FormField::AgentObservations => &self.agent_observations,
            FormField::DocNotes => &self.doc_notes,
        }
    }

    pub fn set(&mut self, field: FormField, value: impl Into<String>) {
        let slot = match field {
            FormField::Name => &mut self.name,
            FormField::Surname => &mut self.surname,
            FormField::TransactionNumber => &mut self.transaction_number,
            FormField::TransactionAmount => &mut self.transaction_amount,
            FormField::EuroEquivalent => &mut self.euro_equivalent,
            FormField::Address => &mut self.address,
            FormField::DocumentNumber => &mut self.document_number,
            FormField::DocumentIssuePlace => &mut self.document_issue_place,
            FormField::DocumentIssueDate => &mut self.document_issue_date,
            FormField::DocumentValidity => &mut self.document_validity,
            FormField::ExpiryDate => &mut self.expiry_date,
            FormField::BirthDate => &mut self.birth_date,
            FormField::BirthPlace => &mut self.birth_place,
            FormField::Nationality => &mut self.nationality,
            FormField::Sex => &mut self.sex,
            FormField::Telephone => &mut self.telephone,
            FormField::Email => &mut self.email,
            FormField::SalaryOrigin => &mut self.salary_origin,
            FormField::TransactionIntent => &mut self.transaction_intent,
            FormField::TransactionNature => &mut self.transaction_nature,
            FormField::Suspicious => &mut self.suspicious,
            FormField::AgentObservations => &mut self.agent_observations,
            FormField::DocNotes => &mut self.doc_notes,
        };
        *slot = value.into();
    }

    /// `(field, value)` pairs in form order.
    pub fn entries(&self) -> impl Iterator<Item = (FormField, &str)> + '_ {
        FormField::ALL.iter().map(move |field| (*field, self.get(*field)))
    }
}

/// `/save_registration` answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationReceipt {
    #[serde(default)]
    pub registration_id: Option<Value>,
}

impl RegistrationReceipt {
    /// The id as text; the backend sends an integer today.
    pub fn id(&self) -> Option<String> {
        match &self.registration_id {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A rendered PDF report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    pub bytes: Vec<u8>,
}

impl PdfDocument {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ============ OCR ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStatus {
    Success,
    PartialSuccess,
    #[serde(other)]
    Error,
}

/// `/ocr_and_interpret` answer.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrResponse {
    pub status: OcrStatus,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub ocr_text: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub ai_note: Option<String>,
}

// ============ AI Chat & PRADO ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    System,
    User,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(Sender::Ai, text)
    }

    /// Apology shown in place of an answer.
    pub fn failure(reason: &str) -> Self {
        let reason = if reason.trim().is_empty() {
            "Please try again later."
        } else {
            reason
        };
        Self::ai(format!("Sorry, I couldn't process your request. {}", reason))
    }
}

/// Lookup hints the assistant attaches to an answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PradoContext {
    #[serde(default, rename = "suggestPrado")]
    pub suggest_prado: bool,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub country_info: Option<Value>,
}

/// `/chat_with_ai` answer.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "pradoContext")]
    pub prado_context: Option<PradoContext>,
}

impl ChatReply {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}

/// `/prepare_prado_url` answer.
#[derive(Debug, Clone, Deserialize)]
pub struct PradoUrlResponse {
    #[serde(default)]
    pub url: Option<String>,
}

// ============ Status Reporting ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A banner message with its severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusLine {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            text: text.into(),
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.level {
            StatusLevel::Info => "..",
            StatusLevel::Success => "ok",
            StatusLevel::Warning => "!!",
            StatusLevel::Error => "xx",
        };
        write!(f, "[{}] {}", marker, self.text)
    }
}
