//! Command-line driver for the compliance workflow.
//!
//! Usage:
//!   compliance-desk search --name Jane --surname Doe
//!   compliance-desk ocr passport-front.jpg passport-back.jpg --apply
//!   compliance-desk chat "Belgium ID card" --prado
//!   compliance-desk prado --issue-place "Belgium, Brussels"
//!   compliance-desk register --name Jane --surname Doe --set transactionNumber=TX-1 --pdf out.pdf

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Map;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compliance_desk::config::Config;
use compliance_desk::core::models::{FormField, MatchRecord, SessionUpdate};
use compliance_desk::core::phase::PhaseController;
use compliance_desk::documents::{DocumentFile, PreviewRegistry};
use compliance_desk::features::chat::ChatController;
use compliance_desk::features::ocr::OcrController;
use compliance_desk::features::prado::{PradoInputs, PradoLookup};
use compliance_desk::features::registration::RegistrationController;
use compliance_desk::features::search::SearchController;
use compliance_desk::features::ActionState;
use compliance_desk::field_store::StorageArea;
use compliance_desk::core::services::Services;

#[derive(Parser)]
#[command(name = "compliance-desk")]
#[command(about = "Sanctions screening, document OCR and customer registration")]
struct Args {
    /// Backend base URL
    #[arg(long, global = true, env = "COMPLIANCE_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Screen a name against the sanctions lists
    Search {
        #[arg(long)]
        name: String,
        #[arg(long)]
        surname: String,
        /// Minimum match score (0-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,
    },
    /// Extract identity data from one or two document pages
    Ocr {
        /// Front page, then optional back page
        #[arg(required = true, num_args = 1..=2)]
        files: Vec<PathBuf>,
        /// Write extracted fields into the saved registration form
        #[arg(long)]
        apply: bool,
    },
    /// Ask the document-verification assistant
    Chat {
        /// Messages, sent in order
        #[arg(required = true)]
        messages: Vec<String>,
        /// Resolve a PRADO page from the conversation afterwards
        #[arg(long)]
        prado: bool,
    },
    /// Find the PRADO page for a document
    Prado {
        /// Issue place as written on the document, e.g. "Belgium, Brussels"
        #[arg(long, default_value = "")]
        issue_place: String,
        /// Document to run through OCR first
        #[arg(long)]
        document: Option<PathBuf>,
    },
    /// Register a customer and optionally render the PDF report
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        surname: String,
        /// Field assignment, e.g. transactionAmount=1500
        #[arg(long = "set", value_parser = parse_assignment)]
        fields: Vec<(FormField, String)>,
        /// Identity document to attach (repeatable)
        #[arg(long = "document")]
        documents: Vec<PathBuf>,
        /// Fill the form from the attached documents before submitting
        #[arg(long)]
        ocr: bool,
        /// Decision taken on the sanctions results
        #[arg(long, default_value = "proceed_anyway")]
        decision: String,
        #[arg(long)]
        search_log_id: Option<String>,
        /// Where to write the PDF report
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
}

fn parse_assignment(raw: &str) -> Result<(FormField, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", raw))?;
    let field = field.trim().parse::<FormField>().map_err(|e| e.to_string())?;
    Ok((field, value.to_string()))
}

async fn load_documents(paths: &[PathBuf]) -> anyhow::Result<Vec<DocumentFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(DocumentFile::from_path(path).await?);
    }
    Ok(files)
}

fn print_match(index: usize, record: &MatchRecord) {
    let score = record
        .score
        .map(|s| format!("{:.1}", s))
        .unwrap_or_else(|| "N/A".to_string());
    println!(
        "{:>2}. {} {} [{}] score {} risk {}",
        index + 1,
        record.display_name(),
        record.display_surname(),
        record.display_country(),
        score,
        record.risk().as_str()
    );
    if !record.aliases.is_empty() {
        println!("    aliases: {}", record.aliases.join(", "));
    }
    if let Some(ref list) = record.sanction_list {
        println!("    list: {}", list);
    }
}

fn report(state: &ActionState) -> anyhow::Result<()> {
    match state.error() {
        Some(message) => anyhow::bail!("{}", message),
        None => Ok(()),
    }
}

/// Entry point of the CLI.
///
/// Initializes logging, loads configuration and runs one subcommand.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compliance_desk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(url) = args.api_url.filter(|url| !url.trim().is_empty()) {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("--api-url must start with http:// or https://");
        }
        config.api_base_url = url.trim_end_matches('/').to_string();
    }
    tracing::info!("Configuration loaded successfully");

    let services = Services::from_config(&config).context("Failed to create API client")?;

    match args.command {
        Command::Search {
            name,
            surname,
            threshold,
        } => {
            let mut search = SearchController::with_defaults(
                services.sanctions.clone(),
                threshold.unwrap_or(config.match_threshold),
                config.top_n,
            );
            search.name = name;
            search.surname = surname;

            let mut phases = PhaseController::new();
            if let Some(outcome) = search.search().await {
                phases.enter_results(SessionUpdate::from(outcome));
            }
            report(search.state())?;

            let session = phases.session();
            println!(
                "Search {} at {}: {} match(es)",
                session.search_log_id.as_deref().unwrap_or("-"),
                session.timestamp,
                session.matches.len()
            );
            for (i, record) in session.matches.iter().enumerate() {
                print_match(i, record);
            }
        }

        Command::Ocr { files, apply } => {
            let documents = load_documents(&files).await?;
            let mut ocr = OcrController::new(services.ocr.clone());

            if apply {
                let storage = StorageArea::open(&config.storage_dir)?;
                let mut registration = RegistrationController::new(
                    services.registration.clone(),
                    storage,
                    PreviewRegistry::new(),
                    &Default::default(),
                );
                ocr.process_documents(&documents, None, Some(&mut registration))
                    .await;
            } else {
                ocr.process_documents(&documents, None, None).await;
            }

            if let Some(status) = ocr.status() {
                println!("{}", status);
            }
            for line in ocr.extracted_lines() {
                println!("  {}", line);
            }
            if ocr.extracted_data().is_none() && !ocr.ocr_text().is_empty() {
                println!("--- raw text ---\n{}", ocr.ocr_text());
            }
            report(ocr.state())?;
        }

        Command::Chat { messages, prado } => {
            let mut chat = ChatController::new(services.chat.clone(), Map::new());
            for message in &messages {
                chat.send_message(message).await;
            }
            for message in chat.messages() {
                println!("[{:?}] {}", message.sender, message.text);
            }

            if prado {
                let lookup =
                    PradoLookup::with_fallback(services.prado.clone(), &config.prado_fallback_url);
                let resolution = lookup
                    .resolve(PradoInputs {
                        chat_context: chat.prado_context(),
                        ..PradoInputs::default()
                    })
                    .await;
                println!("PRADO ({}): {}", resolution.source, resolution.url);
            }
        }

        Command::Prado {
            issue_place,
            document,
        } => {
            let mut ocr = OcrController::new(services.ocr.clone());
            if let Some(path) = document {
                let documents = load_documents(&[path]).await?;
                ocr.process_documents(&documents, None, None).await;
                if let Some(status) = ocr.status() {
                    println!("{}", status);
                }
            }

            let lookup =
                PradoLookup::with_fallback(services.prado.clone(), &config.prado_fallback_url);
            let resolution = lookup
                .resolve(PradoInputs {
                    chat_context: None,
                    extracted: ocr.extracted_data(),
                    issue_place: &issue_place,
                })
                .await;
            println!("PRADO ({}): {}", resolution.source, resolution.url);
        }

        Command::Register {
            name,
            surname,
            fields,
            documents,
            ocr,
            decision,
            search_log_id,
            pdf,
        } => {
            let mut phases = PhaseController::new();
            phases.enter_results(SessionUpdate {
                name: Some(name),
                surname: Some(surname),
                search_log_id,
                ..SessionUpdate::default()
            });
            phases.enter_registration(Some(SessionUpdate::decision(decision)));

            let storage = StorageArea::open(&config.storage_dir)?;
            let mut registration = RegistrationController::new(
                services.registration.clone(),
                storage,
                PreviewRegistry::new(),
                phases.session(),
            );
            registration.add_documents(load_documents(&documents).await?);

            if ocr {
                let mut extractor = OcrController::new(services.ocr.clone());
                let files = registration.document_files();
                extractor
                    .process_documents(&files, None, Some(&mut registration))
                    .await;
                if let Some(status) = extractor.status() {
                    println!("{}", status);
                }
            }

            for (field, value) in fields {
                registration.handle_change(field, value);
            }

            match registration.submit().await {
                Some(_) => println!(
                    "Registration saved: {}",
                    registration.registration_id().unwrap_or("(no id returned)")
                ),
                None if !registration.validation_errors().is_empty() => {
                    for (field, message) in registration.validation_errors() {
                        println!("  {}: {}", field, message);
                    }
                    anyhow::bail!("Registration form is incomplete");
                }
                None => report(registration.state())?,
            }

            if let Some(path) = pdf {
                let written = match registration.generate_pdf().await {
                    Some(document) => {
                        tokio::fs::write(&path, &document.bytes)
                            .await
                            .with_context(|| format!("Writing {}", path.display()))?;
                        document.len()
                    }
                    None => return report(registration.pdf_state()),
                };
                println!("PDF report written to {} ({} bytes)", path.display(), written);
            }

            registration.reset(&mut phases);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_outside_percent_range_is_rejected() {
        let parsed = Args::try_parse_from([
            "compliance-desk", "search", "--name", "Jane", "--surname", "Doe", "--threshold", "200",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn threshold_bounds_are_accepted() {
        for value in ["0", "100"] {
            let args = Args::try_parse_from([
                "compliance-desk", "search", "--name", "Jane", "--surname", "Doe", "--threshold", value,
            ])
            .unwrap();
            match args.command {
                Command::Search { threshold, .. } => {
                    assert_eq!(threshold, Some(value.parse().unwrap()))
                }
                _ => panic!("expected search"),
            }
        }
    }

    #[test]
    fn api_url_flag_is_global() {
        let args = Args::try_parse_from([
            "compliance-desk", "prado", "--api-url", "http://backend:9000",
        ])
        .unwrap();
        assert_eq!(args.api_url.as_deref(), Some("http://backend:9000"));
    }

    #[test]
    fn field_assignments_parse_wire_names() {
        let (field, value) = parse_assignment("transactionAmount=1500").unwrap();
        assert_eq!(field, FormField::TransactionAmount);
        assert_eq!(value, "1500");
        assert!(parse_assignment("transactionAmount").is_err());
        assert!(parse_assignment("shoeSize=42").is_err());
    }
}
