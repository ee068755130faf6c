//! Custodia — audit-trail pipeline CLI.
//!
//! Wraps the pipeline crates behind thin subcommands:
//!
//!   custodia trace-id
//!   custodia keygen
//!   custodia mask --text "..." [--language en] [--remote]
//!   custodia record --prompt "..." --response "..." [--method M] [--model M]
//!   custodia send --file <record.json>
//!   custodia upload-all [--dry-run]
//!   custodia verify [--processed]
//!
//! Fatal errors (missing keys, bad config, rejected credentials) print a
//! clear message and exit non-zero. Degraded conditions (remote classifier
//! unreachable, throttled records) warn but exit zero when the run
//! otherwise completed.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use custodia_audit::{
    content_hash, generate_keypair, load_verifying_key, verify_record, ChainStateFile,
    RecordBuilder, SigningIdentity,
};
use custodia_contracts::config::CustodiaConfig;
use custodia_contracts::error::{CustodiaError, CustodiaResult};
use custodia_contracts::record::{AuditRecord, RequestMeta, ResponseMeta};
use custodia_contracts::redaction::TextAnalysis;
use custodia_contracts::trace::TraceId;
use custodia_deliver::{DeliveryEngine, DeliveryState, HttpLogSink, LogSink, RetryPolicy, SinkEvent};
use custodia_redact::{HttpClassifier, Redactor};
use custodia_store::RecordStore;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Custodia — tamper-evident audit trail for AI-assistant interactions.
#[derive(Parser)]
#[command(
    name = "custodia",
    about = "Tamper-evident, PII-redacted audit trail for AI-assistant interactions",
    long_about = "Generates trace identifiers, redacts PII, builds signed hash-chained\n\
                  audit records, and delivers them idempotently to a remote log sink."
)]
struct Cli {
    /// Path to the configuration file. Defaults to ./custodia.toml when
    /// present; built-in defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one fresh trace identifier on standard output.
    TraceId,
    /// One-time Ed25519 signing key generation. Refuses to overwrite.
    Keygen,
    /// Redact PII from text and print the result as JSON.
    Mask {
        /// The text to redact.
        #[arg(long)]
        text: String,
        /// Language code; defaults to the configured language.
        #[arg(long)]
        language: Option<String>,
        /// Consult the remote classifier when the language allows.
        #[arg(long)]
        remote: bool,
    },
    /// Build, sign, and persist one audit record for an exchange.
    Record {
        /// The outbound prompt text.
        #[arg(long)]
        prompt: String,
        /// The tool's response text.
        #[arg(long)]
        response: String,
        /// The invoking surface (chatgpt, gemini, copilot, ...).
        #[arg(long, default_value = "cli")]
        method: String,
        /// The model the prompt was sent to.
        #[arg(long, default_value = "unknown")]
        model: String,
    },
    /// Deliver a single serialized record file to the remote sink.
    Send {
        /// Path to a persisted record JSON file.
        #[arg(long)]
        file: PathBuf,
    },
    /// Deliver every pending record, then purge processed records past
    /// retention.
    UploadAll {
        /// Simulate and report instead of executing moves and purges.
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify hashes and signatures of persisted records.
    Verify {
        /// Verify the processed area instead of the pending area.
        #[arg(long)]
        processed: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    // Structured logging. Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("custodia: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::TraceId => run_trace_id(),
        Command::Keygen => run_keygen(&config),
        Command::Mask { text, language, remote } => run_mask(&config, &text, language, remote),
        Command::Record { prompt, response, method, model } => {
            run_record(&config, &prompt, &response, &method, &model)
        }
        Command::Send { file } => run_send(&config, &file),
        Command::UploadAll { dry_run } => run_upload_all(&config, dry_run),
        Command::Verify { processed } => run_verify(&config, processed),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("custodia: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load configuration from `--config`, `./custodia.toml`, or defaults.
///
/// An explicitly named file must exist; the implicit default path may be
/// absent.
fn load_config(path: Option<&std::path::Path>) -> CustodiaResult<CustodiaConfig> {
    match path {
        Some(path) => CustodiaConfig::from_file(path),
        None => {
            let default = std::path::Path::new("custodia.toml");
            if default.exists() {
                CustodiaConfig::from_file(default)
            } else {
                Ok(CustodiaConfig::default())
            }
        }
    }
}

// ── Subcommands ───────────────────────────────────────────────────────────────

fn run_trace_id() -> CustodiaResult<()> {
    println!("{}", TraceId::new());
    Ok(())
}

fn run_keygen(config: &CustodiaConfig) -> CustodiaResult<()> {
    let (key_path, pub_path) = generate_keypair(&config.keys.dir)?;
    println!("Generated signing key pair:");
    println!("  private: {}", key_path.display());
    println!("  public:  {}", pub_path.display());
    Ok(())
}

fn run_mask(
    config: &CustodiaConfig,
    text: &str,
    language: Option<String>,
    remote: bool,
) -> CustodiaResult<()> {
    let language = language.unwrap_or_else(|| config.redaction.language.clone());
    let redactor = build_redactor(config, remote);
    let result = redactor.mask(text, &language, remote);

    let json = serde_json::to_string_pretty(&result).map_err(|e| CustodiaError::Serialization {
        reason: format!("cannot render redaction result: {}", e),
    })?;
    println!("{}", json);
    Ok(())
}

fn run_record(
    config: &CustodiaConfig,
    prompt: &str,
    response: &str,
    method: &str,
    model: &str,
) -> CustodiaResult<()> {
    let use_remote = config.redaction.use_remote;
    let language = config.redaction.language.clone();
    let redactor = build_redactor(config, use_remote);

    let pii_detection = redactor.mask(prompt, &language, use_remote);
    let analysis = redactor.analyze(prompt, &language);
    let nlp_analysis = (analysis != TextAnalysis::default()).then_some(analysis);

    let request = RequestMeta {
        method: method.to_string(),
        model: model.to_string(),
        body_hash: content_hash(prompt.as_bytes()),
        pii_detection,
        nlp_analysis,
    };
    let response_meta = ResponseMeta {
        status: "success".to_string(),
        content_hash: content_hash(response.as_bytes()),
    };

    let builder = RecordBuilder::new(
        SigningIdentity::load(&config.keys.dir)?,
        ChainStateFile::new(&config.store.root),
    );
    let record = builder.build(TraceId::new(), request, response_meta)?;

    let store = RecordStore::open(&config.store.root)?;
    let handle = store.persist(&record)?;
    println!("{}", handle.path.display());
    Ok(())
}

fn run_send(config: &CustodiaConfig, file: &std::path::Path) -> CustodiaResult<()> {
    let contents = std::fs::read_to_string(file).map_err(|e| CustodiaError::Store {
        reason: format!("cannot read record file '{}': {}", file.display(), e),
    })?;
    let record: AuditRecord =
        serde_json::from_str(&contents).map_err(|e| CustodiaError::Serialization {
            reason: format!("record file '{}' is not valid JSON: {}", file.display(), e),
        })?;

    let sink = HttpLogSink::from_config(&config.sink).map_err(CustodiaError::Sink)?;
    let event = SinkEvent {
        timestamp_ms: record.timestamp.timestamp_millis(),
        message: contents.trim().to_string(),
    };
    let policy = RetryPolicy {
        max_attempts: config.delivery.max_attempts,
        backoff_base: config.delivery.backoff_base(),
    };

    let state = policy.run(|| {
        sink.put_events(
            &config.sink.log_group,
            &config.sink.log_stream,
            std::slice::from_ref(&event),
        )
    });
    match state {
        DeliveryState::Succeeded => {
            println!("sent {}", record.trace_id);
            Ok(())
        }
        DeliveryState::Failed { error } => Err(error.into()),
        _ => unreachable!("retry driver returned non-terminal state"),
    }
}

fn run_upload_all(config: &CustodiaConfig, dry_run: bool) -> CustodiaResult<()> {
    let store = RecordStore::open(&config.store.root)?;
    let sink = HttpLogSink::from_config(&config.sink).map_err(CustodiaError::Sink)?;
    let mut engine = DeliveryEngine::new(Box::new(sink), &config.delivery, &config.sink);
    if dry_run {
        engine = engine.dry_run();
    }

    let report = engine.deliver_all(&store)?;
    if dry_run {
        println!(
            "dry run: would deliver {}, would purge {}",
            report.skipped, report.purged
        );
    } else {
        println!(
            "delivered {}, failed {}, skipped {}, purged {}",
            report.succeeded, report.failed, report.skipped, report.purged
        );
    }
    Ok(())
}

fn run_verify(config: &CustodiaConfig, processed: bool) -> CustodiaResult<()> {
    let key = load_verifying_key(&config.keys.dir)?;
    let store = RecordStore::open(&config.store.root)?;
    let handles = if processed { store.list_processed()? } else { store.list_pending()? };

    let mut records = Vec::new();
    for handle in &handles {
        records.push(store.read_record(handle)?);
    }
    let known_hashes: HashSet<&str> = records.iter().map(|r| r.record_hash.as_str()).collect();

    let mut ok = 0usize;
    let mut failed = 0usize;
    for record in &records {
        // Per-record check: hash correctness and signature under the stated
        // prev_hash. Linkage across areas is reported, not failed, since a
        // predecessor may already have moved to the sibling area.
        match verify_record(record, record.prev_hash.as_deref(), &key) {
            Ok(()) => {
                ok += 1;
                if let Some(prev) = record.prev_hash.as_deref() {
                    if !known_hashes.contains(prev) {
                        warn!(
                            trace_id = %record.trace_id,
                            "predecessor not in this area (may be pending/processed sibling)"
                        );
                    }
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("FAIL {}: {}", record.trace_id, e);
            }
        }
    }

    println!("verified {}: {} ok, {} failed", records.len(), ok, failed);
    if failed > 0 {
        return Err(CustodiaError::Integrity {
            reason: format!("{} record(s) failed verification", failed),
        });
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Build a redactor, attaching the HTTP classifier when one is configured
/// and the caller asked for remote detection. Classifier construction
/// failure degrades to local-only with a warning — masking never depends on
/// the remote tier being available.
fn build_redactor(config: &CustodiaConfig, remote: bool) -> Redactor {
    if !remote {
        return Redactor::local_only();
    }
    match HttpClassifier::from_config(&config.classifier) {
        Ok(classifier) => Redactor::with_classifier(Box::new(classifier)),
        Err(e) => {
            warn!(error = %e, "remote classifier unavailable; masking locally");
            Redactor::local_only()
        }
    }
}
