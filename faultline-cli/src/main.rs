//! faultline-cli: producer and inspection tool for a running Faultline relay
//!
//! Talks to the operator HTTP API. Records are published to the stream topic as
//! raw `|`-delimited lines, exactly as an instrumented application would send them.
//!
//! # Subcommands
//! - `publish <RAW>`                  publish a raw record verbatim
//! - `throw [--kind <KIND>] [...]`    publish a synthetic e-commerce exception
//! - `summary <KIND>`                 show the latest cached summary for a kind
//! - `status`                         show server health

use clap::{Parser, Subcommand};
use faultline_core::{encode, ExceptionEvent};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

/// Exception kinds thrown by the demo storefront.
pub const EXCEPTION_CATALOGUE: &[&str] = &[
    "InvalidShippingAddress",
    "InsufficientInventory",
    "InvalidCouponCode",
    "PaymentFailed",
    "ProductNotAvailable",
    "InvalidCreditCardNumber",
    "OrderNotFound",
    "DuplicateEmailAddress",
    "InvalidShippingMethod",
    "CartEmpty",
    "InvalidProductVariant",
    "InsufficientFunds",
    "AccountLocked",
    "InvalidPromoCode",
    "InvalidLoginCredentials",
    "InvalidReturnRequest",
    "OrderCancellationFailed",
    "InvalidSecurityCode",
    "ProductOutOfStock",
    "AccountCreationFailed",
    "InvalidDeliveryAddress",
    "OrderModificationFailed",
    "InvalidPaymentMethod",
    "ProductNotFound",
    "DuplicateOrder",
    "AccountDeletionFailed",
    "InvalidEmailAddress",
    "InvalidOrderStatus",
    "PaymentAuthorizationFailed",
    "InvalidPhoneNumber",
    "InvalidShippingOption",
    "AccountSuspensionFailed",
    "InvalidOrderID",
    "InvalidCategory",
    "AccountReactivationFailed",
    "InvalidProductID",
    "AccountUpdateFailed",
    "InvalidOrderDetails",
    "AccountVerificationFailed",
    "InvalidProductName",
    "AccountLoginFailed",
    "InvalidOrderQuantity",
    "AccountLogoutFailed",
    "InvalidOrderDate",
    "AccountPasswordResetFailed",
    "InvalidOrderTotal",
    "AccountCreationLimitExceeded",
    "InvalidOrderStatusUpdate",
    "AccountDeactivationFailed",
    "InvalidOrderPayment",
    "AccountSuspensionLimitExceeded",
    "InvalidOrderShipping",
    "AccountReactivationLimitExceeded",
    "InvalidOrderCancellation",
    "AccountUpdateLimitExceeded",
    "InvalidOrderModification",
    "AccountVerificationLimitExceeded",
    "InvalidOrderReturn",
    "AccountDeletionLimitExceeded",
];

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "faultline-cli",
    version,
    about = "Publish exception records to Faultline and inspect cached summaries"
)]
struct Cli {
    /// Faultline HTTP server URL (overrides FAULTLINE_HTTP_URL env var)
    #[arg(long, env = "FAULTLINE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Publish a raw record (`date|kind|file|method|line`) verbatim
    Publish {
        /// The record text; malformed records are published too
        raw: String,
    },

    /// Publish a synthetic exception stamped with the current UTC time
    Throw {
        /// Exception kind; picked at random from the catalogue when omitted
        #[arg(long)]
        kind: Option<String>,

        #[arg(long, default_value = "Storefront.java")]
        file: String,

        #[arg(long, default_value = "handleRequest")]
        method: String,

        /// Line number; random when omitted
        #[arg(long)]
        line: Option<u32>,
    },

    /// Show the latest cached summary for an exception kind
    Summary {
        kind: String,
    },

    /// Show Faultline server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Response body of POST /publish
#[derive(Debug, Deserialize)]
pub struct PublishResponse {
    pub published: bool,
    pub topic: String,
    pub offset: i64,
    pub well_formed: bool,
}

/// Response body of GET /summaries/{kind}
#[derive(Debug, Deserialize)]
pub struct SummaryResponse {
    pub kind: String,
    pub created_at: String,
    pub source_file: String,
    pub source_method: String,
    pub source_line: String,
    pub summary_text: String,
}

// ============================================================================
// Record construction
// ============================================================================

/// Build a five-field record for a synthetic exception.
pub fn synthetic_record<R: Rng>(
    rng: &mut R,
    kind: Option<&str>,
    file: &str,
    method: &str,
    line: Option<u32>,
) -> String {
    let kind = match kind {
        Some(k) => k.to_string(),
        None => EXCEPTION_CATALOGUE
            .choose(rng)
            .copied()
            .unwrap_or("PaymentFailed")
            .to_string(),
    };
    let line = line.unwrap_or_else(|| rng.gen_range(1..=500));

    encode(&ExceptionEvent {
        occurred_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        kind,
        source_file: file.to_string(),
        source_method: method.to_string(),
        source_line: line.to_string(),
    })
}

/// Human-readable summary block for `summary`.
pub fn format_summary(summary: &SummaryResponse) -> String {
    format!(
        "{}\n  cached from: {} at {}:{} ({})\n\n{}",
        summary.kind,
        summary.created_at,
        summary.source_file,
        summary.source_line,
        summary.source_method,
        summary.summary_text
    )
}

// ============================================================================
// Commands
// ============================================================================

fn http_client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?)
}

fn do_publish(server: &str, raw: &str) -> anyhow::Result<()> {
    let url = format!("{}/publish", server);
    let resp = http_client()?
        .post(&url)
        .json(&serde_json::json!({ "raw": raw }))
        .send()?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        anyhow::bail!("publish failed (HTTP {}): {}", status, body);
    }

    let published: PublishResponse = resp.json()?;
    if !published.published {
        anyhow::bail!("server did not publish the record");
    }
    println!(
        "Published to {} at offset {}: {}",
        published.topic, published.offset, raw
    );
    if !published.well_formed {
        eprintln!("faultline-cli: warning: record is malformed and will be skipped by the relay");
    }
    Ok(())
}

/// `<server>/summaries/<kind>` with the kind percent-encoded as one path segment.
pub fn summary_url(server: &str, kind: &str) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(server)?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("server URL cannot take a path: {}", server))?
        .pop_if_empty()
        .push("summaries")
        .push(kind);
    Ok(url)
}

fn do_summary(server: &str, kind: &str) -> anyhow::Result<()> {
    let url = summary_url(server, kind)?;
    let resp = http_client()?.get(url).send()?;

    match resp.status() {
        s if s.is_success() => {
            let summary: SummaryResponse = resp.json()?;
            println!("{}", format_summary(&summary));
            Ok(())
        }
        reqwest::StatusCode::NOT_FOUND => {
            println!("No summary cached for {}", kind);
            Ok(())
        }
        s => {
            let body = resp.text().unwrap_or_default();
            anyhow::bail!("summary lookup failed (HTTP {}): {}", s, body)
        }
    }
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = http_client()?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Faultline server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:          {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:            {}", body["store"].as_str().unwrap_or("?"));
            println!("Topic:            {}", body["topic"].as_str().unwrap_or("?"));
            println!("PostgreSQL:       {}", body["postgresql"].as_str().unwrap_or("n/a"));
            println!("Clients:          {}", body["clients"].as_u64().unwrap_or(0));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("faultline-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("faultline-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Publish { raw } => do_publish(&server, &raw),
        Commands::Throw {
            kind,
            file,
            method,
            line,
        } => {
            let raw = synthetic_record(&mut rand::thread_rng(), kind.as_deref(), &file, &method, line);
            do_publish(&server, &raw)
        }
        Commands::Summary { kind } => do_summary(&server, &kind),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("faultline-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
