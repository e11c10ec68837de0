//! `sfcall`: runs one operation against a remote instance.
//!
//! The binary is the composition root. It loads `sfcall.toml`, installs the
//! tracing subscriber, builds an [`HttpBackend`] on the current tokio runtime,
//! and sends a single message through a [`Dispatcher`]. Every object name is
//! decoded as a schemaless JSON document.

mod cli;
mod config;
mod output;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dispatch::{Dispatcher, Message, TypeRegistry};
use rest_client::{HttpBackend, StaticToken};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::cli::Cli;
use crate::config::CliConfig;

/// Environment variable holding the bearer/session token.
const ACCESS_TOKEN_ENV: &str = "SF_ACCESS_TOKEN";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(&cli.config)?;
    telemetry::initialise(&config.telemetry)?;

    let token = std::env::var(ACCESS_TOKEN_ENV)
        .with_context(|| format!("{ACCESS_TOKEN_ENV} is not set"))?;
    let backend = HttpBackend::new(
        &config.connection.instance_url,
        config.endpoint.api_version,
        Arc::new(StaticToken::new(token)),
        Handle::current(),
    )
    .context("failed to build the HTTP backend")?;

    let dispatcher = Dispatcher::for_name(
        &cli.operation,
        config.endpoint,
        TypeRegistry::documents(),
        Arc::new(backend),
    )?;

    let completion = dispatcher.call(message(&cli)).await;
    for warning in &completion.warnings {
        warn!(warning = %warning, "Call completed with a warning");
    }
    debug!(headers = ?completion.headers, "Merged response headers");

    let payload = completion
        .outcome
        .with_context(|| format!("{} failed", cli.operation))?;
    if let Some(text) = output::render(payload)? {
        println!("{text}");
    }
    Ok(())
}

fn message(cli: &Cli) -> Message {
    let mut message = Message::new();
    for (name, value) in &cli.headers {
        message = message.with_header(name.clone(), value.clone());
    }
    if let Some(body) = &cli.body {
        message = message.with_body(body.as_str());
    }
    message
}

#[cfg(test)]
mod tests {
    use dispatch::Body;
    use serde_json::json;

    use super::*;

    #[test]
    fn arguments_become_message_headers_and_body() {
        let cli = Cli::try_parse_from([
            "sfcall",
            "--operation",
            "upsertSObject",
            "--header",
            "sObjectName=Account",
            "--header",
            "sObjectIdValue=42",
            "--body",
            r#"{"Name":"Acme"}"#,
        ])
        .expect("arguments parse");

        let message = message(&cli);

        assert_eq!(message.header("sObjectName"), Some(&json!("Account")));
        assert_eq!(message.header("sObjectIdValue"), Some(&json!(42)));
        assert!(matches!(message.body(), Body::Text(text) if text == r#"{"Name":"Acme"}"#));
    }
}
