//! Command-line arguments for `sfcall`.

use std::path::PathBuf;

use clap::Parser;
use serde_json::Value;

/// Runs one operation against a remote endpoint and prints the result.
#[derive(Parser, Debug)]
#[command(name = "sfcall", version)]
pub(crate) struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, value_name = "PATH", default_value = "sfcall.toml")]
    pub(crate) config: PathBuf,
    /// Operation wire name, for example `getSObject`.
    #[arg(long, value_name = "NAME")]
    pub(crate) operation: String,
    /// Message header as `name=value`; the value is read as JSON when it parses.
    #[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_header)]
    pub(crate) headers: Vec<(String, Value)>,
    /// Message body, sent as text.
    #[arg(long, value_name = "TEXT")]
    pub(crate) body: Option<String>,
}

/// Splits `name=value`, reading the value as JSON and falling back to a string.
pub(crate) fn parse_header(argument: &str) -> Result<(String, Value), String> {
    let (name, value) = argument
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{argument}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in `{argument}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((name.to_owned(), value))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("sObjectName=Account", "sObjectName", json!("Account"))]
    #[case("allOrNone=true", "allOrNone", json!(true))]
    #[case("limit=25", "limit", json!(25))]
    #[case("approval={\"actionType\":\"Submit\"}", "approval", json!({"actionType": "Submit"}))]
    #[case("sObjectQuery=SELECT Id FROM Account WHERE Name = 'a=b'", "sObjectQuery", json!("SELECT Id FROM Account WHERE Name = 'a=b'"))]
    #[case("empty=", "empty", json!(""))]
    fn headers_parse_as_json_or_text(
        #[case] argument: &str,
        #[case] name: &str,
        #[case] value: Value,
    ) {
        assert_eq!(parse_header(argument), Ok((name.to_owned(), value)));
    }

    #[rstest]
    #[case("no-separator")]
    #[case("=value")]
    fn malformed_headers_are_rejected(#[case] argument: &str) {
        assert!(parse_header(argument).is_err());
    }

    #[test]
    fn arguments_collect_repeated_headers() {
        let cli = Cli::try_parse_from([
            "sfcall",
            "--operation",
            "getSObject",
            "--header",
            "sObjectName=Account",
            "--header",
            "sObjectFields=Id,Name",
            "--body",
            "001xx",
        ])
        .expect("arguments parse");

        assert_eq!(cli.config, PathBuf::from("sfcall.toml"));
        assert_eq!(cli.operation, "getSObject");
        assert_eq!(cli.headers.len(), 2);
        assert_eq!(cli.headers[1].1, json!("Id,Name"));
        assert_eq!(cli.body.as_deref(), Some("001xx"));
    }
}
