//! Switchboard CLI - Command-line client for the Switchboard batch endpoint

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Read;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527/";
const DEFAULT_METRICS_PATH: &str = "/metrics";

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Switchboard JSON-RPC CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC endpoint URL
    #[arg(long, env = "SWITCHBOARD_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a method and print its result
    Call {
        /// Method name (e.g., Demo.Echo)
        method: String,

        /// Params as JSON object or array
        #[arg(short, long)]
        params: Option<String>,

        /// Request id (JSON; a bare word is sent as a string)
        #[arg(long, default_value = "1")]
        id: String,
    },

    /// Send a notification (no response expected)
    Notify {
        /// Method name (e.g., Demo.Echo)
        method: String,

        /// Params as JSON object or array
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Send a batch from a JSON file ("-" reads stdin)
    Batch {
        file: String,

        /// Print the raw response instead of a table
        #[arg(long)]
        raw: bool,
    },

    /// Print the server's metrics exposition
    Metrics {
        /// Metrics path on the same host
        #[arg(long, default_value = DEFAULT_METRICS_PATH)]
        path: String,

        /// Only show lines containing this text
        #[arg(short, long)]
        filter: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Value,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Tabled)]
struct ResponseRow {
    id: String,
    status: String,
    detail: String,
}

impl From<&JsonRpcResponse> for ResponseRow {
    fn from(response: &JsonRpcResponse) -> Self {
        let (status, detail) = match (&response.error, &response.result) {
            (Some(error), _) => (
                format!("error {}", error.code),
                error.message.clone(),
            ),
            (None, Some(result)) => ("ok".to_string(), result.to_string()),
            (None, None) => ("ok".to_string(), "null".to_string()),
        };
        Self {
            id: response.id.to_string(),
            status,
            detail,
        }
    }
}

fn parse_params(params: Option<&str>) -> Result<Option<Value>> {
    params
        .map(|raw| serde_json::from_str(raw).context("Invalid JSON params"))
        .transpose()
}

fn parse_id(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn request(id: Option<Value>, method: &str, params: Option<Value>) -> Value {
    let mut item = json!({ "jsonrpc": "2.0", "method": method });
    if let Some(id) = id {
        item["id"] = id;
    }
    if let Some(params) = params {
        item["params"] = params;
    }
    item
}

/// POST a batch body; the endpoint only accepts arrays
async fn send_batch(url: &str, batch: &Value) -> Result<Value> {
    let client = reqwest::Client::new();
    let response = client
        .post(url)
        .json(batch)
        .send()
        .await
        .context("Failed to connect to server")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("HTTP {}: {}", status, body.trim());
    }

    response.json().await.context("Failed to parse response")
}

/// Responses of a batch, or the single parse-error object
fn responses(body: Value) -> Result<Vec<JsonRpcResponse>> {
    match body {
        Value::Array(_) => serde_json::from_value(body).context("Unexpected response shape"),
        other => Ok(vec![
            serde_json::from_value(other).context("Unexpected response shape")?
        ]),
    }
}

fn metrics_url(rpc_url: &str, path: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(rpc_url).context("Invalid RPC URL")?;
    url.set_path(path);
    url.set_query(None);
    Ok(url.to_string())
}

fn read_batch(file: &str) -> Result<Value> {
    let mut text = String::new();
    if file == "-" {
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
    } else {
        text = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?;
    }
    serde_json::from_str(&text).context("Batch file is not valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Call { method, params, id } => {
            let item = request(Some(parse_id(&id)), &method, parse_params(params.as_deref())?);
            let body = send_batch(&cli.rpc_url, &json!([item])).await?;

            let response = responses(body)?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("No response in batch"))?;

            if let Some(error) = response.error {
                anyhow::bail!("RPC error ({}): {}", error.code, error.message);
            }

            let result = response.result.unwrap_or(Value::Null);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Notify { method, params } => {
            let item = request(None, &method, parse_params(params.as_deref())?);
            let body = send_batch(&cli.rpc_url, &json!([item])).await?;

            match responses(body)?.first() {
                Some(JsonRpcResponse {
                    error: Some(error), ..
                }) => anyhow::bail!("RPC error ({}): {}", error.code, error.message),
                _ => println!("{}", format!("✓ Notification {} sent", method).green().bold()),
            }
        }

        Commands::Batch { file, raw } => {
            let batch = read_batch(&file)?;
            let body = send_batch(&cli.rpc_url, &batch).await?;

            if raw {
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(());
            }

            let responses = responses(body)?;
            let failed = responses.iter().filter(|r| r.error.is_some()).count();
            let rows: Vec<ResponseRow> = responses.iter().map(ResponseRow::from).collect();

            println!("{}", Table::new(rows));
            println!();
            let summary = format!("{} responses, {} failed", responses.len(), failed);
            if failed == 0 {
                println!("{}", summary.green().bold());
            } else {
                println!("{}", summary.yellow().bold());
            }
        }

        Commands::Metrics { path, filter } => {
            let url = metrics_url(&cli.rpc_url, &path)?;
            let text = reqwest::get(&url)
                .await
                .context("Failed to connect to server")?
                .error_for_status()
                .context("Metrics endpoint returned an error")?
                .text()
                .await?;

            for line in text.lines() {
                match &filter {
                    Some(needle) if !line.contains(needle.as_str()) => {}
                    _ if line.starts_with('#') => println!("{}", line.dimmed()),
                    _ => println!("{}", line),
                }
            }
        }
    }

    Ok(())
}
