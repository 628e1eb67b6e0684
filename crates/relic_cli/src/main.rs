//! Command-line client for the Relic admin backup API.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use relic_core::DEFAULT_CLI_SERVER_URL;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "relic-admin", about = "Relic backup administration", version)]
struct Cli {
    /// Server URL (can also be set via RELIC_SERVER env var)
    #[arg(short, long, env = "RELIC_SERVER")]
    server: Option<String>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    json: bool,

    /// Request timeout in seconds
    #[arg(short = 't', long, default_value = "60")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// List stored backups, newest first
    List {
        #[arg(short, long, default_value = "25")]
        limit: usize,
        #[arg(short, long, default_value = "0")]
        offset: usize,
    },
    /// Take a manual backup now
    Create,
    /// Show which tier each backup falls into without deleting anything
    Retention,
    /// Run a retention pass on the server
    Cleanup,
    /// Download one backup file
    Download {
        filename: String,
        /// Output path (defaults to the backup filename)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn error_message_for_response(status: reqwest::StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return value
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or(body)
            .to_string();
    }

    body.to_string()
}

async fn ensure_success_or_exit(res: reqwest::Response, action: &str) -> reqwest::Response {
    let status = res.status();
    if status.is_success() {
        return res;
    }

    let body = match res.text().await {
        Ok(body) => body,
        Err(err) => format!("failed to read error response body: {}", err),
    };
    let message = error_message_for_response(status, &body);
    eprintln!("{} failed ({}): {}", action, status, message);
    std::process::exit(1);
}

fn api_url(server: &str, segments: &[&str]) -> Result<reqwest::Url, String> {
    let mut url = reqwest::Url::parse(server)
        .map_err(|err| format!("Invalid server URL '{}': {}", server, err))?;
    let mut path = url
        .path_segments_mut()
        .map_err(|_| "Server URL cannot be used as an API base".to_string())?;
    path.pop_if_empty();
    for segment in segments {
        path.push(segment);
    }
    drop(path);
    Ok(url)
}

fn api_url_or_exit(server: &str, action: &str, segments: &[&str]) -> reqwest::Url {
    match api_url(server, segments) {
        Ok(url) => url,
        Err(message) => {
            eprintln!("{} failed: {}", action, message);
            std::process::exit(1);
        }
    }
}

fn exit_with(action: &str, message: String) -> ! {
    eprintln!("{} failed: {}", action, message);
    std::process::exit(1);
}

fn resolve_server(server: Option<String>) -> String {
    let server = server
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_CLI_SERVER_URL.to_string());
    server.trim_end_matches('/').to_string()
}

fn pretty(value: &Value) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|err| format!("response encoding error: {}", err))
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

fn field_str<'a>(item: &'a Value, field: &str, index: usize) -> Result<&'a str, String> {
    item.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("response item {} missing '{}' field", index, field))
}

fn format_list_output(body: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(body);
    }
    let backups = body
        .get("backups")
        .and_then(Value::as_array)
        .ok_or_else(|| "response missing 'backups' field".to_string())?;

    let mut rows = Vec::with_capacity(backups.len() + 1);
    for (index, backup) in backups.iter().enumerate() {
        let filename = field_str(backup, "filename", index)?;
        let timestamp = field_str(backup, "timestamp", index)?;
        let size = backup.get("size_bytes").and_then(Value::as_u64).unwrap_or(0);
        rows.push(format!("{:<42} {:>10}  {}", filename, human_size(size), timestamp));
    }
    let total = body.get("total").and_then(Value::as_u64).unwrap_or(0);
    let total_size = body
        .get("total_size_bytes")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    rows.push(format!(
        "{} of {} backups shown, {} total",
        backups.len(),
        total,
        human_size(total_size)
    ));
    Ok(rows.join("\n"))
}

fn format_create_output(body: &Value, json: bool) -> Result<String, String> {
    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("no message");
    if !success {
        return Err(message.to_string());
    }
    if json {
        return pretty(body);
    }
    match body.get("key").and_then(Value::as_str) {
        Some(key) => Ok(format!("{}: {}", message, key)),
        None => Ok(message.to_string()),
    }
}

fn format_retention_output(body: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(body);
    }
    let backups = body
        .get("backups")
        .and_then(Value::as_array)
        .ok_or_else(|| "response missing 'backups' field".to_string())?;

    let mut rows = Vec::with_capacity(backups.len() + 1);
    for (index, backup) in backups.iter().enumerate() {
        let tier = field_str(backup, "tier", index)?;
        let filename = field_str(backup, "filename", index)?;
        rows.push(format!("{:<8} {}", tier, filename));
    }
    let summary = body.get("summary").cloned().unwrap_or(Value::Null);
    let count = |name: &str| summary.get(name).and_then(Value::as_u64).unwrap_or(0);
    rows.push(format!(
        "{} monthly, {} weekly, {} daily, {} expired",
        count("monthly"),
        count("weekly"),
        count("daily"),
        count("expired")
    ));
    Ok(rows.join("\n"))
}

fn format_cleanup_output(body: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(body);
    }
    let number = |name: &str| body.get(name).and_then(Value::as_u64).unwrap_or(0);
    let failures = body
        .get("failures")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    let mut output = format!(
        "Deleted {} backups ({} freed), retained {}",
        number("deleted"),
        human_size(number("deleted_bytes")),
        number("retained")
    );
    if failures > 0 {
        output.push_str(&format!(", {} deletes failed", failures));
    }
    Ok(output)
}

fn download_path(filename: &str, output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| PathBuf::from(filename))
}

fn write_download(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

async fn get_json(
    client: &reqwest::Client,
    server: &str,
    action: &str,
    segments: &[&str],
    query: &[(&str, String)],
) -> Result<Value, reqwest::Error> {
    let endpoint = api_url_or_exit(server, action, segments);
    let res = client.get(endpoint).query(query).send().await?;
    let res = ensure_success_or_exit(res, action).await;
    res.json().await
}

async fn post_json(
    client: &reqwest::Client,
    server: &str,
    action: &str,
    segments: &[&str],
) -> Result<Value, reqwest::Error> {
    let endpoint = api_url_or_exit(server, action, segments);
    let res = client.post(endpoint).send().await?;
    let res = ensure_success_or_exit(res, action).await;
    res.json().await
}

fn print_or_exit(action: &str, rendered: Result<String, String>) {
    match rendered {
        Ok(output) if output.is_empty() => {}
        Ok(output) => println!("{}", output),
        Err(message) => exit_with(action, message),
    }
}

const BACKUPS: [&str; 4] = ["api", "v1", "admin", "backups"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli {
        server,
        json,
        timeout,
        command,
    } = Cli::parse();

    if let Commands::Completions { shell } = &command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout))
        .build()?;
    let server = resolve_server(server);

    match command {
        Commands::Completions { .. } => {}
        Commands::List { limit, offset } => {
            let query = [("limit", limit.to_string()), ("offset", offset.to_string())];
            let body = get_json(&client, &server, "List", &BACKUPS, &query).await?;
            print_or_exit("List", format_list_output(&body, json));
        }
        Commands::Create => {
            let body = post_json(&client, &server, "Create", &BACKUPS).await?;
            print_or_exit("Create", format_create_output(&body, json));
        }
        Commands::Retention => {
            let segments = [&BACKUPS[..], &["retention"]].concat();
            let body = get_json(&client, &server, "Retention", &segments, &[]).await?;
            print_or_exit("Retention", format_retention_output(&body, json));
        }
        Commands::Cleanup => {
            let segments = [&BACKUPS[..], &["cleanup"]].concat();
            let body = post_json(&client, &server, "Cleanup", &segments).await?;
            print_or_exit("Cleanup", format_cleanup_output(&body, json));
        }
        Commands::Download { filename, output } => {
            let segments = [&BACKUPS[..], &[filename.as_str(), "download"]].concat();
            let endpoint = api_url_or_exit(&server, "Download", &segments);
            let res = client.get(endpoint).send().await?;
            let res = ensure_success_or_exit(res, "Download").await;
            let bytes = res.bytes().await?;

            let path = download_path(&filename, output);
            if let Err(err) = write_download(&path, &bytes) {
                exit_with("Download", format!("{}: {}", path.display(), err));
            }
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "path": path.display().to_string(), "bytes": bytes.len() })
                );
            } else {
                println!("Saved {} ({})", path.display(), human_size(bytes.len() as u64));
            }
        }
    }

    Ok(())
}
