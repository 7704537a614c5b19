mod handlers;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use spooltag::{KeyDerivationCache, ScanConfig, ScanPipeline};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use handlers::{
    create_error_response, process_request, ServerState, PARSE_ERROR, REQUEST_TIMEOUT, SERVER_ERROR,
};

/// Path of a JSON `ScanConfig` file
const CONFIG_ENV: &str = "SPOOLTAG_CONFIG";

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RpcRequest {
    jsonrpc: String,
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize, Debug)]
pub struct RpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize, Debug)]
pub struct RpcError {
    code: i32,
    message: String,
}

fn load_config() -> ScanConfig {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => match ScanConfig::from_path(&path) {
            Ok(config) => {
                info!("Loaded scan config from {}", path);
                config
            }
            Err(e) => {
                error!("Ignoring config {}: {}; using defaults", path, e);
                ScanConfig::default()
            }
        },
        Err(_) => ScanConfig::default(),
    }
}

async fn write_response(stdout: &mut Stdout, response: &RpcResponse) {
    let resp_str = serde_json::to_string(response).unwrap_or_else(|e| {
        error!("Failed to serialize response for ID {:?}: {}", response.id, e);
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"Serialization error"}}}}"#,
            SERVER_ERROR
        )
    });
    debug!(">>> Sending response: {}", resp_str);
    if let Err(e) = stdout.write_all(format!("{}\r\n", resp_str).as_bytes()).await {
        error!("Failed to write response for ID {:?}: {}", response.id, e);
    } else if let Err(e) = stdout.flush().await {
        error!("Failed to flush stdout for ID {:?}: {}", response.id, e);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config();
    let state = Arc::new(ServerState {
        pipeline: ScanPipeline::new(
            Arc::new(KeyDerivationCache::new(config.cache_capacity)),
            config,
        ),
    });

    info!("Starting spooltag RPC server on stdio...");
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut line_buffer = String::new();

    let ready_msg = json!({"jsonrpc": "2.0", "method": "server/ready", "params": {"status": "ready"}});
    if let Err(e) = stdout
        .write_all(format!("{}\r\n", ready_msg).as_bytes())
        .await
    {
        error!("Fatal: Failed to write ready message: {}", e);
        return;
    }
    if let Err(e) = stdout.flush().await {
        error!("Fatal: Failed to flush after ready message: {}", e);
        return;
    }

    loop {
        line_buffer.clear();
        match reader.read_line(&mut line_buffer).await {
            Ok(0) => {
                info!("Stdin closed (EOF). Exiting server.");
                break;
            }
            Ok(_) => {
                let trimmed_line = line_buffer.trim();
                if trimmed_line.is_empty() || !trimmed_line.starts_with('{') {
                    if !trimmed_line.is_empty() {
                        warn!("Received non-JSON input line, ignoring.");
                    }
                    continue;
                }
                debug!("<<< Received raw line ({} bytes)", trimmed_line.len());

                let parsed_json: Value = match serde_json::from_str(trimmed_line) {
                    Ok(v) => v,
                    Err(e) => {
                        let resp =
                            create_error_response(Value::Null, PARSE_ERROR, format!("Parse error: {}", e));
                        write_response(&mut stdout, &resp).await;
                        continue;
                    }
                };

                // notifications carry no id and get no response
                if parsed_json.get("id").map_or(true, Value::is_null) {
                    match parsed_json.get("method").and_then(Value::as_str) {
                        Some(method) => info!("Received notification: {}", method),
                        None => warn!("Received notification without method field"),
                    }
                    continue;
                }

                let id = parsed_json.get("id").cloned().unwrap_or(Value::Null);
                let req: RpcRequest = match serde_json::from_value(parsed_json) {
                    Ok(r) => r,
                    Err(e) => {
                        let resp = create_error_response(id, PARSE_ERROR, format!("Parse error: {}", e));
                        write_response(&mut stdout, &resp).await;
                        continue;
                    }
                };

                let response = process_request(Arc::clone(&state), req, REQUEST_TIMEOUT).await;
                write_response(&mut stdout, &response).await;
            }
            Err(e) => {
                error!("Failed to read from stdin: {}", e);
                break;
            }
        }
    }

    info!("spooltag RPC server finished.");
}
