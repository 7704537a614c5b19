use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use spooltag::session::{is_trailer, BLOCK_COUNT, BLOCK_LEN, DUMP_LEN};
use spooltag::{
    BlockInterpreter, EventLog, FilamentInfo, MemoryTag, RawBlockTable, ScanPipeline, TagUid,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::{RpcError, RpcRequest, RpcResponse};

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const PARSE_ERROR: i32 = -32700;
pub const SERVER_ERROR: i32 = -32000;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const METHODS: &[(&str, &str)] = &[
    ("initialize", "Server info and method list"),
    ("keys/derive", "Derive the 16 sector key pairs for a UID"),
    ("tag/decode", "Decode a table of data blocks into filament info"),
    ("tag/scan", "Replay a 1024 byte dump through the full scan pipeline"),
    ("reel/compare", "Check whether two decoded tags belong to the same reel"),
    ("cache/stats", "Key derivation cache counters"),
];

/// State shared by every request
pub struct ServerState {
    pub pipeline: ScanPipeline,
}

pub fn create_error_response(id: Value, code: i32, message: String) -> RpcResponse {
    error!("Responding with error: code={}, message={}", code, message);
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(RpcError { code, message }),
    }
}

pub fn create_success_response(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: Some(result),
        error: None,
    }
}

fn invalid_params(message: impl Into<String>) -> RpcError {
    RpcError {
        code: INVALID_PARAMS,
        message: message.into(),
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| invalid_params(format!("Invalid params: {}", e)))
}

fn parse_uid(uid: &str) -> Result<TagUid, RpcError> {
    TagUid::from_hex(uid).map_err(|e| invalid_params(format!("uid: {}", e)))
}

#[derive(Deserialize, Debug)]
struct KeysDeriveParams {
    uid: String,
}

#[derive(Deserialize, Debug)]
struct TagDecodeParams {
    uid: String,
    /// Block index (decimal string) to 16 byte hex payload
    blocks: BTreeMap<String, String>,
}

#[derive(Deserialize, Debug)]
struct TagScanParams {
    uid: String,
    /// Base64 encoded card image
    dump: String,
    /// Rewrite the trailers with derived keys before replaying
    #[serde(default = "default_true")]
    derive_trailers: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Debug)]
struct ReelCompareParams {
    a: TagDecodeParams,
    b: TagDecodeParams,
}

fn block_table(blocks: &BTreeMap<String, String>) -> Result<RawBlockTable, RpcError> {
    let mut table = RawBlockTable::new();
    for (index, payload) in blocks {
        let block: u8 = index
            .parse()
            .ok()
            .filter(|b| usize::from(*b) < BLOCK_COUNT)
            .ok_or_else(|| invalid_params(format!("blocks: invalid block index '{}'", index)))?;
        if is_trailer(block) {
            return Err(invalid_params(format!(
                "blocks: block {} is a sector trailer",
                block
            )));
        }
        let bytes = hex::decode(payload)
            .map_err(|e| invalid_params(format!("blocks: block {}: {}", block, e)))?;
        let data: [u8; BLOCK_LEN] = bytes.as_slice().try_into().map_err(|_| {
            invalid_params(format!(
                "blocks: block {} holds {} bytes, expected {}",
                block,
                bytes.len(),
                BLOCK_LEN
            ))
        })?;
        table.insert(block, data);
    }
    Ok(table)
}

fn decode_tag(params: &TagDecodeParams) -> Result<(FilamentInfo, Vec<String>), RpcError> {
    let uid = parse_uid(&params.uid)?;
    let blocks = block_table(&params.blocks)?;
    Ok(BlockInterpreter::default().interpret(&uid, &blocks))
}

fn handle_initialize() -> Value {
    let methods: Vec<Value> = METHODS
        .iter()
        .map(|(name, description)| json!({"name": name, "description": description}))
        .collect();
    json!({
        "serverInfo": {"name": "spooltag-rpc", "version": env!("CARGO_PKG_VERSION")},
        "methods": methods,
    })
}

fn handle_keys_derive(state: &ServerState, params: Value) -> Result<Value, RpcError> {
    let params: KeysDeriveParams = parse_params(params)?;
    let uid = parse_uid(&params.uid)?;
    let cache = state.pipeline.cache();
    let cached = cache.contains(uid.as_bytes());
    let keys = cache.get_or_derive(uid.as_bytes());
    if keys.is_empty() {
        return Err(invalid_params(format!(
            "uid: {} bytes is too short to derive keys",
            uid.len()
        )));
    }
    let sectors: Vec<Value> = keys
        .iter()
        .map(|pair| {
            json!({
                "sector": pair.sector,
                "key_a": pair.key_a.to_hex(),
                "key_b": pair.key_b.to_hex(),
            })
        })
        .collect();
    Ok(json!({"uid": uid.to_hex(), "cached": cached, "sectors": sectors}))
}

fn handle_tag_decode(params: Value) -> Result<Value, RpcError> {
    let params: TagDecodeParams = parse_params(params)?;
    let (filament, errors) = decode_tag(&params)?;
    Ok(json!({"filament": filament, "errors": errors}))
}

fn handle_tag_scan(state: &ServerState, params: Value) -> Result<Value, RpcError> {
    let params: TagScanParams = parse_params(params)?;
    let uid = parse_uid(&params.uid)?;
    let dump = base64::engine::general_purpose::STANDARD
        .decode(params.dump.trim())
        .map_err(|e| invalid_params(format!("dump: {}", e)))?;
    if dump.len() != DUMP_LEN {
        return Err(invalid_params(format!(
            "dump: {} bytes, expected {}",
            dump.len(),
            DUMP_LEN
        )));
    }

    let mut tag = MemoryTag::from_dump(uid.as_bytes().to_vec(), &dump);
    if params.derive_trailers {
        tag = tag.with_derived_trailers();
    }
    let mut events = EventLog::new();
    let report = state.pipeline.run(&mut tag, &mut events);
    info!(
        "tag/scan {} finished: {} ({} auth attempts)",
        uid,
        report.result.kind(),
        tag.auth_attempts()
    );
    Ok(json!({
        "kind": report.result.kind(),
        "report": report,
        "events": events.events,
    }))
}

fn handle_reel_compare(params: Value) -> Result<Value, RpcError> {
    let params: ReelCompareParams = parse_params(params)?;
    let (a, _) = decode_tag(&params.a)?;
    let (b, _) = decode_tag(&params.b)?;
    Ok(json!({
        "same_reel": a.same_reel(&b),
        "tray_uid_a": a.tray_uid,
        "tray_uid_b": b.tray_uid,
    }))
}

fn dispatch(state: &ServerState, method: &str, params: Value) -> Result<Value, RpcError> {
    match method {
        "initialize" => Ok(handle_initialize()),
        "keys/derive" => handle_keys_derive(state, params),
        "tag/decode" => handle_tag_decode(params),
        "tag/scan" => handle_tag_scan(state, params),
        "reel/compare" => handle_reel_compare(params),
        "cache/stats" => {
            let cache = state.pipeline.cache();
            Ok(json!({
                "entries": cache.len(),
                "capacity": cache.capacity(),
                "stats": cache.stats(),
            }))
        }
        other => Err(RpcError {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {}", other),
        }),
    }
}

pub type ResponseFuture = Pin<Box<dyn Future<Output = RpcResponse> + Send>>;

/// Handle `req` on the blocking pool, answering with an error after `timeout`
pub fn process_request(state: Arc<ServerState>, req: RpcRequest, timeout: Duration) -> ResponseFuture {
    Box::pin(async move {
        debug!("Processing request: {:?}", req);

        if req.jsonrpc != "2.0" {
            return create_error_response(
                req.id,
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"".to_string(),
            );
        }

        info!("Received {} request", req.method);
        let method = req.method.clone();
        let params = req.params;
        let handle = tokio::task::spawn_blocking(move || dispatch(&state, &method, params));
        await_dispatch(req.id, &req.method, handle, timeout).await
    })
}

/// Wait for a dispatched handler; a handler still running at `timeout` keeps
/// its blocking thread but the caller gets an error response
pub async fn await_dispatch(
    id: Value,
    method: &str,
    handle: JoinHandle<Result<Value, RpcError>>,
    timeout: Duration,
) -> RpcResponse {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(result))) => create_success_response(id, result),
        Ok(Ok(Err(e))) => create_error_response(id, e.code, e.message),
        Ok(Err(e)) => create_error_response(
            id,
            SERVER_ERROR,
            format!("Handler for method '{}' failed: {}", method, e),
        ),
        Err(_) => {
            error!(
                "Request processing timed out after {:?} for Method '{}', ID {:?}",
                timeout, method, id
            );
            create_error_response(
                id,
                SERVER_ERROR,
                format!("Request timed out for method '{}'", method),
            )
        }
    }
}
