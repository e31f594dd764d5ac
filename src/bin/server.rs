//! text2sql HTTP server
//!
//! Plain tokio TCP server speaking just enough HTTP/1.1 for JSON requests.

use std::sync::Arc;
use text2sql::api::{route, ApiState};
use text2sql::bootstrap::build_registry;
use text2sql::ServiceConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{error, info};

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    text2sql::init_tracing();

    let config = ServiceConfig::from_env()?;
    info!(
        "Starting text2sql server (database type: {}, vector store: {})",
        config.dialect, config.qdrant.url
    );

    let registry = build_registry(&config)?;
    let state = Arc::new(ApiState::new(Arc::new(registry)));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on {}", config.bind_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                error!("Error handling connection from {}: {}", addr, e);
            }
        });
    }
}

struct RawRequest {
    method: String,
    target: String,
    body: String,
}

async fn read_request(stream: &mut TcpStream) -> anyhow::Result<Option<RawRequest>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buffer, b"\r\n\r\n") {
            break pos + 4;
        }
        if buffer.len() > MAX_BODY_BYTES {
            anyhow::bail!("request headers too large");
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(m), Some(t)) => (m.to_string(), t.to_string()),
        _ => return Ok(None),
    };

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        anyhow::bail!("request body too large ({} bytes)", content_length);
    }

    while buffer.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    let body_end = (header_end + content_length).min(buffer.len());
    let body = String::from_utf8_lossy(&buffer[header_end..body_end]).to_string();

    Ok(Some(RawRequest {
        method,
        target,
        body,
    }))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn handle_connection(mut stream: TcpStream, state: Arc<ApiState>) -> anyhow::Result<()> {
    let request = match timeout(Duration::from_secs(10), read_request(&mut stream)).await {
        Ok(Ok(Some(request))) => request,
        Ok(Ok(None)) => {
            write_response(&mut stream, 400, r#"{"error":"Invalid request line"}"#).await?;
            return Ok(());
        }
        Ok(Err(e)) => {
            write_response(&mut stream, 400, &serde_json::json!({"error": e.to_string()}).to_string())
                .await?;
            return Ok(());
        }
        Err(_) => {
            write_response(&mut stream, 408, r#"{"error":"Request timeout"}"#).await?;
            return Ok(());
        }
    };

    if request.method == "OPTIONS" {
        write_response(&mut stream, 200, "{}").await?;
        return Ok(());
    }

    let response = route(&state, &request.method, &request.target, &request.body).await;
    info!("{} {} -> {}", request.method, request.target, response.status);
    write_response(&mut stream, response.status, &response.body.to_string()).await
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        408 => "Request Timeout",
        500 => "Internal Server Error",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

async fn write_response(stream: &mut TcpStream, status: u16, json_body: &str) -> anyhow::Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text(status),
        json_body.len(),
        json_body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
