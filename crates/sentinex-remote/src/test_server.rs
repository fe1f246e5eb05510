//! One-shot HTTP server for exercising the clients over a real socket.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub struct Served {
    pub base_url: String,
    /// Resolves to the raw request once the reply has been written.
    pub request: JoinHandle<String>,
}

/// Accept one connection on 127.0.0.1, answer it with `status` and a JSON
/// `body`, then close.
pub async fn serve_once(status: &str, body: &str) -> Served {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    );
    let request = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept client");
        let raw = read_request(&mut stream).await;
        stream
            .write_all(response.as_bytes())
            .await
            .expect("write response");
        let _ = stream.shutdown().await;
        String::from_utf8_lossy(&raw).into_owned()
    });
    Served {
        base_url: format!("http://{addr}"),
        request,
    }
}

async fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await.expect("read request");
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
        if request_complete(&raw) {
            break;
        }
    }
    raw
}

fn request_complete(raw: &[u8]) -> bool {
    let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&raw[..end]).to_ascii_lowercase();
    let body = &raw[end + 4..];
    if let Some(len) = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
    {
        return len.trim().parse::<usize>().map_or(true, |len| body.len() >= len);
    }
    if head.contains("transfer-encoding: chunked") {
        return body.ends_with(b"0\r\n\r\n");
    }
    true
}
