//! Downloader tests against a minimal in-process HTTP server.

use std::sync::Arc;

use similar_asserts::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use macsym_common::DownloadConfig;
use macsym_retrieval::{Downloader, RetrievalErrorKind};

/// What the test server answers with.
#[derive(Clone)]
enum Behavior {
    /// Serve this body, honoring HEAD and byte-range GETs.
    File(Arc<Vec<u8>>),
    /// Answer every request with a bare status line.
    Status(u16),
}

async fn serve(listener: TcpListener, behavior: Behavior) {
    loop {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(handle(socket, behavior.clone()));
    }
}

async fn handle(mut socket: TcpStream, behavior: Behavior) {
    let mut buf = vec![0u8; 4096];
    let mut read = 0;
    loop {
        match socket.read(&mut buf[read..]).await {
            Ok(0) => break,
            Ok(n) => {
                read += n;
                if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") || read == buf.len() {
                    break;
                }
            }
            Err(_) => return,
        }
    }
    let request = String::from_utf8_lossy(&buf[..read]).into_owned();
    let is_head = request.starts_with("HEAD");

    let response = match behavior {
        Behavior::Status(code) => format!(
            "HTTP/1.1 {code} Oops\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
        )
        .into_bytes(),
        Behavior::File(body) => {
            let range = request
                .lines()
                .find_map(|line| line.to_ascii_lowercase().strip_prefix("range: bytes=").map(str::to_owned));

            let (status, slice) = match range {
                Some(range) => {
                    let (start, end) = range.trim().split_once('-').unwrap();
                    let start: usize = start.parse().unwrap();
                    let end: usize = end.parse().unwrap();
                    ("206 Partial Content", body[start..=end].to_vec())
                }
                None => ("200 OK", body.as_ref().clone()),
            };

            let declared = if is_head { body.len() } else { slice.len() };
            let mut response = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {declared}\r\naccept-ranges: bytes\r\nconnection: close\r\n\r\n"
            )
            .into_bytes();
            if !is_head {
                response.extend_from_slice(&slice);
            }
            response
        }
    };

    let _ = socket.write_all(&response).await;
    let _ = socket.shutdown().await;
}

async fn spawn_server(behavior: Behavior) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, behavior));
    format!("http://{addr}/symbols.zip")
}

fn small_chunks() -> DownloadConfig {
    DownloadConfig {
        chunk_size: 8,
        max_concurrent_chunks: 3,
        max_chunk_retries: 2,
        timeout_secs: 10,
        ..DownloadConfig::default()
    }
}

#[tokio::test]
async fn test_metadata_classifies_unauthorized() {
    let url = spawn_server(Behavior::Status(401)).await;
    let downloader = Downloader::new(&small_chunks(), None).unwrap();

    let error = downloader
        .fetch_metadata(&url)
        .await
        .expect_err("server rejects everything");
    assert_eq!(error.kind(), RetrievalErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_metadata_classifies_not_found() {
    let url = spawn_server(Behavior::Status(404)).await;
    let downloader = Downloader::new(&small_chunks(), None).unwrap();

    let error = downloader
        .fetch_metadata(&url)
        .await
        .expect_err("archive is missing");
    assert_eq!(error.kind(), RetrievalErrorKind::NotFound);
}

#[tokio::test]
async fn test_chunked_download_reassembles_exactly() {
    // 30 bytes over 8-byte chunks: three full chunks plus a short tail.
    let body: Vec<u8> = (0u8..30).collect();
    let url = spawn_server(Behavior::File(Arc::new(body.clone()))).await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("symbols.zip");
    let downloader = Downloader::new(&small_chunks(), None).unwrap();

    downloader.download_file(&url, &target).await.unwrap();

    let downloaded = std::fs::read(&target).unwrap();
    assert_eq!(downloaded, body);
    // Chunk scratch space is cleaned up after the merge.
    assert!(!dir.path().join("symbols.zip.parts").exists());
}

#[tokio::test]
async fn test_failed_transfer_leaves_no_output_file() {
    let url = spawn_server(Behavior::Status(500)).await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("symbols.zip");
    let downloader = Downloader::new(&small_chunks(), None).unwrap();

    let error = downloader
        .download_file(&url, &target)
        .await
        .expect_err("server errors");
    assert_eq!(error.kind(), RetrievalErrorKind::Http);
    assert!(!target.exists());
}
