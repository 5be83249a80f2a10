use std::sync::Arc;
use std::time::Duration;

use ganesha_llm::{
    ChatMessage, ChatRequest, ChatTransport, ClientConfig, ModelCache, ModelCatalogSource,
    OllamaClient, StreamEventPayload, StreamSessionId, StreamTarget, fetch_model_catalog,
    run_stream_worker,
};
use ganesha_storage::{ConversationId, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Serves one canned response per accepted connection and hands back the raw requests.
async fn serve(
    status_line: &'static str,
    body_parts: Vec<&'static str>,
) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let request = read_request(&mut socket).await;
            let _ = requests_tx.send(request);

            let head = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/x-ndjson\r\nconnection: close\r\n\r\n"
            );
            if socket.write_all(head.as_bytes()).await.is_err() {
                continue;
            }
            for part in &body_parts {
                // The client may hang up as soon as it has seen `done`.
                if socket.write_all(part.as_bytes()).await.is_err() || socket.flush().await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = socket.shutdown().await;
        }
    });

    (address, requests_rx)
}

/// Sends the head and `first_part`, then keeps the connection open without writing.
async fn serve_then_stall(first_part: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            read_request(&mut socket).await;
            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n";
            let chunk = format!("{:x}\r\n{first_part}\r\n", first_part.len());
            if socket.write_all(head.as_bytes()).await.is_err()
                || socket.write_all(chunk.as_bytes()).await.is_err()
            {
                continue;
            }
            let _ = socket.flush().await;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            });
        }
    });

    address
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buffer = [0u8; 4096];

    loop {
        let read = socket.read(&mut buffer).await.unwrap();
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&buffer[..read]);

        let text = String::from_utf8_lossy(&raw);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&raw).into_owned()
}

fn client(address: &str) -> OllamaClient {
    OllamaClient::new(ClientConfig::new(address, Duration::from_secs(5))).unwrap()
}

fn target() -> StreamTarget {
    StreamTarget::new(ConversationId::from("http"), StreamSessionId::new(7))
}

async fn collect_payloads(
    transport: Arc<dyn ChatTransport>,
    request: ChatRequest,
) -> Vec<StreamEventPayload> {
    let (sink, mut events) = mpsc::unbounded_channel();
    run_stream_worker(transport, request, target(), sink, CancellationToken::new()).await;

    let mut payloads = Vec::new();
    while let Ok(event) = events.try_recv() {
        payloads.push(event.payload);
    }
    payloads
}

#[tokio::test]
async fn streams_chat_reply_split_across_tcp_writes() {
    let (address, mut requests) = serve(
        "200 OK",
        vec![
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"message\":{\"con",
            "tent\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"content\":\" wor",
            "ld\"},\"done\":false}\n{\"message\":{\"content\":\"\"},\"done\":true}\n",
        ],
    )
    .await;

    let request = ChatRequest::streaming(
        "llava",
        vec![ChatMessage::from(&Message::user(
            "hi",
            vec!["aW1hZ2U=".to_string()],
        ))],
    );
    let payloads = collect_payloads(Arc::new(client(&address)), request).await;

    assert_eq!(
        payloads,
        vec![
            StreamEventPayload::Prefix,
            StreamEventPayload::Chunk("Hel".to_string()),
            StreamEventPayload::Chunk("lo".to_string()),
            StreamEventPayload::Chunk(" world".to_string()),
            StreamEventPayload::Finished,
        ]
    );

    let raw_request = requests.recv().await.unwrap();
    assert!(raw_request.starts_with("POST /api/chat HTTP/1.1"));
    let body = &raw_request[raw_request.find("\r\n\r\n").unwrap() + 4..];
    let body: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(body["model"], "llava");
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"][0]["images"][0], "aW1hZ2U=");
}

#[tokio::test]
async fn http_error_status_is_a_connection_error() {
    let (address, _requests) = serve("404 Not Found", vec!["{\"error\":\"model 'nope' not found\"}"]).await;

    let payloads =
        collect_payloads(Arc::new(client(&address)), ChatRequest::streaming("nope", Vec::new())).await;

    assert_eq!(payloads.len(), 2);
    assert!(matches!(&payloads[0], StreamEventPayload::Chunk(text) if text.contains("not found")));
    assert!(matches!(&payloads[1], StreamEventPayload::Error(message) if message.contains("404")));
}

#[tokio::test]
async fn refused_connection_reports_diagnostic_then_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let payloads =
        collect_payloads(Arc::new(client(&address)), ChatRequest::streaming("m", Vec::new())).await;

    assert_eq!(payloads.len(), 2);
    assert!(matches!(payloads[0], StreamEventPayload::Chunk(_)));
    assert!(matches!(payloads[1], StreamEventPayload::Error(_)));
}

#[tokio::test]
async fn tags_endpoint_populates_the_catalog() {
    let (address, mut requests) = serve(
        "200 OK",
        vec!["{\"models\":[{\"name\":\"llama3.2:latest\",\"size\":1},{\"name\":\"llava:7b\"}]}"],
    )
    .await;

    let catalog = fetch_model_catalog(&client(&address), &Arc::new(ModelCache::new())).await;
    assert_eq!(catalog.source, ModelCatalogSource::ServerApi);
    assert_eq!(
        catalog.names().collect::<Vec<_>>(),
        vec!["llama3.2:latest", "llava:7b"]
    );
    assert!(requests.recv().await.unwrap().starts_with("GET /api/tags"));
}

#[tokio::test]
async fn unreachable_server_falls_back_to_default_model() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let catalog = fetch_model_catalog(&client(&address), &Arc::new(ModelCache::new())).await;
    assert_eq!(catalog.source, ModelCatalogSource::StaticFallback);
    assert_eq!(catalog.models, ganesha_llm::default_models());
}

#[tokio::test]
async fn stalled_stream_hits_the_request_timeout() {
    let address = serve_then_stall("{\"message\":{\"content\":\"a\"},\"done\":false}\n").await;
    let client = OllamaClient::new(ClientConfig::new(&address, Duration::from_millis(300))).unwrap();

    let started = std::time::Instant::now();
    let payloads =
        collect_payloads(Arc::new(client), ChatRequest::streaming("m", Vec::new())).await;
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(payloads.len(), 4, "{payloads:?}");
    assert_eq!(payloads[0], StreamEventPayload::Prefix);
    assert_eq!(payloads[1], StreamEventPayload::Chunk("a".to_string()));
    assert!(
        matches!(&payloads[2], StreamEventPayload::Chunk(text)
            if text.starts_with("[Error talking to the inference server:")
                && text.to_lowercase().contains("timed out")),
        "{payloads:?}"
    );
    assert!(matches!(payloads[3], StreamEventPayload::Error(_)));
}
