//! End-to-end dispatcher tests over an in-memory stream

use super::*;
use crate::completion::{BackendError, CompletionBackend, Prompt};
use crate::io::StreamTransport;
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::task::JoinHandle;

const TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(feature = "test-logging")]
crate::setup_test_logging!();

// ============================================================================
// Test backends
// ============================================================================

/// Echoes the prompt text back in brackets
struct EchoBackend;

impl CompletionBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        Ok(format!("[{}]", prompt.text))
    }
}

/// Lists the context directories it was given
struct ContextPathsBackend;

impl CompletionBackend for ContextPathsBackend {
    fn name(&self) -> &str {
        "context-paths"
    }

    fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let paths: Vec<String> = prompt
            .context_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Ok(paths.join(","))
    }
}

struct FailingBackend;

impl CompletionBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn generate(&self, _prompt: &Prompt) -> Result<String, BackendError> {
        Err(BackendError::Generation("model unavailable".to_string()))
    }
}

/// Blocks every generation until the test releases it
struct GatedBackend {
    release: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl CompletionBackend for GatedBackend {
    fn name(&self) -> &str {
        "gated"
    }

    fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn generate(&self, _prompt: &Prompt) -> Result<String, BackendError> {
        self.release
            .lock()
            .unwrap()
            .recv()
            .map_err(|e| BackendError::Generation(e.to_string()))?;
        Ok("released".to_string())
    }
}

/// Records the highest number of overlapping generations
#[derive(Default)]
struct OverlapBackend {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CompletionBackend for OverlapBackend {
    fn name(&self) -> &str {
        "overlap"
    }

    fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(10));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(prompt.text.len().to_string())
    }
}

// ============================================================================
// Test client
// ============================================================================

struct TestClient {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    server: JoinHandle<i32>,
}

impl TestClient {
    fn start(backend: Arc<dyn CompletionBackend>) -> Self {
        let server = LanguageServer::new(
            ServerOptions::default(),
            Arc::new(BackendContext::new(backend)),
        );
        Self::start_server(server)
    }

    fn start_server(server: LanguageServer) -> Self {
        let (server_side, client_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (client_read, client_write) = tokio::io::split(client_side);

        let server = tokio::spawn(server.serve(StreamTransport::new(server_read, server_write)));

        Self {
            reader: BufReader::new(client_read),
            writer: client_write,
            server,
        }
    }

    async fn send_raw(&mut self, payload: &str) {
        self.send_bytes(payload.as_bytes()).await;
    }

    /// Frame and send a body that need not be valid UTF-8
    async fn send_bytes(&mut self, body: &[u8]) {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer.write_all(header.as_bytes()).await.unwrap();
        self.writer.write_all(body).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn request(&mut self, id: i64, method: &str, params: Value) {
        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.send_raw(&message.to_string()).await;
    }

    async fn notify(&mut self, method: &str, params: Value) {
        let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.send_raw(&message.to_string()).await;
    }

    /// Next framed message from the server, or None at end of stream
    async fn read_message(&mut self) -> Option<Value> {
        tokio::time::timeout(TIMEOUT, async {
            let mut content_length = None;
            loop {
                let mut line = String::new();
                if self.reader.read_line(&mut line).await.unwrap() == 0 {
                    return None;
                }
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some(value) = line.strip_prefix("Content-Length:") {
                    content_length = Some(value.trim().parse::<usize>().unwrap());
                }
            }

            let mut body = vec![0u8; content_length.unwrap()];
            self.reader.read_exact(&mut body).await.unwrap();
            Some(serde_json::from_slice(&body).unwrap())
        })
        .await
        .expect("timed out waiting for a server message")
    }

    /// Skip notifications until the response for `id`
    async fn response(&mut self, id: i64) -> Value {
        loop {
            let message = self.read_message().await.expect("stream closed");
            if message["id"] == json!(id) {
                return message;
            }
        }
    }

    async fn call(&mut self, id: i64, method: &str, params: Value) -> Value {
        self.request(id, method, params).await;
        self.response(id).await
    }

    async fn initialize(&mut self, params: Value) -> Value {
        let response = self.call(1, "initialize", params).await;
        self.notify("initialized", json!({})).await;
        response
    }

    async fn open(&mut self, uri: &str, text: &str) {
        self.notify(
            "textDocument/didOpen",
            json!({"textDocument": {"uri": uri, "languageId": "plaintext", "version": 1, "text": text}}),
        )
        .await;
    }

    async fn complete(&mut self, id: i64, uri: &str, line: u32, character: u32) -> Value {
        self.call(
            id,
            "textDocument/completion",
            json!({"textDocument": {"uri": uri}, "position": {"line": line, "character": character}}),
        )
        .await
    }

    async fn exit_code(self) -> i32 {
        tokio::time::timeout(TIMEOUT, self.server)
            .await
            .expect("server did not stop")
            .unwrap()
    }
}

fn label(response: &Value) -> &str {
    response["result"]["items"][0]["label"].as_str().unwrap()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_initialize_declares_capabilities() {
    let mut client = TestClient::start(Arc::new(EchoBackend));

    let response = client
        .initialize(json!({"processId": null, "rootUri": "file:///ws", "capabilities": {}}))
        .await;

    let capabilities = &response["result"]["capabilities"];
    assert_eq!(capabilities["textDocumentSync"], 2);
    assert_eq!(capabilities["completionProvider"]["resolveProvider"], false);
    assert_eq!(capabilities["completionProvider"]["triggerCharacters"], json!([]));
    assert_eq!(response["result"]["serverInfo"]["name"], "natls");
}

#[tokio::test]
async fn test_minimal_initialize_params_are_accepted() {
    let mut client = TestClient::start(Arc::new(EchoBackend));

    let response = client.initialize(json!({})).await;
    assert!(response["result"]["capabilities"].is_object());

    let again = client.call(2, "initialize", json!({})).await;
    assert_eq!(again["error"]["code"], -32600);
}

#[tokio::test]
async fn test_requests_before_initialize_fail() {
    let mut client = TestClient::start(Arc::new(EchoBackend));

    // Dropped: the document is not known afterwards
    client.open("file:///ws/a.txt", "early text").await;

    let response = client.complete(1, "file:///ws/a.txt", 0, 5).await;
    assert_eq!(response["error"]["code"], -32002);

    let response = client.call(2, "shutdown", Value::Null).await;
    assert_eq!(response["error"]["code"], -32002);

    client.call(3, "initialize", json!({})).await;
    let response = client.complete(4, "file:///ws/a.txt", 0, 5).await;
    assert_eq!(label(&response), "[]");
}

#[tokio::test]
async fn test_shutdown_then_exit() {
    let mut client = TestClient::start(Arc::new(EchoBackend));
    client.initialize(json!({})).await;

    let response = client.call(2, "shutdown", Value::Null).await;
    assert_eq!(response["result"], Value::Null);
    assert!(response.get("error").is_none());

    let response = client.complete(3, "file:///ws/a.txt", 0, 0).await;
    assert_eq!(response["error"]["code"], -32600);

    let response = client.call(4, "shutdown", Value::Null).await;
    assert_eq!(response["error"]["code"], -32600);

    client.notify("exit", Value::Null).await;
    assert_eq!(client.read_message().await, None);
    assert_eq!(client.exit_code().await, 0);
}

#[tokio::test]
async fn test_exit_without_shutdown_fails() {
    let mut client = TestClient::start(Arc::new(EchoBackend));
    client.initialize(json!({})).await;

    client.notify("exit", Value::Null).await;
    assert_eq!(client.exit_code().await, 1);
}

#[tokio::test]
async fn test_stream_closure_is_fatal() {
    let client = TestClient::start(Arc::new(EchoBackend));
    let TestClient {
        reader,
        writer,
        server,
    } = client;
    drop(writer);
    drop(reader);

    let code = tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(code, 1);
}

#[tokio::test]
async fn test_forced_exit_through_token() {
    let server = LanguageServer::new(
        ServerOptions::default(),
        Arc::new(BackendContext::new(Arc::new(EchoBackend))),
    );
    let token = server.exit_token();
    let mut client = TestClient::start_server(server);
    client.initialize(json!({})).await;

    token.cancel();
    assert_eq!(client.read_message().await, None);
    assert_eq!(client.exit_code().await, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_parent_process_exit_stops_server() {
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let parent_pid = child.id();
    child.wait().unwrap();

    let server = LanguageServer::new(
        ServerOptions {
            check_parent_process: true,
        },
        Arc::new(BackendContext::new(Arc::new(EchoBackend))),
    );
    let mut client = TestClient::start_server(server);

    client
        .request(
            1,
            "initialize",
            json!({
                "processId": parent_pid,
                "initializationOptions": {"parentProcessWatchInterval": 1}
            }),
        )
        .await;

    let response = client.read_message().await.unwrap();
    assert_eq!(response["id"], 1);
    assert!(response["result"]["capabilities"].is_object());

    while client.read_message().await.is_some() {}
    assert_eq!(client.exit_code().await, 0);
}

#[tokio::test]
async fn test_live_parent_process_keeps_server_running() {
    let server = LanguageServer::new(
        ServerOptions {
            check_parent_process: true,
        },
        Arc::new(BackendContext::new(Arc::new(EchoBackend))),
    );
    let mut client = TestClient::start_server(server);

    client
        .initialize(json!({
            "processId": std::process::id(),
            "initializationOptions": {"parentProcessWatchInterval": 1}
        }))
        .await;
    client.open("file:///ws/a.txt", "alive").await;

    let response = client.complete(2, "file:///ws/a.txt", 0, 5).await;
    assert_eq!(label(&response), "alive [alive]");
}

// ============================================================================
// Protocol errors
// ============================================================================

#[tokio::test]
async fn test_unknown_method() {
    let mut client = TestClient::start(Arc::new(EchoBackend));
    client.initialize(json!({})).await;

    let response = client.call(2, "textDocument/hover", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["error"]["data"], "textDocument/hover");

    // Unknown notifications are ignored
    client.notify("workspace/didChangeConfiguration", json!({})).await;
    client.notify("$/cancelRequest", json!({"id": 2})).await;
    let response = client.call(3, "shutdown", Value::Null).await;
    assert_eq!(response["result"], Value::Null);
}

#[tokio::test]
async fn test_malformed_payloads_get_error_responses() {
    let mut client = TestClient::start(Arc::new(EchoBackend));
    client.initialize(json!({})).await;

    client.send_raw("{this is not json").await;
    let response = client.read_message().await.unwrap();
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);

    client.send_raw(r#"{"jsonrpc":"2.0","id":9}"#).await;
    let response = client.read_message().await.unwrap();
    assert_eq!(response["error"]["code"], -32600);
    assert_eq!(response["id"], 9);

    let response = client
        .call(10, "textDocument/completion", json!({"position": "nowhere"}))
        .await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn test_body_that_is_not_utf8_is_rejected_and_dispatch_continues() {
    let mut client = TestClient::start(Arc::new(EchoBackend));
    client.initialize(json!({})).await;

    let mut body = br#"{"jsonrpc":"2.0","method":"textDocument/didOpen","params":{"textDocument":{"uri":"file:///ws/a.txt","languageId":"plaintext","version":1,"text":""#.to_vec();
    body.push(0xFF);
    body.extend_from_slice(br#""}}}"#);
    client.send_bytes(&body).await;

    let response = client.read_message().await.unwrap();
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);

    let response = client.call(7, "shutdown", Value::Null).await;
    assert_eq!(response["result"], Value::Null);
    assert!(response.get("error").is_none());
}

#[tokio::test]
async fn test_change_to_unknown_document_is_reported() {
    let mut client = TestClient::start(Arc::new(EchoBackend));
    client.initialize(json!({})).await;

    client
        .notify(
            "textDocument/didChange",
            json!({
                "textDocument": {"uri": "file:///ws/ghost.txt", "version": 2},
                "contentChanges": [{"text": "boo"}]
            }),
        )
        .await;

    let message = client.read_message().await.unwrap();
    assert_eq!(message["method"], "window/logMessage");
    assert_eq!(message["params"]["type"], 1);
    assert!(
        message["params"]["message"]
            .as_str()
            .unwrap()
            .contains("file:///ws/ghost.txt")
    );

    client.open("file:///ws/a.txt", "still works").await;
    let response = client.complete(2, "file:///ws/a.txt", 0, 11).await;
    assert_eq!(label(&response), "works [still works]");
}

#[tokio::test]
async fn test_backend_failure_fails_only_that_request() {
    let mut client = TestClient::start(Arc::new(FailingBackend));
    client.initialize(json!({})).await;
    client.open("file:///ws/a.txt", "text").await;

    let response = client.complete(2, "file:///ws/a.txt", 0, 4).await;
    assert_eq!(response["error"]["code"], -32803);
    assert!(
        response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("model unavailable")
    );

    let response = client.call(3, "shutdown", Value::Null).await;
    assert_eq!(response["result"], Value::Null);
}

// ============================================================================
// Documents and completion
// ============================================================================

#[tokio::test]
async fn test_open_change_complete() {
    let mut client = TestClient::start(Arc::new(EchoBackend));
    client.initialize(json!({})).await;

    client.open("file:///ws/a.txt", "itshelloworld").await;
    client
        .notify(
            "textDocument/didChange",
            json!({
                "textDocument": {"uri": "file:///ws/a.txt", "version": 2},
                "contentChanges": [
                    {"range": {"start": {"line": 0, "character": 3}, "end": {"line": 0, "character": 8}}, "text": "goodbye"},
                    {"range": {"start": {"line": 0, "character": 15}, "end": {"line": 0, "character": 15}}, "text": "\nnext li"}
                ]
            }),
        )
        .await;

    let response = client.complete(2, "file:///ws/a.txt", 1, 7).await;
    assert_eq!(response["result"]["isIncomplete"], false);
    assert_eq!(response["result"]["items"][0]["kind"], 1);
    assert_eq!(label(&response), "li [itsgoodbyeworld\nnext li]");

    client
        .notify(
            "textDocument/didChange",
            json!({
                "textDocument": {"uri": "file:///ws/a.txt", "version": 3},
                "contentChanges": [{"text": "replaced"}]
            }),
        )
        .await;
    let response = client.complete(3, "file:///ws/a.txt", 0, 100).await;
    assert_eq!(label(&response), "replaced [replaced]");
}

#[tokio::test]
async fn test_close_drops_client_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "on disk").unwrap();
    let uri = crate::workspace::uris::from_fs_path(&path).unwrap();

    let mut client = TestClient::start(Arc::new(EchoBackend));
    client.initialize(json!({})).await;

    client.open(&uri, "in memory").await;
    assert_eq!(label(&client.complete(2, &uri, 0, 9).await), "memory [in memory]");

    client
        .notify("textDocument/didClose", json!({"textDocument": {"uri": uri}}))
        .await;
    client
        .notify("textDocument/didSave", json!({"textDocument": {"uri": uri}}))
        .await;
    assert_eq!(label(&client.complete(3, &uri, 0, 7).await), "disk [on disk]");
}

#[tokio::test]
async fn test_root_path_fallback_and_context_paths() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir_all(project.join("src")).unwrap();
    std::fs::write(project.join("pyproject.toml"), "").unwrap();
    let file = project.join("src").join("main.py");
    let uri = crate::workspace::uris::from_fs_path(&file).unwrap();

    let mut client = TestClient::start(Arc::new(ContextPathsBackend));
    client
        .initialize(json!({"rootPath": dir.path().display().to_string()}))
        .await;

    client.open(&uri, "x").await;
    let response = client.complete(2, &uri, 0, 1).await;
    assert_eq!(label(&response), format!("x {}", project.display()));
}

#[tokio::test]
async fn test_initialization_options_are_applied() {
    let mut client = TestClient::start(Arc::new(EchoBackend));
    client
        .initialize(json!({"initializationOptions": {"contextWindow": 4}}))
        .await;

    client.open("file:///ws/a.txt", "abcdefgh").await;
    let response = client.complete(2, "file:///ws/a.txt", 0, 8).await;
    assert_eq!(label(&response), "abcdefgh [efgh]");
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_completion_does_not_block_dispatch() {
    let (release, gate) = std::sync::mpsc::channel();
    let mut client = TestClient::start(Arc::new(GatedBackend {
        release: Mutex::new(gate),
    }));
    client.initialize(json!({})).await;
    client.open("file:///ws/a.txt", "slow").await;

    client
        .request(
            2,
            "textDocument/completion",
            json!({"textDocument": {"uri": "file:///ws/a.txt"}, "position": {"line": 0, "character": 4}}),
        )
        .await;

    // Answered while the completion is still blocked in the backend
    let response = client.call(3, "textDocument/hover", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);

    release.send(()).unwrap();
    let response = client.response(2).await;
    assert_eq!(label(&response), "slow released");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_are_single_flight() {
    let overlap = Arc::new(OverlapBackend::default());
    let mut client = TestClient::start(overlap.clone());
    client
        .initialize(json!({"initializationOptions": {"maxWorkers": 4}}))
        .await;
    client.open("file:///ws/a.txt", "0123456789").await;

    for id in 10..20 {
        client
            .request(
                id,
                "textDocument/completion",
                json!({"textDocument": {"uri": "file:///ws/a.txt"}, "position": {"line": 0, "character": id - 10}}),
            )
            .await;
    }

    let mut answered = Vec::new();
    while answered.len() < 10 {
        let message = client.read_message().await.unwrap();
        if let Some(id) = message["id"].as_i64() {
            assert_eq!(label(&message), format!("0123456789 {}", id - 10));
            answered.push(id);
        }
    }
    answered.sort();

    assert_eq!(answered, (10..20).collect::<Vec<_>>());
    assert_eq!(overlap.max_in_flight.load(Ordering::SeqCst), 1);
}
