//! Integration tests for the contents API client
//!
//! A small fake of the repository contents API runs on a loopback listener;
//! the client under test talks to it over real HTTP.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use lab_inventory::config::InventoryConfig;
use lab_inventory::csv_handler::{decode_content, encode_content};
use lab_inventory::entities::{Organism, Vendor};
use lab_inventory::error::InventoryError;
use lab_inventory::manager::DataManager;
use lab_inventory::remote::{ContentStore, ContentsClient};

const TOKEN: &str = "good-token";
const CONTENTS_PREFIX: &str = "/repos/lab/inv/contents/";

/// A request as seen by the fake server.
#[derive(Debug, Clone)]
struct Seen {
    method: String,
    target: String,
    authorization: Option<String>,
    body: Option<Value>,
}

/// State of the fake repository.
struct FakeRepo {
    addr: Mutex<Option<SocketAddr>>,
    files: Mutex<HashMap<String, (String, String)>>,
    version: AtomicU64,
    inline_limit: usize,
    fail_with: Mutex<Option<u16>>,
    seen: Mutex<Vec<Seen>>,
}

impl FakeRepo {
    fn put(&self, path: &str, text: &str) -> String {
        let sha = format!("sha{}", self.version.fetch_add(1, Ordering::SeqCst) + 1);
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), (text.to_string(), sha.clone()));
        sha
    }

    fn text(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).map(|(t, _)| t.clone())
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn respond(&self, seen: &Seen) -> (u16, String) {
        if let Some(status) = *self.fail_with.lock().unwrap() {
            return (status, json!({"message": "server trouble"}).to_string());
        }
        if seen.authorization.as_deref() != Some(&format!("Bearer {TOKEN}")) {
            return (401, json!({"message": "Bad credentials"}).to_string());
        }

        let (path, _query) = seen
            .target
            .split_once('?')
            .unwrap_or((seen.target.as_str(), ""));

        if let Some(raw) = path.strip_prefix("/raw/") {
            return match self.text(raw) {
                Some(text) => (200, text),
                None => (404, String::new()),
            };
        }

        let Some(file) = path.strip_prefix(CONTENTS_PREFIX) else {
            return (404, String::new());
        };
        let file = file.replace("%20", " ");

        match seen.method.as_str() {
            "GET" => {
                let files = self.files.lock().unwrap();
                let Some((text, sha)) = files.get(&file) else {
                    return (404, json!({"message": "Not Found"}).to_string());
                };
                let inline = text.len() <= self.inline_limit;
                let addr = self.addr.lock().unwrap().unwrap();
                let body = json!({
                    "path": file,
                    "sha": sha,
                    "size": text.len(),
                    "encoding": if inline { "base64" } else { "none" },
                    "content": if inline { encode_content(text) } else { String::new() },
                    "download_url": format!("http://{addr}/raw/{file}"),
                });
                (200, body.to_string())
            }
            "PUT" => {
                let body = seen.body.clone().unwrap_or(Value::Null);
                let expected = body["sha"].as_str();
                let current = self.files.lock().unwrap().get(&file).map(|(_, s)| s.clone());
                match (current.as_deref(), expected) {
                    (Some(cur), Some(exp)) if cur == exp => {}
                    (None, None) => {}
                    (Some(_), None) => {
                        return (422, json!({"message": "\"sha\" wasn't supplied."}).to_string())
                    }
                    _ => return (409, json!({"message": "is at a different sha"}).to_string()),
                }
                let text = decode_content(body["content"].as_str().unwrap_or("")).unwrap();
                let sha = self.put(&file, &text);
                let status = if current.is_some() { 200 } else { 201 };
                let reply = json!({
                    "content": {"path": file, "sha": sha},
                    "commit": {"sha": format!("commit-{sha}")},
                });
                (status, reply.to_string())
            }
            _ => (405, String::new()),
        }
    }
}

async fn handle(stream: TcpStream, repo: Arc<FakeRepo>) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            match name.to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.unwrap();

    let seen = Seen {
        method,
        target,
        authorization,
        body: serde_json::from_slice(&body).ok(),
    };
    repo.seen.lock().unwrap().push(seen.clone());
    let (status, payload) = repo.respond(&seen);

    let response = format!(
        "HTTP/1.1 {status} Fake\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let mut stream = reader.into_inner();
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn start_fake_repo(inline_limit: usize) -> Arc<FakeRepo> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let repo = Arc::new(FakeRepo {
        addr: Mutex::new(Some(listener.local_addr().unwrap())),
        files: Mutex::new(HashMap::new()),
        version: AtomicU64::new(0),
        inline_limit,
        fail_with: Mutex::new(None),
        seen: Mutex::new(Vec::new()),
    });
    let server = repo.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handle(stream, server.clone()));
        }
    });
    repo
}

fn config_for(repo: &FakeRepo) -> InventoryConfig {
    let addr = repo.addr.lock().unwrap().unwrap();
    InventoryConfig {
        owner: "lab".into(),
        repo: "inv".into(),
        branch: Some("main".into()),
        api_base: format!("http://{addr}"),
        token: Some(TOKEN.into()),
        ..InventoryConfig::default()
    }
}

#[tokio::test]
async fn test_get_csv_content_decodes_inline_file() {
    let repo = start_fake_repo(10_000).await;
    repo.put("data/organisms.csv", "id,name\n1,Yeast\n");
    let client = ContentsClient::new(&config_for(&repo)).unwrap();

    let text = client.get_csv_content("organisms.csv").await.unwrap();
    assert_eq!(text, "id,name\n1,Yeast\n");

    let seen = repo.seen();
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].target, "/repos/lab/inv/contents/data/organisms.csv?ref=main");
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer good-token"));
}

#[tokio::test]
async fn test_large_file_follows_download_url() {
    let repo = start_fake_repo(8).await;
    repo.put("data/vendors.csv", "id,name\n1,Acme\n2,Globex\n");
    let client = ContentsClient::new(&config_for(&repo)).unwrap();

    let text = client.get_csv_content("vendors.csv").await.unwrap();
    assert_eq!(text, "id,name\n1,Acme\n2,Globex\n");
    assert!(repo.seen().iter().any(|s| s.target == "/raw/data/vendors.csv"));
}

#[tokio::test]
async fn test_missing_file_is_not_found_and_snapshot_is_empty() {
    let repo = start_fake_repo(10_000).await;
    let client = ContentsClient::new(&config_for(&repo)).unwrap();

    assert!(client.get_csv_content("users.csv").await.unwrap_err().is_not_found());
    let snapshot = client.csv_snapshot("users.csv").await.unwrap();
    assert_eq!(snapshot.path, "data/users.csv");
    assert_eq!(snapshot.text, "");
    assert!(snapshot.sha.is_none());
}

#[tokio::test]
async fn test_update_csv_creates_then_replaces() {
    let repo = start_fake_repo(10_000).await;
    let client = ContentsClient::new(&config_for(&repo)).unwrap();

    let created = client
        .update_csv("categories.csv", "id,name\n1,Plastics\n", "Create categories")
        .await
        .unwrap();
    assert_eq!(created.path, "data/categories.csv");
    assert_eq!(created.commit_sha.as_deref(), Some(format!("commit-{}", created.sha).as_str()));

    client
        .update_csv("categories.csv", "id,name\n1,Plastics\n2,Glass\n", "Add glass")
        .await
        .unwrap();
    assert_eq!(
        repo.text("data/categories.csv").as_deref(),
        Some("id,name\n1,Plastics\n2,Glass\n")
    );

    let puts: Vec<Seen> = repo.seen().into_iter().filter(|s| s.method == "PUT").collect();
    assert_eq!(puts.len(), 2);
    let first = puts[0].body.clone().unwrap();
    assert!(first.get("sha").is_none());
    assert_eq!(first["branch"], "main");
    assert_eq!(first["message"], "Create categories");
    let second = puts[1].body.clone().unwrap();
    assert_eq!(second["sha"], created.sha.as_str());
}

#[tokio::test]
async fn test_stale_sha_is_conflict() {
    let repo = start_fake_repo(10_000).await;
    let sha = repo.put("data/organisms.csv", "id,name\n1,Yeast\n");
    let client = ContentsClient::new(&config_for(&repo)).unwrap();

    repo.put("data/organisms.csv", "id,name\n1,Yeast\n2,Mouse\n");
    let error = client
        .update_file("data/organisms.csv", "id,name\n", "overwrite", Some(&sha))
        .await
        .unwrap_err();
    assert!(matches!(error, InventoryError::OptimisticConflict { .. }));

    let error = client
        .update_file("data/organisms.csv", "id,name\n", "overwrite", None)
        .await
        .unwrap_err();
    assert!(error.is_conflict());
    assert!(repo.text("data/organisms.csv").unwrap().contains("Mouse"));
}

#[tokio::test]
async fn test_unauthorized_clears_token() {
    let repo = start_fake_repo(10_000).await;
    repo.put("data/users.csv", "id,username\n");
    let mut config = config_for(&repo);
    config.token = Some("expired".into());
    let client = ContentsClient::new(&config).unwrap();

    let error = client.get_csv_content("users.csv").await.unwrap_err();
    assert!(matches!(error, InventoryError::AuthExpired));
    assert!(!client.has_token());

    let error = client.get_csv_content("users.csv").await.unwrap_err();
    assert!(matches!(error, InventoryError::AuthRequired));
    assert_eq!(repo.seen().len(), 1);

    client.set_token(TOKEN);
    assert!(client.get_csv_content("users.csv").await.is_ok());
}

#[tokio::test]
async fn test_server_error_is_remote_unavailable() {
    let repo = start_fake_repo(10_000).await;
    *repo.fail_with.lock().unwrap() = Some(502);
    let client = ContentsClient::new(&config_for(&repo)).unwrap();

    match client.get_csv_content("users.csv").await {
        Err(InventoryError::RemoteUnavailable { status, message }) => {
            assert_eq!(status, Some(502));
            assert!(message.contains("server trouble"));
        }
        other => panic!("expected RemoteUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_validation_failure_is_not_a_conflict() {
    let repo = start_fake_repo(10_000).await;
    *repo.fail_with.lock().unwrap() = Some(422);
    let client = ContentsClient::new(&config_for(&repo)).unwrap();

    for sha in [None, Some("0123abcd")] {
        match client
            .update_file("data/organisms.csv", "id,name\n", "Create organisms", sha)
            .await
        {
            Err(InventoryError::RemoteUnavailable { status, message }) => {
                assert_eq!(status, Some(422));
                assert!(message.contains("server trouble"));
            }
            other => panic!("expected RemoteUnavailable, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_manager_round_trip_over_http() {
    let repo = start_fake_repo(10_000).await;
    repo.put("data/organisms.csv", "id,name\n1,Yeast\n3,Mouse\n");
    let client = Arc::new(ContentsClient::new(&config_for(&repo)).unwrap());
    let manager = DataManager::with_store(client, None);

    let outcome = manager
        .add(Organism {
            id: 0,
            name: "Fly, fruit".into(),
        })
        .await
        .unwrap();
    assert_eq!(outcome.ids, vec![4]);
    assert_eq!(
        repo.text("data/organisms.csv").as_deref(),
        Some("id,name\n1,Yeast\n3,Mouse\n4,\"Fly, fruit\"\n")
    );

    manager
        .add(Vendor {
            id: 0,
            name: "Acme".into(),
        })
        .await
        .unwrap();
    let vendors = manager.get_vendors().await.unwrap();
    assert_eq!(vendors.len(), 1);
    assert_eq!(vendors[0].id, 1);
}
