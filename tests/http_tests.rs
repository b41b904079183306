// Integration tests for the HTTP endpoints


use hyper::{Body, Method, Request, StatusCode};
use msgrelay::relay::http::{handle_request, serve};
use msgrelay::MessageStore;
use serde_json::{json, Value};
use std::sync::Arc;
use test_utils::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn call(
    store: &Arc<MessageStore>,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body = match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    };
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let resp = handle_request(req, store.clone()).await.unwrap();
    let status = resp.status();
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_send_message() {
    let dir = temp_dir();
    let store = Arc::new(store_with(dir.path(), SINGLE_MESSAGE));

    let (status, data) = call(
        &store,
        Method::POST,
        "/send_message",
        Some(json!({"sender": "Bar", "recipient": "Foo", "message": "My first message"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["status"], "Message sent");
    let id = data["message_id"].as_str().unwrap();
    assert!(store.load().unwrap().contains_id(id));
}

#[tokio::test]
async fn test_fail_to_send_message() {
    let dir = temp_dir();
    let store = Arc::new(store_with(dir.path(), SINGLE_MESSAGE));

    let (status, data) = call(
        &store,
        Method::POST,
        "/send_message",
        Some(json!({"sender": "Bar", "message": "I'm missing a recipient"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(data["error"], "Missing sender, recipient, or message");
    assert!(data.get("status").is_none());

    // No body at all, and a field of the wrong type
    let (status, _) = call(&store, Method::POST, "/send_message", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(
        &store,
        Method::POST,
        "/send_message",
        Some(json!({"sender": "Bar", "recipient": "Foo", "message": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(store.load().unwrap().message_count(), 1);
}

#[tokio::test]
async fn test_get_messages() {
    let dir = temp_dir();
    let store = Arc::new(store_with(dir.path(), SINGLE_MESSAGE));

    let (status, data) = call(&store, Method::GET, "/get_messages/Foo", None).await;
    assert_eq!(status, StatusCode::OK);
    let messages = data["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "Hello World!");
    assert_eq!(messages[0]["id"], "abcd-1234-efgh-5678");
    assert_eq!(messages[0]["timestamp"], "2024-09-08T12:34:56.789000Z");
}

#[tokio::test]
async fn test_fail_to_get_messages() {
    let dir = temp_dir();
    let store = Arc::new(store_with(dir.path(), SINGLE_MESSAGE));

    let (status, data) = call(&store, Method::GET, "/get_messages/UnknownRecipient", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        data["error"],
        "No messages found for recipient: UnknownRecipient"
    );
    assert!(data.get("messages").is_none());
}

#[tokio::test]
async fn test_get_messages_since() {
    let dir = temp_dir();
    let store = Arc::new(store_with(dir.path(), UNSORTED_MESSAGES));

    let (status, data) = call(
        &store,
        Method::GET,
        "/get_messages/Foo?last_retrieved=2024-09-06T00%3A00%3A00.000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = data["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["2", "3"]);

    let (status, data) = call(
        &store,
        Method::GET,
        "/get_messages/Foo?last_retrieved=not-a-time",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(data["error"], "Invalid timestamp: not-a-time");
}

#[tokio::test]
async fn test_delete_messages() {
    let dir = temp_dir();
    let store = Arc::new(store_with(dir.path(), SINGLE_MESSAGE));

    let (status, data) = call(
        &store,
        Method::DELETE,
        "/delete_messages/Foo",
        Some(json!({"message_ids": ["abcd-1234-efgh-5678"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["status"], "Deleted 1 messages");

    let (status, data) = call(
        &store,
        Method::DELETE,
        "/delete_messages/Foo",
        Some(json!({"message_ids": ["abcd-1234-efgh-5678"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["status"], "Deleted 0 messages");
}

#[tokio::test]
async fn test_fail_to_delete_messages() {
    let dir = temp_dir();
    let store = Arc::new(store_with(dir.path(), SINGLE_MESSAGE));

    let (status, data) = call(&store, Method::DELETE, "/delete_messages/Foo", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(data["error"], "No Message IDs Provided");
    assert!(data.get("messages").is_none());
    assert_eq!(store.load().unwrap().message_count(), 1);
}

#[tokio::test]
async fn test_get_messages_range() {
    let dir = temp_dir();
    let store = Arc::new(store_with(dir.path(), SINGLE_MESSAGE));

    let (status, data) = call(
        &store,
        Method::GET,
        "/get_messages_range/Foo?start=0&stop=5",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = data["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "Hello World!");

    let (status, data) = call(&store, Method::GET, "/get_messages_range/Nobody", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["messages"], json!([]));

    let (status, _) = call(
        &store,
        Method::GET,
        "/get_messages_range/Foo?start=-1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_messages_range_sorted_in_time() {
    let dir = temp_dir();
    let store = Arc::new(store_with(dir.path(), UNSORTED_MESSAGES));

    let (status, data) = call(
        &store,
        Method::GET,
        "/get_messages_range/Foo?start=0&stop=2",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = data["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["message"], "I was sent first.");
    assert_eq!(messages[1]["message"], "I got sent second.");
}

#[tokio::test]
async fn test_unknown_route_and_wrong_method() {
    let dir = temp_dir();
    let store = Arc::new(empty_store(dir.path()));

    let (status, data) = call(&store, Method::GET, "/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(data["error"], "Not found");

    let (status, data) = call(&store, Method::GET, "/send_message", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(data["error"], "Method not allowed");
}

#[tokio::test]
async fn test_storage_failure_is_server_error() {
    let dir = temp_dir();
    // Point the store at a directory so every load fails
    let store = Arc::new(MessageStore::open(dir.path()));

    let (status, data) = call(&store, Method::GET, "/get_messages_range/Foo", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(data["error"], "Internal server error");
}

#[tokio::test]
async fn test_serve_over_tcp() {
    let dir = temp_dir();
    let store = Arc::new(store_with(dir.path(), SINGLE_MESSAGE));

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(serve(listener, store, async {
        let _ = shutdown_rx.await;
    }));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /get_messages/Foo HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("Hello World!"));

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
