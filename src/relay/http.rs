// HTTP endpoints exposing the message store
//
// Each route is a thin adapter: decode the request, call one store
// operation, encode the result. Client errors map to 400 and storage
// errors to 500.

use crate::relay::error::StoreError;
use crate::relay::store::MessageStore;
use anyhow::{Context, Result};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;

const DEFAULT_RANGE_START: usize = 0;
const DEFAULT_RANGE_STOP: usize = 10;

/// Body of `POST /send_message`
#[derive(Debug, Default, Deserialize)]
struct SendRequest {
    sender: Option<String>,
    recipient: Option<String>,
    message: Option<String>,
}

/// Body of `DELETE /delete_messages/{recipient}`
#[derive(Debug, Default, Deserialize)]
struct DeleteRequest {
    message_ids: Option<Vec<String>>,
}

/// Routes served by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Send,
    Messages(String),
    Delete(String),
    Range(String),
}

impl Route {
    fn parse(path: &str) -> Option<Self> {
        let path = path.trim_start_matches('/');
        if path == "send_message" {
            return Some(Route::Send);
        }

        let (prefix, segment) = path.split_once('/')?;
        if segment.is_empty() || segment.contains('/') {
            return None;
        }
        let recipient = urlencoding::decode(segment).ok()?.into_owned();

        match prefix {
            "get_messages" => Some(Route::Messages(recipient)),
            "delete_messages" => Some(Route::Delete(recipient)),
            "get_messages_range" => Some(Route::Range(recipient)),
            _ => None,
        }
    }

    fn method(&self) -> Method {
        match self {
            Route::Send => Method::POST,
            Route::Messages(_) | Route::Range(_) => Method::GET,
            Route::Delete(_) => Method::DELETE,
        }
    }
}

/// Serve the relay on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, store: Arc<MessageStore>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    listener
        .set_nonblocking(true)
        .context("Failed to configure listener")?;
    let local_addr = listener.local_addr().context("Listener has no address")?;

    let make_svc = make_service_fn(move |_conn| {
        let store = store.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle_request(req, store.clone())))
        }
    });

    let server = Server::from_tcp(listener)
        .context("Failed to start HTTP server")?
        .serve(make_svc);

    tracing::info!("📬 Message relay listening on http://{}", local_addr);

    server
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    tracing::info!("Message relay stopped");
    Ok(())
}

/// Dispatch a single request against the store
pub async fn handle_request(
    req: Request<Body>,
    store: Arc<MessageStore>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    tracing::debug!("{} {}", method, path);

    let route = match Route::parse(&path) {
        Some(route) => route,
        None => return Ok(json_response(StatusCode::NOT_FOUND, json!({"error": "Not found"}))),
    };

    if route.method() != method {
        return Ok(json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({"error": "Method not allowed"}),
        ));
    }

    let result = match route {
        Route::Send => send_message(req, &store).await,
        Route::Messages(recipient) => get_messages(&req, &store, &recipient),
        Route::Delete(recipient) => delete_messages(req, &store, &recipient).await,
        Route::Range(recipient) => get_messages_range(&req, &store, &recipient),
    };

    Ok(match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(&method, &path, &e),
    })
}

async fn send_message(req: Request<Body>, store: &MessageStore) -> Result<Value, StoreError> {
    let body: SendRequest = read_json(req).await;

    let message_id = store.append(
        body.recipient.as_deref().unwrap_or_default(),
        body.sender.as_deref().unwrap_or_default(),
        body.message.as_deref().unwrap_or_default(),
    )?;

    Ok(json!({"status": "Message sent", "message_id": message_id}))
}

fn get_messages(
    req: &Request<Body>,
    store: &MessageStore,
    recipient: &str,
) -> Result<Value, StoreError> {
    let params = query_params(req);
    let since = params
        .get("last_retrieved")
        .map(String::as_str)
        .filter(|s| !s.is_empty());

    let messages = store.list_since(recipient, since)?;
    Ok(json!({ "messages": messages }))
}

async fn delete_messages(
    req: Request<Body>,
    store: &MessageStore,
    recipient: &str,
) -> Result<Value, StoreError> {
    let body: DeleteRequest = read_json(req).await;
    let ids: Option<HashSet<String>> = body.message_ids.map(|ids| ids.into_iter().collect());

    let removed = store.delete(recipient, ids.as_ref())?;
    Ok(json!({"status": format!("Deleted {} messages", removed)}))
}

fn get_messages_range(
    req: &Request<Body>,
    store: &MessageStore,
    recipient: &str,
) -> Result<Value, StoreError> {
    let params = query_params(req);
    let start = offset_param(&params, "start", DEFAULT_RANGE_START)?;
    let stop = offset_param(&params, "stop", DEFAULT_RANGE_STOP)?;

    let messages = store.list_range(recipient, start, stop)?;
    Ok(json!({ "messages": messages }))
}

/// Decode a JSON body, treating an absent or malformed body as empty
async fn read_json<T>(req: Request<Body>) -> T
where
    T: for<'de> Deserialize<'de> + Default,
{
    let bytes = match hyper::body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read request body: {}", e);
            return T::default();
        }
    };

    serde_json::from_slice(&bytes).unwrap_or_default()
}

fn query_params(req: &Request<Body>) -> HashMap<String, String> {
    req.uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn offset_param(
    params: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, StoreError> {
    match params.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| StoreError::invalid(format!("Invalid value for {}: {}", name, raw))),
    }
}

fn json_response(status: StatusCode, body: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(method: &Method, path: &str, err: &StoreError) -> Response<Body> {
    let status = if err.is_client_error() {
        tracing::warn!("{} {} rejected: {}", method, path, err);
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!("{} {} failed: {}", method, path, err);
        StatusCode::INTERNAL_SERVER_ERROR
    };

    json_response(status, json!({"error": err.user_message()}))
}
