//! Bridges one axum request/response pair to a leased worker's framed wire
//! protocol (spec §4.4 steps 4-5, §4.2).

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use buntime_core::BuntimeError;
use buntime_pool::{Lease, LeaseOutcome};
use buntime_worker::{ProxyRequest, WsMessage, WsUpgradeRequest};

/// Proxy `req` through the worker `lease` holds, returning the response as
/// soon as its head arrives; the body streams lazily as the worker
/// produces it. The lease is released in the background once the full
/// response body (and the pump task behind it) finishes, so this function
/// never blocks on the tail of a long streaming response.
pub async fn proxy(
    mut lease: Lease,
    req: Request<Body>,
    remote_addr: Option<String>,
) -> Result<Response<Body>, BuntimeError> {
    let (parts, body) = req.into_parts();
    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let (body_tx, body_rx) = mpsc::channel::<Bytes>(32);
    let mut incoming = body.into_data_stream();
    tokio::spawn(async move {
        while let Some(chunk) = incoming.next().await {
            match chunk {
                Ok(bytes) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    if body_tx.send(bytes).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let proxy_request = ProxyRequest {
        id: Uuid::new_v4(),
        method: parts.method.to_string(),
        url: parts.uri.to_string(),
        headers,
        remote_addr,
        body: body_rx,
    };

    let handled = lease.worker_mut().handle(proxy_request).await;
    let (proxy_response, join) = match handled {
        Ok(ok) => ok,
        Err(e) => {
            lease.release(LeaseOutcome::Kill).await;
            return Err(e);
        }
    };

    let status = StatusCode::from_u16(proxy_response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response_headers = HeaderMap::new();
    for (name, value) in proxy_response.headers {
        if let (Ok(name), Ok(value)) =
            (name.parse::<HeaderName>(), HeaderValue::from_str(&value))
        {
            response_headers.append(name, value);
        }
    }

    let body_stream = ReceiverStream::new(proxy_response.body).map(Ok::<_, std::io::Error>);
    let mut response = Response::new(Body::from_stream(body_stream));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;

    // The pump task behind `join` keeps running after the head is
    // returned, forwarding body chunks into the channel `response`'s body
    // is built from. Once it finishes, restore the worker's stdio and
    // return it to the pool.
    tokio::spawn(async move {
        let outcome = lease.worker_mut().finish(join).await;
        let result = if outcome.crashed { LeaseOutcome::Kill } else { LeaseOutcome::Ok };
        lease.release(result).await;
    });

    Ok(response)
}

/// Bridge a WebSocket upgrade to a leased worker (spec §4.4 step 5, §4.2).
///
/// The worker's handshake answer is awaited *before* axum's upgrade is
/// accepted: a non-101 status is returned as a plain response and the
/// worker goes back to READY, exactly as if this had been a normal request.
/// Only a 101 commits to [`WebSocketUpgrade::on_upgrade`].
pub async fn proxy_websocket(
    mut lease: Lease,
    ws: WebSocketUpgrade,
    parts: Parts,
    remote_addr: Option<String>,
) -> Result<Response<Body>, BuntimeError> {
    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let request = WsUpgradeRequest {
        id: Uuid::new_v4(),
        method: parts.method.to_string(),
        url: parts.uri.to_string(),
        headers,
        remote_addr,
    };
    let id = request.id;

    let handshake = match lease.worker_mut().begin_websocket(request).await {
        Ok(h) => h,
        Err(e) => {
            lease.release(LeaseOutcome::Kill).await;
            return Err(e);
        }
    };

    if handshake.status != 101 {
        let status = StatusCode::from_u16(handshake.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response_headers = HeaderMap::new();
        for (name, value) in handshake.headers {
            if let (Ok(name), Ok(value)) =
                (name.parse::<HeaderName>(), HeaderValue::from_str(&value))
            {
                response_headers.append(name, value);
            }
        }
        lease.release(LeaseOutcome::Ok).await;
        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        return Ok(response);
    }

    Ok(ws.on_upgrade(move |socket| bridge_socket(lease, socket, id)))
}

/// Pumps frames between the client's WebSocket and the worker for the
/// connection's lifetime, then releases the lease with the pump's outcome.
async fn bridge_socket(mut lease: Lease, socket: WebSocket, id: Uuid) {
    let (mut sink, mut stream) = socket.split();
    let (to_client_tx, mut to_client_rx) = mpsc::channel::<WsMessage>(32);
    let (to_worker_tx, to_worker_rx) = mpsc::channel::<WsMessage>(32);

    let forward_out = tokio::spawn(async move {
        while let Some(msg) = to_client_rx.recv().await {
            let axum_msg = match msg {
                WsMessage::Text(t) => Message::Text(t.into()),
                WsMessage::Binary(b) => Message::Binary(b.into()),
                WsMessage::Ping(b) => Message::Ping(b.into()),
                WsMessage::Pong(b) => Message::Pong(b.into()),
            };
            if sink.send(axum_msg).await.is_err() {
                break;
            }
        }
    });

    let forward_in = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            let bridged = match msg {
                Message::Text(t) => WsMessage::Text(t.to_string()),
                Message::Binary(b) => WsMessage::Binary(b.to_vec()),
                Message::Ping(b) => WsMessage::Ping(b.to_vec()),
                Message::Pong(b) => WsMessage::Pong(b.to_vec()),
                Message::Close(_) => break,
            };
            if to_worker_tx.send(bridged).await.is_err() {
                break;
            }
        }
    });

    let outcome = lease.worker_mut().bridge_websocket(id, to_worker_rx, to_client_tx).await;
    forward_in.abort();
    let _ = forward_out.await;

    let result = if outcome.crashed { LeaseOutcome::Kill } else { LeaseOutcome::Ok };
    lease.release(result).await;
}
