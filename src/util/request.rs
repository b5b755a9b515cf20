use core::fmt;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, debug_span, instrument, trace, warn};

pub type RequestResult<T> = core::result::Result<T, RequestError>;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("while decoding response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request queue worker has stopped")]
    QueueClosed,

    #[error("request was dropped before completing")]
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(value: Method) -> Self {
        match value {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        })
    }
}

/// A single outbound HTTP request; consumed when it is sent
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: &str) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn patch(url: &str) -> Self {
        Self::new(Method::Patch, url)
    }

    pub fn delete(url: &str) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: &HeaderMap) -> Self {
        self.headers.extend(headers.clone());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> RequestResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Resolves exactly once with the request's outcome
pub type Completion = oneshot::Receiver<RequestResult<Response>>;

struct Pending {
    request: OutboundRequest,
    done: oneshot::Sender<RequestResult<Response>>,
}

/// Sends outbound requests, running GETs strictly one at a time in submission order
///
/// GETs are handed to a single worker task over a FIFO channel, so a GET is only issued once
/// every earlier GET has completed. POST, PATCH and DELETE requests are spawned immediately and
/// complete in whatever order the network allows.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    client: reqwest::Client,
    gets: mpsc::UnboundedSender<Pending>,
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("request", &self.request)
            .finish()
    }
}

impl RequestQueue {
    /// Spawns the GET worker; must be called from within a tokio runtime
    pub fn new(client: reqwest::Client) -> Self {
        let (gets, rx) = mpsc::unbounded_channel();
        tokio::spawn(get_worker(client.clone(), rx).instrument(debug_span!("get_queue")));

        Self { client, gets }
    }

    pub fn submit(&self, request: OutboundRequest) -> Completion {
        let (done, completion) = oneshot::channel();

        match request.method {
            Method::Get => {
                trace!(url = %request.url, "queueing GET");
                if let Err(mpsc::error::SendError(pending)) =
                    self.gets.send(Pending { request, done })
                {
                    let _ = pending.done.send(Err(RequestError::QueueClosed));
                }
            }
            _ => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    let result = execute(&client, request).await;
                    if done.send(result).is_err() {
                        debug!("request completed after its caller went away");
                    }
                });
            }
        }

        completion
    }

    /// Submits `request` and waits for its outcome
    pub async fn send(&self, request: OutboundRequest) -> RequestResult<Response> {
        self.submit(request)
            .await
            .map_err(|_| RequestError::Dropped)?
    }
}

async fn get_worker(client: reqwest::Client, mut rx: mpsc::UnboundedReceiver<Pending>) {
    while let Some(Pending { request, done }) = rx.recv().await {
        let result = execute(&client, request).await;
        if done.send(result).is_err() {
            debug!("GET completed after its caller went away");
        }
    }

    debug!("GET queue closed");
}

#[instrument(skip(client, request), fields(method = %request.method, url = %request.url))]
async fn execute(client: &reqwest::Client, request: OutboundRequest) -> RequestResult<Response> {
    let mut builder = client
        .request(request.method.into(), &request.url)
        .headers(request.headers);

    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }

    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let res = match builder.send().await {
        Ok(res) => res,
        Err(e) => {
            warn!(error = %e, "request failed");
            return Err(e.into());
        }
    };

    let status = res.status();
    let headers = res.headers().clone();
    let body = res.bytes().await?.to_vec();

    debug!(%status, bytes = body.len(), "request complete");
    Ok(Response {
        status,
        headers,
        body,
    })
}
