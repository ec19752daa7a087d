//! Content server on hyper 1.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::CacheEngine;
use crate::error::{Error, Result};

/// Operational endpoints live under this prefix. Titles cannot start with
/// an underscore, so no article id collides with it.
pub const OPS_PREFIX: &str = "/_cdn/";

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub bind_addr: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Serves articles out of a shared cache engine
#[derive(Debug, Clone)]
pub struct HttpServer {
    config: HttpConfig,
    engine: Arc<CacheEngine>,
}

impl HttpServer {
    pub fn new(config: HttpConfig, engine: Arc<CacheEngine>) -> Self {
        Self { config, engine }
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await.map_err(|e| {
            Error::Config(format!("Failed to bind HTTP server on {}: {}", self.config.bind_addr, e))
        })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        info!("HTTP server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("HTTP server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("HTTP accept error: {}", e);
                        continue;
                    }
                },
            };

            let io = TokioIo::new(stream);
            let engine = Arc::clone(&self.engine);

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let engine = Arc::clone(&engine);
                    async move {
                        Ok::<_, Infallible>(respond(&engine, req.method(), req.uri().path()).await)
                    }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, "HTTP connection error: {}", e);
                }
            });
        }
    }
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Route one request. `HEAD` gets the `GET` headers and an empty body.
pub async fn respond(engine: &CacheEngine, method: &Method, path: &str) -> Response<Full<Bytes>> {
    let response = match *method {
        Method::GET | Method::HEAD => route(engine, path).await,
        _ => return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
    };
    if *method != Method::HEAD {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    if let Some(len) = body.size_hint().exact() {
        parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    Response::from_parts(parts, Full::new(Bytes::new()))
}

async fn route(engine: &CacheEngine, path: &str) -> Response<Full<Bytes>> {
    let Some(endpoint) = path.strip_prefix(OPS_PREFIX) else {
        return serve_article(engine, path).await;
    };

    match endpoint {
        "healthz" => text(StatusCode::OK, "ok"),
        "metrics" => match engine.metrics().encode_text() {
            Ok((content_type, body)) => {
                let mut response = text(StatusCode::OK, body);
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
            }
        },
        "stats" => match serde_json::to_vec(&engine.stats().await) {
            Ok(body) => {
                let mut response = text(StatusCode::OK, body);
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => {
                error!("Failed to serialize stats: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "stats unavailable")
            }
        },
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn serve_article(engine: &CacheEngine, path: &str) -> Response<Full<Bytes>> {
    match engine.lookup(path).await {
        Ok(result) => {
            debug!(
                path,
                source = %result.source,
                latency_us = result.latency.as_micros() as u64,
                "Served article"
            );
            let mut response = Response::new(Full::new(result.data));
            let headers = response.headers_mut();
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            if let Some(encoding) = engine.compression().content_encoding() {
                headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
            }
            headers.insert("x-cache", HeaderValue::from_static(result.source.label()));
            response
        }
        Err(e) if e.is_not_found() => text(StatusCode::NOT_FOUND, "not found"),
        Err(e @ Error::OriginFetch { .. }) => {
            warn!(path, "{}", e);
            text(StatusCode::BAD_GATEWAY, "origin unavailable")
        }
        Err(e) => {
            error!(path, "Request failed: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, GzipCompressor, ManifestEntry};
    use crate::domain::ports::{ArticleId, OriginClient};
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use std::io::Read;
    use tempfile::TempDir;

    struct Origin;

    #[async_trait]
    impl OriginClient for Origin {
        async fn fetch(&self, article: &ArticleId) -> Result<Bytes> {
            match article.as_str() {
                "Rust" => Ok(Bytes::from_static(b"<html>Rust</html>")),
                "Flaky" => Err(Error::OriginFetch {
                    article: article.to_string(),
                    reason: "503".to_string(),
                }),
                other => Err(Error::OriginNotFound(other.to_string())),
            }
        }
    }

    async fn engine(dir: &TempDir) -> CacheEngine {
        let config = CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let manifest = ["Rust", "Flaky", "Gone"]
            .iter()
            .map(|id| ManifestEntry {
                id: ArticleId::from_normalized(*id),
                views: 1,
            })
            .collect();
        CacheEngine::build(config, manifest, Arc::new(Origin), Arc::new(GzipCompressor::new()))
            .await
            .unwrap()
    }

    async fn body(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_article_is_served_gzipped() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        let response = respond(&engine, &Method::GET, "/Rust").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()["x-cache"], "origin");

        let compressed = body(response).await;
        let mut html = String::new();
        flate2::read::GzDecoder::new(compressed.as_ref())
            .read_to_string(&mut html)
            .unwrap();
        assert_eq!(html, "<html>Rust</html>");

        let again = respond(&engine, &Method::GET, "/Rust").await;
        assert_eq!(again.headers()["x-cache"], "memory");
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        let unknown = respond(&engine, &Method::GET, "/Unknown").await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let gone = respond(&engine, &Method::GET, "/Gone").await;
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);

        let flaky = respond(&engine, &Method::GET, "/Flaky").await;
        assert_eq!(flaky.status(), StatusCode::BAD_GATEWAY);

        let post = respond(&engine, &Method::POST, "/Rust").await;
        assert_eq!(post.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_operational_endpoints() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        respond(&engine, &Method::GET, "/Rust").await;

        let health = respond(&engine, &Method::GET, "/_cdn/healthz").await;
        assert_eq!(body(health).await.as_ref(), b"ok");

        let stats = body(respond(&engine, &Method::GET, "/_cdn/stats").await).await;
        let stats: serde_json::Value = serde_json::from_slice(&stats).unwrap();
        assert_eq!(stats["records"], 3);
        assert_eq!(stats["memory_entries"], 1);

        let metrics = body(respond(&engine, &Method::GET, "/_cdn/metrics").await).await;
        let metrics = String::from_utf8(metrics.to_vec()).unwrap();
        assert!(metrics.contains("cdn_cache_origin_fetches_total 1"));

        let unknown = respond(&engine, &Method::GET, "/_cdn/nope").await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_articles_named_like_endpoints_are_served() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            admit_unknown: true,
            ..Default::default()
        };
        let engine = CacheEngine::build(config, vec![], Arc::new(Origin), Arc::new(GzipCompressor::new()))
            .await
            .unwrap();

        // An article path, so the origin is asked
        let response = respond(&engine, &Method::GET, "/stats").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(engine.metrics().origin_fetches(), 1);
    }

    #[tokio::test]
    async fn test_head_has_get_headers_and_no_body() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        let get = respond(&engine, &Method::GET, "/Rust").await;
        let get_len = body(get).await.len() as u64;

        let head = respond(&engine, &Method::HEAD, "/Rust").await;
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(head.headers()[CONTENT_ENCODING], "gzip");
        assert_eq!(head.headers()["x-cache"], "memory");
        assert_eq!(head.headers()[CONTENT_LENGTH], get_len.to_string().as_str());
        assert!(body(head).await.is_empty());

        let missing = respond(&engine, &Method::HEAD, "/Unknown").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serves_over_tcp_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let server = HttpServer::new(HttpConfig::default(), Arc::new(engine(&dir).await));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.serve(listener, shutdown).await })
        };

        let response = reqwest::get(format!("http://{}/_cdn/healthz", addr)).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().await.unwrap(), "ok");

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }
}
