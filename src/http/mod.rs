//! HTTP Content Serving
//!
//! `GET /<article>` answers with the gzip-compressed article from the cache
//! engine. Operational endpoints sit under `/_cdn/`.

mod server;

pub use server::{respond, HttpConfig, HttpServer, OPS_PREFIX};
