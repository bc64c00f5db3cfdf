pub mod rest;
pub mod websocket;

use reqwest::Client;
use std::time::Duration;

use crate::config::IngestCfg;

/// Shared exchange connection state: the HTTP client and endpoint bases.
pub struct Connection {
    pub(crate) http: Client,
    pub(crate) cfg: IngestCfg,
}

impl Connection {
    pub fn new(cfg: IngestCfg) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build http client");
        Self { http, cfg }
    }

    pub(crate) fn rest_base(&self) -> &str {
        self.cfg.rest_base_url.trim_end_matches('/')
    }

    pub(crate) fn ws_base(&self) -> &str {
        self.cfg.ws_base_url.trim_end_matches('/')
    }
}
