//! `fetch`-backing HTTP client (spec §4.7), built on `reqwest` the way
//! `jhead-bevy-react`'s `js/esm.rs` uses it for ESM-over-HTTP, here used for
//! script-level `fetch()` instead.

use std::collections::HashMap;

/// Plain-data result of one request, matching the response shape spec §4.7
/// hands back to JS: `{ ok, status, url, error?, data, headers }`.
#[derive(Debug, Clone)]
pub struct HttpOutcome {
    pub ok: bool,
    pub status: u16,
    pub url: String,
    pub error: Option<String>,
    pub data: Vec<u8>,
    pub headers: HashMap<String, String>,
}

pub async fn fetch(url: &str) -> HttpOutcome {
    match reqwest::get(url).await {
        Ok(response) => {
            let status = response.status().as_u16();
            let ok = response.status().is_success();
            let headers = response
                .headers()
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect();
            let final_url = response.url().to_string();
            match response.bytes().await {
                Ok(bytes) => HttpOutcome { ok, status, url: final_url, error: None, data: bytes.to_vec(), headers },
                Err(e) => HttpOutcome { ok: false, status, url: final_url, error: Some(e.to_string()), data: Vec::new(), headers },
            }
        }
        Err(e) => HttpOutcome { ok: false, status: 0, url: url.to_string(), error: Some(e.to_string()), data: Vec::new(), headers: HashMap::new() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_malformed_url_fails_without_a_status() {
        let outcome = fetch("not a url").await;
        assert!(!outcome.ok);
        assert_eq!(outcome.status, 0);
        assert!(outcome.error.is_some());
    }
}
