//! Retrieval of the remote index document.

use reqwest::{Client, Url};
use thiserror::Error;

/// The index could not be retrieved. Without it there is nothing to
/// mirror, so this ends the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to fetch index {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP error {status} fetching index {url}")]
    HttpStatus { status: u16, url: String },
}

/// HTTP client shared by the index fetch and all package downloads.
pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("opkgsync/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Download the index text.
pub async fn fetch_index(client: &Client, url: &Url) -> Result<String, FetchError> {
    let http_err = |source| FetchError::Http {
        url: url.to_string(),
        source,
    };

    tracing::info!("Fetching index from {}", url);
    let response = client.get(url.clone()).send().await.map_err(http_err)?;
    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }
    let text = response.text().await.map_err(http_err)?;
    tracing::debug!(bytes = text.len(), "Fetched index");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_index_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/Packages"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Filename: a.ipk\n"))
            .mount(&server)
            .await;
        let url = Url::parse(&format!("{}/feed/Packages", server.uri())).unwrap();

        let text = fetch_index(&build_client().unwrap(), &url).await.unwrap();
        assert_eq!(text, "Filename: a.ipk\n");
    }

    #[tokio::test]
    async fn test_fetch_index_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let url = Url::parse(&format!("{}/feed/Packages", server.uri())).unwrap();

        let err = fetch_index(&build_client().unwrap(), &url).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_index_connection_error() {
        let url = Url::parse("http://127.0.0.1:1/Packages").unwrap();
        let err = fetch_index(&build_client().unwrap(), &url).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { .. }));
    }
}
