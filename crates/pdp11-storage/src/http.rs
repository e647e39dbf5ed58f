use crate::cache::BLOCK_SIZE;
use crate::error::FetchError;
use crate::fetch::{RangeResponse, RangeStatus};
use bytes::Bytes;
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::header::RANGE;
use hyper::{Body, Client, Method, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use url::Url;

/// Block fetcher over HTTP.
///
/// Each fetch covers exactly one 1 MiB block with a closed-interval `Range`
/// header. Servers that ignore `Range` answer 200 with the whole image, which
/// [`crate::install_response`] handles by re-anchoring at block 0; servers
/// asked past the end answer 416, which installs a zero block.
pub struct HttpRangeSource {
    client: Client<hyper_rustls::HttpsConnector<HttpConnector>>,
}

impl HttpRangeSource {
    pub fn new() -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            client: Client::builder().build::<_, Body>(https),
        }
    }

    /// Fetch the block covering `[block * 1MiB, (block + 1) * 1MiB - 1]`.
    pub async fn fetch_block(&self, url: &Url, block: u64) -> Result<RangeResponse, FetchError> {
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        let start = block * BLOCK_SIZE;
        let end = start + BLOCK_SIZE - 1;
        let req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(RANGE, format!("bytes={start}-{end}"))
            .body(Body::empty())
            .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        tracing::debug!(url = %url, block, "fetching image block");
        let mut resp = self.client.request(req).await?;

        let status = match resp.status() {
            StatusCode::OK => RangeStatus::Full,
            StatusCode::PARTIAL_CONTENT => RangeStatus::Partial,
            StatusCode::RANGE_NOT_SATISFIABLE => {
                return Ok(RangeResponse {
                    status: RangeStatus::Unsatisfiable,
                    body: Vec::new(),
                })
            }
            other => {
                return Err(FetchError::Transport {
                    status: other.as_u16(),
                    reason: format!("GET {url}"),
                })
            }
        };

        let mut body = Vec::new();
        while let Some(chunk) = resp.body_mut().data().await {
            let chunk: Bytes = chunk?;
            body.extend_from_slice(&chunk);
        }

        Ok(RangeResponse { status, body })
    }
}

impl Default for HttpRangeSource {
    fn default() -> Self {
        Self::new()
    }
}
