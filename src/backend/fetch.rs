use log::debug;
use url::Url;

use super::error::FetchError;

pub trait PageFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("gallery-scroll/0.1.0")
            .build()
            .expect("failed to build http client");
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        debug!("fetching {url}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Gallery page N lives at `/{kind}/{id}/{N}/`, without any query flags.
pub fn gallery_page_url(base: &Url, kind: &str, gallery_id: &str, page: u32) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("/{kind}/{gallery_id}/{page}/"));
    url.set_query(None);
    url
}

/// Clones the captured query string with `page` overwritten; every other
/// parameter is preserved as-is.
pub fn with_page_param(base: &Url, page: u32) -> Url {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = base.clone();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("page", &page.to_string());
    }
    url
}

pub fn page_param(url: &Url) -> Option<u32> {
    url.query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok())
}
