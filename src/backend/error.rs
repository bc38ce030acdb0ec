use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("http status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None => FetchError::Network(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no image element in the fetched page")]
    MissingImage,
    #[error("listing container not found")]
    MissingContainer,
    #[error("page count marker not found")]
    MissingPageCount,
    #[error("unrecognized gallery path: {0}")]
    BadGalleryPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("image failed to load: {0}")]
pub struct RenderError(pub String);

/// Everything that can sink a single page load or pagination step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("request failed: {0}")]
    Transport(#[from] FetchError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
