use std::io::Cursor;
use std::time::Duration;

use image::GenericImageView;
use log::{info, warn};

use crate::backend::error::RenderError;
use crate::backend::extract::Card;
use crate::scroll::surface::{GallerySurface, ListingSurface};

/// Stands in for the live page when running headless: loader output becomes
/// log lines, and an image is "loaded" by fetching and decoding it, so a
/// broken source fails at the rendering layer just like a browser `<img>`.
pub struct ConsoleSurface {
    client: reqwest::Client,
    cards_rendered: usize,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("gallery-scroll/0.1.0")
            .build()
            .expect("failed to build http client");
        Self {
            client,
            cards_rendered: 0,
        }
    }
}

impl Default for ConsoleSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl GallerySurface for ConsoleSurface {
    fn insert_placeholder(&self, page: u32, total: u32) {
        info!("placeholder {page}/{total}");
    }

    fn set_progress(&self, done: usize, total: usize) {
        info!("loading... {done}/{total}");
    }

    fn remove_progress(&self) {
        info!("all pages settled");
    }

    async fn attach_image(&self, page: u32, src: &str) -> Result<(), RenderError> {
        let response = self
            .client
            .get(src)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RenderError(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError(e.to_string()))?;

        let image = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| RenderError(e.to_string()))?
            .decode()
            .map_err(|e| RenderError(e.to_string()))?;

        let (width, height) = image.dimensions();
        info!("page {page}: {width}x{height} ({src})");
        Ok(())
    }

    fn set_page_error(&self, page: u32, message: &str) {
        warn!("page {page}: {message}");
    }
}

impl ListingSurface for ConsoleSurface {
    fn apply_initial_cards(&mut self, cards: &[Card]) {
        self.cards_rendered = cards.len();
        info!("listing primed with {} cards", cards.len());
    }

    fn remove_pagination(&mut self) {}

    fn show_loading(&mut self) {
        info!("loading next page...");
    }

    fn remove_loading(&mut self) {}

    fn append_cards(&mut self, cards: Vec<Card>) {
        for card in &cards {
            info!(
                "  p{} {} {}",
                card.page,
                card.href.as_deref().unwrap_or("-"),
                card.caption.as_deref().unwrap_or("")
            );
        }
        self.cards_rendered += cards.len();
    }

    fn show_end(&mut self) {
        info!("- nothing more to load -");
    }

    fn update_indicator(&mut self, page: u32, total: Option<u32>) {
        match total {
            Some(total) => info!("page {page} / {total}"),
            None => info!("page {page}"),
        }
    }

    fn show_retrying(&mut self, attempt: u32) {
        warn!("load failed, retrying ({attempt})...");
    }

    fn flash_failure(&mut self, message: &str, _linger: Duration) {
        warn!("load failed: {message}");
    }

    fn teardown(&mut self) {
        info!("listing finished with {} cards", self.cards_rendered);
    }
}
