use std::time::Duration;

use crate::backend::error::RenderError;
use crate::backend::extract::Card;

/// Geometry of one rendered, page-tagged image. Coordinates are relative to
/// the viewport top, like `getBoundingClientRect` in a browser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageBox {
    pub page: u32,
    pub top: f64,
    pub bottom: f64,
    /// Whether the image belongs to the loadable container (as opposed to
    /// sidebars, headers or the popular strip).
    pub in_container: bool,
}

/// One scroll observation handed in by the embedder.
#[derive(Debug, Clone, Default)]
pub struct ScrollSample {
    pub scroll_y: f64,
    pub viewport_height: f64,
    pub document_height: f64,
    pub images: Vec<ImageBox>,
}

impl ScrollSample {
    /// Fraction of the document above the bottom edge of the viewport.
    pub fn depth(&self) -> f64 {
        if self.document_height <= 0.0 {
            return 0.0;
        }
        (self.scroll_y + self.viewport_height) / self.document_height
    }
}

/// Rendering adapter for single-page mode. Methods take `&self` because up
/// to six page tasks share the surface while in flight.
pub trait GallerySurface {
    /// Placeholder block for one page, inserted in call order.
    fn insert_placeholder(&self, page: u32, total: u32);
    fn set_progress(&self, done: usize, total: usize);
    fn remove_progress(&self);
    /// Injects the image into the page's slot and resolves once the
    /// rendering layer has it ready (or failed).
    async fn attach_image(&self, page: u32, src: &str) -> Result<(), RenderError>;
    /// Paints a failure reason into the page's placeholder, in place.
    fn set_page_error(&self, page: u32, message: &str);
}

/// Rendering adapter for the scroll-paginated listing view. Pagination steps
/// are strictly serialized, so plain `&mut self` is enough.
pub trait ListingSurface {
    /// Re-applies the already-rendered first page: lazy sources made eager
    /// and every card tagged with its page number.
    fn apply_initial_cards(&mut self, cards: &[Card]);
    /// Drops whatever pagination control is currently in the view.
    fn remove_pagination(&mut self);
    fn show_loading(&mut self);
    fn remove_loading(&mut self);
    /// One batched insertion, cards in original order.
    fn append_cards(&mut self, cards: Vec<Card>);
    fn show_end(&mut self);
    fn update_indicator(&mut self, page: u32, total: Option<u32>);
    fn show_retrying(&mut self, attempt: u32);
    /// Terminal failure message; the adapter dismisses it after `linger`.
    fn flash_failure(&mut self, message: &str, linger: Duration);
    /// Removes the indicator and any other chrome this surface added.
    fn teardown(&mut self);
}
