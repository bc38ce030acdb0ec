use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, warn};
use url::Url;

use super::surface::GallerySurface;
use crate::backend::error::LoadError;
use crate::backend::extract::{self, GalleryInfo};
use crate::backend::fetch::{PageFetcher, gallery_page_url};
use crate::backend::scheduler::run_limited;

const CONCURRENT_PAGE_LOADS: usize = 6;

/// Single-page mode: fetches every page of a gallery and renders them into
/// one continuous scroll view.
pub struct GalleryStitcher<F, S> {
    fetcher: F,
    surface: S,
}

impl<F: PageFetcher, S: GallerySurface> GalleryStitcher<F, S> {
    pub fn new(fetcher: F, surface: S) -> Self {
        Self { fetcher, surface }
    }

    /// Populates the surface with pages `start_page..=total_pages`.
    ///
    /// Placeholders go in synchronously, in page order, so the visual order
    /// never depends on fetch completion order. Each page then loads as its
    /// own task with bounded parallelism; a failed page paints its reason
    /// into its own slot and leaves its siblings alone. Outcomes come back
    /// in page order.
    pub async fn run(&self, base: &Url, gallery: &GalleryInfo) -> Vec<Result<u32, LoadError>> {
        let pages: Vec<u32> = (gallery.start_page..=gallery.total_pages).collect();
        let total_tasks = pages.len();

        self.surface.set_progress(0, total_tasks);
        for &page in &pages {
            self.surface.insert_placeholder(page, gallery.total_pages);
        }

        let done = AtomicUsize::new(0);
        let tasks: Vec<_> = pages
            .iter()
            .map(|&page| {
                let url = gallery_page_url(base, &gallery.kind, &gallery.id, page);
                let fetcher = &self.fetcher;
                let surface = &self.surface;
                let done = &done;
                move || async move {
                    match load_page(fetcher, surface, page, url.as_str()).await {
                        Ok(()) => {
                            let settled = done.fetch_add(1, Ordering::Relaxed) + 1;
                            surface.set_progress(settled, total_tasks);
                            Ok(page)
                        }
                        Err(err) => {
                            warn!("gallery page {page} failed: {err}");
                            surface.set_page_error(page, &err.to_string());
                            Err(err)
                        }
                    }
                }
            })
            .collect();

        let results = run_limited(tasks, CONCURRENT_PAGE_LOADS).await;
        self.surface.remove_progress();
        results
    }
}

async fn load_page<F: PageFetcher, S: GallerySurface>(
    fetcher: &F,
    surface: &S,
    page: u32,
    url: &str,
) -> Result<(), LoadError> {
    debug!("loading gallery page {page} from {url}");
    let html = fetcher.fetch_html(url).await?;
    let src = extract::gallery_image_src(&html)?;
    surface.attach_image(page, &src).await?;
    Ok(())
}
