mod backend;
mod scroll;
mod ui;

use std::env;
use std::error::Error;
use std::time::Duration;

use log::info;
use tokio::sync::mpsc;
use url::Url;

use backend::extract;
use backend::fetch::{HttpFetcher, PageFetcher};
use scroll::gallery::GalleryStitcher;
use scroll::listing::{InfiniteScroll, ScrollDriver};
use scroll::surface::ScrollSample;
use ui::console::ConsoleSurface;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let arg = env::args().nth(1).ok_or("usage: gallery-scroll <url>")?;
    let url = Url::parse(&arg)?;

    let fetcher = HttpFetcher::new();
    let surface = ConsoleSurface::new();

    let single_mode = url.query_pairs().any(|(k, v)| k == "single" && v == "true");
    if single_mode {
        run_single_page(fetcher, surface, url).await
    } else {
        run_infinite_scroll(fetcher, surface, url).await
    }
}

async fn run_single_page(
    fetcher: HttpFetcher,
    surface: ConsoleSurface,
    url: Url,
) -> Result<(), Box<dyn Error>> {
    let html = fetcher.fetch_html(url.as_str()).await?;
    let gallery = extract::gallery_info(&url, &html)?;
    info!(
        "gallery {}/{}: stitching pages {}..={}",
        gallery.kind, gallery.id, gallery.start_page, gallery.total_pages
    );

    let stitcher = GalleryStitcher::new(fetcher, surface);
    let results = stitcher.run(&url, &gallery).await;

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!("{} pages loaded, {failed} failed", results.len() - failed);
    Ok(())
}

async fn run_infinite_scroll(
    fetcher: HttpFetcher,
    surface: ConsoleSurface,
    url: Url,
) -> Result<(), Box<dyn Error>> {
    let html = fetcher.fetch_html(url.as_str()).await?;
    let loader = InfiniteScroll::new(fetcher, surface, url, &html)?;

    // Headless embedding: there is no real viewport, so keep feeding the
    // driver samples that sit past the fetch threshold until the loader
    // runs out of pages.
    let (tx, rx) = mpsc::unbounded_channel();
    let feeder = tokio::spawn(async move {
        loop {
            let sample = ScrollSample {
                scroll_y: 9_000.0,
                viewport_height: 1_000.0,
                document_height: 10_000.0,
                images: Vec::new(),
            };
            if tx.send(sample).is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    });

    let loader = ScrollDriver::new(loader).run(rx).await;
    feeder.abort();

    info!(
        "stopped at page {} of {:?}",
        loader.current_page(),
        loader.total_pages()
    );
    Ok(())
}
