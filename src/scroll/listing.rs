use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, sleep};
use url::Url;

use super::surface::{ListingSurface, ScrollSample};
use crate::backend::error::LoadError;
use crate::backend::extract::{self, ViewKind};
use crate::backend::fetch::{PageFetcher, page_param, with_page_param};

const SCROLL_THRESHOLD: f64 = 0.8;
const THROTTLE_DELAY: Duration = Duration::from_millis(200);
const THROTTLE_TICK: Duration = Duration::from_millis(50);
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const FAILURE_LINGER: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    LoadingNext,
    ErrorRetrying,
    End,
}

/// Scroll-driven pagination for listing views: tracks the cursor, appends
/// the next page when the reader scrolls deep enough, and keeps a cosmetic
/// "currently visible page" indicator fresh.
pub struct InfiniteScroll<F, S> {
    fetcher: F,
    surface: S,
    base: Url,
    view: ViewKind,
    current_page: u32,
    total_pages: Option<u32>,
    phase: Phase,
    end_shown: bool,
}

impl<F: PageFetcher, S: ListingSurface> InfiniteScroll<F, S> {
    /// Bootstraps from the listing document that is already on screen: reads
    /// the cursor from the URL, the total from the pagination control, makes
    /// the first page's lazy images eager, and discards the control.
    pub fn new(fetcher: F, mut surface: S, url: Url, html: &str) -> Result<Self, LoadError> {
        let view = ViewKind::from_path(url.path());
        let current_page = page_param(&url).unwrap_or(1);
        let total_pages = extract::listing_total_pages(html);

        let cards = extract::listing_cards(html, view, current_page)?;
        surface.apply_initial_cards(&cards);
        surface.remove_pagination();
        surface.update_indicator(current_page, total_pages);
        info!("infinite scroll ready at page {current_page}, total {total_pages:?}");

        Ok(Self {
            fetcher,
            surface,
            base: url,
            view,
            current_page,
            total_pages,
            phase: Phase::Idle,
            end_shown: false,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    fn has_more(&self) -> bool {
        match self.total_pages {
            Some(total) => self.current_page < total,
            None => true,
        }
    }

    /// Pure fetch decision: one load at a time, never past the last page,
    /// only when the viewport is deep enough into the document.
    fn should_fetch(&self, sample: &ScrollSample) -> bool {
        self.phase == Phase::Idle && self.has_more() && sample.depth() >= SCROLL_THRESHOLD
    }

    pub async fn handle_scroll(&mut self, sample: &ScrollSample) {
        if let Some(page) = viewport_focus_page(sample) {
            self.surface.update_indicator(page, self.total_pages);
        }
        if self.should_fetch(sample) {
            self.load_next_page().await;
        }
    }

    /// One pagination step. The retry budget is local to the step, so it
    /// resets every time a step begins. The loading indicator and flag are
    /// cleared on every exit path.
    pub async fn load_next_page(&mut self) {
        self.phase = Phase::LoadingNext;
        self.surface.show_loading();
        self.surface.remove_pagination();

        if !self.has_more() {
            self.finish();
        } else {
            let mut attempt = 0;
            loop {
                match self.append_next().await {
                    Ok(()) => break,
                    Err(err) if attempt < MAX_RETRIES => {
                        attempt += 1;
                        warn!(
                            "page {} failed ({err}), retry {attempt}/{MAX_RETRIES}",
                            self.current_page + 1
                        );
                        self.phase = Phase::ErrorRetrying;
                        self.surface.show_retrying(attempt);
                        sleep(RETRY_DELAY).await;
                        self.phase = Phase::LoadingNext;
                    }
                    Err(err) => {
                        warn!("page {} failed for good: {err}", self.current_page + 1);
                        self.surface.flash_failure(&err.to_string(), FAILURE_LINGER);
                        break;
                    }
                }
            }
        }

        self.surface.remove_loading();
        if self.phase != Phase::End {
            self.phase = Phase::Idle;
        }
    }

    async fn append_next(&mut self) -> Result<(), LoadError> {
        let next = self.current_page + 1;
        let url = with_page_param(&self.base, next);
        debug!("appending listing page {next} from {url}");

        let html = self.fetcher.fetch_html(url.as_str()).await?;
        let cards = extract::listing_cards(&html, self.view, next)?;
        self.surface.append_cards(cards);

        self.current_page = next;
        self.surface.update_indicator(next, self.total_pages);
        if !self.has_more() {
            self.finish();
        }
        Ok(())
    }

    // Terminal state; the end marker is rendered exactly once no matter how
    // often this runs.
    fn finish(&mut self) {
        self.phase = Phase::End;
        if !self.end_shown {
            self.end_shown = true;
            self.surface.show_end();
        }
    }

    pub fn teardown(&mut self) {
        self.surface.teardown();
    }
}

/// Best-effort "which page is the reader looking at": the first image whose
/// box crosses the vertical midpoint of the viewport. If that image is not
/// part of the loadable container, fall back to the container's own images
/// anywhere inside the viewport.
pub fn viewport_focus_page(sample: &ScrollSample) -> Option<u32> {
    let midpoint = sample.viewport_height / 2.0;
    for image in &sample.images {
        if image.top <= midpoint && image.bottom >= 0.0 {
            if image.in_container {
                return Some(image.page);
            }
            return sample
                .images
                .iter()
                .filter(|i| i.in_container)
                .find(|i| i.top <= sample.viewport_height && i.bottom >= 0.0)
                .map(|i| i.page);
        }
    }
    None
}

/// Feeds scroll samples to a loader with a leading debounce: the first
/// sample arms the throttle window, samples inside the window are dropped,
/// and the armed sample is handled once the window elapses.
pub struct ScrollDriver<F, S> {
    loader: InfiniteScroll<F, S>,
}

impl<F: PageFetcher, S: ListingSurface> ScrollDriver<F, S> {
    pub fn new(loader: InfiniteScroll<F, S>) -> Self {
        Self { loader }
    }

    /// Runs until the loader reaches the end state or the sample channel
    /// closes, then tears the surface down. The loader comes back for
    /// inspection.
    pub async fn run(mut self, mut samples: UnboundedReceiver<ScrollSample>) -> InfiniteScroll<F, S> {
        let mut armed: Option<(Instant, ScrollSample)> = None;
        loop {
            let window_elapsed = armed
                .as_ref()
                .is_some_and(|(since, _)| since.elapsed() >= THROTTLE_DELAY);
            if window_elapsed {
                if let Some((_, sample)) = armed.take() {
                    self.loader.handle_scroll(&sample).await;
                    if self.loader.phase() == Phase::End {
                        break;
                    }
                }
            }

            tokio::select! {
                _ = sleep(THROTTLE_TICK) => {}
                received = samples.recv() => match received {
                    Some(sample) => {
                        if armed.is_none() {
                            armed = Some((Instant::now(), sample));
                        }
                    }
                    None => break,
                },
            }
        }

        self.loader.teardown();
        self.loader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::FetchError;
    use crate::backend::extract::Card;
    use crate::scroll::surface::ImageBox;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Initial(usize),
        PaginationRemoved,
        Loading,
        LoadingRemoved,
        Appended(Vec<u32>),
        End,
        Indicator(u32, Option<u32>),
        Retrying(u32),
        Failure(String),
        Teardown,
    }

    #[derive(Default)]
    struct FakeSurface {
        events: Vec<Event>,
    }

    impl ListingSurface for FakeSurface {
        fn apply_initial_cards(&mut self, cards: &[Card]) {
            self.events.push(Event::Initial(cards.len()));
        }

        fn remove_pagination(&mut self) {
            self.events.push(Event::PaginationRemoved);
        }

        fn show_loading(&mut self) {
            self.events.push(Event::Loading);
        }

        fn remove_loading(&mut self) {
            self.events.push(Event::LoadingRemoved);
        }

        fn append_cards(&mut self, cards: Vec<Card>) {
            self.events
                .push(Event::Appended(cards.iter().map(|c| c.page).collect()));
        }

        fn show_end(&mut self) {
            self.events.push(Event::End);
        }

        fn update_indicator(&mut self, page: u32, total: Option<u32>) {
            self.events.push(Event::Indicator(page, total));
        }

        fn show_retrying(&mut self, attempt: u32) {
            self.events.push(Event::Retrying(attempt));
        }

        fn flash_failure(&mut self, message: &str, _linger: Duration) {
            self.events.push(Event::Failure(message.to_string()));
        }

        fn teardown(&mut self) {
            self.events.push(Event::Teardown);
        }
    }

    struct ScriptedFetcher {
        script: Mutex<VecDeque<Result<String, FetchError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Result<String, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl PageFetcher for &ScriptedFetcher {
        async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Status(404)))
        }
    }

    fn listing_html(page: u32, total: Option<u32>) -> String {
        let pagination = match total {
            Some(total) => format!(
                r#"<section class="pagination"><a class="page" href="?page=1">1</a><a class="last" href="?page={total}">Last</a></section>"#
            ),
            None => String::new(),
        };
        format!(
            r#"
            <div class="container index-container index-popular">
                <div class="gallery"><a href="/g/1/"><img class="lazyload" data-src="https://t.example/pop.jpg"></a></div>
            </div>
            <div class="container index-container">
                <div class="gallery">
                    <a class="cover" href="/g/{page}01/"><img class="lazyload" data-src="https://t.example/{page}01.jpg"></a>
                    <div class="caption">Work {page}01</div>
                </div>
                <div class="gallery">
                    <a class="cover" href="/g/{page}02/"><img class="lazyload" data-src="https://t.example/{page}02.jpg"></a>
                    <div class="caption">Work {page}02</div>
                </div>
                {pagination}
            </div>
            "#
        )
    }

    fn loader_at(
        fetcher: &ScriptedFetcher,
        page: u32,
        total: Option<u32>,
    ) -> InfiniteScroll<&ScriptedFetcher, FakeSurface> {
        let url = Url::parse(&format!("https://example.net/search/?q=cats&page={page}")).unwrap();
        InfiniteScroll::new(fetcher, FakeSurface::default(), url, &listing_html(page, total))
            .unwrap()
    }

    fn sample(depth: f64) -> ScrollSample {
        ScrollSample {
            scroll_y: depth * 1000.0 - 500.0,
            viewport_height: 500.0,
            document_height: 1000.0,
            images: Vec::new(),
        }
    }

    #[tokio::test]
    async fn bootstrap_reads_cursor_and_total() {
        let fetcher = ScriptedFetcher::new(Vec::new());
        let loader = loader_at(&fetcher, 4, Some(9));

        assert_eq!(loader.current_page, 4);
        assert_eq!(loader.total_pages, Some(9));
        assert_eq!(
            loader.surface.events,
            vec![
                Event::Initial(2),
                Event::PaginationRemoved,
                Event::Indicator(4, Some(9)),
            ]
        );
    }

    #[tokio::test]
    async fn missing_pagination_means_unbounded() {
        let fetcher = ScriptedFetcher::new(Vec::new());
        let loader = loader_at(&fetcher, 1, None);
        assert_eq!(loader.total_pages, None);
        assert!(loader.has_more());
    }

    #[tokio::test]
    async fn fetch_triggers_only_past_the_threshold() {
        let fetcher = ScriptedFetcher::new(vec![Ok(listing_html(2, Some(3)))]);
        let mut loader = loader_at(&fetcher, 1, Some(3));

        loader.handle_scroll(&sample(0.5)).await;
        assert_eq!(fetcher.call_count(), 0);

        loader.handle_scroll(&sample(0.9)).await;
        assert_eq!(fetcher.call_count(), 1);
        assert!(fetcher.calls.lock().unwrap()[0].contains("page=2"));
        assert!(fetcher.calls.lock().unwrap()[0].contains("q=cats"));
        assert_eq!(loader.current_page, 2);
        assert!(loader.surface.events.contains(&Event::Appended(vec![2, 2])));
    }

    #[tokio::test]
    async fn no_fetch_while_a_load_is_in_flight() {
        let fetcher = ScriptedFetcher::new(Vec::new());
        let mut loader = loader_at(&fetcher, 1, Some(3));

        loader.phase = Phase::LoadingNext;
        assert!(!loader.should_fetch(&sample(0.95)));
        loader.phase = Phase::ErrorRetrying;
        assert!(!loader.should_fetch(&sample(0.95)));
        loader.phase = Phase::Idle;
        assert!(loader.should_fetch(&sample(0.95)));
    }

    #[tokio::test]
    async fn end_marker_is_rendered_exactly_once() {
        let fetcher = ScriptedFetcher::new(vec![Ok(listing_html(3, Some(3)))]);
        let mut loader = loader_at(&fetcher, 2, Some(3));

        loader.handle_scroll(&sample(0.9)).await;
        assert_eq!(loader.phase, Phase::End);
        assert_eq!(loader.current_page, 3);

        // further deep scrolls and even a direct re-invocation change nothing
        loader.handle_scroll(&sample(0.95)).await;
        loader.load_next_page().await;

        assert_eq!(fetcher.call_count(), 1);
        let ends = loader
            .surface
            .events
            .iter()
            .filter(|e| **e == Event::End)
            .count();
        assert_eq!(ends, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_and_the_budget_resets_per_step() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::Status(502)),
            Err(FetchError::Network("connection reset".into())),
            Ok(listing_html(2, Some(5))),
            Err(FetchError::Status(502)),
            Err(FetchError::Status(502)),
            Ok(listing_html(3, Some(5))),
        ]);
        let mut loader = loader_at(&fetcher, 1, Some(5));

        loader.load_next_page().await;
        assert_eq!(loader.current_page, 2);

        loader.load_next_page().await;
        assert_eq!(loader.current_page, 3);

        assert_eq!(fetcher.call_count(), 6);
        let retries: Vec<u32> = loader
            .surface
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Retrying(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(retries, vec![1, 2, 1, 2]);
        assert!(
            !loader
                .surface
                .events
                .iter()
                .any(|e| matches!(e, Event::Failure(_)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_flash_a_failure_and_return_to_idle() {
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::Status(500)); 4]);
        let mut loader = loader_at(&fetcher, 1, Some(5));

        loader.load_next_page().await;

        // initial try plus three retries
        assert_eq!(fetcher.call_count(), 4);
        assert_eq!(loader.phase, Phase::Idle);
        assert_eq!(loader.current_page, 1);
        assert!(
            loader
                .surface
                .events
                .iter()
                .any(|e| matches!(e, Event::Failure(msg) if msg.contains("500")))
        );
        assert_eq!(loader.surface.events.last(), Some(&Event::LoadingRemoved));

        // a later deep scroll is allowed to try again
        assert!(loader.should_fetch(&sample(0.9)));
    }

    #[tokio::test(start_paused = true)]
    async fn driver_debounces_scroll_bursts() {
        let fetcher = ScriptedFetcher::new(vec![Ok(listing_html(2, Some(2)))]);
        let loader = loader_at(&fetcher, 1, Some(2));

        let (tx, rx) = mpsc::unbounded_channel();
        let feeder = async {
            for _ in 0..5 {
                tx.send(sample(0.9)).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(400)).await;
            drop(tx);
        };

        let (loader, ()) = tokio::join!(ScrollDriver::new(loader).run(rx), feeder);

        // the burst collapses into one handled sample, hence one fetch
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(loader.phase, Phase::End);
        assert_eq!(loader.surface.events.last(), Some(&Event::Teardown));
    }

    #[test]
    fn focus_picks_the_midpoint_crossing_container_image() {
        let sample = ScrollSample {
            scroll_y: 0.0,
            viewport_height: 600.0,
            document_height: 2000.0,
            images: vec![
                ImageBox { page: 1, top: -400.0, bottom: -100.0, in_container: true },
                ImageBox { page: 2, top: 100.0, bottom: 500.0, in_container: true },
                ImageBox { page: 3, top: 550.0, bottom: 900.0, in_container: true },
            ],
        };
        assert_eq!(viewport_focus_page(&sample), Some(2));
    }

    #[test]
    fn focus_falls_back_to_container_images_in_the_viewport() {
        // a sidebar image crosses the midpoint first
        let sample = ScrollSample {
            scroll_y: 0.0,
            viewport_height: 600.0,
            document_height: 2000.0,
            images: vec![
                ImageBox { page: 7, top: 200.0, bottom: 280.0, in_container: false },
                ImageBox { page: 3, top: 400.0, bottom: 580.0, in_container: true },
            ],
        };
        assert_eq!(viewport_focus_page(&sample), Some(3));
    }

    #[test]
    fn focus_is_none_without_a_visible_image() {
        let sample = ScrollSample {
            scroll_y: 0.0,
            viewport_height: 600.0,
            document_height: 2000.0,
            images: vec![ImageBox { page: 4, top: 700.0, bottom: 1000.0, in_container: true }],
        };
        assert_eq!(viewport_focus_page(&sample), None);
    }
}
