use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::error::ExtractError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryInfo {
    pub kind: String,
    pub id: String,
    pub start_page: u32,
    pub total_pages: u32,
}

/// One listing entry, lifted out of the fetched markup with its lazy cover
/// already rewritten to an eager source and tagged with the page it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub page: u32,
    pub href: Option<String>,
    pub caption: Option<String>,
    pub cover_src: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Listing,
    Favorites,
}

impl ViewKind {
    pub fn from_path(path: &str) -> Self {
        if path == "/favorites/" {
            ViewKind::Favorites
        } else {
            ViewKind::Listing
        }
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// The single designated image of a gallery page.
pub fn gallery_image_src(html: &str) -> Result<String, ExtractError> {
    let doc = Html::parse_document(html);
    doc.select(&selector("#image-container img"))
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_owned)
        .ok_or(ExtractError::MissingImage)
}

/// Gallery identity from the URL path (`/{kind}/{id}/{page}/`), total page
/// count from the page's `.num-pages` marker.
pub fn gallery_info(url: &Url, html: &str) -> Result<GalleryInfo, ExtractError> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|split| split.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let (kind, id) = match segments.as_slice() {
        [kind, id, ..] => (kind.to_string(), id.to_string()),
        _ => return Err(ExtractError::BadGalleryPath(url.path().to_string())),
    };
    let start_page = segments.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);

    let doc = Html::parse_document(html);
    let total_pages = doc
        .select(&selector(".num-pages"))
        .next()
        .and_then(|el| el.text().collect::<String>().trim().parse().ok())
        .ok_or(ExtractError::MissingPageCount)?;

    Ok(GalleryInfo {
        kind,
        id,
        start_page,
        total_pages,
    })
}

/// Total page count from the pagination control: the "last page" link's
/// `page=` parameter, else the highest numbered page link, else 1. `None`
/// when the document has no pagination control at all (unbounded listing).
pub fn listing_total_pages(html: &str) -> Option<u32> {
    let doc = Html::parse_document(html);
    let pagination = doc.select(&selector(".pagination")).next()?;

    let from_last_link = pagination
        .select(&selector(".last"))
        .next()
        .and_then(|link| link.value().attr("href"))
        .and_then(page_param_in_href);
    if let Some(total) = from_last_link {
        return Some(total);
    }

    let from_page_links = pagination
        .select(&selector(".page"))
        .last()
        .and_then(|link| link.text().collect::<String>().trim().parse().ok());

    Some(from_page_links.unwrap_or(1))
}

fn page_param_in_href(href: &str) -> Option<u32> {
    let (_, query) = href.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|value| value.parse().ok())
}

/// Collects the loadable container's child cards, skipping any nested
/// pagination control, in original document order.
pub fn listing_cards(html: &str, view: ViewKind, page: u32) -> Result<Vec<Card>, ExtractError> {
    let doc = Html::parse_document(html);
    let container = select_container(&doc, view).ok_or(ExtractError::MissingContainer)?;

    let cards = container
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| !child.value().classes().any(|c| c == "pagination"))
        .map(|child| card_from_element(child, page))
        .collect();
    Ok(cards)
}

/// Container precedence: favorites views have a dedicated id, everything
/// else takes the first index container that is not the "popular" strip.
fn select_container<'a>(doc: &'a Html, view: ViewKind) -> Option<ElementRef<'a>> {
    match view {
        ViewKind::Favorites => doc.select(&selector("#favcontainer")).next(),
        ViewKind::Listing => doc
            .select(&selector(".container.index-container"))
            .find(|el| !el.value().classes().any(|c| c == "index-popular")),
    }
}

fn card_from_element(el: ElementRef<'_>, page: u32) -> Card {
    let href = if el.value().name() == "a" {
        el.value().attr("href").map(str::to_owned)
    } else {
        el.select(&selector("a"))
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_owned)
    };

    let cover_src = el.select(&selector("img")).next().and_then(eager_src);

    let caption = el
        .select(&selector(".caption"))
        .next()
        .map(|c| c.text().collect::<String>().trim().to_owned())
        .filter(|text| !text.is_empty());

    Card {
        page,
        href,
        caption,
        cover_src,
    }
}

// Lazy covers keep their real source in data-src until activated.
fn eager_src(img: ElementRef<'_>) -> Option<String> {
    let el = img.value();
    if el.classes().any(|c| c == "lazyload") {
        if let Some(src) = el.attr("data-src") {
            return Some(src.to_owned());
        }
    }
    el.attr("src").map(str::to_owned)
}
