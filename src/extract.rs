use scraper::Html;
use url::Url;

use crate::panels;
use crate::raster;
use crate::view::{DocumentView, SnapshotView};

// ── Constants ────────────────────────────────────────────────────────────────

const USER_AGENT: &str = "img2img-canvas-api/1.0";

const IMAGE_TAG: &str = "img";
const IMAGE_CLASS: &str = "forge-image";
const CANVAS_TAG: &str = "canvas";
const CANVAS_CLASS: &str = "forge-drawing-canvas";

/// Snapshot attribute carrying a drawing canvas's backing bitmap. Canvas
/// pixel content does not survive HTML serialization, so the host captures
/// it here when it takes the snapshot.
const CANVAS_BITMAP_ATTR: &str = "data-bitmap";

// ── Error type ───────────────────────────────────────────────────────────────

/// Internal failure causes. The public operations collapse every variant to
/// the empty string; the distinction exists for logging and tests.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("no container element for id {0}")]
    ContainerNotFound(String),
    #[error("active panel has no extractable target")]
    NoTarget,
    #[error("no valid image source or canvas content")]
    NothingToExtract,
    #[error("image source did not load: {0}")]
    SourceLoad(String),
    #[error("bitmap decode failed: {0}")]
    Decode(String),
    #[error("png serialization failed: {0}")]
    Encode(String),
}

// ── Extraction plan ──────────────────────────────────────────────────────────

/// What the DOM inspection decided to serialize. Planning is synchronous and
/// borrows nothing from the document, so the snapshot can be dropped before
/// any source bytes are fetched.
#[derive(Debug, Clone)]
pub enum ExtractionPlan {
    /// Rasterize the image source. If the source turns out never to have
    /// loaded (undecodable, or natural width 0), fall back to the canvas,
    /// exactly as an unloaded image element would.
    Image {
        src: String,
        fallback: Option<CanvasTarget>,
    },
    Canvas(CanvasTarget),
}

#[derive(Debug, Clone)]
pub struct CanvasTarget {
    pub width: u32,
    pub height: u32,
    pub bitmap: Option<String>,
}

// ── Planning (synchronous DOM reads) ─────────────────────────────────────────

pub fn plan_for_panel<V: DocumentView>(
    view: &V,
    elem_id: &str,
) -> Result<ExtractionPlan, ExtractionError> {
    // Primary lookup key, then the identifier itself.
    let container = view
        .element_by_id(&format!("container_{}", elem_id))
        .or_else(|| view.element_by_id(elem_id))
        .ok_or_else(|| ExtractionError::ContainerNotFound(elem_id.to_string()))?;

    let image = view.descendant(container, IMAGE_TAG, IMAGE_CLASS);
    let canvas = view.descendant(container, CANVAS_TAG, CANVAS_CLASS);
    tracing::debug!(
        elem_id,
        image = image.is_some(),
        canvas = canvas.is_some(),
        "located panel elements"
    );

    let canvas_target = canvas
        .map(|c| CanvasTarget {
            width: dimension_attr(view, c, "width"),
            height: dimension_attr(view, c, "height"),
            bitmap: view.attr(c, CANVAS_BITMAP_ATTR),
        })
        .filter(|t| t.width > 1 || t.height > 1);

    // A source that is empty or ends in a bare slash is a placeholder the UI
    // leaves behind when the panel holds no image.
    let src = image
        .and_then(|img| view.attr(img, "src"))
        .filter(|s| !s.is_empty() && !s.ends_with('/'));

    match (src, canvas_target) {
        (Some(src), fallback) => Ok(ExtractionPlan::Image { src, fallback }),
        (None, Some(target)) => Ok(ExtractionPlan::Canvas(target)),
        (None, None) => Err(ExtractionError::NothingToExtract),
    }
}

pub fn plan_for_active<V: DocumentView>(view: &V) -> Result<ExtractionPlan, ExtractionError> {
    let tab = panels::active_panel(view).ok_or(ExtractionError::NoTarget)?;
    let elem_id = tab.elem_id.ok_or(ExtractionError::NoTarget)?;
    plan_for_panel(view, elem_id)
}

fn dimension_attr<V: DocumentView>(view: &V, handle: V::Handle, name: &str) -> u32 {
    view.attr(handle, name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

// ── Source fetching ──────────────────────────────────────────────────────────

/// Loads image source bytes: `data:` URLs inline, `http(s)` over the wire,
/// relative sources against an optional base URL.
pub struct SourceFetcher {
    base: Option<Url>,
}

impl SourceFetcher {
    pub fn new(base_url: Option<&str>) -> Self {
        SourceFetcher {
            base: base_url.and_then(|b| Url::parse(b).ok()),
        }
    }

    pub async fn load(&self, src: &str) -> Result<Vec<u8>, ExtractionError> {
        if src.starts_with("data:") {
            return raster::parse_data_url(src)
                .ok_or_else(|| ExtractionError::SourceLoad("malformed data URL".to_string()));
        }

        let resolved = match Url::parse(src) {
            Ok(url) => url,
            Err(_) => self
                .base
                .as_ref()
                .and_then(|b| b.join(src).ok())
                .ok_or_else(|| {
                    ExtractionError::SourceLoad("unresolvable relative source".to_string())
                })?,
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            return Err(ExtractionError::SourceLoad(format!(
                "unsupported scheme: {}",
                resolved.scheme()
            )));
        }

        let client = reqwest::ClientBuilder::new()
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ExtractionError::SourceLoad(e.to_string()))?;

        let response = client
            .get(resolved)
            .send()
            .await
            .map_err(|e| ExtractionError::SourceLoad(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractionError::SourceLoad(format!(
                "upstream status {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if content_type.starts_with("text/") {
            return Err(ExtractionError::SourceLoad(format!(
                "source is not an image: {}",
                content_type
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ExtractionError::SourceLoad(e.to_string()))
    }
}

// ── Resolution (rasterize the plan) ──────────────────────────────────────────

pub async fn resolve_plan(
    plan: ExtractionPlan,
    fetcher: &SourceFetcher,
) -> Result<String, ExtractionError> {
    match plan {
        ExtractionPlan::Image { src, fallback } => {
            // Load failure and natural width 0 both mean the image never
            // rendered: fall through to the drawing canvas. Failures past
            // this point do not fall through.
            let loaded = match fetcher.load(&src).await {
                Ok(bytes) => raster::decode(&bytes).filter(|img| img.width() > 0),
                Err(e) => {
                    tracing::debug!("image source did not load: {}", e);
                    None
                }
            };
            match loaded {
                Some(decoded) => {
                    let data_url = raster::rasterize_to_data_url(&decoded)
                        .map_err(|e| ExtractionError::Encode(e.to_string()))?;
                    tracing::debug!(len = data_url.len(), "extracted from image element");
                    Ok(data_url)
                }
                None => match fallback {
                    Some(target) => serialize_canvas(target),
                    None => Err(ExtractionError::NothingToExtract),
                },
            }
        }
        ExtractionPlan::Canvas(target) => serialize_canvas(target),
    }
}

fn serialize_canvas(target: CanvasTarget) -> Result<String, ExtractionError> {
    tracing::debug!(
        width = target.width,
        height = target.height,
        "extracting from drawing canvas"
    );
    match target.bitmap {
        Some(bitmap) => {
            let bytes = raster::parse_data_url(&bitmap)
                .ok_or_else(|| ExtractionError::Decode("malformed canvas bitmap".to_string()))?;
            let decoded = raster::decode(&bytes)
                .ok_or_else(|| ExtractionError::Decode("undecodable canvas bitmap".to_string()))?;
            raster::rasterize_to_data_url(&decoded)
                .map_err(|e| ExtractionError::Encode(e.to_string()))
        }
        None => raster::blank_canvas_data_url(target.width, target.height)
            .map_err(|e| ExtractionError::Encode(e.to_string())),
    }
}

/// Raw bytes of whatever the plan would serialize, without re-encoding.
/// Metadata readers need these: a redraw strips the PNG text chunks.
pub async fn raw_source_bytes(
    plan: ExtractionPlan,
    fetcher: &SourceFetcher,
) -> Result<Vec<u8>, ExtractionError> {
    match plan {
        ExtractionPlan::Image { src, fallback } => match fetcher.load(&src).await {
            Ok(bytes) if raster::decode(&bytes).is_some_and(|img| img.width() > 0) => Ok(bytes),
            _ => match fallback {
                Some(target) => canvas_bytes(target),
                None => Err(ExtractionError::NothingToExtract),
            },
        },
        ExtractionPlan::Canvas(target) => canvas_bytes(target),
    }
}

fn canvas_bytes(target: CanvasTarget) -> Result<Vec<u8>, ExtractionError> {
    // A blank canvas has pixels but no original bytes to read metadata from.
    let bitmap = target.bitmap.ok_or(ExtractionError::NothingToExtract)?;
    raster::parse_data_url(&bitmap)
        .ok_or_else(|| ExtractionError::Decode("malformed canvas bitmap".to_string()))
}

// ── Public operations ────────────────────────────────────────────────────────

/// Collapse a planned extraction to the public contract: a data URL on
/// success, the empty string on any failure.
pub async fn data_url_or_empty(
    plan: Result<ExtractionPlan, ExtractionError>,
    fetcher: &SourceFetcher,
) -> String {
    let resolved = match plan {
        Ok(plan) => resolve_plan(plan, fetcher).await,
        Err(e) => Err(e),
    };
    match resolved {
        Ok(data_url) => data_url,
        Err(e) => {
            tracing::debug!("extraction yielded no data: {}", e);
            String::new()
        }
    }
}

/// Get active panel data: data URL of whatever the user is currently
/// viewing or drawing on, or the empty string.
pub async fn active_panel_data_url(html: &str, fetcher: &SourceFetcher) -> String {
    let plan = {
        let doc = Html::parse_document(html);
        let view = SnapshotView::new(&doc);
        plan_for_active(&view)
    };
    data_url_or_empty(plan, fetcher).await
}

/// Get panel data by container element identifier.
pub async fn panel_data_url(html: &str, fetcher: &SourceFetcher, elem_id: &str) -> String {
    let plan = {
        let doc = Html::parse_document(html);
        let view = SnapshotView::new(&doc);
        plan_for_panel(&view, elem_id)
    };
    data_url_or_empty(plan, fetcher).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PNG_DATA_URL_PREFIX;
    use image::{Rgba, RgbaImage};

    fn solid_png_data_url(width: u32, height: u32, rgba: [u8; 4]) -> String {
        raster::encode_png_data_url(RgbaImage::from_pixel(width, height, Rgba(rgba))).unwrap()
    }

    fn no_base() -> SourceFetcher {
        SourceFetcher::new(None)
    }

    fn page(container_body: &str) -> String {
        format!(
            r#"<div id="mode_img2img"><div class="tabs"><div>
                <button class="selected">img2img</button>
                <button>Sketch</button><button>Inpaint</button>
                <button>Inpaint sketch</button><button>Inpaint upload</button>
                <button>Batch</button>
            </div></div></div>
            <div id="container_img2img_image">{}</div>"#,
            container_body
        )
    }

    #[tokio::test]
    async fn valid_image_rasterizes_at_natural_dimensions() {
        let src = solid_png_data_url(64, 64, [1, 2, 3, 255]);
        let html = page(&format!(r#"<img class="forge-image" src="{}">"#, src));
        let result = active_panel_data_url(&html, &no_base()).await;
        assert!(result.starts_with(PNG_DATA_URL_PREFIX));
        let decoded = raster::decode(&raster::parse_data_url(&result).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[tokio::test]
    async fn image_wins_over_canvas_when_both_present() {
        let src = solid_png_data_url(10, 10, [9, 9, 9, 255]);
        let html = page(&format!(
            r#"<img class="forge-image" src="{}">
               <canvas class="forge-drawing-canvas" width="256" height="256"></canvas>"#,
            src
        ));
        let result = active_panel_data_url(&html, &no_base()).await;
        let decoded = raster::decode(&raster::parse_data_url(&result).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
    }

    #[tokio::test]
    async fn placeholder_src_falls_back_to_canvas() {
        let html = page(
            r#"<img class="forge-image" src="http://localhost:7860/file/">
               <canvas class="forge-drawing-canvas" width="256" height="256"></canvas>"#,
        );
        let result = active_panel_data_url(&html, &no_base()).await;
        assert_eq!(
            result,
            raster::blank_canvas_data_url(256, 256).unwrap(),
            "blank canvas serialization expected"
        );
    }

    #[tokio::test]
    async fn unloadable_image_falls_back_to_canvas() {
        // Well-formed src that decodes to nothing behaves as natural width 0.
        let html = page(
            r#"<img class="forge-image" src="data:image/png;base64,AAAA">
               <canvas class="forge-drawing-canvas" width="32" height="32"></canvas>"#,
        );
        let result = active_panel_data_url(&html, &no_base()).await;
        assert_eq!(result, raster::blank_canvas_data_url(32, 32).unwrap());
    }

    #[tokio::test]
    async fn canvas_backing_bitmap_is_serialized() {
        let bitmap = solid_png_data_url(16, 16, [0, 255, 0, 255]);
        let html = page(&format!(
            r#"<canvas class="forge-drawing-canvas" width="16" height="16" data-bitmap="{}"></canvas>"#,
            bitmap
        ));
        let result = active_panel_data_url(&html, &no_base()).await;
        let decoded = raster::decode(&raster::parse_data_url(&result).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
        assert_eq!(decoded.to_rgba8().get_pixel(8, 8).0, [0, 255, 0, 255]);
    }

    #[tokio::test]
    async fn one_by_one_canvas_is_ignored() {
        let html = page(r#"<canvas class="forge-drawing-canvas" width="1" height="1"></canvas>"#);
        assert_eq!(active_panel_data_url(&html, &no_base()).await, "");
    }

    #[tokio::test]
    async fn empty_container_yields_empty_string() {
        let html = page("<p>nothing here</p>");
        assert_eq!(active_panel_data_url(&html, &no_base()).await, "");
    }

    #[tokio::test]
    async fn missing_container_and_fallback_yield_empty_string() {
        let html = "<div><p>no panels at all</p></div>";
        assert_eq!(panel_data_url(html, &no_base(), "img2img_image").await, "");
    }

    #[tokio::test]
    async fn direct_id_fallback_is_used_when_container_prefix_missing() {
        let src = solid_png_data_url(4, 4, [5, 5, 5, 255]);
        let html = format!(
            r#"<div id="img2maskimg"><img class="forge-image" src="{}"></div>"#,
            src
        );
        let result = panel_data_url(&html, &no_base(), "img2maskimg").await;
        assert!(result.starts_with(PNG_DATA_URL_PREFIX));
    }

    #[tokio::test]
    async fn batch_tab_always_yields_empty_string() {
        let src = solid_png_data_url(8, 8, [7, 7, 7, 255]);
        let html = format!(
            r#"<div id="mode_img2img"><div class="tabs"><div>
                <button>a</button><button>b</button><button>c</button>
                <button>d</button><button>e</button>
                <button class="selected">Batch</button>
            </div></div></div>
            <div id="container_img2img_image"><img class="forge-image" src="{}"></div>"#,
            src
        );
        assert_eq!(active_panel_data_url(&html, &no_base()).await, "");
    }

    #[test]
    fn plan_distinguishes_failure_causes() {
        let doc = Html::parse_document("<div></div>");
        let view = SnapshotView::new(&doc);
        assert!(matches!(
            plan_for_panel(&view, "img2img_image"),
            Err(ExtractionError::ContainerNotFound(_))
        ));

        let doc = Html::parse_document(r#"<div id="container_x"><p>empty</p></div>"#);
        let view = SnapshotView::new(&doc);
        assert!(matches!(
            plan_for_panel(&view, "x"),
            Err(ExtractionError::NothingToExtract)
        ));
    }

    #[tokio::test]
    async fn raw_source_bytes_preserve_text_chunks() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let infotext = "a cat\nSteps: 20, Sampler: DDIM, Seed: 42";
        let png = crate::metadata::png_with_text("parameters", infotext);
        let src = format!("data:image/png;base64,{}", STANDARD.encode(&png));
        let html = page(&format!(r#"<img class="forge-image" src="{}">"#, src));

        let plan = {
            let doc = Html::parse_document(&html);
            let view = SnapshotView::new(&doc);
            plan_for_active(&view).unwrap()
        };
        let bytes = raw_source_bytes(plan, &no_base()).await.unwrap();
        assert_eq!(
            crate::metadata::read_parameters(&bytes).as_deref(),
            Some(infotext)
        );
    }

    #[tokio::test]
    async fn blank_canvas_has_no_source_bytes() {
        let html = page(r#"<canvas class="forge-drawing-canvas" width="8" height="8"></canvas>"#);
        let plan = {
            let doc = Html::parse_document(&html);
            let view = SnapshotView::new(&doc);
            plan_for_active(&view).unwrap()
        };
        assert!(matches!(
            raw_source_bytes(plan, &no_base()).await,
            Err(ExtractionError::NothingToExtract)
        ));
    }

    #[tokio::test]
    async fn fetcher_rejects_unsupported_schemes() {
        let fetcher = no_base();
        assert!(matches!(
            fetcher.load("ftp://example.com/a.png").await,
            Err(ExtractionError::SourceLoad(_))
        ));
        assert!(matches!(
            fetcher.load("relative/path.png").await,
            Err(ExtractionError::SourceLoad(_))
        ));
    }
}
