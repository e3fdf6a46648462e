use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

// ── Static selectors ─────────────────────────────────────────────────────────

static TAB_BUTTON_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#mode_img2img .tabs > div > button").unwrap());

static ANY_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("*").unwrap());

// ── Document view abstraction ────────────────────────────────────────────────

/// The subset of the hosting UI tree the extraction logic reads.
///
/// Only DOM reads live here; pixel work is in [`crate::raster`]. Keeping the
/// seam this narrow lets the extraction logic run against any tree
/// representation, without a browser.
pub trait DocumentView {
    type Handle: Copy;

    /// Selection flags of the img2img tab-strip buttons, in document order.
    fn tab_selection(&self) -> Vec<bool>;

    fn element_by_id(&self, id: &str) -> Option<Self::Handle>;

    /// First descendant of `scope` with the given tag name and class.
    fn descendant(&self, scope: Self::Handle, tag: &str, class: &str) -> Option<Self::Handle>;

    fn attr(&self, handle: Self::Handle, name: &str) -> Option<String>;
}

// ── Snapshot-backed implementation ───────────────────────────────────────────

/// [`DocumentView`] over a parsed HTML snapshot of the UI.
pub struct SnapshotView<'a> {
    doc: &'a Html,
}

impl<'a> SnapshotView<'a> {
    pub fn new(doc: &'a Html) -> Self {
        SnapshotView { doc }
    }
}

impl<'a> DocumentView for SnapshotView<'a> {
    type Handle = ElementRef<'a>;

    fn tab_selection(&self) -> Vec<bool> {
        self.doc
            .select(&TAB_BUTTON_SEL)
            .map(|button| button.value().classes().any(|c| c == "selected"))
            .collect()
    }

    fn element_by_id(&self, id: &str) -> Option<ElementRef<'a>> {
        // Attribute comparison instead of a dynamic `#id` selector: element
        // ids arrive from the request path and need not be valid CSS idents.
        self.doc
            .select(&ANY_SEL)
            .find(|el| el.value().id() == Some(id))
    }

    fn descendant(&self, scope: ElementRef<'a>, tag: &str, class: &str) -> Option<ElementRef<'a>> {
        scope.select(&ANY_SEL).find(|el| {
            el.value().name() == tag && el.value().classes().any(|c| c == class)
        })
    }

    fn attr(&self, handle: ElementRef<'a>, name: &str) -> Option<String> {
        handle.value().attr(name).map(|v| v.to_string())
    }
}
