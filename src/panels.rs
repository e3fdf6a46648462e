use serde::Serialize;

use crate::view::DocumentView;

// ── Panel identifiers ────────────────────────────────────────────────────────

/// Logical sub-tabs of the img2img mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Panel {
    Image,
    Sketch,
    Inpaint,
    InpaintSketch,
    InpaintUpload,
    Batch,
}

/// One entry of the tab-index → panel table.
pub struct PanelTab {
    pub panel: Panel,
    /// Container element id, or `None` when the panel has no single image
    /// to extract (batch processing).
    pub elem_id: Option<&'static str>,
}

/// Tab order is fixed by the UI layout; the batch tab carries no target.
pub const TAB_PANELS: [PanelTab; 6] = [
    PanelTab { panel: Panel::Image, elem_id: Some("img2img_image") },
    PanelTab { panel: Panel::Sketch, elem_id: Some("img2img_sketch") },
    PanelTab { panel: Panel::Inpaint, elem_id: Some("img2maskimg") },
    PanelTab { panel: Panel::InpaintSketch, elem_id: Some("inpaint_sketch") },
    PanelTab { panel: Panel::InpaintUpload, elem_id: Some("img_inpaint_base") },
    PanelTab { panel: Panel::Batch, elem_id: None },
];

// ── Tab resolution ───────────────────────────────────────────────────────────

/// Index of the first tab button flagged selected; 0 when none is flagged
/// or the strip is empty.
pub fn active_tab_index<V: DocumentView>(view: &V) -> usize {
    view.tab_selection()
        .iter()
        .position(|selected| *selected)
        .unwrap_or(0)
}

/// Table entry for the active tab. `None` for an index past the table, which
/// extraction treats the same as the batch tab.
pub fn active_panel<V: DocumentView>(view: &V) -> Option<&'static PanelTab> {
    let index = active_tab_index(view);
    tracing::debug!(index, "resolved active img2img tab");
    TAB_PANELS.get(index)
}
