use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::panels::Panel;

#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    /// HTML snapshot of the img2img UI.
    pub html: String,
    /// Base for resolving relative image sources, e.g. the UI's own origin.
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PanelDataResponse {
    /// Resolved panel for the active-tab operation; `null` for by-id lookups
    /// and for a tab index past the panel table.
    pub panel: Option<Panel>,
    /// PNG data URL, or `""` when nothing could be extracted.
    pub data_url: String,
}

#[derive(Debug, Deserialize)]
pub struct MetadataRequest {
    pub html: String,
    pub base_url: Option<String>,
    /// Comma-separated terms to strip from the returned prompt.
    pub remove: Option<String>,
    /// Comma-separated terms to append to the returned prompt.
    pub add: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    pub prompt: String,
    pub negative_prompt: String,
    pub seed: Option<i64>,
    pub parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_prompt: Option<String>,
}
