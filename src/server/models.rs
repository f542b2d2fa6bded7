use serde::{Deserialize, Serialize};

use crate::editor::{EditorEvent, SurfaceRect};
use crate::region::RegionId;
use crate::session::SessionSnapshot;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadedImage {
    pub(crate) name: String,
    pub(crate) data_base64: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IngestRequest {
    pub(crate) images: Vec<UploadedImage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoveImageRequest {
    pub(crate) from: usize,
    pub(crate) to: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PointerRequest {
    pub(crate) surface: SurfaceRect,
    pub(crate) x: f32,
    pub(crate) y: f32,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct SelectionRequest {
    pub(crate) id: Option<RegionId>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EditRegionRequest {
    pub(crate) original_text: Option<String>,
    pub(crate) translated_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LanguagesRequest {
    pub(crate) source_lang: String,
    pub(crate) target_lang: String,
}

/// Result of a command that may or may not change anything, with the state
/// after it ran.
#[derive(Debug, Serialize)]
pub(crate) struct CommandResponse {
    pub(crate) changed: bool,
    pub(crate) session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub(crate) struct EditorResponse {
    pub(crate) event: Option<EditorEvent>,
    pub(crate) session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegionResponse {
    pub(crate) id: Option<RegionId>,
    pub(crate) session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub(crate) struct PassResponse {
    pub(crate) processed: usize,
    pub(crate) session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
