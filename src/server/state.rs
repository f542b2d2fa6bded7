use std::sync::Arc;
use tokio::sync::Mutex;

use crate::ocr::OcrEngine;
use crate::render::ExportStyle;
use crate::session::Session;
use crate::settings::Settings;
use crate::translations::TranslationService;

/// Shared by every request. The session lock is never held across an OCR or
/// translation call.
pub struct ServerState {
    pub(crate) session: Mutex<Session>,
    pub(crate) export_style: ExportStyle,
    pub(crate) ocr: Arc<dyn OcrEngine>,
    pub(crate) translator: Arc<dyn TranslationService>,
}

impl ServerState {
    pub fn new(
        session: Session,
        export_style: ExportStyle,
        ocr: Arc<dyn OcrEngine>,
        translator: Arc<dyn TranslationService>,
    ) -> Self {
        Self {
            session: Mutex::new(session),
            export_style,
            ocr,
            translator,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        ocr: Arc<dyn OcrEngine>,
        translator: Arc<dyn TranslationService>,
    ) -> Self {
        Self::new(
            Session::from_settings(settings),
            ExportStyle::from_settings(settings),
            ocr,
            translator,
        )
    }
}
