//! The session controller: the single owner of the image list, the working
//! image, the regions and the editor.
//!
//! Every command checks the busy flag first. Merge, OCR and translation
//! passes are split into `begin_*`, `apply_*` and [`Session::finish_pass`] so
//! a caller can do the slow work without holding the session; the `run_*`
//! helpers drive the same steps in process.

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use serde::Serialize;
use std::fmt;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::compositor::{self, SourceImage, WorkingImage};
use crate::editor::{EditorEvent, RegionEditor, SurfaceRect};
use crate::languages;
use crate::ocr::{self, OcrEngine, RegionCrop};
use crate::region::{PercentRect, RegionId, TextRegion};
use crate::render::{self, ExportArtifact, ExportStyle};
use crate::sequencing::RegionSet;
use crate::settings::Settings;
use crate::translations::{TranslationBatch, TranslationItem, TranslationMap, TranslationService};

/// Returned by every command issued while a pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionBusy;

impl fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("session is busy with another pass")
    }
}

impl std::error::Error for SessionBusy {}

/// Ends the pass when dropped, so a pass future abandoned mid-await still
/// leaves the session idle.
struct PassGuard<'a> {
    session: &'a mut Session,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.session.finish_pass();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ingest,
    Edit,
}

/// Owned snapshot of an OCR pass: one crop per region, in `order`.
#[derive(Debug, Clone)]
pub struct OcrJob {
    pub language: String,
    pub crops: Vec<RegionCrop>,
}

#[derive(Debug, Clone)]
pub struct TranslationJob {
    pub batch: TranslationBatch,
}

/// Owned copy of the working image and regions, rendered without the session.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub image: RgbaImage,
    pub regions: Vec<TextRegion>,
}

impl ExportJob {
    pub fn render(&self, style: &ExportStyle, at: OffsetDateTime) -> Result<ExportArtifact> {
        let artifact = render::export_jpeg(&self.image, &self.regions, style, at)?;
        info!(filename = %artifact.filename, bytes = artifact.bytes.len(), "export rendered");
        Ok(artifact)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub stage: Stage,
    pub busy: bool,
    pub progress: Option<String>,
    pub images: Vec<ImageInfo>,
    pub working_image: Option<ImageSize>,
    pub regions: Vec<TextRegion>,
    pub selected: Option<RegionId>,
    pub drawing: Option<PercentRect>,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Debug)]
pub struct Session {
    stage: Stage,
    sources: Vec<SourceImage>,
    working: Option<WorkingImage>,
    regions: RegionSet,
    editor: RegionEditor,
    busy: bool,
    progress: Option<String>,
    source_lang: String,
    target_lang: String,
}

impl Session {
    pub fn new(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            stage: Stage::Ingest,
            sources: Vec::new(),
            working: None,
            regions: RegionSet::new(),
            editor: RegionEditor::new(),
            busy: false,
            progress: None,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.source_lang, &settings.target_lang)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    pub fn sources(&self) -> &[SourceImage] {
        &self.sources
    }

    pub fn working_image(&self) -> Option<&WorkingImage> {
        self.working.as_ref()
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn selected(&self) -> Option<RegionId> {
        self.editor.selected()
    }

    pub fn source_lang(&self) -> &str {
        &self.source_lang
    }

    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.busy {
            return Err(SessionBusy.into());
        }
        Ok(())
    }

    /// Decodes and appends images in the given order. Nothing is appended
    /// when any of them fails to decode.
    pub fn ingest_images(&mut self, files: Vec<(String, Vec<u8>)>) -> Result<usize> {
        self.ensure_idle()?;
        let decoded = compositor::decode_all(files)?;
        self.add_sources(decoded)
    }

    /// Appends images decoded elsewhere, in the given order.
    pub fn add_sources(&mut self, decoded: Vec<SourceImage>) -> Result<usize> {
        self.ensure_idle()?;
        let added = decoded.len();
        self.sources.extend(decoded);
        info!(added, total = self.sources.len(), "images ingested");
        Ok(added)
    }

    pub fn move_image(&mut self, from: usize, to: usize) -> Result<bool> {
        self.ensure_idle()?;
        if from >= self.sources.len() || to >= self.sources.len() {
            return Ok(false);
        }
        let image = self.sources.remove(from);
        self.sources.insert(to, image);
        Ok(true)
    }

    pub fn remove_image(&mut self, index: usize) -> Result<bool> {
        self.ensure_idle()?;
        if index >= self.sources.len() {
            return Ok(false);
        }
        self.sources.remove(index);
        Ok(true)
    }

    /// Stitches the current images into a new working image and moves to the
    /// edit stage. Existing regions are dropped since they were measured on
    /// the previous image. Does nothing without images.
    pub fn merge(&mut self) -> Result<bool> {
        self.ensure_idle()?;
        let Some(working) = compositor::merge_images(&self.sources)? else {
            return Ok(false);
        };
        self.apply_merge(working);
        Ok(true)
    }

    /// Starts a merge whose stitching runs outside the session: marks the
    /// session busy and hands out a copy of the images. `None` without
    /// images. Finish with [`Session::apply_merge`] and
    /// [`Session::finish_pass`].
    pub fn begin_merge(&mut self) -> Result<Option<Vec<SourceImage>>> {
        self.ensure_idle()?;
        if self.sources.is_empty() {
            return Ok(None);
        }
        self.busy = true;
        self.progress = Some(format!("Merging {} images", self.sources.len()));
        Ok(Some(self.sources.clone()))
    }

    /// Installs a new working image and moves to the edit stage.
    pub fn apply_merge(&mut self, working: WorkingImage) {
        info!(
            width = working.width(),
            height = working.height(),
            "working image ready"
        );
        self.working = Some(working);
        self.regions.clear();
        self.editor.reset();
        self.stage = Stage::Edit;
    }

    pub fn pointer_down(
        &mut self,
        surface: &SurfaceRect,
        client_x: f32,
        client_y: f32,
    ) -> Result<Option<EditorEvent>> {
        self.ensure_idle()?;
        if self.working.is_none() {
            return Ok(None);
        }
        Ok(self
            .editor
            .pointer_down(surface, client_x, client_y, &self.regions))
    }

    pub fn pointer_move(
        &mut self,
        surface: &SurfaceRect,
        client_x: f32,
        client_y: f32,
    ) -> Result<()> {
        self.ensure_idle()?;
        self.editor.pointer_move(surface, client_x, client_y);
        Ok(())
    }

    pub fn pointer_up(&mut self) -> Result<Option<EditorEvent>> {
        self.ensure_idle()?;
        Ok(self.editor.pointer_up(&mut self.regions))
    }

    pub fn pointer_leave(&mut self) -> Result<Option<EditorEvent>> {
        self.ensure_idle()?;
        Ok(self.editor.pointer_leave(&mut self.regions))
    }

    /// Selects a region, or clears the selection with `None`. Unknown ids are
    /// ignored.
    pub fn select_region(&mut self, id: Option<RegionId>) -> Result<Option<EditorEvent>> {
        self.ensure_idle()?;
        if let Some(id) = id
            && self.regions.get(id).is_none()
        {
            return Ok(None);
        }
        Ok(self.editor.select(id))
    }

    /// Adds a region from an explicit rectangle, clamped to the image. Too
    /// small rectangles are dropped like a short drag.
    pub fn add_region(&mut self, rect: PercentRect) -> Result<Option<RegionId>> {
        self.ensure_idle()?;
        if self.working.is_none() {
            return Ok(None);
        }
        let rect = rect.clamped();
        if !rect.exceeds_min_size() {
            return Ok(None);
        }
        Ok(Some(self.regions.add(rect)))
    }

    pub fn remove_region(&mut self, id: RegionId) -> Result<bool> {
        self.ensure_idle()?;
        let removed = self.regions.remove(id);
        if removed {
            self.editor.region_removed(id);
        }
        Ok(removed)
    }

    /// Replaces whichever of the two texts is given.
    pub fn edit_region_text(
        &mut self,
        id: RegionId,
        original_text: Option<String>,
        translated_text: Option<String>,
    ) -> Result<bool> {
        self.ensure_idle()?;
        let Some(region) = self.regions.get_mut(id) else {
            return Ok(false);
        };
        if let Some(text) = original_text {
            region.original_text = text;
        }
        if let Some(text) = translated_text {
            region.translated_text = text;
        }
        Ok(true)
    }

    pub fn set_languages(&mut self, source_lang: &str, target_lang: &str) -> Result<()> {
        self.ensure_idle()?;
        let (source, target) = (source_lang.trim(), target_lang.trim());
        if source.is_empty() || target.is_empty() {
            return Err(anyhow!("language codes must not be empty"));
        }
        for code in [source, target] {
            if !languages::is_supported(code) {
                warn!("language '{}' is not in the known list; passing it through", code);
            }
        }
        self.source_lang = source.to_string();
        self.target_lang = target.to_string();
        Ok(())
    }

    /// Starts an OCR pass. `None` when there is nothing to recognize.
    pub fn begin_ocr(&mut self) -> Result<Option<OcrJob>> {
        self.ensure_idle()?;
        let Some(working) = self.working.as_ref() else {
            return Ok(None);
        };
        if self.regions.is_empty() {
            return Ok(None);
        }
        let crops = ocr::collect_crops(&working.image, &self.regions);
        self.busy = true;
        self.progress = Some(format!("Recognizing text (0/{})", crops.len()));
        Ok(Some(OcrJob {
            language: self.source_lang.clone(),
            crops,
        }))
    }

    /// Records one OCR result. `done` counts the crops finished so far.
    pub fn apply_ocr_text(
        &mut self,
        id: RegionId,
        text: String,
        done: usize,
        total: usize,
    ) -> bool {
        self.progress = Some(format!("Recognizing text ({}/{})", done, total));
        self.regions.set_original_text(id, text)
    }

    /// Starts a translation pass over regions that have recognized text.
    /// `None` when no region has any.
    pub fn begin_translation(&mut self) -> Result<Option<TranslationJob>> {
        self.ensure_idle()?;
        let items: Vec<TranslationItem> = self
            .regions
            .sorted_by_order()
            .into_iter()
            .filter(|region| !region.original_text.trim().is_empty())
            .map(|region| TranslationItem {
                id: region.id,
                original_text: region.original_text.clone(),
            })
            .collect();
        if items.is_empty() {
            return Ok(None);
        }
        self.busy = true;
        self.progress = Some(format!("Translating {} regions", items.len()));
        Ok(Some(TranslationJob {
            batch: TranslationBatch {
                items,
                source_language: languages::display_name(&self.source_lang),
                target_language: languages::display_name(&self.target_lang),
            },
        }))
    }

    pub fn apply_translations(&mut self, translations: &TranslationMap) -> usize {
        self.regions.apply_translations(translations)
    }

    /// Ends the running pass, whatever its outcome.
    pub fn finish_pass(&mut self) {
        self.busy = false;
        self.progress = None;
    }

    /// Runs a full OCR pass in region order. The first engine error stops
    /// the pass; texts recognized before it are kept.
    pub async fn run_ocr_pass(&mut self, engine: &dyn OcrEngine) -> Result<usize> {
        let Some(job) = self.begin_ocr()? else {
            return Ok(0);
        };
        let outcome = {
            let mut guard = PassGuard { session: self };
            guard.session.drive_ocr(&job, engine).await
        };
        match outcome {
            Ok(count) => {
                info!(regions = count, "OCR pass finished");
                Ok(count)
            }
            Err(err) => {
                error!("OCR pass failed: {:#}", err);
                Err(err).with_context(|| "text recognition failed")
            }
        }
    }

    async fn drive_ocr(&mut self, job: &OcrJob, engine: &dyn OcrEngine) -> Result<usize> {
        let total = job.crops.len();
        for (index, crop) in job.crops.iter().enumerate() {
            let text = ocr::recognize_crop(engine, crop, &job.language)
                .await
                .with_context(|| format!("region {} (order {})", crop.id, crop.order))?;
            self.apply_ocr_text(crop.id, text, index + 1, total);
        }
        Ok(total)
    }

    /// Translates every region with recognized text in one batch and writes
    /// the results back by id.
    pub async fn run_translation_pass(
        &mut self,
        service: &dyn TranslationService,
    ) -> Result<usize> {
        let Some(job) = self.begin_translation()? else {
            return Ok(0);
        };
        let result = {
            let mut guard = PassGuard { session: self };
            match service.translate(&job.batch).await {
                Ok(translations) => Ok(guard.session.apply_translations(&translations)),
                Err(err) => Err(err),
            }
        };
        match result {
            Ok(updated) => {
                info!(
                    requested = job.batch.items.len(),
                    updated, "translation pass finished"
                );
                Ok(updated)
            }
            Err(err) => {
                error!("translation pass failed: {:#}", err);
                Err(err).with_context(|| "translation failed")
            }
        }
    }

    /// Renders the export from the working image. `None` before the first
    /// merge.
    pub fn export(
        &self,
        style: &ExportStyle,
        at: OffsetDateTime,
    ) -> Result<Option<ExportArtifact>> {
        self.ensure_idle()?;
        let Some(working) = self.working.as_ref() else {
            return Ok(None);
        };
        let artifact = render::export_jpeg(&working.image, self.regions.as_slice(), style, at)?;
        info!(filename = %artifact.filename, bytes = artifact.bytes.len(), "export rendered");
        Ok(Some(artifact))
    }

    /// Copies what [`ExportJob::render`] needs. `None` before the first
    /// merge.
    pub fn export_job(&self) -> Result<Option<ExportJob>> {
        self.ensure_idle()?;
        Ok(self.working.as_ref().map(|working| ExportJob {
            image: working.image.clone(),
            regions: self.regions.as_slice().to_vec(),
        }))
    }

    /// Back to the ingest stage with nothing loaded. Languages are kept.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.sources.clear();
        self.working = None;
        self.regions.clear();
        self.editor.reset();
        self.stage = Stage::Ingest;
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stage: self.stage,
            busy: self.busy,
            progress: self.progress.clone(),
            images: self
                .sources
                .iter()
                .map(|source| ImageInfo {
                    name: source.name.clone(),
                    width: source.width(),
                    height: source.height(),
                })
                .collect(),
            working_image: self.working.as_ref().map(|working| ImageSize {
                width: working.width(),
                height: working.height(),
            }),
            regions: self.regions.as_slice().to_vec(),
            selected: self.editor.selected(),
            drawing: self.editor.pending(),
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::solid_png;
    use crate::ocr::OcrFuture;
    use crate::translations::TranslationFuture;
    use image::DynamicImage;
    use std::sync::Mutex;

    fn merged_session() -> Session {
        let mut session = Session::new("ko", "en");
        session
            .ingest_images(vec![
                ("a.png".to_string(), solid_png(100, 60, [0, 0, 0, 255])),
                ("b.png".to_string(), solid_png(80, 40, [0, 0, 0, 255])),
            ])
            .unwrap();
        assert!(session.merge().unwrap());
        session
    }

    struct ScriptedOcr {
        calls: Mutex<Vec<(u32, u32)>>,
        fail_on_call: Option<usize>,
    }

    impl OcrEngine for ScriptedOcr {
        fn recognize<'a>(&'a self, crop: &'a DynamicImage, language: &'a str) -> OcrFuture<'a> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((crop.width(), crop.height()));
            let call = calls.len();
            let fail = self.fail_on_call == Some(call);
            let text = format!("{} text {}", language, call);
            Box::pin(async move {
                if fail {
                    Err(anyhow!("engine crashed"))
                } else {
                    Ok(text)
                }
            })
        }
    }

    struct FixedTranslator(TranslationMap);

    impl TranslationService for FixedTranslator {
        fn translate<'a>(&'a self, _batch: &'a TranslationBatch) -> TranslationFuture<'a> {
            let map = self.0.clone();
            Box::pin(async move { Ok(map) })
        }
    }

    struct FailingTranslator;

    impl TranslationService for FailingTranslator {
        fn translate<'a>(&'a self, _batch: &'a TranslationBatch) -> TranslationFuture<'a> {
            Box::pin(async move { Err(anyhow!("service unavailable")) })
        }
    }

    #[test]
    fn merge_moves_to_edit_and_drops_old_regions() {
        let mut session = merged_session();
        assert_eq!(session.stage(), Stage::Edit);
        let size = session.snapshot().working_image.unwrap();
        assert_eq!((size.width, size.height), (100, 100));

        let first = session
            .add_region(PercentRect::new(10.0, 10.0, 20.0, 10.0))
            .unwrap()
            .unwrap();
        session.select_region(Some(first)).unwrap();
        assert!(session.merge().unwrap());
        assert!(session.regions().is_empty());
        assert_eq!(session.selected(), None);

        let second = session
            .add_region(PercentRect::new(10.0, 10.0, 20.0, 10.0))
            .unwrap()
            .unwrap();
        assert!(second > first);
    }

    #[test]
    fn merge_without_images_is_a_no_op() {
        let mut session = Session::new("ko", "en");
        assert!(!session.merge().unwrap());
        assert_eq!(session.stage(), Stage::Ingest);
    }

    #[test]
    fn failed_ingest_adds_nothing() {
        let mut session = Session::new("ko", "en");
        let result = session.ingest_images(vec![
            ("ok.png".to_string(), solid_png(4, 4, [0, 0, 0, 255])),
            ("bad.png".to_string(), b"garbage".to_vec()),
        ]);
        assert!(result.is_err());
        assert!(session.sources().is_empty());
    }

    #[test]
    fn images_can_be_reordered_and_removed() {
        let mut session = Session::new("ko", "en");
        session
            .ingest_images(vec![
                ("a.png".to_string(), solid_png(4, 4, [0, 0, 0, 255])),
                ("b.png".to_string(), solid_png(4, 4, [0, 0, 0, 255])),
                ("c.png".to_string(), solid_png(4, 4, [0, 0, 0, 255])),
            ])
            .unwrap();
        assert!(session.move_image(2, 0).unwrap());
        assert!(!session.move_image(5, 0).unwrap());
        assert!(session.remove_image(1).unwrap());
        let names: Vec<&str> = session.sources().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["c.png", "b.png"]);
    }

    #[test]
    fn commands_are_rejected_while_busy() {
        let mut session = merged_session();
        session
            .add_region(PercentRect::new(0.0, 0.0, 50.0, 50.0))
            .unwrap();
        let job = session.begin_ocr().unwrap().unwrap();
        assert!(session.is_busy());
        assert_eq!(session.progress(), Some("Recognizing text (0/1)"));

        let err = session
            .add_region(PercentRect::new(0.0, 0.0, 10.0, 10.0))
            .unwrap_err();
        assert!(err.downcast_ref::<SessionBusy>().is_some());
        assert!(session.merge().is_err());
        assert!(session.begin_translation().is_err());
        assert!(session.reset().is_err());

        session.apply_ocr_text(job.crops[0].id, "안녕".to_string(), 1, 1);
        session.finish_pass();
        assert!(!session.is_busy());
        assert_eq!(session.progress(), None);
        assert_eq!(session.regions().as_slice()[0].original_text, "안녕");
    }

    #[test]
    fn split_merge_holds_the_session_until_applied() {
        let mut session = Session::new("ko", "en");
        assert!(session.begin_merge().unwrap().is_none());
        assert!(!session.is_busy());

        session
            .ingest_images(vec![
                ("a.png".to_string(), solid_png(100, 60, [0, 0, 0, 255])),
                ("b.png".to_string(), solid_png(80, 40, [0, 0, 0, 255])),
            ])
            .unwrap();
        let sources = session.begin_merge().unwrap().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(session.progress(), Some("Merging 2 images"));
        let err = session.add_sources(Vec::new()).unwrap_err();
        assert!(err.downcast_ref::<SessionBusy>().is_some());
        assert!(session.export_job().is_err());

        let working = compositor::merge_images(&sources).unwrap().unwrap();
        session.apply_merge(working);
        session.finish_pass();
        assert_eq!(session.stage(), Stage::Edit);
        assert!(!session.is_busy());
        let size = session.snapshot().working_image.unwrap();
        assert_eq!((size.width, size.height), (100, 100));
    }

    #[test]
    fn export_job_renders_without_the_session() {
        let mut session = Session::new("ko", "en");
        assert!(session.export_job().unwrap().is_none());

        session
            .ingest_images(vec![("a.png".to_string(), solid_png(40, 40, [0, 0, 0, 255]))])
            .unwrap();
        session.merge().unwrap();
        session
            .add_region(PercentRect::new(10.0, 10.0, 50.0, 50.0))
            .unwrap();
        let job = session.export_job().unwrap().unwrap();
        session.reset().unwrap();

        assert_eq!(job.regions.len(), 1);
        let artifact = job
            .render(&ExportStyle::default(), OffsetDateTime::UNIX_EPOCH)
            .unwrap();
        assert_eq!(&artifact.bytes[..2], &[0xFF, 0xD8]);
    }

    struct StalledOcr;

    impl OcrEngine for StalledOcr {
        fn recognize<'a>(&'a self, _crop: &'a DynamicImage, _language: &'a str) -> OcrFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    struct StalledTranslator;

    impl TranslationService for StalledTranslator {
        fn translate<'a>(&'a self, _batch: &'a TranslationBatch) -> TranslationFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn abandoned_passes_leave_the_session_idle() {
        let mut session = merged_session();
        let id = session
            .add_region(PercentRect::new(0.0, 0.0, 50.0, 50.0))
            .unwrap()
            .unwrap();

        tokio::select! {
            biased;
            _ = session.run_ocr_pass(&StalledOcr) => panic!("stalled OCR pass finished"),
            _ = tokio::task::yield_now() => {}
        }
        assert!(!session.is_busy());
        assert_eq!(session.progress(), None);

        session
            .edit_region_text(id, Some("안녕".to_string()), None)
            .unwrap();
        tokio::select! {
            biased;
            _ = session.run_translation_pass(&StalledTranslator) => {
                panic!("stalled translation pass finished")
            }
            _ = tokio::task::yield_now() => {}
        }
        assert!(!session.is_busy());
        assert!(session.reset().is_ok());
    }

    #[tokio::test]
    async fn ocr_pass_runs_in_order_and_resets_busy_on_failure() {
        let mut session = merged_session();
        let first = session
            .add_region(PercentRect::new(0.0, 0.0, 50.0, 20.0))
            .unwrap()
            .unwrap();
        let second = session
            .add_region(PercentRect::new(0.0, 50.0, 20.0, 10.0))
            .unwrap()
            .unwrap();
        let engine = ScriptedOcr {
            calls: Mutex::new(Vec::new()),
            fail_on_call: Some(2),
        };

        let err = session.run_ocr_pass(&engine).await.unwrap_err();
        assert!(format!("{:#}", err).contains("engine crashed"));
        assert!(!session.is_busy());
        assert_eq!(session.regions().get(first).unwrap().original_text, "ko text 1");
        assert_eq!(session.regions().get(second).unwrap().original_text, "");
        assert_eq!(*engine.calls.lock().unwrap(), vec![(50, 20), (20, 10)]);
    }

    #[tokio::test]
    async fn translation_matches_by_id() {
        let mut session = merged_session();
        let a = session
            .add_region(PercentRect::new(0.0, 0.0, 50.0, 20.0))
            .unwrap()
            .unwrap();
        let b = session
            .add_region(PercentRect::new(0.0, 50.0, 20.0, 10.0))
            .unwrap()
            .unwrap();
        let empty = session
            .add_region(PercentRect::new(60.0, 60.0, 20.0, 10.0))
            .unwrap()
            .unwrap();
        session
            .edit_region_text(a, Some("가".into()), Some("old".into()))
            .unwrap();
        session.edit_region_text(b, Some("나".into()), None).unwrap();

        let job = session.begin_translation().unwrap().unwrap();
        let ids: Vec<RegionId> = job.batch.items.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(job.batch.source_language, "Korean");
        assert_eq!(job.batch.target_language, "English");
        session.finish_pass();

        let map: TranslationMap = [(b, "B".to_string()), (RegionId(999), "?".to_string())]
            .into_iter()
            .collect();
        let updated = session
            .run_translation_pass(&FixedTranslator(map))
            .await
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(session.regions().get(a).unwrap().translated_text, "old");
        assert_eq!(session.regions().get(b).unwrap().translated_text, "B");
        assert_eq!(session.regions().get(empty).unwrap().translated_text, "");
    }

    #[tokio::test]
    async fn failed_translation_resets_busy() {
        let mut session = merged_session();
        let id = session
            .add_region(PercentRect::new(0.0, 0.0, 50.0, 20.0))
            .unwrap()
            .unwrap();
        session.edit_region_text(id, Some("가".into()), None).unwrap();
        assert!(session.run_translation_pass(&FailingTranslator).await.is_err());
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn passes_without_work_are_no_ops() {
        let mut session = merged_session();
        let engine = ScriptedOcr {
            calls: Mutex::new(Vec::new()),
            fail_on_call: None,
        };
        assert_eq!(session.run_ocr_pass(&engine).await.unwrap(), 0);
        assert_eq!(
            session
                .run_translation_pass(&FailingTranslator)
                .await
                .unwrap(),
            0
        );
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn add_region_clamps_and_drops_slivers() {
        let mut session = merged_session();
        let id = session
            .add_region(PercentRect::new(90.0, 95.0, 30.0, 30.0))
            .unwrap()
            .unwrap();
        assert_eq!(
            session.regions().get(id).unwrap().rect,
            PercentRect::new(90.0, 95.0, 10.0, 5.0)
        );
        assert!(session
            .add_region(PercentRect::new(10.0, 10.0, 0.05, 20.0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn removing_the_selected_region_clears_selection() {
        let mut session = merged_session();
        let id = session
            .add_region(PercentRect::new(10.0, 10.0, 20.0, 10.0))
            .unwrap()
            .unwrap();
        session.select_region(Some(id)).unwrap();
        assert!(session.select_region(Some(RegionId(999))).unwrap().is_none());
        assert_eq!(session.selected(), Some(id));
        assert!(session.remove_region(id).unwrap());
        assert_eq!(session.selected(), None);
        assert!(!session.remove_region(id).unwrap());
    }

    #[test]
    fn export_requires_a_working_image() {
        let session = Session::new("ko", "en");
        let at = OffsetDateTime::UNIX_EPOCH;
        assert!(session.export(&ExportStyle::default(), at).unwrap().is_none());

        let session = merged_session();
        let artifact = session.export(&ExportStyle::default(), at).unwrap().unwrap();
        assert_eq!(artifact.filename, "webtoon-translated-1970-01-01T00-00-00Z.jpg");
    }

    #[test]
    fn reset_returns_to_ingest() {
        let mut session = merged_session();
        session
            .add_region(PercentRect::new(10.0, 10.0, 20.0, 10.0))
            .unwrap();
        session.reset().unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.stage, Stage::Ingest);
        assert!(snapshot.images.is_empty());
        assert!(snapshot.working_image.is_none());
        assert!(snapshot.regions.is_empty());
        assert_eq!(snapshot.source_lang, "ko");
    }

    #[test]
    fn languages_must_not_be_blank() {
        let mut session = Session::new("ko", "en");
        session.set_languages("ja", " fr ").unwrap();
        assert_eq!((session.source_lang(), session.target_lang()), ("ja", "fr"));
        assert!(session.set_languages("", "en").is_err());
    }
}
