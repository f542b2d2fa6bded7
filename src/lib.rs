use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

pub mod compositor;
pub mod editor;
pub mod languages;
pub mod logging;
pub mod ocr;
mod providers;
pub mod region;
pub mod render;
pub mod sequencing;
pub mod server;
pub mod session;
pub mod settings;
pub mod translations;

pub use ocr::{OcrEngine, TesseractEngine};
pub use providers::{Gemini, OpenAI, Provider, ProviderImpl, ProviderKind, ProviderUsage};
pub use region::{PercentRect, RegionId, TextRegion};
pub use render::ExportStyle;
pub use session::{Session, SessionBusy, Stage};
pub use settings::Settings;
pub use translations::{LlmTranslator, TranslationMap, TranslationService};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub images: Vec<PathBuf>,
    pub regions_path: Option<PathBuf>,
    pub source_lang: Option<String>,
    pub lang: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub output: Option<PathBuf>,
    pub skip_ocr: bool,
    pub skip_translate: bool,
    pub settings_path: Option<String>,
}

/// What a pipeline run did, printed by the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub regions: usize,
    pub recognized: usize,
    pub translated: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "output: {}", self.output.display())?;
        writeln!(f, "size: {}x{}", self.width, self.height)?;
        writeln!(f, "regions: {}", self.regions)?;
        writeln!(f, "recognized: {}", self.recognized)?;
        write!(f, "translated: {}", self.translated)
    }
}

/// One entry of a regions file. Only the rectangle is required; `id` is
/// accepted so a saved session snapshot can be read back, but ids are always
/// reassigned.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSpec {
    #[serde(default)]
    pub id: Option<RegionId>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub translated_text: Option<String>,
    #[serde(default)]
    pub order: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegionsFile {
    List(Vec<RegionSpec>),
    Wrapped { regions: Vec<RegionSpec> },
}

/// Parses a regions file: either a bare array or an object with a `regions`
/// array. Entries with an `order` come first, sorted by it; the rest keep
/// their file position.
pub fn parse_regions(content: &str) -> Result<Vec<RegionSpec>> {
    let parsed: RegionsFile =
        serde_json::from_str(content).with_context(|| "failed to parse regions JSON")?;
    let mut specs = match parsed {
        RegionsFile::List(specs) => specs,
        RegionsFile::Wrapped { regions } => regions,
    };
    specs.sort_by_key(|spec| spec.order.unwrap_or(u32::MAX));
    Ok(specs)
}

pub async fn run(config: Config) -> Result<RunReport> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    let engine = TesseractEngine::from_settings(&settings);
    if !config.skip_ocr {
        let source = config.source_lang.as_deref().unwrap_or(&settings.source_lang);
        ocr::check_language_installed(source);
    }
    let translator = build_translator(&settings, config.model.as_deref(), config.key.as_deref());
    let style = ExportStyle::from_settings(&settings);

    run_pipeline(&config, &settings, &engine, &translator, &style).await
}

/// Runs the whole pipeline with the given collaborators: load and merge the
/// images, add the regions, recognize, translate and export.
pub async fn run_pipeline(
    config: &Config,
    settings: &Settings,
    ocr: &dyn OcrEngine,
    translator: &dyn TranslationService,
    style: &ExportStyle,
) -> Result<RunReport> {
    if config.images.is_empty() {
        return Err(anyhow!("no images given; pass at least one --image"));
    }
    let mut session = Session::from_settings(settings);
    if config.source_lang.is_some() || config.lang.is_some() {
        let source = config
            .source_lang
            .clone()
            .unwrap_or_else(|| settings.source_lang.clone());
        let target = config
            .lang
            .clone()
            .unwrap_or_else(|| settings.target_lang.clone());
        session.set_languages(&source, &target)?;
    }

    let mut files = Vec::with_capacity(config.images.len());
    for path in &config.images {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read image: {}", path.display()))?;
        files.push((path.display().to_string(), bytes));
    }
    session.ingest_images(files)?;
    session.merge()?;

    if let Some(path) = config.regions_path.as_deref() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read regions: {}", path.display()))?;
        for spec in parse_regions(&content)? {
            add_spec(&mut session, spec)?;
        }
    }

    let recognized = if config.skip_ocr {
        0
    } else {
        session.run_ocr_pass(ocr).await?
    };
    let translated = if config.skip_translate {
        0
    } else {
        session.run_translation_pass(translator).await?
    };

    let artifact = session
        .export(style, OffsetDateTime::now_utc())?
        .ok_or_else(|| anyhow!("nothing to export"))?;
    let output = config
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&artifact.filename));
    std::fs::write(&output, &artifact.bytes)
        .with_context(|| format!("failed to write output: {}", output.display()))?;
    info!(output = %output.display(), "export written");

    let (width, height) = session
        .working_image()
        .map(|working| (working.width(), working.height()))
        .unwrap_or((0, 0));
    Ok(RunReport {
        output,
        width,
        height,
        regions: session.regions().len(),
        recognized,
        translated,
    })
}

fn add_spec(session: &mut Session, spec: RegionSpec) -> Result<()> {
    let rect = PercentRect::new(spec.x, spec.y, spec.width, spec.height);
    let Some(id) = session.add_region(rect)? else {
        warn!(
            x = spec.x,
            y = spec.y,
            width = spec.width,
            height = spec.height,
            "skipping region that is too small"
        );
        return Ok(());
    };
    if spec.original_text.is_some() || spec.translated_text.is_some() {
        session.edit_region_text(id, spec.original_text, spec.translated_text)?;
    }
    Ok(())
}

/// Model precedence: explicit argument, then `[translation] model` from
/// settings, then whichever API key is present.
pub fn build_translator(
    settings: &Settings,
    model: Option<&str>,
    key: Option<&str>,
) -> LlmTranslator {
    let model = model.or(settings.translation_model.as_deref());
    LlmTranslator::from_model_arg(model, key)
}

/// Starts the HTTP session service with Tesseract OCR and the configured
/// translation provider.
pub async fn serve(
    addr: String,
    settings_path: Option<&str>,
    model: Option<&str>,
    key: Option<&str>,
) -> Result<()> {
    let settings = settings::load_settings(settings_path.map(Path::new))?;
    ocr::check_language_installed(&settings.source_lang);
    let translator = build_translator(&settings, model, key);
    let state = server::ServerState::from_settings(
        &settings,
        Arc::new(TesseractEngine::from_settings(&settings)),
        Arc::new(translator),
    );
    server::run_server(state, addr).await
}
