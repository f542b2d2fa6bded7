use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub source_lang: String,
    pub target_lang: String,
    pub ocr_psm: u32,
    pub ocr_upscale: u32,
    pub export_font_family: Option<String>,
    pub export_font_path: Option<String>,
    pub export_fill_color: String,
    pub export_text_color: String,
    pub export_quality: u8,
    pub translation_model: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_lang: "ko".to_string(),
            target_lang: "en".to_string(),
            ocr_psm: 6,
            ocr_upscale: 2,
            export_font_family: None,
            export_font_path: None,
            export_fill_color: "#ffffff".to_string(),
            export_text_color: "#000000".to_string(),
            export_quality: 95,
            translation_model: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    system: Option<SystemSettings>,
    ocr: Option<OcrSettings>,
    export: Option<ExportSettings>,
    translation: Option<TranslationSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct SystemSettings {
    source_lang: Option<String>,
    target_lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    psm: Option<u32>,
    upscale: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportSettings {
    font_family: Option<String>,
    font_path: Option<String>,
    fill_color: Option<String>,
    text_color: Option<String>,
    quality: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    model: Option<String>,
}

/// Loads the embedded defaults, then layers `settings.toml` and
/// `settings.local.toml` from the working directory and from
/// `$HOME/.webtoon-translator`, then `extra_path` when given.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    load_settings_with_home(home_dir().as_deref(), extra_path)
}

pub fn load_settings_with_home(home: Option<&Path>, extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.merge(parse_settings(DEFAULT_SETTINGS_TOML, Path::new("<default>"))?);
    if let Some(home) = home {
        ensure_home_settings_file(home)?;
    }

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge(parse_settings(&content, &path)?);
        }
    }

    Ok(settings)
}

fn parse_settings(content: &str, path: &Path) -> Result<SettingsFile> {
    toml::from_str(content).with_context(|| format!("failed to parse settings: {}", path.display()))
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(system) = incoming.system {
            if let Some(lang) = non_blank(system.source_lang) {
                self.source_lang = lang;
            }
            if let Some(lang) = non_blank(system.target_lang) {
                self.target_lang = lang;
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(psm) = ocr.psm {
                self.ocr_psm = psm;
            }
            if let Some(upscale) = ocr.upscale
                && upscale > 0
            {
                self.ocr_upscale = upscale;
            }
        }
        if let Some(export) = incoming.export {
            if let Some(family) = non_blank(export.font_family) {
                self.export_font_family = Some(family);
            }
            if let Some(path) = non_blank(export.font_path) {
                self.export_font_path = Some(path);
            }
            if let Some(color) = non_blank(export.fill_color) {
                self.export_fill_color = color;
            }
            if let Some(color) = non_blank(export.text_color) {
                self.export_text_color = color;
            }
            if let Some(quality) = export.quality
                && (1..=100).contains(&quality)
            {
                self.export_quality = quality;
            }
        }
        if let Some(translation) = incoming.translation
            && let Some(model) = non_blank(translation.model)
        {
            self.translation_model = Some(model);
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn ensure_home_settings_file(home: &Path) -> Result<()> {
    fs::create_dir_all(home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".webtoon-translator"))
        }
    })
}
