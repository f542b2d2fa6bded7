use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, ImageFormat};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use super::preprocess::prepare_crop;
use super::{OcrEngine, OcrFuture};
use crate::languages;
use crate::settings::Settings;

/// OCR through the `tesseract` command line tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TesseractEngine {
    pub psm: u32,
    pub upscale: u32,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self { psm: 6, upscale: 2 }
    }
}

impl TesseractEngine {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            psm: settings.ocr_psm,
            upscale: settings.ocr_upscale.max(1),
        }
    }

    fn recognize_blocking(&self, crop: &DynamicImage, language: &str) -> Result<String> {
        let prepared = prepare_crop(crop, self.upscale);
        let file = tempfile::Builder::new()
            .prefix("webtoon-ocr-")
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create OCR temp file")?;
        prepared
            .save_with_format(file.path(), ImageFormat::Png)
            .with_context(|| "failed to write OCR crop")?;
        run_tesseract(file.path(), language, self.psm)
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize<'a>(&'a self, crop: &'a DynamicImage, language: &'a str) -> OcrFuture<'a> {
        let engine = *self;
        let crop = crop.clone();
        let language = languages::tesseract_code(language);
        Box::pin(async move {
            debug!(
                width = crop.width(),
                height = crop.height(),
                language = %language,
                "running tesseract"
            );
            tokio::task::spawn_blocking(move || engine.recognize_blocking(&crop, &language))
                .await
                .with_context(|| "tesseract task panicked")?
        })
    }
}

fn run_tesseract(path: &Path, language: &str, psm: u32) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(language)
        .arg("--psm")
        .arg(psm.to_string())
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(normalize_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Joins the recognized lines with single newlines and drops blank lines and
/// form feeds.
fn normalize_output(raw: &str) -> String {
    raw.lines()
        .map(|line| line.trim_matches(|ch: char| ch.is_whitespace() || ch == '\u{c}'))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    Ok(parse_language_list(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Logs a warning when the traineddata for `code` is not installed. Returns
/// whether it was found; an unreachable tesseract counts as found.
pub fn check_language_installed(code: &str) -> bool {
    let wanted = languages::tesseract_code(code);
    let available = match list_tesseract_languages() {
        Ok(list) => list,
        Err(err) => {
            debug!("could not list tesseract languages: {:#}", err);
            return true;
        }
    };
    let missing: Vec<&str> = wanted
        .split('+')
        .map(str::trim)
        .filter(|lang| !lang.is_empty() && !available.iter().any(|value| value == lang))
        .collect();
    if missing.is_empty() {
        return true;
    }
    warn!(
        "tesseract language(s) not installed: {} (available: {})",
        missing.join(", "),
        available.join(", ")
    );
    false
}
