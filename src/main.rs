use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "webtoon-translator",
    version,
    about = "Merge webtoon pages, OCR and translate marked regions, and export the result"
)]
struct Cli {
    /// Page image, in reading order (repeat for each page)
    #[arg(short = 'i', long = "image")]
    images: Vec<PathBuf>,

    /// JSON file with regions (percent x/y/width/height, optional texts)
    #[arg(short = 'R', long = "regions")]
    regions: Option<PathBuf>,

    /// Source language code (default from settings)
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Target language code (default from settings)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Model name or provider:model (e.g. gemini:gemini-2.0-flash)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Output JPEG path (default: webtoon-translated-<timestamp>.jpg)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Keep the texts from the regions file instead of running OCR
    #[arg(long = "skip-ocr")]
    skip_ocr: bool,

    /// Do not call the translation service
    #[arg(long = "skip-translate")]
    skip_translate: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Run the HTTP session service on this address instead (e.g. 127.0.0.1:8787)
    #[arg(long = "serve")]
    serve: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    webtoon_translator::logging::init(cli.verbose)?;

    if let Some(addr) = cli.serve {
        return webtoon_translator::serve(
            addr,
            cli.read_settings.as_deref(),
            cli.model.as_deref(),
            cli.key.as_deref(),
        )
        .await;
    }

    let report = webtoon_translator::run(webtoon_translator::Config {
        images: cli.images,
        regions_path: cli.regions,
        source_lang: cli.source_lang,
        lang: cli.lang,
        model: cli.model,
        key: cli.key,
        output: cli.output,
        skip_ocr: cli.skip_ocr,
        skip_translate: cli.skip_translate,
        settings_path: cli.read_settings,
    })
    .await?;

    println!("{}", report);
    Ok(())
}
