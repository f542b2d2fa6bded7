//! Language codes accepted on the command line and over HTTP, with the name
//! sent to the translation model and the Tesseract traineddata to use.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub tesseract: &'static str,
}

const LANGUAGES: &[Language] = &[
    Language {
        code: "ko",
        name: "Korean",
        tesseract: "kor",
    },
    Language {
        code: "ja",
        name: "Japanese",
        tesseract: "jpn",
    },
    Language {
        code: "zh",
        name: "Chinese (Simplified)",
        tesseract: "chi_sim",
    },
    Language {
        code: "zh-hant",
        name: "Chinese (Traditional)",
        tesseract: "chi_tra",
    },
    Language {
        code: "en",
        name: "English",
        tesseract: "eng",
    },
    Language {
        code: "es",
        name: "Spanish",
        tesseract: "spa",
    },
    Language {
        code: "fr",
        name: "French",
        tesseract: "fra",
    },
    Language {
        code: "de",
        name: "German",
        tesseract: "deu",
    },
    Language {
        code: "pt",
        name: "Portuguese",
        tesseract: "por",
    },
    Language {
        code: "it",
        name: "Italian",
        tesseract: "ita",
    },
    Language {
        code: "ru",
        name: "Russian",
        tesseract: "rus",
    },
    Language {
        code: "id",
        name: "Indonesian",
        tesseract: "ind",
    },
    Language {
        code: "th",
        name: "Thai",
        tesseract: "tha",
    },
    Language {
        code: "vi",
        name: "Vietnamese",
        tesseract: "vie",
    },
];

pub fn all() -> &'static [Language] {
    LANGUAGES
}

pub fn lookup(code: &str) -> Option<&'static Language> {
    let code = normalize_code(code);
    LANGUAGES.iter().find(|lang| lang.code == code)
}

pub fn is_supported(code: &str) -> bool {
    lookup(code).is_some()
}

/// Human-readable name for prompts; unknown codes pass through unchanged.
pub fn display_name(code: &str) -> String {
    lookup(code)
        .map(|lang| lang.name.to_string())
        .unwrap_or_else(|| code.trim().to_string())
}

/// Tesseract language for a code. Values that already look like Tesseract
/// names (`kor`, `jpn_vert`, `kor+eng`) are passed through.
pub fn tesseract_code(code: &str) -> String {
    match lookup(code) {
        Some(lang) => lang.tesseract.to_string(),
        None => code.trim().to_string(),
    }
}

fn normalize_code(code: &str) -> String {
    let code = code.trim().to_lowercase().replace('_', "-");
    match code.as_str() {
        "zh-cn" | "zh-hans" => "zh".to_string(),
        "zh-tw" => "zh-hant".to_string(),
        _ => code,
    }
}
