const fn base_url() -> &'static str {
    if let Some(url) = option_env!("CROWDCOMPASS_GENAI_BASE_URL") {
        url
    } else {
        "https://generativelanguage.googleapis.com/v1beta"
    }
}

const fn model() -> &'static str {
    if let Some(model) = option_env!("CROWDCOMPASS_GENAI_MODEL") {
        model
    } else {
        "gemini-2.0-flash"
    }
}

/// Provider API root, can be overridden at build time
pub const DEFAULT_BASE_URL: &str = base_url();
/// Model used when none is configured, can be overridden at build time
pub const DEFAULT_MODEL: &str = model();

const DEFAULT_GENERATE_URL: &str =
    const_str::concat!(DEFAULT_BASE_URL, "/models/", DEFAULT_MODEL, ":generateContent");

pub fn generate_url(base_url: &str, model: &str) -> String {
    if base_url == DEFAULT_BASE_URL && model == DEFAULT_MODEL {
        DEFAULT_GENERATE_URL.to_string()
    } else {
        format!(
            "{}/models/{model}:generateContent",
            base_url.trim_end_matches('/')
        )
    }
}
