const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Process-wide settings, read once from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Idle sessions older than this are evicted. Zero keeps them forever.
    pub session_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            api_key: non_empty("GEMINI_API_KEY"),
            api_base: non_empty("GEMINI_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            text_model: non_empty("GEMINI_TEXT_MODEL").unwrap_or(defaults.text_model),
            image_model: non_empty("GEMINI_IMAGE_MODEL").unwrap_or(defaults.image_model),
            port: non_empty("PORT").and_then(|v| v.parse().ok()).unwrap_or(defaults.port),
            max_upload_bytes: non_empty("MAX_UPLOAD_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            session_ttl_secs: non_empty("SESSION_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.session_ttl_secs),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}
