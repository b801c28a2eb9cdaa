use std::env;
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;

use crate::compositor::CompositeOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: String,
    pub bind_address: String,
    pub cors_allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_temperature: f32,
    pub gemini_max_output_tokens: i32,
    pub gemini_timeout_seconds: u64,
    pub contrast_factor: f32,
    pub shadow_peak_alpha: u8,
    pub shadow_blur_sigma: f32,
    pub keep_alpha: bool,
    pub max_overlay_dimension: u32,
    /// Problems found while loading, logged once logging is up.
    pub load_warnings: Vec<String>,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f32>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_csv(name: &str, default: &str) -> Vec<String> {
    parse_csv(&env::var(name).unwrap_or_else(|_| default.to_string()))
}

fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn resolve_gemini_api_key() -> String {
    for name in ["GEMINI_API_KEY", "GOOGLE_API_KEY"] {
        if let Ok(value) = env::var(name) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    String::new()
}

fn normalize_base_url(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn clamp_shadow_alpha(value: u64) -> (u8, Option<String>) {
    let warning = (value > u8::MAX as u64)
        .then(|| format!("SHADOW_PEAK_ALPHA={value} exceeds 255; clamping."));
    (value.min(u8::MAX as u64) as u8, warning)
}

impl Config {
    pub fn load() -> Result<Self> {
        let gemini_api_key = resolve_gemini_api_key();
        let mut load_warnings = Vec::new();
        let (shadow_peak_alpha, shadow_warning) =
            clamp_shadow_alpha(env_u64("SHADOW_PEAK_ALPHA", 50));
        load_warnings.extend(shadow_warning);

        let mut cors_allowed_origins = env_csv(
            "CORS_ALLOWED_ORIGINS",
            "https://barulins.art,https://*.barulins.art",
        );
        if cors_allowed_origins.is_empty() {
            cors_allowed_origins = vec!["*".to_string()];
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: env_string("LOG_DIR", "logs"),
            bind_address: env_string("BIND_ADDRESS", "0.0.0.0:8080"),
            cors_allowed_origins,
            max_body_bytes: env_usize("MAX_BODY_BYTES", 32 * 1024 * 1024),
            gemini_api_key,
            gemini_model: env_string("GEMINI_MODEL", "gemini-1.5-pro"),
            gemini_base_url: normalize_base_url(env_string(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            )),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.4),
            gemini_max_output_tokens: env_i32("GEMINI_MAX_OUTPUT_TOKENS", 1024),
            gemini_timeout_seconds: env_u64("GEMINI_TIMEOUT_SECONDS", 0),
            contrast_factor: env_f32("CONTRAST_FACTOR", 1.1),
            shadow_peak_alpha,
            shadow_blur_sigma: env_f32("SHADOW_BLUR_SIGMA", 5.0),
            keep_alpha: env_bool("KEEP_ALPHA", false),
            max_overlay_dimension: env_u64("MAX_OVERLAY_DIMENSION", 16384).clamp(1, u32::MAX as u64)
                as u32,
            load_warnings,
        })
    }

    /// `None` keeps the model call blocking until the remote side answers.
    pub fn gemini_timeout(&self) -> Option<Duration> {
        match self.gemini_timeout_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        }
    }

    pub fn composite_options(&self) -> CompositeOptions {
        CompositeOptions {
            contrast_factor: self.contrast_factor,
            shadow_peak_alpha: self.shadow_peak_alpha,
            shadow_blur_sigma: self.shadow_blur_sigma,
            keep_alpha: self.keep_alpha,
            max_overlay_dimension: self.max_overlay_dimension,
        }
    }
}

pub const PLACEMENT_PROMPT: &str = r#"
Ты — профессиональный ассистент по дизайну интерьеров.
На первом изображении (интерьер) найди самую подходящую стену для размещения картины.
Учти перспективу, освещение и тени в комнате.
Верни ТОЛЬКО JSON с координатами для размещения второй картины (artwork):
{"x": центр_x (пиксели, от 0 до ширины интерьера), "y": верх_y (от 0), "scale": 0.5-1.0 (масштаб), "rotation": угол_в_градусах (обычно 0-5), "wall_height": высота_стены_пиксели (для теней)}.
Предполагай размер интерьера 1920x1080. Не добавляй текст вне JSON.
"#;
