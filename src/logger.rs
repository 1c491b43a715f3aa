use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, LevelFilter, Metadata, Record};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use uuid::Uuid;

static FUNCTION_LOGGER: Lazy<FunctionLogger> = Lazy::new(FunctionLogger::new);

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Runs `fut` with `request_id` attached to every log line it emits.
/// Work moved to other tasks or blocking threads does not inherit it.
pub async fn with_request_id<F: Future>(request_id: impl Into<String>, fut: F) -> F::Output {
    REQUEST_ID.scope(request_id.into(), fut).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

pub fn init() -> Result<(), String> {
    init_with_config(LoggerConfig::from_env())
}

pub fn init_with_config(config: LoggerConfig) -> Result<(), String> {
    let max_level = config.min_level.to_level_filter();
    FUNCTION_LOGGER.update_config(config);

    if let Err(e) = log::set_logger(&*FUNCTION_LOGGER) {
        return Err(format!("Failed to set logger: {:?}", e));
    }

    log::set_max_level(max_level);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Console label, emoji, colour and Cloud Logging severity.
    fn style(&self) -> (&'static str, &'static str, Color, &'static str) {
        match self {
            LogLevel::Trace => ("TRACE", "🔍", Color::Cyan, "DEBUG"),
            LogLevel::Debug => ("DEBUG", "🐛", Color::Blue, "DEBUG"),
            LogLevel::Info => ("INFO", "💡", Color::Green, "INFO"),
            LogLevel::Warn => ("WARN", "⚠️", Color::Yellow, "WARNING"),
            LogLevel::Error => ("ERROR", "❌", Color::Red, "ERROR"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.style().0
    }

    pub fn emoji(&self) -> &'static str {
        self.style().1
    }

    pub fn color(&self) -> Color {
        self.style().2
    }

    pub fn severity(&self) -> &'static str {
        self.style().3
    }

    pub fn to_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::Trace,
            LogLevel::Debug => Level::Debug,
            LogLevel::Info => Level::Info,
            LogLevel::Warn => Level::Warn,
            LogLevel::Error => Level::Error,
        }
    }

    pub fn to_level_filter(&self) -> LevelFilter {
        self.to_level().to_level_filter()
    }

    pub fn from_level(level: Level) -> Self {
        [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ]
        .into_iter()
        .find(|candidate| candidate.to_level() == level)
        .unwrap_or(LogLevel::Info)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: &'static str,
    #[serde(skip)]
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub message: String,
    pub module: String,
    pub file: String,
    pub line: u32,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: String, module: String, file: String, line: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            severity: level.severity(),
            level,
            request_id: current_request_id(),
            message,
            module,
            file,
            line,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub show_colors: bool,
    pub show_emojis: bool,
    pub show_file_location: bool,
    pub show_module: bool,
    pub include_timestamp: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub custom_prefix: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: true,
            show_emojis: true,
            show_file_location: true,
            show_module: true,
            include_timestamp: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            output_json: false,
            custom_prefix: None,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `LOG_FORMAT=json` selects [`LoggerConfig::production`]; `LOG_LEVEL`
    /// overrides the minimum level of either profile.
    pub fn from_env() -> Self {
        let json = std::env::var("LOG_FORMAT")
            .map(|val| val.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config = if json {
            Self::production()
        } else {
            Self::development()
        };

        match std::env::var("LOG_LEVEL").ok().and_then(|val| val.parse().ok()) {
            Some(level) => config.with_level(level),
            None => config,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.custom_prefix = Some(prefix.into());
        self
    }

    pub fn production() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: false,
            show_emojis: false,
            output_json: true,
            ..Default::default()
        }
    }

    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            show_colors: true,
            show_emojis: true,
            output_json: false,
            show_file_location: true,
            ..Default::default()
        }
    }
}

pub struct FunctionLogger {
    config: RwLock<LoggerConfig>,
}

impl FunctionLogger {
    pub fn new() -> Self {
        Self {
            config: RwLock::new(LoggerConfig::default()),
        }
    }

    pub fn update_config(&self, new_config: LoggerConfig) {
        if let Ok(mut config) = self.config.write() {
            *config = new_config;
        }
    }

    fn format_console_output(&self, entry: &LogEntry, config: &LoggerConfig) -> String {
        let paint = |text: &str, style: fn(&str) -> ColoredString| -> String {
            if config.show_colors {
                style(text).to_string()
            } else {
                text.to_string()
            }
        };

        let mut parts: Vec<String> = Vec::new();

        if let Some(prefix) = &config.custom_prefix {
            parts.push(format!("[{}]", paint(prefix, |s| s.bright_white().bold())));
        }

        if config.include_timestamp {
            let timestamp = entry.timestamp.format(&config.timestamp_format).to_string();
            parts.push(paint(&timestamp, |s| s.bright_black()));
        }

        let level = if config.show_emojis {
            format!("{} {}", entry.level.emoji(), entry.level.as_str())
        } else {
            entry.level.as_str().to_string()
        };
        let level = if config.show_colors {
            level.color(entry.level.color()).bold().to_string()
        } else {
            level
        };
        parts.push(format!("[{}]", level));

        if let Some(id) = &entry.request_id {
            parts.push(format!("[req:{}]", paint(id, |s| s.magenta())));
        }

        let mut message = String::new();
        if config.show_module && !entry.module.is_empty() {
            message.push_str(&paint(&entry.module, |s| s.bright_blue()));
            message.push_str("::");
        }
        message.push_str(&paint(&entry.message, |s| s.white().bold()));
        parts.push(message);

        if config.show_file_location {
            let location = format!("{}:{}", entry.file, entry.line);
            parts.push(format!("({})", paint(&location, |s| s.bright_black())));
        }

        parts.join(" ")
    }

    fn create_log_entry(&self, record: &Record) -> LogEntry {
        LogEntry::new(
            LogLevel::from_level(record.level()),
            record.args().to_string(),
            record.module_path().unwrap_or("unknown").to_string(),
            record.file().unwrap_or("unknown").to_string(),
            record.line().unwrap_or(0),
        )
    }
}

impl Default for FunctionLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl log::Log for FunctionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.config.read() {
            Ok(config) => metadata.level() <= config.min_level.to_level(),
            Err(_) => true,
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let entry = self.create_log_entry(record);
        if let Ok(config) = self.config.read() {
            // One JSON object per line is what the hosting runtime's log
            // collector parses into structured entries.
            if config.output_json {
                println!("{}", serde_json::to_string(&entry).unwrap_or_default());
            } else {
                println!("{}", self.format_console_output(&entry, &config));
            }
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

/// Logs how long a pipeline stage took when dropped.
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        log::info!(
            "⏱️  {} finished in {}ms",
            self.name,
            self.elapsed().as_millis()
        );
    }
}

pub fn timer(name: &str) -> Timer {
    Timer::new(name)
}

pub fn log_startup_info(app_name: &str, version: &str, port: u16) {
    log::info!("🚀 Starting {} v{}", app_name, version);
    log::info!("🌐 Listening on http://0.0.0.0:{}", port);
}

/// Logs the effective configuration. Secrets are reported by length only.
pub fn log_config_info(config: &crate::config::Config) {
    log::info!("⚙️  Configuration loaded:");
    log::info!("   Preset: {}", config.preset.as_str());
    log::info!("   Input: {:?}", config.pipeline.input_source);
    log::info!("   Missing prompt: {:?}", config.pipeline.missing_prompt);
    log::info!("   Key strategy: {:?}", config.pipeline.key_strategy);
    log::info!(
        "   Engine: {} @ {}",
        config.stability.engine,
        config.stability.host
    );
    match &config.stability.api_key {
        Some(key) => log::info!("   API key: ✅ ({} chars)", key.len()),
        None => log::warn!("   API key: ❌ not set"),
    }
    log::info!("   Storage: {}", config.storage.backend.as_str());
    match &config.storage.bucket {
        Some(bucket) => log::info!("   Bucket: {}", bucket),
        None => log::warn!("   Bucket: ❌ not set"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert_eq!(LogLevel::Info.as_str(), "INFO");
        assert_eq!(LogLevel::Error.emoji(), "❌");
        assert_eq!(LogLevel::Debug.color(), Color::Blue);
        assert_eq!(LogLevel::Warn.severity(), "WARNING");
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_logger_config() {
        let config = LoggerConfig::development();
        assert_eq!(config.min_level, LogLevel::Debug);
        assert!(config.show_colors);

        let prod_config = LoggerConfig::production();
        assert!(!prod_config.show_colors);
        assert!(prod_config.output_json);
    }

    #[test]
    fn test_plain_console_format() {
        let logger = FunctionLogger::new();
        let config = LoggerConfig::new().with_colors(false).with_prefix("fn");
        let config = LoggerConfig {
            show_emojis: false,
            include_timestamp: false,
            ..config
        };
        let entry = LogEntry::new(
            LogLevel::Warn,
            "bucket missing".into(),
            "stability_bucket::storage".into(),
            "src/storage/mod.rs".into(),
            12,
        );

        assert_eq!(
            logger.format_console_output(&entry, &config),
            "[fn] [WARN] stability_bucket::storage::bucket missing (src/storage/mod.rs:12)"
        );
    }

    #[test]
    fn test_json_entry_carries_severity() {
        let entry = LogEntry::new(LogLevel::Warn, "filtered".into(), "m".into(), "f.rs".into(), 1);
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["severity"], "WARNING");
        assert_eq!(json["message"], "filtered");
        assert!(json.get("level").is_none());
        assert!(json.get("request_id").is_none());
    }

    #[tokio::test]
    async fn test_entries_inside_a_request_carry_its_id() {
        let logger = FunctionLogger::new();
        let config = LoggerConfig {
            show_emojis: false,
            include_timestamp: false,
            show_file_location: false,
            show_module: false,
            ..LoggerConfig::new().with_colors(false)
        };

        let entry = with_request_id("req-7", async {
            LogEntry::new(LogLevel::Info, "uploading".into(), "m".into(), "f.rs".into(), 1)
        })
        .await;

        assert_eq!(entry.request_id.as_deref(), Some("req-7"));
        assert_eq!(
            logger.format_console_output(&entry, &config),
            "[INFO] [req:req-7] uploading"
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["request_id"], "req-7");
        assert_eq!(current_request_id(), None);
    }

    #[test]
    fn test_logger_initialization() {
        let config = LoggerConfig::development();
        assert!(init_with_config(config).is_ok());
    }
}
