//! Request-event log.
//!
//! Every entry is mirrored to `tracing` and also kept in a bounded ring buffer
//! that is appended to a JSONL file, so a failed stream can be diagnosed from the
//! log alone.

use crate::providers::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_LOG_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Pipeline stage: `validate`, `dispatch`, `stream`, `relay`, `server`, ...
    pub stage: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            stage: stage.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }

    fn emit_tracing(&self) {
        let ctx = self
            .context
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        match self.level {
            LogLevel::Debug => tracing::debug!(stage = %self.stage, context = %ctx, "{}", self.message),
            LogLevel::Info => tracing::info!(stage = %self.stage, context = %ctx, "{}", self.message),
            LogLevel::Warn => tracing::warn!(stage = %self.stage, context = %ctx, "{}", self.message),
            LogLevel::Error => tracing::error!(stage = %self.stage, context = %ctx, "{}", self.message),
        }
    }
}

/// Ring buffer persisted as JSONL.
pub struct Logger {
    entries: VecDeque<LogEntry>,
    writer: Option<BufWriter<File>>,
}

impl Logger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = VecDeque::with_capacity(MAX_LOG_ENTRIES);

        if file_path.exists() {
            let reader = BufReader::new(File::open(file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(entry) = serde_json::from_str::<LogEntry>(&line) {
                    if entries.len() >= MAX_LOG_ENTRIES {
                        entries.pop_front();
                    }
                    entries.push_back(entry);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            entries,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// A logger with no backing file, for tests and embedding.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            entries: VecDeque::new(),
            writer: None,
        }
    }

    pub fn log(&mut self, entry: LogEntry) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
        if self.entries.len() >= MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }
}

#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<Logger>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Logger::new(file_path)?))))
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self(Arc::new(Mutex::new(Logger::in_memory())))
    }

    pub fn log(&self, entry: LogEntry) {
        entry.emit_tracing();
        if let Ok(mut logger) = self.0.lock() {
            logger.log(entry);
        }
    }

    pub fn info(&self, stage: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, stage, message));
    }

    pub fn warn(&self, stage: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warn, stage, message));
    }

    pub fn error(&self, stage: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, stage, message));
    }

    /// Mirrored to `tracing` only; debug entries are not buffered or persisted.
    pub fn debug(&self, stage: impl Into<String>, message: impl Into<String>) {
        LogEntry::new(LogLevel::Debug, stage, message).emit_tracing();
    }

    pub fn log_with_context(
        &self,
        level: LogLevel,
        stage: impl Into<String>,
        message: impl Into<String>,
        context: serde_json::Value,
    ) {
        self.log(LogEntry::new(level, stage, message).with_context(context));
    }

    /// A handle that tags every entry with a fresh request id and the provider.
    #[must_use]
    pub fn for_request(&self, provider: Provider) -> RequestLogger {
        RequestLogger {
            logger: self.clone(),
            request_id: uuid::Uuid::new_v4().to_string(),
            provider,
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }
}

/// Per-request view of a [`SharedLogger`].
#[derive(Clone)]
pub struct RequestLogger {
    logger: SharedLogger,
    request_id: String,
    provider: Provider,
}

impl RequestLogger {
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    fn context(&self) -> serde_json::Value {
        serde_json::json!({
            "request_id": self.request_id,
            "provider": self.provider.name(),
        })
    }

    pub fn info(&self, stage: &str, message: impl Into<String>) {
        self.logger
            .log_with_context(LogLevel::Info, stage, message, self.context());
    }

    pub fn warn(&self, stage: &str, message: impl Into<String>) {
        self.logger
            .log_with_context(LogLevel::Warn, stage, message, self.context());
    }

    pub fn error(&self, stage: &str, message: impl Into<String>) {
        self.logger
            .log_with_context(LogLevel::Error, stage, message, self.context());
    }

    /// Per-event chatter; goes to `tracing` only, never to the JSONL file.
    pub fn debug(&self, stage: &str, message: impl Into<String>) {
        LogEntry::new(LogLevel::Debug, stage, message)
            .with_context(self.context())
            .emit_tracing();
    }
}
