// src/core/messages.rs

use crate::models::{Message, MessageLevel};

impl MessageLevel {
    /// The `log` level a message is forwarded at. `NOTE` is the default
    /// console level, so it maps to `Info` and everything below shifts down.
    pub fn log_level(self) -> log::Level {
        match self {
            MessageLevel::Error => log::Level::Error,
            MessageLevel::Warning => log::Level::Warn,
            MessageLevel::Notice => log::Level::Info,
            MessageLevel::Info => log::Level::Debug,
            MessageLevel::Debug => log::Level::Trace,
        }
    }

    pub fn from_log_level(level: log::Level) -> Self {
        match level {
            log::Level::Error => MessageLevel::Error,
            log::Level::Warn => MessageLevel::Warning,
            log::Level::Info => MessageLevel::Notice,
            log::Level::Debug => MessageLevel::Info,
            log::Level::Trace => MessageLevel::Debug,
        }
    }
}

/// Accumulates leveled, host-tagged messages for one deployment pass.
///
/// Every recorded message is also forwarded to the `log` facade, so the
/// console shows it as it happens while the caller can still inspect the
/// full list afterwards.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
    host: Option<String>,
    demote_errors: bool,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    /// Forwards errors to the console as warnings. The recorded level is kept.
    pub fn demote_errors(&mut self, enabled: bool) {
        self.demote_errors = enabled;
    }

    pub fn demotes_errors(&self) -> bool {
        self.demote_errors
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn record(&mut self, level: MessageLevel, text: impl Into<String>) {
        let message = Message {
            level,
            host: self.host.clone(),
            text: text.into(),
        };
        let shown = console_level(message.level, self.demote_errors);
        log::log!(target: "tpm::messages", shown.log_level(), "{}", message_body(&message));
        self.messages.push(message);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.record(MessageLevel::Error, text);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.record(MessageLevel::Warning, text);
    }

    pub fn notice(&mut self, text: impl Into<String>) {
        self.record(MessageLevel::Notice, text);
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.record(MessageLevel::Info, text);
    }

    pub fn debug(&mut self, text: impl Into<String>) {
        self.record(MessageLevel::Debug, text);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn at_level(&self, level: MessageLevel) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.level == level)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Message> {
        self.at_level(MessageLevel::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// The level a message is shown at on the console. With `--quiet --force`,
/// errors are demoted to warnings; the log keeps the original level.
pub fn console_level(level: MessageLevel, demote_errors: bool) -> MessageLevel {
    if demote_errors && level == MessageLevel::Error {
        MessageLevel::Warning
    } else {
        level
    }
}

// The level prefix is added by the log formatter.
fn message_body(message: &Message) -> String {
    match &message.host {
        Some(host) => format!("{} >> {}", host, message.text),
        None => message.text.clone(),
    }
}
