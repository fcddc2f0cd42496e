//! Inbound console commands.
//!
//! One command per line: a case-insensitive command word, optionally
//! followed by `:` and an argument.  The [`AppService`](super::service::AppService)
//! interprets them and answers every line with exactly one
//! [`ConsoleResponse`].

use serde::Serialize;

use crate::config::CHANNEL_COUNT;
use crate::error::ParseError;

/// Commands the serial console accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Device identity, uptime, supply and link summary.
    Status,
    /// Current configuration without secrets.
    Config,
    /// Apply a configuration patch; the JSON payload is taken verbatim.
    SetConfig(String),
    /// Activate a channel as if its button were pressed.
    Test(u8),
    Wifi,
    /// Supply voltage and power mode (alias `BATTERY`).
    Power,
    Help,
    /// Forget the stored WiFi credentials and request a restart.
    ResetWifi,
    /// Blink every channel LED so the unit can be found.
    Identify,
}

/// `(usage, description)` for `HELP`.
pub const HELP: &[(&str, &str)] = &[
    ("STATUS", "Device information"),
    ("CONFIG", "Get configuration"),
    ("SET_CONFIG:<json>", "Upload configuration"),
    ("TEST:<n>", "Test button n (0-7)"),
    ("WIFI", "WiFi status"),
    ("POWER", "Supply voltage and power mode (alias BATTERY)"),
    ("RESET_WIFI", "Clear WiFi credentials and restart"),
    ("IDENTIFY", "Blink all button LEDs"),
    ("HELP", "This help"),
];

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (word, arg) = match line.split_once(':') {
            Some((w, a)) => (w.trim(), Some(a)),
            None => (line.trim(), None),
        };
        let word = word.to_ascii_uppercase();

        match (word.as_str(), arg) {
            ("SET_CONFIG", Some(json)) => Ok(Self::SetConfig(json.to_string())),
            ("SET_CONFIG", None) => Err(ParseError::BadArgument),
            ("TEST", Some(n)) => match n.trim().parse::<u8>() {
                Ok(ch) if usize::from(ch) < CHANNEL_COUNT => Ok(Self::Test(ch)),
                _ => Err(ParseError::BadArgument),
            },
            ("TEST", None) => Err(ParseError::BadArgument),
            (_, Some(_)) => Err(ParseError::UnknownCommand),
            ("STATUS", None) => Ok(Self::Status),
            ("CONFIG", None) => Ok(Self::Config),
            ("WIFI", None) => Ok(Self::Wifi),
            ("POWER" | "BATTERY", None) => Ok(Self::Power),
            ("HELP", None) => Ok(Self::Help),
            ("RESET_WIFI", None) => Ok(Self::ResetWifi),
            ("IDENTIFY", None) => Ok(Self::Identify),
            _ => Err(ParseError::UnknownCommand),
        }
    }
}

/// One reply line, written as `RESPONSE:<json>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub success: bool,
    pub message: String,
    pub timestamp: u64,
}

impl ConsoleResponse {
    pub fn ok(kind: &'static str, message: impl Into<String>, timestamp: u64) -> Self {
        Self {
            kind,
            success: true,
            message: message.into(),
            timestamp,
        }
    }

    pub fn fail(kind: &'static str, message: impl Into<String>, timestamp: u64) -> Self {
        Self {
            kind,
            success: false,
            message: message.into(),
            timestamp,
        }
    }

    /// Reply for a line that did not parse.
    pub fn parse_error(err: ParseError, timestamp: u64) -> Self {
        let message = match err {
            ParseError::BadArgument => "Invalid argument",
            _ => "Unknown command",
        };
        Self::fail("error", message, timestamp)
    }

    pub fn to_line(&self) -> String {
        format!("RESPONSE:{}", serde_json::to_string(self).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_word_is_case_insensitive() {
        assert_eq!(ConsoleCommand::parse("status"), Ok(ConsoleCommand::Status));
        assert_eq!(ConsoleCommand::parse("Battery\r\n"), Ok(ConsoleCommand::Power));
        assert_eq!(ConsoleCommand::parse("reset_wifi"), Ok(ConsoleCommand::ResetWifi));
    }

    #[test]
    fn set_config_payload_is_verbatim() {
        let cmd = ConsoleCommand::parse(r#"set_config:{"device":{"name":"MixedCase: Yes"}}"#);
        assert_eq!(
            cmd,
            Ok(ConsoleCommand::SetConfig(r#"{"device":{"name":"MixedCase: Yes"}}"#.into()))
        );
    }

    #[test]
    fn test_takes_zero_based_index() {
        assert_eq!(ConsoleCommand::parse("TEST:0"), Ok(ConsoleCommand::Test(0)));
        assert_eq!(ConsoleCommand::parse("TEST: 7"), Ok(ConsoleCommand::Test(7)));
        assert_eq!(ConsoleCommand::parse("TEST:8"), Err(ParseError::BadArgument));
        assert_eq!(ConsoleCommand::parse("TEST:x"), Err(ParseError::BadArgument));
        assert_eq!(ConsoleCommand::parse("TEST"), Err(ParseError::BadArgument));
    }

    #[test]
    fn unknown_commands_rejected() {
        assert_eq!(ConsoleCommand::parse("REBOOT"), Err(ParseError::UnknownCommand));
        assert_eq!(ConsoleCommand::parse("STATUS:now"), Err(ParseError::UnknownCommand));
        assert_eq!(ConsoleCommand::parse(""), Err(ParseError::UnknownCommand));
    }

    #[test]
    fn unknown_command_reply_shape() {
        let line = ConsoleResponse::parse_error(ParseError::UnknownCommand, 42).to_line();
        let json = line.strip_prefix("RESPONSE:").unwrap();
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["success"], false);
        assert_eq!(v["message"], "Unknown command");
        assert_eq!(v["timestamp"], 42);
    }
}
