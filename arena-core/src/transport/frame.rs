//! STOMP 1.2 frames
//!
//! One frame per WebSocket text message. Bare EOLs are heart-beats and decode
//! to `None`.

use std::fmt;

use crate::error::ProtocolError;

/// Frame command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECT" => Some(Self::Connect),
            "STOMP" => Some(Self::Stomp),
            "CONNECTED" => Some(Self::Connected),
            "SEND" => Some(Self::Send),
            "SUBSCRIBE" => Some(Self::Subscribe),
            "UNSUBSCRIBE" => Some(Self::Unsubscribe),
            "MESSAGE" => Some(Self::Message),
            "RECEIPT" => Some(Self::Receipt),
            "ERROR" => Some(Self::Error),
            "DISCONNECT" => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// CONNECT and CONNECTED headers are never escaped
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header (repeated headers: first one wins)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(authorization: &str) -> Self {
        Self::new(Command::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("heart-beat", "0,0")
            .header("Authorization", authorization)
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send(destination: &str, json: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(json)
    }

    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Serialize to wire text (NUL terminated)
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse wire text. Heart-beats yield `Ok(None)`.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        let (head, rest) = split_head(text)
            .ok_or_else(|| ProtocolError::MalformedFrame("missing blank line after headers".into()))?;

        let mut lines = head.lines();
        let command_line = lines.next().unwrap_or_default().trim_end_matches('\r');
        let command = Command::parse(command_line).ok_or_else(|| {
            ProtocolError::MalformedFrame(format!("unknown command {command_line:?}"))
        })?;
        let unescape = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                ProtocolError::MalformedFrame(format!("header without colon: {line:?}"))
            })?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let declared_len = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .and_then(|(_, v)| v.trim().parse::<usize>().ok());

        let body = match declared_len {
            Some(len) if len <= rest.len() && rest.is_char_boundary(len) => &rest[..len],
            _ => rest.split('\0').next().unwrap_or_default(),
        };

        Ok(Some(Self {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

/// Split at the first blank line, tolerating CRLF
fn split_head(text: &str) -> Option<(&str, &str)> {
    let lf = text.find("\n\n").map(|i| (i, 2));
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let (idx, sep) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 < b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => {
            // A frame with no headers and no body may end right after the command
            let trimmed = text.trim_end_matches('\0').trim_end_matches(['\r', '\n']);
            return (!trimmed.contains('\n')).then_some((trimmed, ""));
        }
    };
    Some((&text[..idx], &text[idx + sep..]))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ProtocolError::MalformedFrame(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_decodes_to_none() {
        assert_eq!(Frame::decode("\n").unwrap(), None);
        assert_eq!(Frame::decode("\r\n").unwrap(), None);
        assert_eq!(Frame::decode("").unwrap(), None);
    }

    #[test]
    fn connect_frame_carries_bearer_header_unescaped() {
        let wire = Frame::connect("Bearer abc.def:ghi").encode();
        assert!(wire.starts_with("CONNECT\n"));
        assert!(wire.contains("Authorization:Bearer abc.def:ghi\n"));
        assert!(wire.ends_with("\n\n\0"));
    }

    #[test]
    fn decodes_spring_message_frame() {
        let wire = "MESSAGE\ndestination:/topic/room/AB12\ncontent-type:application/json\nsubscription:sub-0\nmessage-id:3f-1\ncontent-length:37\n\n{\"type\":\"CHAT\",\"content\":\"hi\",\"x\":12}\0";
        let frame = Frame::decode(wire).unwrap().unwrap();

        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.get("destination"), Some("/topic/room/AB12"));
        assert_eq!(frame.body, "{\"type\":\"CHAT\",\"content\":\"hi\",\"x\":12}");
    }

    #[test]
    fn decodes_frame_without_content_length() {
        let frame = Frame::decode("MESSAGE\nsubscription:sub-1\n\n{\"event\":\"START_MATCH\"}\0\n")
            .unwrap()
            .unwrap();
        assert_eq!(frame.body, "{\"event\":\"START_MATCH\"}");
    }

    #[test]
    fn decodes_crlf_frames() {
        let frame = Frame::decode("CONNECTED\r\nversion:1.2\r\n\r\n\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.get("version"), Some("1.2"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn send_frame_escapes_header_values() {
        let frame = Frame::send("/app/chat.typing/a:b", "{}");
        let wire = frame.encode();
        assert!(wire.contains("destination:/app/chat.typing/a\\cb\n"));

        let decoded = Frame::decode(&wire).unwrap().unwrap();
        assert_eq!(decoded.get("destination"), Some("/app/chat.typing/a:b"));
        assert_eq!(decoded.body, "{}");
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let frame = Frame::send("/app/chat.sendMessage", "{\"content\":\"héllo ✓\"}");
        let decoded = Frame::decode(&frame.encode()).unwrap().unwrap();
        assert_eq!(decoded.body, "{\"content\":\"héllo ✓\"}");
    }

    #[test]
    fn unknown_command_is_malformed() {
        let err = Frame::decode("PING\n\n\0").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn bad_escape_is_malformed() {
        let err = Frame::decode("MESSAGE\ndestination:/topic/\\x\n\n\0").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn bare_disconnect_decodes() {
        let frame = Frame::decode("DISCONNECT\n\0").unwrap().unwrap();
        assert_eq!(frame.command, Command::Disconnect);
    }
}
