//! STOMP 1.2 frame encoding and incremental decoding.

use strum::{AsRefStr, Display, EnumString};

use crate::error::{BotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// CONNECT and CONNECTED frames carry their headers unescaped.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    #[must_use]
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

    /// First value of header `name`; repeated headers after the first are ignored.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_ref());
        out.push('\n');

        for (name, value) in &self.headers {
            if escape {
                push_header(&mut out, &escape_header(name), &escape_header(value));
            } else {
                push_header(&mut out, name, value);
            }
        }
        if !self.body.is_empty() && self.get_header("content-length").is_none() {
            push_header(&mut out, "content-length", &self.body.len().to_string());
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push(':');
    out.push_str(value);
    out.push('\n');
}

fn escape_header(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            ':' => escaped.push_str("\\c"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape_header(raw: &str) -> Result<String> {
    let mut unescaped = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => unescaped.push('\\'),
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('c') => unescaped.push(':'),
            other => {
                return Err(BotError::Frame(format!(
                    "invalid escape sequence '\\{}' in header",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(unescaped)
}

/// Accumulates transport text and yields complete frames.
///
/// Heart-beat end-of-lines between frames are skipped. After a malformed frame
/// is reported, its remaining bytes up to the terminating NUL are discarded so
/// decoding resumes with the next frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    discarding: bool,
}

impl FrameDecoder {
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete frame, or `None` when more data is needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.discarding && !self.discard_rest_of_frame() {
            return Ok(None);
        }

        self.decode().inspect_err(|_| {
            self.discarding = true;
            self.discard_rest_of_frame();
        })
    }

    /// Drops bytes through the next NUL. Returns false while the end of the
    /// frame hasn't arrived yet.
    fn discard_rest_of_frame(&mut self) -> bool {
        match self.buffer.iter().position(|b| *b == 0) {
            Some(pos) => {
                self.buffer.drain(..=pos);
                self.discarding = false;
                true
            }
            None => {
                self.buffer.clear();
                false
            }
        }
    }

    fn decode(&mut self) -> Result<Option<Frame>> {
        let leading = self
            .buffer
            .iter()
            .take_while(|b| matches!(b, b'\n' | b'\r'))
            .count();
        self.buffer.drain(..leading);

        let Some((head_len, body_start)) = find_head_end(&self.buffer) else {
            return Ok(None);
        };

        let head = std::str::from_utf8(&self.buffer[..head_len])
            .map_err(|e| BotError::Frame(format!("frame head is not UTF-8: {e}")))?;
        let mut lines = head.lines().map(|line| line.trim_end_matches('\r'));

        let command_line = lines.next().unwrap_or_default();
        let command: Command = command_line
            .parse()
            .map_err(|_| BotError::Frame(format!("unknown command '{command_line}'")))?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| BotError::Frame(format!("header without colon: '{line}'")))?;
            if command.escapes_headers() {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .map(|(_, value)| {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| BotError::Frame(format!("bad content-length '{value}'")))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                let body_end = body_start
                    .checked_add(len)
                    .filter(|end| *end < usize::MAX)
                    .ok_or_else(|| BotError::Frame(format!("content-length {len} is too large")))?;
                if self.buffer.len() <= body_end {
                    return Ok(None);
                }
                if self.buffer[body_end] != 0 {
                    return Err(BotError::Frame(
                        "body is not terminated by NUL after content-length bytes".to_string(),
                    ));
                }
                body_end
            }
            None => match self.buffer[body_start..].iter().position(|b| *b == 0) {
                Some(pos) => body_start + pos,
                None => return Ok(None),
            },
        };

        let body = String::from_utf8_lossy(&self.buffer[body_start..body_end]).into_owned();
        self.buffer.drain(..=body_end);

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

/// Length of the command and header lines, and where the body starts.
fn find_head_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    while let Some(pos) = buffer[line_start..].iter().position(|b| *b == b'\n') {
        let line_end = line_start + pos;
        let line = &buffer[line_start..line_end];
        if line.is_empty() || line == b"\r" {
            return Some((line_start, line_end + 1));
        }
        line_start = line_end + 1;
    }
    None
}
