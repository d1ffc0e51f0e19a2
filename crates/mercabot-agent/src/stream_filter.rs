//! Incremental extraction of the `message` field from a streamed reply.
//!
//! Providers are told to answer with the JSON envelope, so a raw stream
//! looks like `{"message": "Hola, ...`. Callers should see `Hola, ...`
//! as it arrives. Text that does not start like JSON passes through
//! untouched. A leading markdown fence is skipped.

use mercabot_providers::reply_parser;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Nothing but whitespace seen so far.
    Detect,
    /// Inside the opening "```json" line.
    Fence,
    /// JSON envelope; looking for the `message` key.
    Seek,
    /// Decoding the `message` string value.
    Message,
    /// `message` fully emitted; the rest is ignored.
    Done,
    /// Not JSON; everything passes through.
    Plain,
}

const MESSAGE_KEY: &str = "\"message\"";

#[derive(Debug)]
pub struct EnvelopeFilter {
    mode: Mode,
    /// Unprocessed input while detecting or seeking.
    pending: String,
    /// Everything received, for the end-of-stream fallback.
    raw: String,
    escape: bool,
    unicode: Option<String>,
    high_surrogate: Option<u32>,
    emitted: bool,
}

impl Default for EnvelopeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeFilter {
    pub fn new() -> Self {
        Self {
            mode: Mode::Detect,
            pending: String::new(),
            raw: String::new(),
            escape: false,
            unicode: None,
            high_surrogate: None,
            emitted: false,
        }
    }

    /// Feed one chunk; returns the text to forward (possibly empty).
    pub fn push(&mut self, chunk: &str) -> String {
        self.raw.push_str(chunk);
        let mut out = String::new();
        match self.mode {
            Mode::Message => self.decode(chunk, &mut out),
            Mode::Plain => out.push_str(chunk),
            Mode::Done => {}
            Mode::Detect | Mode::Fence | Mode::Seek => {
                self.pending.push_str(chunk);
                self.advance(&mut out);
            }
        }
        if !out.is_empty() {
            self.emitted = true;
        }
        out
    }

    /// End of stream. Returns any text still owed to the caller: when the
    /// envelope never exposed a `message`, the whole reply is parsed once.
    pub fn finish(self) -> String {
        if self.emitted {
            return String::new();
        }
        match self.mode {
            Mode::Detect | Mode::Plain => self.pending,
            _ => reply_parser::parse_reply(&self.raw).message,
        }
    }

    fn advance(&mut self, out: &mut String) {
        loop {
            match self.mode {
                Mode::Detect => {
                    let trimmed = self.pending.trim_start();
                    let Some(first) = trimmed.chars().next() else {
                        return;
                    };
                    self.mode = match first {
                        '{' => Mode::Seek,
                        '`' => Mode::Fence,
                        _ => Mode::Plain,
                    };
                    if self.mode == Mode::Plain {
                        out.push_str(&std::mem::take(&mut self.pending));
                        return;
                    }
                }
                Mode::Fence => {
                    let Some(newline) = self.pending.find('\n') else {
                        return;
                    };
                    self.pending.drain(..=newline);
                    self.mode = Mode::Detect;
                }
                Mode::Seek => {
                    let Some(start) = find_string_start(&self.pending) else {
                        return;
                    };
                    let rest = self.pending.split_off(start);
                    self.pending.clear();
                    self.mode = Mode::Message;
                    self.decode(&rest, out);
                    return;
                }
                Mode::Message | Mode::Done | Mode::Plain => return,
            }
        }
    }

    /// Decode JSON string content until the closing quote.
    fn decode(&mut self, input: &str, out: &mut String) {
        for c in input.chars() {
            if self.mode != Mode::Message {
                return;
            }
            if let Some(hex) = self.unicode.as_mut() {
                hex.push(c);
                if hex.chars().count() == 4 {
                    let code = u32::from_str_radix(hex, 16).unwrap_or(0xFFFD);
                    self.unicode = None;
                    self.push_code_unit(code, out);
                }
                continue;
            }
            if self.escape {
                self.escape = false;
                match c {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => {}
                    'b' | 'f' => {}
                    'u' => self.unicode = Some(String::with_capacity(4)),
                    other => out.push(other),
                }
                continue;
            }
            match c {
                '\\' => self.escape = true,
                '"' => self.mode = Mode::Done,
                other => out.push(other),
            }
        }
    }

    fn push_code_unit(&mut self, code: u32, out: &mut String) {
        if (0xD800..0xDC00).contains(&code) {
            self.high_surrogate = Some(code);
            return;
        }
        let scalar = match self.high_surrogate.take() {
            Some(high) if (0xDC00..0xE000).contains(&code) => 0x10000 + ((high - 0xD800) << 10) + (code - 0xDC00),
            _ => code,
        };
        out.push(char::from_u32(scalar).unwrap_or('\u{FFFD}'));
    }
}

/// Byte offset just past the opening quote of the `message` value.
fn find_string_start(buf: &str) -> Option<usize> {
    let key = buf.find(MESSAGE_KEY)?;
    let after_key = key + MESSAGE_KEY.len();
    let rest = &buf[after_key..];
    let colon = rest.find(|c: char| !c.is_whitespace())?;
    if !rest[colon..].starts_with(':') {
        return None;
    }
    let after_colon = &rest[colon + 1..];
    let quote = after_colon.find(|c: char| !c.is_whitespace())?;
    after_colon[quote..]
        .starts_with('"')
        .then(|| after_key + colon + 1 + quote + 1)
}
