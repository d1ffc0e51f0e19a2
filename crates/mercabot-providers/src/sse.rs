//! Server-sent events decoding.
//!
//! Turns a streaming `reqwest::Response` into the `data:` payloads of its
//! events. Events are separated by a blank line; an event may span several
//! `data:` lines, which are joined with `\n`. `[DONE]` ends the stream.

use std::fmt::Display;

use futures::stream::{self, Stream, StreamExt};

use crate::error::ProviderError;

pub fn data_events(
    provider: &'static str,
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, ProviderError>> + Send {
    decode_events(provider, response.bytes_stream())
}

/// Split a raw byte stream into event payloads. Bytes are buffered until an
/// event is complete, so a character split across reads decodes intact.
fn decode_events<S, B, E>(provider: &'static str, bytes: S) -> impl Stream<Item = Result<String, ProviderError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        move |(mut bytes, mut buffer, mut done)| async move {
            loop {
                if done {
                    return None;
                }

                if let Some(end) = buffer.windows(2).position(|w| w == b"\n\n") {
                    let event: Vec<u8> = buffer.drain(..end + 2).collect();
                    match event_data(&String::from_utf8_lossy(&event)) {
                        Some(data) if data == "[DONE]" => {
                            done = true;
                            continue;
                        }
                        Some(data) => return Some((Ok(data), (bytes, buffer, done))),
                        None => continue,
                    }
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        // CR only appears as part of CRLF line endings
                        buffer.extend(chunk.as_ref().iter().filter(|b| **b != b'\r'));
                    }
                    Some(Err(e)) => {
                        done = true;
                        let err = ProviderError::Stream {
                            provider: provider.to_string(),
                            detail: format!("stream read error: {e}"),
                        };
                        return Some((Err(err), (bytes, buffer, done)));
                    }
                    None => {
                        done = true;
                        let rest = std::mem::take(&mut buffer);
                        match event_data(&String::from_utf8_lossy(&rest)) {
                            Some(data) if data != "[DONE]" => {
                                return Some((Ok(data), (bytes, buffer, done)))
                            }
                            _ => return None,
                        }
                    }
                }
            }
        },
    )
}

/// Joined `data:` payload of one event, or `None` for comments/keep-alives.
pub fn event_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if lines.is_empty() {
        return None;
    }
    let data = lines.join("\n");
    let data = data.trim();
    if data.is_empty() {
        None
    } else {
        Some(data.to_string())
    }
}
