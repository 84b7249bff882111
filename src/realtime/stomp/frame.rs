//! STOMP 1.2 framing.

use std::io::{BufRead, Read, Write};

use thiserror::Error;

const NUL: u8 = 0;
const EOL: u8 = b'\n';

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {reason}")]
    Malformed { reason: String },
    #[error("frame too large: max {max_frame_bytes} got at least {got_bytes}")]
    FrameTooLarge {
        max_frame_bytes: usize,
        got_bytes: usize,
    },
    #[error("invalid header escape `\\{found}`")]
    InvalidEscape { found: char },
}

fn malformed(reason: impl Into<String>) -> FrameError {
    FrameError::Malformed {
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `name`; repeated headers keep their first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// CONNECT and CONNECTED frames carry headers verbatim.
    fn escapes_headers(command: &str) -> bool {
        !matches!(command, "CONNECT" | "CONNECTED")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadItem {
    Frame(Frame),
    Heartbeat,
}

pub struct FrameReader<R> {
    reader: R,
    max_frame_bytes: usize,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            max_frame_bytes,
        }
    }

    /// Next frame or heartbeat. `Ok(None)` on a clean EOF between frames.
    pub fn read_next(&mut self) -> Result<Option<ReadItem>, FrameError> {
        let mut consumed = 0usize;
        let Some(command_line) = self.read_line(&mut consumed)? else {
            return Ok(None);
        };
        if command_line.is_empty() {
            return Ok(Some(ReadItem::Heartbeat));
        }
        let command = String::from_utf8(command_line)
            .map_err(|_| malformed("command is not utf-8"))?;
        let escaped = Frame::escapes_headers(&command);

        let mut headers = Vec::new();
        loop {
            let line = self
                .read_line(&mut consumed)?
                .ok_or_else(|| truncated("headers"))?;
            if line.is_empty() {
                break;
            }
            let line = String::from_utf8(line).map_err(|_| malformed("header is not utf-8"))?;
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| malformed(format!("header without colon: {line}")))?;
            let (name, value) = if escaped {
                (unescape(name)?, unescape(value)?)
            } else {
                (name.to_string(), value.to_string())
            };
            headers.push((name, value));
        }

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .map(|(_, value)| {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| malformed(format!("bad content-length `{value}`")))
            })
            .transpose()?;

        let body = match content_length {
            Some(len) => {
                self.charge(&mut consumed, len)?;
                let mut body = vec![0u8; len];
                self.reader.read_exact(&mut body)?;
                let mut terminator = [0u8; 1];
                self.reader.read_exact(&mut terminator)?;
                if terminator[0] != NUL {
                    return Err(malformed("body not terminated by NUL"));
                }
                body
            }
            None => {
                let remaining = self.max_frame_bytes.saturating_sub(consumed) as u64 + 1;
                let mut body = Vec::new();
                (&mut self.reader)
                    .take(remaining)
                    .read_until(NUL, &mut body)?;
                if body.last() != Some(&NUL) {
                    if body.len() as u64 >= remaining {
                        return Err(FrameError::FrameTooLarge {
                            max_frame_bytes: self.max_frame_bytes,
                            got_bytes: consumed + body.len(),
                        });
                    }
                    return Err(truncated("body"));
                }
                body.pop();
                body
            }
        };

        Ok(Some(ReadItem::Frame(Frame {
            command,
            headers,
            body,
        })))
    }

    /// One line without its EOL (`\n` or `\r\n`). `None` on EOF before any
    /// byte was read.
    fn read_line(&mut self, consumed: &mut usize) -> Result<Option<Vec<u8>>, FrameError> {
        let remaining = self.max_frame_bytes.saturating_sub(*consumed) as u64 + 1;
        let mut line = Vec::new();
        let n = (&mut self.reader)
            .take(remaining)
            .read_until(EOL, &mut line)?;
        if n == 0 {
            return Ok(None);
        }
        self.charge(consumed, n)?;
        if line.last() != Some(&EOL) {
            return Err(truncated("line"));
        }
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn charge(&self, consumed: &mut usize, n: usize) -> Result<(), FrameError> {
        *consumed = consumed.saturating_add(n);
        if *consumed > self.max_frame_bytes {
            return Err(FrameError::FrameTooLarge {
                max_frame_bytes: self.max_frame_bytes,
                got_bytes: *consumed,
            });
        }
        Ok(())
    }
}

fn truncated(part: &str) -> FrameError {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("frame {part} truncated"),
    )
    .into()
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<usize, FrameError> {
        let bytes = encode_frame(frame);
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        Ok(bytes.len())
    }

    pub fn write_heartbeat(&mut self) -> Result<(), FrameError> {
        self.writer.write_all(&[EOL])?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let escaped = Frame::escapes_headers(&frame.command);
    let mut buf = Vec::with_capacity(frame.command.len() + frame.body.len() + 64);
    buf.extend_from_slice(frame.command.as_bytes());
    buf.push(EOL);
    for (name, value) in &frame.headers {
        if escaped {
            buf.extend_from_slice(escape(name).as_bytes());
            buf.push(b':');
            buf.extend_from_slice(escape(value).as_bytes());
        } else {
            buf.extend_from_slice(name.as_bytes());
            buf.push(b':');
            buf.extend_from_slice(value.as_bytes());
        }
        buf.push(EOL);
    }
    if !frame.body.is_empty() && frame.get("content-length").is_none() {
        buf.extend_from_slice(format!("content-length:{}", frame.body.len()).as_bytes());
        buf.push(EOL);
    }
    buf.push(EOL);
    buf.extend_from_slice(&frame.body);
    buf.push(NUL);
    buf
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some(other) => return Err(FrameError::InvalidEscape { found: other }),
            None => return Err(malformed("dangling escape at end of header")),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: &[u8], max: usize) -> FrameReader<Cursor<Vec<u8>>> {
        FrameReader::new(Cursor::new(bytes.to_vec()), max)
    }

    #[test]
    fn message_frame_roundtrips_with_escaped_headers() {
        let frame = Frame::new("MESSAGE")
            .header("destination", "/topic/payments")
            .header("note", "a:b\nc")
            .body(br#"{"action":"payment.recorded"}"#.to_vec());
        let bytes = encode_frame(&frame);
        assert!(bytes.ends_with(b"}\0"));

        let decoded = reader(&bytes, 4096).read_next().unwrap().unwrap();
        let ReadItem::Frame(decoded) = decoded else {
            panic!("expected frame");
        };
        assert_eq!(decoded.command, "MESSAGE");
        assert_eq!(decoded.get("note"), Some("a:b\nc"));
        assert_eq!(decoded.get("content-length"), Some("29"));
        assert_eq!(decoded.body, frame.body);
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let bytes = encode_frame(&Frame::new("CONNECT").header("host", "a:b"));
        assert_eq!(bytes, b"CONNECT\nhost:a:b\n\n\0".to_vec());
    }

    #[test]
    fn heartbeats_and_crlf_are_understood() {
        let mut r = reader(b"\n\r\nCONNECTED\r\nversion:1.2\r\n\r\n\0", 1024);
        assert_eq!(r.read_next().unwrap(), Some(ReadItem::Heartbeat));
        assert_eq!(r.read_next().unwrap(), Some(ReadItem::Heartbeat));
        let Some(ReadItem::Frame(frame)) = r.read_next().unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.command, "CONNECTED");
        assert_eq!(frame.get("version"), Some("1.2"));
        assert!(frame.body.is_empty());
        assert_eq!(r.read_next().unwrap(), None);
    }

    #[test]
    fn body_without_content_length_reads_to_nul() {
        let mut r = reader(b"MESSAGE\ndestination:/topic/x\n\nhello\0\n", 1024);
        let Some(ReadItem::Frame(frame)) = r.read_next().unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.body, b"hello");
        assert_eq!(r.read_next().unwrap(), Some(ReadItem::Heartbeat));
    }

    #[test]
    fn oversize_frames_are_rejected() {
        let frame = Frame::new("MESSAGE").body(vec![b'x'; 64]);
        let err = reader(&encode_frame(&frame), 32).read_next().unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));

        let err = reader(b"MESSAGE\n\nxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\0", 16)
            .read_next()
            .unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
    }

    #[test]
    fn truncated_and_malformed_frames_error() {
        let err = reader(b"MESSAGE\ndestination:/x\n", 1024)
            .read_next()
            .unwrap_err();
        assert!(matches!(err, FrameError::Io(_)));

        let err = reader(b"MESSAGE\nno-colon\n\n\0", 1024)
            .read_next()
            .unwrap_err();
        assert!(matches!(err, FrameError::Malformed { .. }));

        let err = reader(b"MESSAGE\nbad:\\t\n\n\0", 1024)
            .read_next()
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidEscape { found: 't' }));
    }
}
