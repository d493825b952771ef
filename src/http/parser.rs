//! HTTP request parser
//!
//! Reads a request line and headers off the raw socket. Bodies are left in
//! the reader for the method handler to consume.

use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::RequestError;

pub const MAX_LINE_LENGTH: usize = 8192;
pub const MAX_HEADERS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Put,
    Other(String),
}

impl Method {
    fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "PUT" => Method::Put,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Other(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn request_line(&self) -> String {
        format!("{} {} {}", self.method, self.target, self.version)
    }

    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .map(|v| v.eq_ignore_ascii_case("100-continue"))
            .unwrap_or(false)
    }

    /// Decoded path component of the request target, without query or
    /// fragment. Absolute-form targets are reduced to their path.
    pub fn path(&self) -> Result<String, RequestError> {
        let mut raw = self.target.as_str();

        if let Some(rest) = raw
            .strip_prefix("http://")
            .or_else(|| raw.strip_prefix("https://"))
        {
            raw = rest.find('/').map(|i| &rest[i..]).unwrap_or("/");
        }

        let raw = raw.split(['?', '#']).next().unwrap_or("");
        percent_decode(raw)
    }

    /// Query string including the leading `?`, or empty.
    pub fn query(&self) -> &str {
        let without_fragment = self.target.split('#').next().unwrap_or("");
        without_fragment
            .find('?')
            .map(|i| &without_fragment[i..])
            .unwrap_or("")
    }
}

/// Decodes `%XX` escapes. Malformed escapes are kept literally; the result
/// must be valid UTF-8.
pub fn percent_decode(input: &str) -> Result<String, RequestError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).map_err(|_| RequestError::BadEncoding(input.to_string()))
}

/// Reads one CRLF- or LF-terminated line of at most [`MAX_LINE_LENGTH`]
/// bytes. Returns `None` on a clean EOF before any byte.
async fn read_limited_line<R>(reader: &mut R) -> Result<Option<String>, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Ok(None);
    }
    if !buf.ends_with(b"\n") && n > MAX_LINE_LENGTH {
        return Err(RequestError::LineTooLong);
    }

    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn parse_request_line(line: &str) -> Result<(Method, String, String), RequestError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version), None) if version.starts_with("HTTP/") => {
            Ok((Method::parse(method), target.to_string(), version.to_string()))
        }
        _ => Err(RequestError::BadRequestLine(line.to_string())),
    }
}

/// Reads a request head. `Ok(None)` means the peer closed without sending
/// anything.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    // Tolerate blank lines before the request line (RFC 9112 §2.2).
    let line = loop {
        match read_limited_line(reader).await? {
            None => return Ok(None),
            Some(line) if line.is_empty() => continue,
            Some(line) => break line,
        }
    };

    let (method, target, version) = parse_request_line(&line)?;

    let mut headers = Vec::new();
    loop {
        let line = match read_limited_line(reader).await? {
            None => {
                return Err(RequestError::IoError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed inside request head",
                )));
            }
            Some(line) => line,
        };
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(RequestError::TooManyHeaders);
        }
        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            _ => return Err(RequestError::BadHeader(line)),
        }
    }

    Ok(Some(Request {
        method,
        target,
        version,
        headers,
    }))
}
