//! HTTP responses
//!
//! Status codes and response serialization. Every response closes the
//! connection.

use tokio::fs::File;
use tokio::io::{self, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const SERVER_NAME: &str = concat!("rax-share/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Continue,
    Ok,
    Created,
    MovedPermanently,
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    RequestTimeout,
    LengthRequired,
    InternalServerError,
    NotImplemented,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Continue => 100,
            Status::Ok => 200,
            Status::Created => 201,
            Status::MovedPermanently => 301,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::RequestTimeout => 408,
            Status::LengthRequired => 411,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Continue => "Continue",
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::MovedPermanently => "Moved Permanently",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::RequestTimeout => "Request Timeout",
            Status::LengthRequired => "Length Required",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
        }
    }
}

#[derive(Debug)]
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    File { file: File, len: u64 },
}

impl Body {
    fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(b) => b.len() as u64,
            Body::File { len, .. } => *len,
        }
    }
}

#[derive(Debug)]
pub struct Response {
    pub status: Status,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Response {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Status with a short HTML explanation.
    pub fn error(status: Status) -> Self {
        let page = format!(
            "<!DOCTYPE html>\n<html><head><title>{code} {reason}</title></head>\
             <body><h1>{code} {reason}</h1></body></html>\n",
            code = status.code(),
            reason = status.reason()
        );
        Self::bytes(status, "text/html; charset=utf-8", page.into_bytes())
    }

    pub fn bytes(status: Status, content_type: &str, body: Vec<u8>) -> Self {
        Self::new(status)
            .with_header("Content-Type", content_type)
            .with_body(Body::Bytes(body))
    }

    pub fn file(file: File, len: u64, content_type: &str) -> Self {
        Self::new(Status::Ok)
            .with_header("Content-Type", content_type)
            .with_body(Body::File { file, len })
    }

    pub fn redirect(location: &str) -> Self {
        Self::new(Status::MovedPermanently).with_header("Location", location)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Serializes the response. `head_only` writes the headers a GET would
    /// have produced but no body.
    pub async fn write_to<W>(self, writer: &mut W, head_only: bool) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nServer: {}\r\nConnection: close\r\nContent-Length: {}\r\n",
            self.status.code(),
            self.status.reason(),
            SERVER_NAME,
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        writer.write_all(head.as_bytes()).await?;

        if !head_only {
            match self.body {
                Body::Empty => {}
                Body::Bytes(bytes) => writer.write_all(&bytes).await?,
                Body::File { file, len } => {
                    let mut limited = file.take(len);
                    io::copy(&mut limited, writer).await?;
                }
            }
        }

        writer.flush().await
    }
}

/// Interim response sent before reading an upload body the client is
/// holding back.
pub async fn write_continue<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let status = Status::Continue;
    let line = format!("HTTP/1.1 {} {}\r\n\r\n", status.code(), status.reason());
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
