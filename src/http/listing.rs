//! Directory listings and content types for the static responder.

use std::io;
use std::path::Path;
use tokio::fs;

/// Renders an HTML index of `dir`, shown to clients as `virtual_path`.
///
/// Directories get a trailing `/`, symlinks a trailing `@`.
pub async fn render_listing(virtual_path: &str, dir: &Path) -> io::Result<Vec<u8>> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type().await?;
        let (display, link) = if file_type.is_symlink() {
            (format!("{}@", name), name.clone())
        } else if file_type.is_dir() {
            (format!("{}/", name), format!("{}/", name))
        } else {
            (name.clone(), name.clone())
        };
        entries.push((name.to_lowercase(), display, link));
    }
    entries.sort();

    let title = format!("Directory listing for {}", html_escape(virtual_path));
    let mut page = format!(
        "<!DOCTYPE HTML>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<hr>\n<ul>\n"
    );
    for (_, display, link) in &entries {
        page.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            percent_encode(link),
            html_escape(display)
        ));
    }
    page.push_str("</ul>\n<hr>\n</body>\n</html>\n");

    Ok(page.into_bytes())
}

pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes everything outside the RFC 3986 unreserved set, keeping `/`.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            b => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("txt") | Some("log") | Some("md") => "text/plain",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("sh") => "application/x-sh",
        Some("ps1") => "text/plain",
        Some("py") => "text/x-python",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("tar") => "application/x-tar",
        Some("exe") | Some("dll") => "application/x-msdownload",
        _ => "application/octet-stream",
    }
}
