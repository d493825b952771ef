//! HTTP method handlers
//!
//! GET/HEAD serve files and listings from the directory root; PUT stores the
//! request body at the requested path.

use log::{debug, info, warn};
use std::path::Path;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::error::handlers::{confinement_to_http_status, upload_to_http_status};
use crate::http::listing::{guess_content_type, percent_encode, render_listing};
use crate::http::parser::Request;
use crate::http::responses::{Response, Status, write_continue};
use crate::storage::filesystem::file_exists;
use crate::storage::{DirectoryRoot, prepare_file_storage, store_upload};

const INDEX_FILES: [&str; 2] = ["index.html", "index.htm"];

/// Handles GET and HEAD.
pub async fn serve_static(root: &DirectoryRoot, request: &Request) -> Response {
    let path = match request.path() {
        Ok(path) => path,
        Err(e) => {
            debug!("Rejecting request target {:?}: {}", request.target, e);
            return Response::error(Status::BadRequest);
        }
    };

    let real = match root.resolve_confined(&path) {
        Ok(real) => real,
        Err(e) => return Response::error(confinement_to_http_status(&e)),
    };

    let metadata = match fs::metadata(&real).await {
        Ok(metadata) => metadata,
        Err(_) => return Response::error(Status::NotFound),
    };

    if metadata.is_dir() {
        if !path.ends_with('/') {
            let location = format!("{}/{}", percent_encode(&path), request.query());
            return Response::redirect(&location);
        }

        for index in INDEX_FILES {
            let candidate = real.join(index);
            if file_exists(&candidate).await {
                return open_file(&candidate).await;
            }
        }

        return match render_listing(&path, &real).await {
            Ok(page) => Response::bytes(Status::Ok, "text/html; charset=utf-8", page),
            Err(e) => {
                warn!("Cannot list {}: {}", real.display(), e);
                Response::error(Status::NotFound)
            }
        };
    }

    if path.ends_with('/') {
        return Response::error(Status::NotFound);
    }

    open_file(&real).await
}

async fn open_file(path: &Path) -> Response {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            debug!("Cannot open {}: {}", path.display(), e);
            return Response::error(Status::NotFound);
        }
    };

    match file.metadata().await {
        Ok(metadata) => Response::file(file, metadata.len(), guess_content_type(path)),
        Err(_) => Response::error(Status::NotFound),
    }
}

/// Handles PUT.
///
/// The body is read from `reader` only once the target has been validated;
/// a rejected upload leaves the filesystem untouched.
pub async fn receive_upload<R, W>(
    root: &DirectoryRoot,
    request: &Request,
    reader: &mut R,
    writer: &mut W,
    body_timeout: Duration,
) -> Response
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let path = match request.path() {
        Ok(path) => path,
        Err(_) => return Response::error(Status::BadRequest),
    };

    let target = match prepare_file_storage(root, &path, request.header("content-length")).await
    {
        Ok(target) => target,
        Err(e) => {
            debug!("Rejected upload to {:?}: {}", path, e);
            return Response::new(upload_to_http_status(&e));
        }
    };

    if request.expects_continue() {
        if let Err(e) = write_continue(writer).await {
            debug!("Failed to send 100 Continue: {}", e);
            return Response::error(Status::BadRequest);
        }
    }

    match store_upload(&target, reader, body_timeout).await {
        Ok(bytes) => {
            info!("Received {} ({} bytes)", target.virtual_path, bytes);
            Response::new(Status::Created)
        }
        Err(e) => {
            warn!("Upload to {} failed: {}", target.virtual_path, e);
            Response::new(upload_to_http_status(&e))
        }
    }
}
