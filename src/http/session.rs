//! HTTP connection handling
//!
//! One request per connection, in the manner of a plain HTTP/1.0 server.

use log::debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::auth::{Credential, Operation};
use crate::error::{RequestError, ShareError};
use crate::http::HttpHandler;
use crate::http::handlers::{receive_upload, serve_static};
use crate::http::parser::{Method, read_request};
use crate::http::responses::{Response, Status};
use crate::middleware::logging::log_request;

const HEAD_TIMEOUT: Duration = Duration::from_secs(30);

/// How long, and how much, unread request data is drained after the
/// response so that closing does not reset the connection under the client.
const LINGER_TIMEOUT: Duration = Duration::from_secs(2);
const LINGER_LIMIT: u64 = 1024 * 1024;

pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: &HttpHandler,
) -> Result<(), ShareError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request = match timeout(HEAD_TIMEOUT, read_request(&mut reader)).await {
        Err(_) => {
            debug!("Timed out waiting for a request from {}", peer);
            return Ok(());
        }
        Ok(Ok(None)) => return Ok(()),
        Ok(Ok(Some(request))) => request,
        Ok(Err(RequestError::IoError(e))) => return Err(e.into()),
        Ok(Err(e)) => {
            debug!("Malformed request from {}: {}", peer, e);
            let response = Response::error(Status::BadRequest);
            log_request(&peer, "-", response.status.code());
            response.write_to(&mut write_half, false).await?;
            let _ = write_half.shutdown().await;
            linger(&mut reader).await;
            return Ok(());
        }
    };

    let policy = handler.policy();
    let identity = policy.authenticate(&Credential::None { user: "" })?;
    let root = policy.resolve_home(&identity);

    let head_only = request.method == Method::Head;
    let response = match &request.method {
        Method::Get | Method::Head => {
            if policy.authorize(&identity, Operation::Read) {
                serve_static(root, &request).await
            } else {
                Response::error(Status::Forbidden)
            }
        }
        Method::Put => {
            if policy.authorize(&identity, Operation::Write) {
                receive_upload(
                    root,
                    &request,
                    &mut reader,
                    &mut write_half,
                    handler.body_timeout(),
                )
                .await
            } else {
                Response::new(Status::Forbidden)
            }
        }
        Method::Other(_) => Response::error(Status::NotImplemented),
    };

    log_request(&peer, &request.request_line(), response.status.code());
    response.write_to(&mut write_half, head_only).await?;
    let _ = write_half.shutdown().await;
    linger(&mut reader).await;

    Ok(())
}

async fn linger<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut drain = reader.take(LINGER_LIMIT);
    let _ = timeout(LINGER_TIMEOUT, tokio::io::copy(&mut drain, &mut tokio::io::sink())).await;
}
