use async_trait::async_trait;
use libunftp::auth::{AuthenticationError, Authenticator, Credentials, DefaultUser};
use log::debug;
use std::net::SocketAddr;
use std::sync::Arc;
use unftp_sbe_fs::ServerExt;

use crate::auth::{Credential, Identity, IdentityPolicy, SharedPolicy};
use crate::error::ListenerError;
use crate::middleware::logging::log_listener_started;
use crate::protocol::Protocol;
use crate::server::probe_bind;

const TARGET: &str = "rax_share::engines::ftp";

/// 220 text used when the policy suppresses its greeting; the reply must
/// carry text after the code.
const DEFAULT_BANNER: &str = concat!("rax-share ", env!("CARGO_PKG_VERSION"), " ready");

/// Text of the 220 service-ready reply.
fn banner(policy: &dyn IdentityPolicy) -> &'static str {
    match policy.greeting() {
        "" => DEFAULT_BANNER,
        greeting => greeting,
    }
}

/// Routes FTP logins through the identity policy.
#[derive(Debug)]
pub struct FtpAuthenticator {
    policy: SharedPolicy,
}

impl FtpAuthenticator {
    pub fn new(policy: SharedPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Authenticator<DefaultUser> for FtpAuthenticator {
    async fn authenticate(
        &self,
        username: &str,
        creds: &Credentials,
    ) -> Result<DefaultUser, AuthenticationError> {
        let credential = match creds.password.as_deref() {
            Some(password) => Credential::Password {
                user: username,
                password,
            },
            None => Credential::None { user: username },
        };

        match self.policy.authenticate(&credential) {
            Ok(identity) => {
                debug!(target: TARGET, "FTP login {:?} as {}", username, identity.name());
                Ok(DefaultUser {})
            }
            Err(e) => {
                debug!(target: TARGET, "FTP login {:?} refused: {}", username, e);
                Err(AuthenticationError::BadPassword)
            }
        }
    }
}

/// Serves FTP from the policy's home directory until the engine stops.
pub async fn serve(addr: SocketAddr, policy: SharedPolicy) -> Result<(), ListenerError> {
    // libunftp binds inside `listen`; probing first reports a taken port
    // the same way the other listeners do.
    probe_bind(Protocol::Ftp, addr)?;

    let engine_error = |message: String| ListenerError::Engine {
        protocol: Protocol::Ftp,
        message,
    };

    let root = policy.resolve_home(&Identity::anonymous()).path().to_path_buf();
    let server = libunftp::Server::with_fs(root)
        .greeting(banner(policy.as_ref()))
        .authenticator(Arc::new(FtpAuthenticator::new(policy)))
        .build()
        .map_err(|e| engine_error(e.to_string()))?;

    log_listener_started(Protocol::Ftp, &addr);
    server
        .listen(addr.to_string())
        .await
        .map_err(|e| engine_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PermissiveIdentityPolicy;
    use crate::storage::DirectoryRoot;
    use std::net::{IpAddr, Ipv4Addr};

    fn authenticator() -> (tempfile::TempDir, FtpAuthenticator) {
        let dir = tempfile::tempdir().unwrap();
        let root = DirectoryRoot::open(dir.path()).unwrap();
        (dir, FtpAuthenticator::new(PermissiveIdentityPolicy::shared(root)))
    }

    fn creds(password: Option<&str>) -> Credentials {
        Credentials {
            password: password.map(str::to_string),
            source_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            certificate_chain: None,
        }
    }

    #[test]
    fn empty_policy_greeting_falls_back_to_a_banner() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PermissiveIdentityPolicy::shared(DirectoryRoot::open(dir.path()).unwrap());
        assert_eq!(policy.greeting(), "");
        assert!(!banner(policy.as_ref()).trim().is_empty());
    }

    #[tokio::test]
    async fn accepts_any_user_and_password() {
        let (_dir, auth) = authenticator();
        assert!(auth.authenticate("anonymous", &creds(None)).await.is_ok());
        assert!(auth.authenticate("root", &creds(Some("nope"))).await.is_ok());
        assert!(auth.authenticate("", &creds(Some(""))).await.is_ok());
    }
}
