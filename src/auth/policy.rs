//! Identity policy
//!
//! The capability object every protocol engine consults for "who is this"
//! and "may they do that". [`PermissiveIdentityPolicy`] answers yes to
//! everything and homes every identity at the directory root.

use log::debug;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::AuthError;
use crate::storage::DirectoryRoot;

/// A credential as presented by a client, whatever the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    None { user: &'a str },
    Password { user: &'a str, password: &'a str },
    PublicKey { user: &'a str },
}

impl Credential<'_> {
    pub fn user(&self) -> &str {
        match self {
            Credential::None { user }
            | Credential::Password { user, .. }
            | Credential::PublicKey { user } => user,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Credential::None { .. } => "none",
            Credential::Password { .. } => "password",
            Credential::PublicKey { .. } => "publickey",
        }
    }
}

/// Operations a session may ask to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    List,
    Delete,
    MakeDir,
    RemoveDir,
    Rename,
    SetAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
}

impl Identity {
    pub const ANONYMOUS: &'static str = "anonymous";

    /// The single synthetic identity every client maps to.
    pub fn anonymous() -> Self {
        Self {
            name: Self::ANONYMOUS.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub trait IdentityPolicy: Debug + Send + Sync {
    fn authenticate(&self, credential: &Credential<'_>) -> Result<Identity, AuthError>;

    fn resolve_home(&self, identity: &Identity) -> &DirectoryRoot;

    fn authorize(&self, identity: &Identity, operation: Operation) -> bool;

    /// Banner shown on login. Empty suppresses protocol banner text.
    fn greeting(&self) -> &'static str;

    fn farewell(&self) -> &'static str;
}

/// Shared handle injected into every engine binding.
pub type SharedPolicy = Arc<dyn IdentityPolicy>;

/// Anyone may do anything, from the directory root.
#[derive(Debug, Clone)]
pub struct PermissiveIdentityPolicy {
    root: DirectoryRoot,
}

impl PermissiveIdentityPolicy {
    pub fn new(root: DirectoryRoot) -> Self {
        Self { root }
    }

    pub fn shared(root: DirectoryRoot) -> SharedPolicy {
        Arc::new(Self::new(root))
    }
}

impl IdentityPolicy for PermissiveIdentityPolicy {
    fn authenticate(&self, credential: &Credential<'_>) -> Result<Identity, AuthError> {
        debug!(
            "Accepting {} credential for user {:?}",
            credential.kind(),
            credential.user()
        );
        Ok(Identity::anonymous())
    }

    fn resolve_home(&self, _identity: &Identity) -> &DirectoryRoot {
        &self.root
    }

    fn authorize(&self, _identity: &Identity, _operation: Operation) -> bool {
        true
    }

    fn greeting(&self) -> &'static str {
        ""
    }

    fn farewell(&self) -> &'static str {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> (tempfile::TempDir, PermissiveIdentityPolicy) {
        let dir = tempfile::tempdir().unwrap();
        let root = DirectoryRoot::open(dir.path()).unwrap();
        (dir, PermissiveIdentityPolicy::new(root))
    }

    #[test]
    fn every_credential_maps_to_anonymous() {
        let (_dir, policy) = policy();
        let credentials = [
            Credential::None { user: "" },
            Credential::Password {
                user: "root",
                password: "wrong",
            },
            Credential::Password {
                user: "",
                password: "",
            },
            Credential::PublicKey { user: "alice" },
        ];

        for credential in credentials {
            let identity = policy.authenticate(&credential).unwrap();
            assert_eq!(identity, Identity::anonymous());
        }
    }

    #[test]
    fn home_is_the_directory_root() {
        let (dir, policy) = policy();
        let home = policy.resolve_home(&Identity::anonymous());
        assert_eq!(home.path(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn every_operation_is_allowed() {
        let (_dir, policy) = policy();
        let identity = Identity::anonymous();
        for op in [
            Operation::Read,
            Operation::Write,
            Operation::List,
            Operation::Delete,
            Operation::MakeDir,
            Operation::RemoveDir,
            Operation::Rename,
            Operation::SetAttributes,
        ] {
            assert!(policy.authorize(&identity, op));
        }
    }

    #[test]
    fn banners_are_suppressed() {
        let (_dir, policy) = policy();
        assert_eq!(policy.greeting(), "");
        assert_eq!(policy.farewell(), "");
    }
}
