//! Authentication system
//!
//! Holds the identity policy shared by every protocol engine.

pub mod policy;

pub use policy::{
    Credential, Identity, IdentityPolicy, Operation, PermissiveIdentityPolicy, SharedPolicy,
};
