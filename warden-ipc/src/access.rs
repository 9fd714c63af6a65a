//! Access control for the local channel
//!
//! The allow-list is built once when the channel is created. Everything not on
//! the list is denied: the socket file is created owner-only (plus the admin
//! group when one is configured), and every accepted peer is checked against the
//! list using its kernel-reported credentials before a single byte is read.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use log::{debug, warn};
use nix::unistd::{Gid, Group, Uid, User};

/// One allowed identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// A user id
    User(u32),
    /// A group id and its member user names, captured at construction
    Group { gid: u32, members: Vec<String> },
}

/// Credentials of a connected peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub uid: u32,
    pub gid: u32,
    pub user_name: Option<String>,
}

impl PeerIdentity {
    /// Build an identity from kernel credentials, resolving the user name
    pub fn resolve(uid: u32, gid: u32) -> Self {
        let user_name = User::from_uid(Uid::from_raw(uid))
            .ok()
            .flatten()
            .map(|user| user.name);
        Self { uid, gid, user_name }
    }
}

/// Deny-by-default allow-list of principals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    allowed: Vec<Principal>,
}

impl AccessPolicy {
    /// Create a policy from an explicit list
    pub fn new(allowed: Vec<Principal>) -> Self {
        Self { allowed }
    }

    /// The default policy: the current user and members of the admin group
    pub fn current_user_and_admins(admin_group: Option<&str>) -> Self {
        let mut allowed = vec![Principal::User(Uid::current().as_raw())];

        if let Some(name) = admin_group {
            match Group::from_name(name) {
                Ok(Some(group)) => allowed.push(Principal::Group {
                    gid: group.gid.as_raw(),
                    members: group.mem,
                }),
                Ok(None) => warn!("Admin group '{}' does not exist, skipping", name),
                Err(e) => warn!("Failed to resolve admin group '{}': {}", name, e),
            }
        }

        Self { allowed }
    }

    /// Principals on the list
    pub fn principals(&self) -> &[Principal] {
        &self.allowed
    }

    /// Group that should own the socket file, if any
    pub fn admin_gid(&self) -> Option<u32> {
        self.allowed.iter().find_map(|p| match p {
            Principal::Group { gid, .. } => Some(*gid),
            Principal::User(_) => None,
        })
    }

    /// Whether a peer may talk to the server
    pub fn permits(&self, peer: &PeerIdentity) -> bool {
        self.allowed.iter().any(|principal| match principal {
            Principal::User(uid) => *uid == peer.uid,
            Principal::Group { gid, members } => {
                *gid == peer.gid
                    || peer
                        .user_name
                        .as_ref()
                        .map(|name| members.iter().any(|m| m == name))
                        .unwrap_or(false)
            }
        })
    }

    /// Restrict the socket file so the OS refuses everyone outside the list
    pub fn apply_to_socket(&self, path: &Path) -> io::Result<()> {
        let mut mode = 0o600;

        if let Some(gid) = self.admin_gid() {
            match nix::unistd::chown(path, None, Some(Gid::from_raw(gid))) {
                Ok(()) => mode = 0o660,
                Err(e) => debug!(
                    "Could not hand socket {} to admin group {}: {}; keeping owner-only access",
                    path.display(),
                    gid,
                    e
                ),
            }
        }

        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }
}
