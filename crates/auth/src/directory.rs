use shepherd_core::{ChurchId, UserId};

use crate::Role;

/// Account as known to the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub user_id: UserId,
    pub church_id: Option<ChurchId>,
    pub role: Role,
    pub email: String,
}

/// Identity/role store consumed by the authentication path.
pub trait IdentityDirectory: Send + Sync {
    fn lookup(&self, user_id: UserId) -> Option<DirectoryUser>;

    /// Returns the account when `password` matches. Never says which part was wrong.
    fn verify_credentials(&self, email: &str, password: &str) -> Option<DirectoryUser>;

    fn lookup_role(&self, user_id: UserId) -> Option<Role> {
        self.lookup(user_id).map(|u| u.role)
    }
}

impl<T: IdentityDirectory + ?Sized> IdentityDirectory for std::sync::Arc<T> {
    fn lookup(&self, user_id: UserId) -> Option<DirectoryUser> {
        (**self).lookup(user_id)
    }

    fn verify_credentials(&self, email: &str, password: &str) -> Option<DirectoryUser> {
        (**self).verify_credentials(email, password)
    }
}
