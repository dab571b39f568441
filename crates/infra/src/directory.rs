use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use shepherd_auth::{DirectoryUser, IdentityDirectory, Role};
use shepherd_core::{ChurchId, UserId};

#[derive(Debug, Clone)]
struct Account {
    user: DirectoryUser,
    /// Argon2 PHC string.
    password_hash: String,
}

/// Verified against when the email is unknown, so both paths cost one hash.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("shepherd-unknown-account").ok());

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

fn password_matches(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            tracing::error!(error = %err, "stored password hash is not a valid PHC string");
            false
        }
    }
}

/// In-memory identity store for dev and tests. Passwords are kept as Argon2
/// hashes only.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    accounts: RwLock<HashMap<UserId, Account>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(
        &self,
        user_id: UserId,
        church_id: Option<ChurchId>,
        role: Role,
        email: impl Into<String>,
        password: impl AsRef<str>,
    ) {
        let password_hash = match hash_password(password.as_ref()) {
            Ok(hash) => hash,
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "could not hash password; account not added");
                return;
            }
        };
        let account = Account {
            user: DirectoryUser {
                user_id,
                church_id,
                role,
                email: email.into(),
            },
            password_hash,
        };
        self.accounts
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(user_id, account);
    }

    pub fn remove_user(&self, user_id: UserId) {
        self.accounts
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&user_id);
    }
}

impl IdentityDirectory for InMemoryDirectory {
    fn lookup(&self, user_id: UserId) -> Option<DirectoryUser> {
        let map = self.accounts.read().unwrap_or_else(|p| p.into_inner());
        map.get(&user_id).map(|a| a.user.clone())
    }

    fn verify_credentials(&self, email: &str, password: &str) -> Option<DirectoryUser> {
        let email = email.trim();
        let account = {
            let map = self.accounts.read().unwrap_or_else(|p| p.into_inner());
            map.values()
                .find(|a| a.user.email.eq_ignore_ascii_case(email))
                .cloned()
        };

        match account {
            Some(account) => password_matches(password, &account.password_hash).then_some(account.user),
            None => {
                if let Some(dummy) = DUMMY_HASH.as_deref() {
                    let _ = password_matches(password, dummy);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> InMemoryDirectory {
        let dir = InMemoryDirectory::new();
        dir.add_user(UserId::new(1), Some(ChurchId::new(7)), Role::PASTOR, "pastor@grace.org", "hunter2");
        dir
    }

    #[test]
    fn verifies_case_insensitive_email() {
        let dir = directory();
        assert!(dir.verify_credentials(" Pastor@Grace.org", "hunter2").is_some());
        assert!(dir.verify_credentials("pastor@grace.org", "wrong").is_none());
        assert!(dir.verify_credentials("nobody@grace.org", "hunter2").is_none());
    }

    #[test]
    fn lookup_role() {
        let dir = directory();
        assert_eq!(dir.lookup_role(UserId::new(1)), Some(Role::PASTOR));
        dir.remove_user(UserId::new(1));
        assert_eq!(dir.lookup_role(UserId::new(1)), None);
    }

    #[test]
    fn stores_only_a_phc_hash() {
        let dir = directory();
        let map = dir.accounts.read().unwrap();
        let stored = &map[&UserId::new(1)].password_hash;
        assert!(stored.starts_with("$argon2"));
        assert!(!stored.contains("hunter2"));
    }

    #[test]
    fn unknown_email_still_runs_a_verification() {
        assert!(DUMMY_HASH.as_deref().is_some_and(|h| PasswordHash::new(h).is_ok()));
        assert!(directory().verify_credentials("ghost@grace.org", "anything").is_none());
    }
}
