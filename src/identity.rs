//! Source of the currently authenticated user.

use std::sync::RwLock;

/// Supplies the identity every engine operation is scoped to.
pub trait IdentityProvider: Send + Sync {
    /// `None` when nobody is signed in.
    fn current_user_id(&self) -> Option<String>;
}

/// Identity held in memory, switchable at runtime.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user_id: RwLock<Option<String>>,
}

impl StaticIdentity {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.user_id.write().unwrap() = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self.user_id.write().unwrap() = None;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap()
            .clone()
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_and_out() {
        let identity = StaticIdentity::signed_out();
        assert!(identity.current_user_id().is_none());

        identity.sign_in("user-1");
        assert_eq!(identity.current_user_id().as_deref(), Some("user-1"));

        identity.sign_out();
        assert!(identity.current_user_id().is_none());
    }

    #[test]
    fn test_empty_id_is_not_an_identity() {
        let identity = StaticIdentity::signed_in("");
        assert!(identity.current_user_id().is_none());
    }
}
