//! Owning-identity port.

use crate::model::record::UserId;
use std::cell::RefCell;

/// Supplies the identity that owns newly created records.
pub trait IdentityProvider {
    fn current_user(&self) -> Option<UserId>;
}

/// Session-backed identity switched by sign-in/sign-out.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    user: RefCell<Option<UserId>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: UserId) -> Self {
        Self {
            user: RefCell::new(Some(user)),
        }
    }

    pub fn sign_in(&self, user: UserId) {
        *self.user.borrow_mut() = Some(user);
    }

    pub fn sign_out(&self) {
        *self.user.borrow_mut() = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.user.borrow().clone()
    }
}
