use crate::model::UserId;
use crate::quota::QuotaTier;

/// Accessor for the authenticated user, injected into the store.
///
/// Authentication itself happens elsewhere; the store only needs to know
/// who is signed in (if anyone) and which plan they are on.
pub trait Session: Send + Sync {
    fn user_id(&self) -> Option<UserId>;
    fn tier(&self) -> QuotaTier;
}

/// A session whose identity is fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    user_id: Option<UserId>,
    tier: QuotaTier,
}

impl StaticSession {
    pub fn new(user_id: UserId, tier: QuotaTier) -> Self {
        Self {
            user_id: Some(user_id),
            tier,
        }
    }

    /// No signed-in user; every store operation fails with `Error::Auth`.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl Session for StaticSession {
    fn user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }

    fn tier(&self) -> QuotaTier {
        self.tier
    }
}
