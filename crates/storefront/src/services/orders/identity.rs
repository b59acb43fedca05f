//! Decides who owns a new order.
//!
//! A checkout may carry two owner claims: the subject of a verified bearer
//! token and a `user_id` in the request body. [`IdentityResolver`] turns
//! them into either a registered [`Identity`] or a guest checkout, as
//! dictated by the configured [`IdentityPolicy`].

use bazaar_core::UserId;

use super::{CheckoutStep, OrderError};
use crate::config::IdentityPolicy;
use crate::db::IdentityStore;
use crate::models::Identity;

/// Owner claims attached to a checkout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerClaim {
    /// Subject of a bearer token that passed signature and expiry checks.
    pub token_subject: Option<UserId>,
    /// `user_id` from the request body.
    pub body_user_id: Option<UserId>,
}

impl OwnerClaim {
    /// A checkout with no claim at all.
    #[must_use]
    pub const fn guest() -> Self {
        Self {
            token_subject: None,
            body_user_id: None,
        }
    }

    /// A checkout authenticated by a bearer token.
    #[must_use]
    pub const fn token(subject: UserId) -> Self {
        Self {
            token_subject: Some(subject),
            body_user_id: None,
        }
    }
}

/// Resolves owner claims against the identity store.
pub struct IdentityResolver<'a, S: ?Sized> {
    store: &'a S,
    policy: IdentityPolicy,
}

impl<'a, S: IdentityStore + ?Sized> IdentityResolver<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, policy: IdentityPolicy) -> Self {
        Self { store, policy }
    }

    /// Resolve the owner of a checkout.
    ///
    /// Returns `Ok(None)` for a guest checkout.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::IdentityUnresolvable` if the two claims disagree,
    /// or under the strict policy if a claim does not resolve.
    /// Returns `OrderError::Persistence` under the strict policy if the
    /// identity store fails.
    pub async fn resolve(&self, claim: OwnerClaim) -> Result<Option<Identity>, OrderError> {
        let (user_id, verified) = match (claim.token_subject, claim.body_user_id) {
            (Some(subject), Some(body)) if subject != body => {
                tracing::warn!(
                    token_subject = %subject,
                    body_user_id = %body,
                    "checkout user_id disagrees with bearer token"
                );
                return Err(OrderError::IdentityUnresolvable);
            }
            (Some(subject), _) => (subject, true),
            (None, Some(body)) => (body, false),
            (None, None) => return Ok(None),
        };

        if !verified && self.policy == IdentityPolicy::Strict {
            tracing::info!(user_id = %user_id, "rejecting unauthenticated owner claim");
            return Err(OrderError::IdentityUnresolvable);
        }

        match self.store.find_identity(user_id).await {
            Ok(Some(identity)) => Ok(Some(identity)),
            Ok(None) => self.downgrade(user_id, "unknown user"),
            Err(e) if self.policy == IdentityPolicy::Lenient => {
                tracing::warn!(user_id = %user_id, error = %e, "identity lookup failed");
                Ok(None)
            }
            Err(e) => Err(OrderError::at(CheckoutStep::ResolveIdentity)(e)),
        }
    }

    fn downgrade(&self, user_id: UserId, reason: &str) -> Result<Option<Identity>, OrderError> {
        match self.policy {
            IdentityPolicy::Strict => {
                tracing::info!(user_id = %user_id, reason, "owner claim rejected");
                Err(OrderError::IdentityUnresolvable)
            }
            IdentityPolicy::Lenient => {
                tracing::warn!(user_id = %user_id, reason, "owner claim downgraded to guest");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::{Email, UserRole};

    use super::*;
    use crate::db::{FailPoint, MemoryStorage};

    async fn storage_with_user(id: i32) -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage
            .put_user(
                Identity {
                    id: UserId::new(id),
                    name: "Sam".into(),
                    email: Email::parse("sam@example.com").unwrap(),
                    role: UserRole::Customer,
                },
                "hash",
            )
            .await;
        storage
    }

    #[tokio::test]
    async fn test_no_claim_is_guest() {
        let storage = MemoryStorage::new();
        let resolver = IdentityResolver::new(&storage, IdentityPolicy::Strict);
        assert!(resolver.resolve(OwnerClaim::guest()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_claim_resolves() {
        let storage = storage_with_user(7).await;
        let resolver = IdentityResolver::new(&storage, IdentityPolicy::Strict);
        let owner = resolver
            .resolve(OwnerClaim::token(UserId::new(7)))
            .await
            .unwrap();
        assert_eq!(owner.unwrap().id, UserId::new(7));
    }

    #[tokio::test]
    async fn test_strict_rejects_body_only_claim() {
        let storage = storage_with_user(7).await;
        let resolver = IdentityResolver::new(&storage, IdentityPolicy::Strict);
        let claim = OwnerClaim {
            token_subject: None,
            body_user_id: Some(UserId::new(7)),
        };
        assert!(matches!(
            resolver.resolve(claim).await,
            Err(OrderError::IdentityUnresolvable)
        ));
    }

    #[tokio::test]
    async fn test_lenient_honors_body_claim_of_existing_user() {
        let storage = storage_with_user(7).await;
        let resolver = IdentityResolver::new(&storage, IdentityPolicy::Lenient);
        let claim = OwnerClaim {
            token_subject: None,
            body_user_id: Some(UserId::new(7)),
        };
        assert_eq!(resolver.resolve(claim).await.unwrap().unwrap().id, UserId::new(7));
    }

    #[tokio::test]
    async fn test_unknown_user_by_policy() {
        let storage = MemoryStorage::new();
        let claim = OwnerClaim {
            token_subject: None,
            body_user_id: Some(UserId::new(99999)),
        };

        let lenient = IdentityResolver::new(&storage, IdentityPolicy::Lenient);
        assert!(lenient.resolve(claim).await.unwrap().is_none());

        let strict = IdentityResolver::new(&storage, IdentityPolicy::Strict);
        assert!(matches!(
            strict.resolve(OwnerClaim::token(UserId::new(99999))).await,
            Err(OrderError::IdentityUnresolvable)
        ));
    }

    #[tokio::test]
    async fn test_conflicting_claims_rejected_under_any_policy() {
        let storage = storage_with_user(7).await;
        let claim = OwnerClaim {
            token_subject: Some(UserId::new(7)),
            body_user_id: Some(UserId::new(8)),
        };
        for policy in [IdentityPolicy::Strict, IdentityPolicy::Lenient] {
            let resolver = IdentityResolver::new(&storage, policy);
            assert!(matches!(
                resolver.resolve(claim).await,
                Err(OrderError::IdentityUnresolvable)
            ));
        }
    }

    #[tokio::test]
    async fn test_identity_store_failure_by_policy() {
        let storage = storage_with_user(7).await;
        storage.set_fail_point(Some(FailPoint::FindIdentity)).await;
        let claim = OwnerClaim::token(UserId::new(7));

        let strict = IdentityResolver::new(&storage, IdentityPolicy::Strict);
        assert!(matches!(
            strict.resolve(claim).await,
            Err(OrderError::Persistence {
                step: CheckoutStep::ResolveIdentity,
                ..
            })
        ));

        let lenient = IdentityResolver::new(&storage, IdentityPolicy::Lenient);
        assert!(lenient.resolve(claim).await.unwrap().is_none());
    }
}
