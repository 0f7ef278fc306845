//! Guest to account cart reconciliation.
//!
//! When a guest logs in, whatever they put in their guest cart is folded into
//! their account cart, quantities summed, exactly once. The guest cart is
//! then gone and the guest session invalidated.
//!
//! The write is a compare-and-swap against the snapshots the merge was
//! computed from ([`CartStore::commit_merge`]). Two logins racing on the same
//! guest session both compute a merge, one commits, the other sees a stale
//! snapshot, re-reads an empty guest cart and does nothing.

use std::sync::Arc;

use tracing::instrument;

use corner_shop_core::{Identity, OwnerKey, SessionKey};

use crate::services::cart::CartError;
use crate::store::{CartStore, Deadline, MergeCommit, SessionStore, StoreError};

/// Compare-and-swap attempts before giving up.
const MAX_MERGE_ATTEMPTS: u32 = 3;

/// Progress of a single reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// Guest cart read, account cart not yet.
    GuestOnly,
    /// Both carts read.
    AccountOnly,
    /// Merge computed, commit in flight.
    Merging,
    /// Guest cart folded in (or there was nothing to fold).
    Merged,
}

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The transition was not guest to account.
    NotApplicable,
    /// The guest cart was empty.
    NothingToMerge,
    /// Guest lines were folded into the account cart.
    Merged {
        /// Distinct products taken from the guest cart.
        lines_moved: usize,
        /// Distinct products in the account cart afterwards.
        account_lines: usize,
    },
}

/// Folds guest carts into account carts on login.
pub struct CartReconciler {
    carts: Arc<dyn CartStore>,
    sessions: Arc<dyn SessionStore>,
}

impl CartReconciler {
    #[must_use]
    pub fn new(carts: Arc<dyn CartStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { carts, sessions }
    }

    /// Fold the guest cart of `prior` into the account cart of `new`.
    ///
    /// Only an `Anonymous` to `Authenticated` transition does anything. A
    /// failed read or commit leaves the guest cart and session untouched.
    ///
    /// # Errors
    ///
    /// Returns `CartError::StorageFailure` if a cart read or the commit fails,
    /// or if the compare-and-swap keeps losing.
    #[instrument(skip_all, fields(user_id = tracing::field::Empty))]
    pub async fn reconcile_on_login(
        &self,
        prior: &Identity,
        new: &Identity,
        deadline: Deadline,
    ) -> Result<ReconcileOutcome, CartError> {
        let (
            Identity::Anonymous { session_key },
            Identity::Authenticated { user_id, .. },
        ) = (prior, new)
        else {
            return Ok(ReconcileOutcome::NotApplicable);
        };
        tracing::Span::current().record("user_id", user_id.get());

        let guest = OwnerKey::Session(session_key.clone());
        let account = OwnerKey::User(*user_id);

        for attempt in 1..=MAX_MERGE_ATTEMPTS {
            let guest_cart = deadline
                .bounded("get_cart", self.carts.get_cart(&guest))
                .await?;
            trace_state(ReconcileState::GuestOnly, attempt);

            if guest_cart.is_empty() {
                trace_state(ReconcileState::Merged, attempt);
                self.invalidate(session_key, deadline).await;
                return Ok(ReconcileOutcome::NothingToMerge);
            }

            let account_cart = deadline
                .bounded("get_cart", self.carts.get_cart(&account))
                .await?;
            trace_state(ReconcileState::AccountOnly, attempt);

            let merged = account_cart.merged_with(&guest_cart);
            trace_state(ReconcileState::Merging, attempt);

            let commit = deadline
                .bounded(
                    "commit_merge",
                    self.carts.commit_merge(
                        &guest,
                        &account,
                        &guest_cart,
                        &account_cart,
                        &merged,
                    ),
                )
                .await?;

            match commit {
                MergeCommit::Committed => {
                    trace_state(ReconcileState::Merged, attempt);
                    self.invalidate(session_key, deadline).await;
                    tracing::info!(
                        lines_moved = guest_cart.line_count(),
                        account_lines = merged.line_count(),
                        "Guest cart merged into account"
                    );
                    return Ok(ReconcileOutcome::Merged {
                        lines_moved: guest_cart.line_count(),
                        account_lines: merged.line_count(),
                    });
                }
                MergeCommit::Stale => {
                    tracing::debug!(attempt, "Cart snapshot went stale, re-reading");
                }
            }
        }

        Err(CartError::StorageFailure(StoreError::Conflict(format!(
            "cart merge did not settle after {MAX_MERGE_ATTEMPTS} attempts"
        ))))
    }

    /// Invalidate the folded guest session. A failure here is logged only:
    /// the guest cart is already empty, so a later retry is a no-op.
    async fn invalidate(&self, session_key: &SessionKey, deadline: Deadline) {
        if let Err(e) = deadline
            .bounded(
                "invalidate_session",
                self.sessions.invalidate_session(session_key),
            )
            .await
        {
            tracing::warn!(
                session = session_key.fingerprint(),
                error = %e,
                "Failed to invalidate folded guest session"
            );
        }
    }
}

fn trace_state(state: ReconcileState, attempt: u32) {
    tracing::trace!(?state, attempt, "Reconcile state");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use corner_shop_core::{Cart, CartLine, Email, ProductId, Quantity, UserId};

    use super::*;
    use crate::store::InMemoryStore;
    use crate::store::memory::Fault;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(1))
    }

    fn cart(lines: &[(i64, u32)]) -> Cart {
        lines
            .iter()
            .map(|&(p, q)| CartLine {
                product_id: ProductId::new(p),
                quantity: Quantity::new(q).unwrap(),
            })
            .collect()
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        reconciler: CartReconciler,
        key: SessionKey,
        guest: Identity,
        user: Identity,
    }

    async fn fixture(guest_lines: &[(i64, u32)], account_lines: &[(i64, u32)]) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let key = SessionKey::generate();
        let now = Utc::now();
        store
            .create_session(&key, now, now + chrono::Duration::hours(24))
            .await
            .unwrap();
        store
            .replace_cart(&OwnerKey::Session(key.clone()), &cart(guest_lines))
            .await
            .unwrap();
        store
            .replace_cart(&OwnerKey::User(UserId::new(1)), &cart(account_lines))
            .await
            .unwrap();
        Fixture {
            reconciler: CartReconciler::new(store.clone(), store.clone()),
            store,
            guest: Identity::Anonymous {
                session_key: key.clone(),
            },
            key,
            user: Identity::Authenticated {
                user_id: UserId::new(1),
                email: Email::parse("a@b.c").unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn test_merge_sums_and_empties_guest() {
        let f = fixture(&[(1, 2)], &[(1, 1), (2, 3)]).await;
        let outcome = f
            .reconciler
            .reconcile_on_login(&f.guest, &f.user, deadline())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Merged {
                lines_moved: 1,
                account_lines: 2
            }
        );
        assert_eq!(
            f.store.get_cart(&f.user.owner_key()).await.unwrap(),
            cart(&[(1, 3), (2, 3)])
        );
        assert!(f.store.get_cart(&f.guest.owner_key()).await.unwrap().is_empty());
        assert!(f.store.get_session(&f.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let f = fixture(&[(1, 2)], &[]).await;
        f.reconciler
            .reconcile_on_login(&f.guest, &f.user, deadline())
            .await
            .unwrap();
        let again = f
            .reconciler
            .reconcile_on_login(&f.guest, &f.user, deadline())
            .await
            .unwrap();
        assert_eq!(again, ReconcileOutcome::NothingToMerge);
        assert_eq!(f.store.item_count(&f.user.owner_key()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_not_applicable_for_authenticated_prior() {
        let f = fixture(&[(1, 2)], &[]).await;
        let outcome = f
            .reconciler
            .reconcile_on_login(&f.user, &f.user, deadline())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::NotApplicable);
        assert_eq!(f.store.item_count(&f.guest.owner_key()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_guest_invalidates_session() {
        let f = fixture(&[], &[(5, 1)]).await;
        let outcome = f
            .reconciler
            .reconcile_on_login(&f.guest, &f.user, deadline())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::NothingToMerge);
        assert!(f.store.get_session(&f.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_account_read_failure_keeps_guest_cart() {
        let f = fixture(&[(1, 2)], &[]).await;
        f.store.inject_after("get_cart", 1, Fault::Unavailable);
        let err = f
            .reconciler
            .reconcile_on_login(&f.guest, &f.user, deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::StorageFailure(_)));
        assert_eq!(f.store.item_count(&f.guest.owner_key()).await.unwrap(), 2);
        assert!(f.store.get_session(&f.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_guest_cart() {
        let f = fixture(&[(1, 2)], &[]).await;
        f.store.fail_next("commit_merge");
        assert!(
            f.reconciler
                .reconcile_on_login(&f.guest, &f.user, deadline())
                .await
                .is_err()
        );
        assert_eq!(f.store.item_count(&f.guest.owner_key()).await.unwrap(), 2);
        assert_eq!(f.store.item_count(&f.user.owner_key()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stale_commit_is_retried() {
        let f = fixture(&[(1, 2)], &[]).await;
        f.store.inject_after("commit_merge", 0, Fault::Stale);
        let outcome = f
            .reconciler
            .reconcile_on_login(&f.guest, &f.user, deadline())
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Merged { .. }));
        assert_eq!(f.store.item_count(&f.user.owner_key()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_storage_failure() {
        let f = fixture(&[(1, 2)], &[]).await;
        for _ in 0..MAX_MERGE_ATTEMPTS {
            f.store.inject_after("commit_merge", 0, Fault::Stale);
        }
        let err = f
            .reconciler
            .reconcile_on_login(&f.guest, &f.user, deadline())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CartError::StorageFailure(StoreError::Conflict(_))
        ));
        assert_eq!(f.store.item_count(&f.guest.owner_key()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_failure_does_not_fail_merge() {
        let f = fixture(&[(1, 2)], &[]).await;
        f.store.fail_next("invalidate_session");
        let outcome = f
            .reconciler
            .reconcile_on_login(&f.guest, &f.user, deadline())
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Merged { .. }));
    }

    #[tokio::test]
    async fn test_stalled_commit_times_out() {
        let f = fixture(&[(1, 2)], &[]).await;
        f.store.inject_after("commit_merge", 0, Fault::Stall);
        let err = f
            .reconciler
            .reconcile_on_login(
                &f.guest,
                &f.user,
                Deadline::after(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CartError::StorageFailure(StoreError::Timeout { .. })
        ));
        assert_eq!(f.store.item_count(&f.guest.owner_key()).await.unwrap(), 2);
    }
}
