use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{Decision, RouteMeta};

/// A decision about whether a navigation may proceed
///
/// Guards read the session but never change it.
#[async_trait]
pub trait Guard: Send + Sync {
    /// Decides on a navigation to `route`
    async fn check(&self, route: &RouteMeta) -> Decision;
}

#[async_trait]
impl<T> Guard for &'_ T
where
    T: Guard + ?Sized,
{
    async fn check(&self, route: &RouteMeta) -> Decision {
        T::check(self, route).await
    }
}

#[async_trait]
impl<T> Guard for Box<T>
where
    T: Guard + ?Sized,
{
    async fn check(&self, route: &RouteMeta) -> Decision {
        T::check(self, route).await
    }
}

#[async_trait]
impl<T> Guard for Arc<T>
where
    T: Guard + ?Sized,
{
    async fn check(&self, route: &RouteMeta) -> Decision {
        T::check(self, route).await
    }
}

/// Runs guards in order, stopping at the first redirect
///
/// With no guards, every navigation is allowed.
#[derive(Default)]
#[must_use]
pub struct AllOf {
    guards: Vec<Box<dyn Guard>>,
}

impl fmt::Debug for AllOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllOf")
            .field("guards", &self.guards.len())
            .finish()
    }
}

impl AllOf {
    /// Constructs an empty composition
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a guard to run after the ones already added
    pub fn and<G>(mut self, guard: G) -> Self
    where
        G: Guard + 'static,
    {
        self.guards.push(Box::new(guard));
        self
    }
}

#[async_trait]
impl Guard for AllOf {
    async fn check(&self, route: &RouteMeta) -> Decision {
        for guard in &self.guards {
            let decision = guard.check(route).await;
            if !decision.is_allowed() {
                return decision;
            }
        }

        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::RedirectTarget;

    struct Fixed {
        decision: Decision,
        calls: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn new(decision: Decision) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    decision,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Guard for Fixed {
        async fn check(&self, _: &RouteMeta) -> Decision {
            self.calls.fetch_add(1, Ordering::AcqRel);
            self.decision
        }
    }

    #[tokio::test]
    async fn empty_composition_allows() {
        assert_eq!(
            AllOf::new().check(&RouteMeta::new("/")).await,
            Decision::Allow
        );
    }

    #[tokio::test]
    async fn first_redirect_wins_and_later_guards_are_skipped() {
        let (allow, allow_calls) = Fixed::new(Decision::Allow);
        let (login, _) = Fixed::new(Decision::Redirect(RedirectTarget::Login));
        let (pairing, pairing_calls) =
            Fixed::new(Decision::Redirect(RedirectTarget::CreatePairing));

        let guard = AllOf::new().and(allow).and(login).and(pairing);

        assert_eq!(
            guard.check(&RouteMeta::new("/")).await,
            Decision::Redirect(RedirectTarget::Login)
        );
        assert_eq!(allow_calls.load(Ordering::Acquire), 1);
        assert_eq!(pairing_calls.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn shared_guards_can_be_composed() {
        let (allow, calls) = Fixed::new(Decision::Allow);
        let shared = Arc::new(allow);

        let guard = AllOf::new().and(shared.clone()).and(shared);

        assert!(guard.check(&RouteMeta::new("/")).await.is_allowed());
        assert_eq!(calls.load(Ordering::Acquire), 2);
    }
}
