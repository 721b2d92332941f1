//! Chain assembly and execution.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error};

use super::{Endpoint, Fact, Middleware, Next, RequestContext, Response};
use crate::{Error, Result};

/// One unit bound to the rest of the chain
struct Link {
    unit: Arc<dyn Middleware>,
    next: Arc<dyn Endpoint>,
}

#[async_trait]
impl Endpoint for Link {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Response> {
        let name = self.unit.name();
        let fut = self.unit.intercept(ctx, Next::new(self.next.as_ref()));
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!(unit = name, "Middleware unit panicked");
                Err(Error::MiddlewareFailure(name.to_string()))
            }
        }
    }
}

/// Terminal endpoint wrapped so a panic becomes a typed failure
struct Guarded {
    name: &'static str,
    inner: Arc<dyn Endpoint>,
}

#[async_trait]
impl Endpoint for Guarded {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Response> {
        match AssertUnwindSafe(self.inner.handle(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!(unit = self.name, "Terminal handler panicked");
                Err(Error::MiddlewareFailure(self.name.to_string()))
            }
        }
    }
}

/// Collects units in outer-to-inner order
#[derive(Default)]
pub struct ChainBuilder {
    units: Vec<Arc<dyn Middleware>>,
}

impl ChainBuilder {
    /// Empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit (runs after every unit added before it)
    #[must_use]
    pub fn with(mut self, unit: Arc<dyn Middleware>) -> Self {
        self.units.push(unit);
        self
    }

    /// Check fact ordering and fold the units around `terminal`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a unit is listed twice, or if a unit or
    /// the terminal requires a fact no earlier unit provides.
    pub fn build(self, terminal: Arc<dyn Endpoint>) -> Result<Chain> {
        let mut available: HashSet<Fact> = HashSet::from([Fact::Principal]);
        let mut seen: HashSet<&'static str> = HashSet::new();

        for unit in &self.units {
            if !seen.insert(unit.name()) {
                return Err(Error::Config(format!(
                    "Middleware '{}' is listed more than once",
                    unit.name()
                )));
            }
            if let Some(missing) = unit.requires().iter().find(|f| !available.contains(f)) {
                return Err(Error::Config(format!(
                    "Middleware '{}' requires {missing}, which no earlier unit provides",
                    unit.name()
                )));
            }
            available.extend(unit.provides().iter().copied());
        }
        if let Some(missing) = terminal.requires().iter().find(|f| !available.contains(f)) {
            return Err(Error::Config(format!(
                "Request handler requires {missing}, which no configured middleware provides"
            )));
        }

        let names: Vec<&'static str> = self.units.iter().map(|u| u.name()).collect();
        let mut head: Arc<dyn Endpoint> = Arc::new(Guarded {
            name: "executor",
            inner: terminal,
        });
        for unit in self.units.into_iter().rev() {
            head = Arc::new(Link { unit, next: head });
        }
        debug!(units = ?names, "Middleware chain assembled");

        Ok(Chain { head, units: names })
    }
}

/// Immutable, pre-composed middleware chain
pub struct Chain {
    head: Arc<dyn Endpoint>,
    units: Vec<&'static str>,
}

impl Chain {
    /// Run one request through every unit and the terminal
    pub async fn execute(&self, ctx: &mut RequestContext) -> Result<Response> {
        self.head.handle(ctx).await
    }

    /// Unit names, outermost first
    #[must_use]
    pub fn units(&self) -> &[&'static str] {
        &self.units
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("units", &self.units).finish()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::gateway::auth::Principal;
    use crate::middleware::Method;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        requires: &'static [Fact],
        provides: &'static [Fact],
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: Arc::clone(log),
                requires: &[],
                provides: &[],
            })
        }
    }

    #[async_trait]
    impl Middleware for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }
        fn requires(&self) -> &'static [Fact] {
            self.requires
        }
        fn provides(&self) -> &'static [Fact] {
            self.provides
        }
        async fn intercept(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response> {
            self.log.lock().push(format!("{}:in", self.name));
            let out = next.run(ctx).await;
            self.log.lock().push(format!("{}:out", self.name));
            out
        }
    }

    struct Blocker;

    #[async_trait]
    impl Middleware for Blocker {
        fn name(&self) -> &'static str {
            "blocker"
        }
        async fn intercept(&self, _ctx: &mut RequestContext, _next: Next<'_>) -> Result<Response> {
            Err(Error::RateLimited("alice".to_string()))
        }
    }

    struct Panicker;

    #[async_trait]
    impl Middleware for Panicker {
        fn name(&self) -> &'static str {
            "panicker"
        }
        async fn intercept(&self, _ctx: &mut RequestContext, _next: Next<'_>) -> Result<Response> {
            panic!("boom");
        }
    }

    struct Terminal {
        log: Log,
        requires: &'static [Fact],
    }

    #[async_trait]
    impl Endpoint for Terminal {
        async fn handle(&self, _ctx: &mut RequestContext) -> Result<Response> {
            self.log.lock().push("terminal".to_string());
            Ok(Response::Pong)
        }
        fn requires(&self) -> &'static [Fact] {
            self.requires
        }
    }

    fn terminal(log: &Log) -> Arc<dyn Endpoint> {
        Arc::new(Terminal {
            log: Arc::clone(log),
            requires: &[],
        })
    }

    fn ctx() -> RequestContext {
        RequestContext::new(
            Method::Ping,
            Principal::new("alice", "Alice", "employee"),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn units_run_in_onion_order() {
        let log: Log = Arc::default();
        let chain = ChainBuilder::new()
            .with(Recorder::new("a", &log))
            .with(Recorder::new("b", &log))
            .with(Recorder::new("c", &log))
            .build(terminal(&log))
            .unwrap();

        let response = chain.execute(&mut ctx()).await.unwrap();
        assert!(matches!(response, Response::Pong));
        assert_eq!(
            *log.lock(),
            vec!["a:in", "b:in", "c:in", "terminal", "c:out", "b:out", "a:out"]
        );
        assert_eq!(chain.units(), &["a", "b", "c"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_units() {
        let log: Log = Arc::default();
        let chain = ChainBuilder::new()
            .with(Recorder::new("outer", &log))
            .with(Arc::new(Blocker))
            .with(Recorder::new("inner", &log))
            .build(terminal(&log))
            .unwrap();

        let err = chain.execute(&mut ctx()).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
        assert_eq!(*log.lock(), vec!["outer:in", "outer:out"]);
    }

    #[tokio::test]
    async fn panic_becomes_middleware_failure() {
        let log: Log = Arc::default();
        let chain = ChainBuilder::new()
            .with(Recorder::new("outer", &log))
            .with(Arc::new(Panicker))
            .build(terminal(&log))
            .unwrap();

        let err = chain.execute(&mut ctx()).await.unwrap_err();
        assert!(matches!(err, Error::MiddlewareFailure(ref unit) if unit == "panicker"));
        assert_eq!(*log.lock(), vec!["outer:in", "outer:out"]);
    }

    #[test]
    fn missing_provider_is_rejected() {
        let log: Log = Arc::default();
        let needs = Arc::new(Recorder {
            name: "gate",
            log: Arc::clone(&log),
            requires: &[Fact::Permissions],
            provides: &[Fact::Authorization],
        });
        let gives = Arc::new(Recorder {
            name: "resolver",
            log: Arc::clone(&log),
            requires: &[],
            provides: &[Fact::Permissions],
        });

        let err = ChainBuilder::new()
            .with(needs.clone())
            .with(gives.clone())
            .build(terminal(&log))
            .unwrap_err();
        assert!(err.to_string().contains("gate"));

        assert!(
            ChainBuilder::new()
                .with(gives)
                .with(needs)
                .build(terminal(&log))
                .is_ok()
        );
    }

    #[test]
    fn terminal_requirements_are_checked() {
        let log: Log = Arc::default();
        let strict = Arc::new(Terminal {
            log: Arc::clone(&log),
            requires: &[Fact::Authorization],
        });
        assert!(ChainBuilder::new().build(strict).is_err());
    }

    #[test]
    fn duplicate_unit_is_rejected() {
        let log: Log = Arc::default();
        let err = ChainBuilder::new()
            .with(Recorder::new("a", &log))
            .with(Recorder::new("a", &log))
            .build(terminal(&log))
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
