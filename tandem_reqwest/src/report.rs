use std::{fmt, sync::Arc};

use predicates::Predicate;
use reqwest::{Method, Request, Response, StatusCode, Url};
use reqwest_middleware::{Middleware, Next, Result};

use crate::ExchangeEndpoints;

/// A failed request, as seen by an [`ErrorReporter`]
#[derive(Clone, Copy, Debug)]
pub struct ErrorReport<'a> {
    /// The request method
    pub method: &'a Method,
    /// The request URL
    pub url: &'a Url,
    /// What went wrong
    pub failure: Failure<'a>,
}

/// The way a request failed
#[derive(Clone, Copy, Debug)]
pub enum Failure<'a> {
    /// The server answered with an error status
    Status(StatusCode),
    /// No response was received
    Transport(&'a reqwest_middleware::Error),
}

/// Presents failed requests to the user or to the logs
pub trait ErrorReporter: Send + Sync {
    /// Called once for every failed request that should be reported
    fn report(&self, report: &ErrorReport<'_>);
}

impl<R: ErrorReporter + ?Sized> ErrorReporter for Arc<R> {
    #[inline]
    fn report(&self, report: &ErrorReport<'_>) {
        R::report(self, report)
    }
}

impl<R: ErrorReporter + ?Sized> ErrorReporter for Box<R> {
    #[inline]
    fn report(&self, report: &ErrorReport<'_>) {
        R::report(self, report)
    }
}

/// Reports failed requests as `tracing` events
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: &ErrorReport<'_>) {
        match &report.failure {
            Failure::Status(status) if status.is_server_error() => tracing::error!(
                method = %report.method,
                url = %report.url,
                status = status.as_u16(),
                "request failed with server error"
            ),
            Failure::Status(status) => tracing::warn!(
                method = %report.method,
                url = %report.url,
                status = status.as_u16(),
                "request was rejected"
            ),
            Failure::Transport(error) => tracing::error!(
                method = %report.method,
                url = %report.url,
                error = (*error as &dyn std::error::Error),
                "request could not be sent"
            ),
        }
    }
}

/// A middleware that hands failed requests to an [`ErrorReporter`]
///
/// Place this outside [`SessionAuthMiddleware`][crate::SessionAuthMiddleware]
/// so that it sees the outcome after any refresh-and-retry. A 401 from a
/// protected endpoint is left to the session and is never reported; a 401 from
/// an exchange endpoint, such as a failed login, is.
#[derive(Clone)]
pub struct ErrorReportingMiddleware<R, P = ExchangeEndpoints> {
    reporter: R,
    exchange: P,
}

impl<R, P: fmt::Debug> fmt::Debug for ErrorReportingMiddleware<R, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ErrorReportingMiddleware")
            .field("exchange", &self.exchange)
            .finish_non_exhaustive()
    }
}

impl<R> ErrorReportingMiddleware<R> {
    /// Construct a new middleware reporting to `reporter`
    pub fn new(reporter: R) -> Self {
        Self {
            reporter,
            exchange: ExchangeEndpoints::default(),
        }
    }

    /// Replaces the predicate that recognizes exchange requests
    pub fn with_exchange_predicate<P>(self, exchange: P) -> ErrorReportingMiddleware<R, P> {
        ErrorReportingMiddleware {
            reporter: self.reporter,
            exchange,
        }
    }
}

#[async_trait::async_trait]
impl<R, P> Middleware for ErrorReportingMiddleware<R, P>
where
    R: ErrorReporter + 'static,
    P: Predicate<Request> + Send + Sync + 'static,
{
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let method = req.method().clone();
        let url = req.url().clone();
        let exchange = self.exchange.eval(&req);

        let result = next.run(req, extensions).await;

        let failure = match &result {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::UNAUTHORIZED && !exchange {
                    tracing::trace!(url = %url, "leaving unauthorized response to the session");
                    None
                } else if status.is_client_error() || status.is_server_error() {
                    Some(Failure::Status(status))
                } else {
                    None
                }
            }
            Err(error) => Some(Failure::Transport(error)),
        };

        if let Some(failure) = failure {
            self.reporter.report(&ErrorReport {
                method: &method,
                url: &url,
                failure,
            });
        }

        result
    }
}
