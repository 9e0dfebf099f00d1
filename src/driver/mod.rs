//! Technology-agnostic automation driver abstraction.
//!
//! The [`EnvironmentProvider`] trait decouples the session runner from
//! whatever actually hosts the isolated browsing context. Each attempt
//! acquires a fresh [`Environment`] and releases it through an
//! [`EnvironmentLease`] so teardown happens exactly once on every exit path.

#[cfg(feature = "browser")]
pub mod chromium;
pub mod lease;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::models::attempt::ProxyDescriptor;
use crate::models::identity::ViewportProfile;
use crate::models::page_state::PageState;
use crate::Result;

pub use lease::EnvironmentLease;

/// Boxed future returned by driver operations.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Parameters for creating one isolated environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentSpec {
    /// Outbound proxy, or `None` for a direct connection.
    pub proxy: Option<ProxyDescriptor>,
    /// Viewport geometry.
    pub viewport: ViewportProfile,
}

/// Factory for isolated browsing environments.
pub trait EnvironmentProvider: Send + Sync {
    /// Create a fresh environment for one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Driver`](crate::AppError::Driver) if the
    /// environment cannot be created.
    fn acquire<'a>(&'a self, spec: &'a EnvironmentSpec) -> DriverFuture<'a, Arc<dyn Environment>>;
}

/// Operations a flow step can perform against one isolated environment.
///
/// Implementations must make [`release`](Self::release) idempotent and
/// report `false` from [`is_alive`](Self::is_alive) once released.
pub trait Environment: Send + Sync {
    /// Load `url` and wait for navigation to settle.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Driver`](crate::AppError::Driver) on navigation failure.
    fn navigate<'a>(&'a self, url: &'a str) -> DriverFuture<'a, ()>;

    /// Replace the value of the element matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Driver`](crate::AppError::Driver) if the element is
    /// missing or not editable.
    fn fill<'a>(&'a self, selector: &'a str, value: &'a str) -> DriverFuture<'a, ()>;

    /// Click the element matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Driver`](crate::AppError::Driver) if the element is
    /// missing or not clickable.
    fn click<'a>(&'a self, selector: &'a str) -> DriverFuture<'a, ()>;

    /// Wait until `selector` is visible. Resolves `false` if it never appears
    /// within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Driver`](crate::AppError::Driver) if the page cannot be probed.
    fn wait_for<'a>(&'a self, selector: &'a str, timeout: Duration) -> DriverFuture<'a, bool>;

    /// Classify the current page.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Driver`](crate::AppError::Driver) if the page cannot be probed.
    fn observe_page_state(&self) -> DriverFuture<'_, PageState>;

    /// Capture a JPEG frame at the given quality (1-100).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Driver`](crate::AppError::Driver) if capture fails.
    fn capture_frame(&self, quality: u8) -> DriverFuture<'_, Vec<u8>>;

    /// Whether the environment can still be used.
    fn is_alive(&self) -> bool;

    /// Tear the environment down.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Driver`](crate::AppError::Driver) if teardown fails;
    /// the environment is considered dead afterwards regardless.
    fn release(&self) -> DriverFuture<'_, ()>;
}

/// Provider used when no browser backend is compiled in.
///
/// Every acquisition fails, so each attempt ends with an
/// environment-acquisition failure instead of the process refusing to start.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableProvider;

impl EnvironmentProvider for UnavailableProvider {
    fn acquire<'a>(&'a self, _spec: &'a EnvironmentSpec) -> DriverFuture<'a, Arc<dyn Environment>> {
        Box::pin(async {
            Err(crate::AppError::Driver(
                "no browser backend available; rebuild with the `browser` feature".into(),
            ))
        })
    }
}
