/*!
 * Scoped Resources
 *
 * Enter/exit pairs usable as a block guard or as a function wrapper.
 *
 * ## Forms
 *
 * - **Guard**: [`Scope::enter`] returns an RAII guard; exit runs on drop
 * - **Block**: [`run`] brackets a closure and returns its value
 * - **Wrapper**: [`decorate`] turns a callable into one that enters and
 *   exits around every call
 *
 * ## Example
 *
 * ```ignore
 * let mut manager = TimeoutManager::new(10);
 * let value = scoped::run(&mut manager, |m| {
 *     m.check()?;
 *     Ok::<_, TimerError>(42)
 * })?;
 * ```
 */

use crate::errors::{TimerError, TimerResult};
use std::ops::Deref;
use tracing::warn;

/// What exit decided about the scope's outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Pass the block's result through
    Clean,
    /// A failure was swallowed; the scope produced no value
    Suppressed,
}

/// An acquire/release pair
///
/// `exit` must run on every path out of the scope, including early
/// returns and panics. An `Err` from `exit` replaces the block's result.
pub trait ScopedResource {
    /// Resource type name for logging
    fn resource_type(&self) -> &'static str;

    fn enter(&mut self) -> TimerResult<()>;

    fn exit(&mut self) -> TimerResult<Release>;
}

/// RAII guard for an entered resource
///
/// Derefs to the resource so the block can inspect it.
pub struct Scope<'a, R: ScopedResource + ?Sized> {
    resource: &'a mut R,
    active: bool,
}

impl<'a, R: ScopedResource + ?Sized> Scope<'a, R> {
    /// Enter `resource`
    pub fn enter(resource: &'a mut R) -> TimerResult<Self> {
        resource.enter()?;
        Ok(Self {
            resource,
            active: true,
        })
    }

    /// Exit explicitly and observe the outcome
    pub fn exit(mut self) -> TimerResult<Release> {
        self.active = false;
        self.resource.exit()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl<R: ScopedResource + ?Sized> Deref for Scope<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &*self.resource
    }
}

impl<R: ScopedResource + ?Sized> Drop for Scope<'_, R> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(e) = self.resource.exit() {
            warn!(
                resource_type = self.resource.resource_type(),
                error = %e,
                "exit failed while dropping scope"
            );
        }
    }
}

/// Run `body` inside `resource`
///
/// Returns `Some(value)` when the body completes, `None` when exit
/// suppressed a failure. Errors from the body pass through unchanged
/// unless exit itself fails.
pub fn run<R, T, E, F>(resource: &mut R, body: F) -> Result<Option<T>, E>
where
    R: ScopedResource + ?Sized,
    F: FnOnce(&R) -> Result<T, E>,
    E: From<TimerError>,
{
    let scope = Scope::enter(resource)?;
    let outcome = body(&scope);
    match scope.exit()? {
        Release::Clean => outcome.map(Some),
        Release::Suppressed => Ok(None),
    }
}

/// Wrap `f` so each call runs inside `resource`
pub fn decorate<R, A, T, E, F>(
    mut resource: R,
    mut f: F,
) -> impl FnMut(A) -> Result<Option<T>, E>
where
    R: ScopedResource,
    F: FnMut(A) -> Result<T, E>,
    E: From<TimerError>,
{
    move |args: A| run(&mut resource, |_| f(args))
}
