//! Usage: Navigation seam invoked on unrecoverable auth failure or explicit logout.

/// External collaborator that sends the user to the login entry point.
///
/// The embedding application decides what a "redirect" means (full page load,
/// window swap, route change); the client only decides when it happens.
pub trait LoginNavigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// Default navigator for embedders that wire navigation elsewhere.
pub struct NoopNavigator;

impl LoginNavigator for NoopNavigator {
    fn redirect_to_login(&self) {
        tracing::info!("login redirect requested");
    }
}
