use std::sync::atomic::{AtomicBool, Ordering};

use pharmacy_core::Navigator;
use tracing::info;

/// Terminal stand-in for a route change: the command cannot continue, so the
/// user is told to log in again once it finishes.
#[derive(Default)]
pub struct CliNavigator {
    redirected: AtomicBool,
}

impl CliNavigator {
    pub fn redirected(&self) -> bool {
        self.redirected.load(Ordering::SeqCst)
    }
}

impl Navigator for CliNavigator {
    fn redirect_to(&self, route: &str) {
        info!(route, "Redirect requested");
        self.redirected.store(true, Ordering::SeqCst);
    }
}
