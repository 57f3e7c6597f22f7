//! Navigation hook used when the session is forcibly ended.

use std::sync::Mutex;

/// Route of the login entry point.
pub const LOGIN_ROUTE: &str = "/login";

/// Moves the UI to another route. Implemented by the front-end.
pub trait Navigator: Send + Sync {
    fn redirect_to(&self, route: &str);
}

/// Records redirects instead of performing them.
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self) -> usize {
        self.routes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to(&self, route: &str) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(route.to_string());
    }
}
