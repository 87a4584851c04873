//! Navigation capability

/// Sends the user agent to a URL (browser redirect, printed link, ...).
pub trait Navigate: Send + Sync {
    fn navigate(&self, url: &str);
}

impl<F> Navigate for F
where
    F: Fn(&str) + Send + Sync,
{
    fn navigate(&self, url: &str) {
        self(url)
    }
}
