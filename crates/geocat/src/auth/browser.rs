//! Opening the authorization URL for the user.

/// Something that can show a URL to the user.
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`. Failure is not fatal; the caller logs the URL instead.
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// The platform default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        webbrowser::open(url)
    }
}
