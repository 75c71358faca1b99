pub mod artifacts;
pub mod fetcher;

#[cfg(feature = "browser")]
pub mod browser_fetcher;

pub use artifacts::{HtmlDebugDir, HtmlDirSink, write_failed_units_csv};
pub use fetcher::ReqwestTransport;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserTransport;
