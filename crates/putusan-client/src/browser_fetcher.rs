use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use putusan_core::error::AppError;
use putusan_core::models::{IdentityRecord, RawResult, TransportErrorKind};
use putusan_core::policy::FallbackPolicy;
use putusan_core::traits::FallbackTransport;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;

const HIDE_WEBDRIVER: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

/// Fallback transport: headless Chromium driven over the DevTools Protocol.
///
/// Renders JavaScript before returning the DOM, which gets past most
/// interstitial challenges that defeat the plain HTTP client.
///
/// One browser session is launched lazily and shared by all renders. It is
/// recycled after `session_max_uses` renders or once it is older than
/// `session_max_age`, and after any render that fails. Each render opens a
/// fresh tab carrying the attempt's identity.
///
/// # Example
///
/// ```rust,no_run
/// use putusan_client::BrowserTransport;
/// use putusan_core::models::IdentityRecord;
/// use putusan_core::policy::FallbackPolicy;
/// use putusan_core::traits::FallbackTransport;
///
/// # async fn run() {
/// let browser = BrowserTransport::new(FallbackPolicy::default());
/// let raw = browser
///     .render("https://example.com", &IdentityRecord::new("Mozilla/5.0"))
///     .await;
/// println!("{:?}", raw.body.map(|b| b.len()));
/// browser.shutdown().await;
/// # }
/// ```
pub struct BrowserTransport {
    policy: FallbackPolicy,
    session: tokio::sync::Mutex<Option<Session>>,
    rng: Mutex<StdRng>,
}

struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
    uses: u32,
    launched: Instant,
}

impl Session {
    async fn launch() -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .arg("--window-size=1920,1080")
            .arg("--disable-blink-features=AutomationControlled")
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        tracing::info!("Browser session launched");
        Ok(Self {
            browser,
            handler,
            uses: 0,
            launched: Instant::now(),
        })
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "Browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        tracing::info!(uses = self.uses, "Browser session closed");
    }
}

impl BrowserTransport {
    /// Create a transport. Chromium is not started until the first render.
    pub fn new(policy: FallbackPolicy) -> Self {
        Self {
            policy,
            session: tokio::sync::Mutex::new(None),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Start the browser now, surfacing launch errors up front.
    pub async fn launch(&self) -> Result<(), AppError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(Session::launch().await?);
        }
        Ok(())
    }

    async fn open_tab(
        &self,
        browser: &Browser,
        url: &str,
        identity: &IdentityRecord,
    ) -> Result<String, chromiumoxide::error::CdpError> {
        let page = browser.new_page("about:blank").await?;
        let result = self.load(&page, url, identity).await;
        let _ = page.close().await;
        result
    }

    async fn load(
        &self,
        page: &Page,
        url: &str,
        identity: &IdentityRecord,
    ) -> Result<String, chromiumoxide::error::CdpError> {
        page.execute(SetUserAgentOverrideParams::new(identity.user_agent.clone()))
            .await?;
        if !identity.extra_headers.is_empty() {
            let headers = serde_json::to_value(&identity.extra_headers)
                .unwrap_or(serde_json::Value::Null);
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
                .await?;
        }
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(HIDE_WEBDRIVER))
            .await?;

        tokio::time::timeout(self.policy.page_load_timeout, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        })
        .await
        .map_err(|_| chromiumoxide::error::CdpError::Timeout)??;

        let settle = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            self.policy.settle.sample(&mut *rng)
        };
        tokio::time::sleep(settle).await;

        page.content().await
    }
}

impl FallbackTransport for BrowserTransport {
    async fn render(&self, url: &str, identity: &IdentityRecord) -> RawResult {
        let mut guard = self.session.lock().await;

        let session = match guard.take() {
            Some(session) if !is_stale(session.uses, session.launched.elapsed(), &self.policy) => {
                session
            }
            stale => {
                if let Some(old) = stale {
                    tracing::info!(uses = old.uses, "Recycling browser session");
                    old.shutdown().await;
                }
                match Session::launch().await {
                    Ok(session) => session,
                    Err(e) => {
                        tracing::warn!(error = %e, "Browser unavailable");
                        return RawResult::transport_error(TransportErrorKind::Connection, e.to_string());
                    }
                }
            }
        };

        let started = Instant::now();
        let result = self.open_tab(&session.browser, url, identity).await;

        match result {
            Ok(html) => {
                tracing::debug!(%url, elapsed_ms = started.elapsed().as_millis() as u64, "Rendered page");
                let mut session = session;
                session.uses += 1;
                *guard = Some(session);
                RawResult {
                    body: Some(html),
                    ..Default::default()
                }
            }
            Err(e) => {
                let message = e.to_string();
                let kind = match e {
                    chromiumoxide::error::CdpError::Timeout => TransportErrorKind::Timeout,
                    _ => kind_from_net_error(&message),
                };
                tracing::debug!(%url, ?kind, error = %message, "Render failed, dropping session");
                session.shutdown().await;
                RawResult::transport_error(kind, message)
            }
        }
    }

    async fn shutdown(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.shutdown().await;
        }
    }
}

fn is_stale(uses: u32, age: Duration, policy: &FallbackPolicy) -> bool {
    uses >= policy.session_max_uses || age >= policy.session_max_age
}

/// Map Chromium `net::ERR_*` navigation errors to the transport taxonomy.
fn kind_from_net_error(message: &str) -> TransportErrorKind {
    let upper = message.to_ascii_uppercase();
    if upper.contains("ERR_TIMED_OUT") || upper.contains("TIMEOUT") {
        TransportErrorKind::Timeout
    } else if upper.contains("ERR_NAME_NOT_RESOLVED") || upper.contains("ERR_NAME_RESOLUTION") {
        TransportErrorKind::Dns
    } else if upper.contains("ERR_CERT") || upper.contains("ERR_SSL") {
        TransportErrorKind::Tls
    } else {
        TransportErrorKind::Connection
    }
}

/// Locate a Chrome/Chromium binary.
///
/// `CHROME_BIN` wins; then the real binary inside a snap (the `/snap/bin`
/// wrapper strips headless flags); then common system paths. `None` lets
/// chromiumoxide do its own lookup.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_recycling_thresholds() {
        let policy = FallbackPolicy {
            session_max_uses: 3,
            session_max_age: Duration::from_secs(60),
            ..FallbackPolicy::default()
        };
        assert!(!is_stale(0, Duration::ZERO, &policy));
        assert!(!is_stale(2, Duration::from_secs(59), &policy));
        assert!(is_stale(3, Duration::ZERO, &policy));
        assert!(is_stale(0, Duration::from_secs(60), &policy));
    }

    #[test]
    fn net_errors_map_to_transport_kinds() {
        assert_eq!(
            kind_from_net_error("net::ERR_NAME_NOT_RESOLVED"),
            TransportErrorKind::Dns
        );
        assert_eq!(
            kind_from_net_error("net::ERR_CERT_AUTHORITY_INVALID"),
            TransportErrorKind::Tls
        );
        assert_eq!(
            kind_from_net_error("net::ERR_SSL_PROTOCOL_ERROR"),
            TransportErrorKind::Tls
        );
        assert_eq!(kind_from_net_error("net::ERR_TIMED_OUT"), TransportErrorKind::Timeout);
        assert_eq!(
            kind_from_net_error("net::ERR_CONNECTION_RESET"),
            TransportErrorKind::Connection
        );
    }
}
