/// Smoke-test for `BrowserTransport`.
///
/// Launches a headless Chromium, renders <https://example.com> with a
/// rotated identity, and checks the rendered DOM.
///
/// Run with:
///   cargo run -p putusan-client --example browser_smoke --features browser
use putusan_client::BrowserTransport;
use putusan_core::identity::IdentityPool;
use putusan_core::policy::{DelayRange, FallbackPolicy};
use putusan_core::traits::FallbackTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let policy = FallbackPolicy {
        settle: DelayRange::zero(),
        ..FallbackPolicy::default()
    };
    let browser = BrowserTransport::new(policy);
    browser.launch().await?;

    let identity = IdentityPool::default().draw();
    let url = "https://example.com";
    println!("Rendering {url} as {}", identity.user_agent);
    let raw = browser.render(url, &identity).await;
    browser.shutdown().await;

    let html = raw
        .body
        .ok_or_else(|| anyhow::anyhow!("render failed: {:?} {:?}", raw.error, raw.detail))?;
    anyhow::ensure!(
        html.contains("Example Domain"),
        "expected heading not found in rendered HTML"
    );

    println!("OK: {} bytes of rendered HTML", html.len());
    Ok(())
}
