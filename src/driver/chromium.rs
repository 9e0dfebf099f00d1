//! Chromium-backed environments over the DevTools protocol.
//!
//! Every environment is its own browser process with a throwaway profile
//! directory, so nothing carries over between attempts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::auth::Credentials;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DriverFuture, Environment, EnvironmentProvider, EnvironmentSpec};
use crate::config::{BrowserSettings, PageDetector};
use crate::models::page_state::PageState;
use crate::{AppError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

const VISIBLE_JS: &str = r"(sel) => {
    const el = document.querySelector(sel);
    if (!el) return false;
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    return rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none';
}";

/// Launches one Chromium process per environment.
pub struct ChromiumProvider {
    settings: BrowserSettings,
}

impl ChromiumProvider {
    /// Create a provider from the `[browser]` configuration section.
    #[must_use]
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    async fn launch(&self, spec: &EnvironmentSpec) -> Result<Arc<dyn Environment>> {
        let profile_dir = std::env::temp_dir().join(format!("form-pilot-{}", Uuid::new_v4()));
        let viewport = &spec.viewport;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&profile_dir)
            .window_size(viewport.width, viewport.height)
            .viewport(Viewport {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: Some(viewport.scale),
                ..Viewport::default()
            });
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(ref executable) = self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        if let Some(ref proxy) = spec.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server));
            if proxy.username.is_some() && proxy.server.starts_with("socks") {
                warn!(server = %proxy.server, "chromium ignores credentials on socks proxies");
            }
        }

        let config = builder
            .build()
            .map_err(|err| AppError::Driver(format!("invalid browser config: {err}")))?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| AppError::Driver(format!("failed to launch browser: {err}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(%err, "cdp handler event error");
                }
            }
        });

        let page = match open_page(&browser, spec).await {
            Ok(page) => page,
            Err(err) => {
                let _ = browser.close().await;
                handler_task.abort();
                let _ = tokio::fs::remove_dir_all(&profile_dir).await;
                return Err(err);
            }
        };

        info!(proxy = ?spec.proxy.as_ref().map(|p| &p.server), viewport = %viewport.name, "browser environment ready");
        Ok(Arc::new(ChromiumEnvironment {
            browser: Mutex::new(Some(browser)),
            handler: Mutex::new(Some(handler_task)),
            page,
            alive: AtomicBool::new(true),
            detectors: self.settings.page_states.clone(),
            profile_dir,
        }))
    }
}

async fn open_page(browser: &Browser, spec: &EnvironmentSpec) -> Result<Page> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|err| AppError::Driver(format!("failed to open page: {err}")))?;

    if let Some(ref proxy) = spec.proxy {
        if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
            page.authenticate(Credentials {
                username: username.clone(),
                password: password.clone(),
            })
            .await
            .map_err(|err| AppError::Driver(format!("proxy authentication setup failed: {err}")))?;
        }
    }
    Ok(page)
}

impl EnvironmentProvider for ChromiumProvider {
    fn acquire<'a>(&'a self, spec: &'a EnvironmentSpec) -> DriverFuture<'a, Arc<dyn Environment>> {
        Box::pin(self.launch(spec))
    }
}

/// One browser process and its single page.
pub struct ChromiumEnvironment {
    browser: Mutex<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    page: Page,
    alive: AtomicBool,
    detectors: Vec<PageDetector>,
    profile_dir: PathBuf,
}

impl ChromiumEnvironment {
    fn ensure_alive(&self) -> Result<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Driver("environment already released".into()))
        }
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let selector_json = serde_json::to_string(selector)
            .map_err(|err| AppError::Driver(format!("bad selector: {err}")))?;
        self.page
            .evaluate(format!("({VISIBLE_JS})({selector_json})"))
            .await
            .map_err(|err| AppError::Driver(format!("visibility probe failed: {err}")))?
            .into_value::<bool>()
            .map_err(|err| AppError::Driver(format!("visibility probe returned garbage: {err}")))
    }
}

impl Environment for ChromiumEnvironment {
    fn navigate<'a>(&'a self, url: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_alive()?;
            self.page
                .goto(url)
                .await
                .map_err(|err| AppError::Driver(format!("navigation to {url} failed: {err}")))?;
            Ok(())
        })
    }

    fn fill<'a>(&'a self, selector: &'a str, value: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_alive()?;
            let element = self
                .page
                .find_element(selector)
                .await
                .map_err(|err| AppError::Driver(format!("'{selector}' not found: {err}")))?;
            element
                .click()
                .await
                .map_err(|err| AppError::Driver(format!("'{selector}' not focusable: {err}")))?;
            element
                .call_js_fn("function() { this.value = ''; }", false)
                .await
                .map_err(|err| AppError::Driver(format!("'{selector}' not clearable: {err}")))?;
            element
                .type_str(value)
                .await
                .map_err(|err| AppError::Driver(format!("typing into '{selector}' failed: {err}")))?;
            Ok(())
        })
    }

    fn click<'a>(&'a self, selector: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_alive()?;
            self.page
                .find_element(selector)
                .await
                .map_err(|err| AppError::Driver(format!("'{selector}' not found: {err}")))?
                .click()
                .await
                .map_err(|err| AppError::Driver(format!("clicking '{selector}' failed: {err}")))?;
            Ok(())
        })
    }

    fn wait_for<'a>(&'a self, selector: &'a str, timeout: Duration) -> DriverFuture<'a, bool> {
        Box::pin(async move {
            self.ensure_alive()?;
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if self.is_visible(selector).await? {
                    return Ok(true);
                }
                if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                    return Ok(false);
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
    }

    fn observe_page_state(&self) -> DriverFuture<'_, PageState> {
        Box::pin(async move {
            self.ensure_alive()?;
            for detector in &self.detectors {
                if self.is_visible(&detector.selector).await? {
                    return Ok(detector.state);
                }
            }
            Ok(PageState::Unknown)
        })
    }

    fn capture_frame(&self, quality: u8) -> DriverFuture<'_, Vec<u8>> {
        Box::pin(async move {
            self.ensure_alive()?;
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Jpeg)
                .quality(i64::from(quality.clamp(1, 100)))
                .build();
            self.page
                .screenshot(params)
                .await
                .map_err(|err| AppError::Driver(format!("screenshot failed: {err}")))
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn release(&self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            if !self.alive.swap(false, Ordering::SeqCst) {
                return Ok(());
            }

            let mut outcome = Ok(());
            if let Some(mut browser) = self.browser.lock().await.take() {
                if let Err(err) = browser.close().await {
                    outcome = Err(AppError::Driver(format!("browser close failed: {err}")));
                }
                if let Err(err) = browser.wait().await {
                    debug!(%err, "browser process wait failed");
                }
            }
            if let Some(handler) = self.handler.lock().await.take() {
                handler.abort();
            }
            if let Err(err) = tokio::fs::remove_dir_all(&self.profile_dir).await {
                debug!(%err, dir = %self.profile_dir.display(), "profile cleanup failed");
            }
            outcome
        })
    }
}
