//! Chrome DevTools Protocol gateway backed by chromiumoxide.
//!
//! Connects to externally-hosted browsers over their CDP websocket
//! endpoint. Browser lifetime is managed remotely; this side only opens
//! and closes sessions and pages.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

use super::{BrowserGateway, BrowserPage, BrowserSession, ImageFormat, NavigationResponse};

/// Production gateway: one CDP websocket connection per session.
pub struct CdpGateway;

impl CdpGateway {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CdpGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserGateway for CdpGateway {
    async fn connect(&self, endpoint: &str, slow_mo_ms: u64) -> Result<Box<dyn BrowserSession>> {
        debug!("connecting to browser endpoint: {}", endpoint);

        let (browser, mut handler) = Browser::connect(endpoint)
            .await
            .context(format!("Failed to connect to browser at {}", endpoint))?;

        // Drive CDP events for this connection; the stream ends when the
        // websocket goes away.
        let handler_endpoint = endpoint.to_string();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error from {}: {}", handler_endpoint, e);
                }
            }
            debug!("CDP handler loop ended for {}", handler_endpoint);
        });

        Ok(Box::new(CdpSession {
            browser,
            slow_mo: Duration::from_millis(slow_mo_ms),
        }))
    }
}

/// One live CDP connection.
pub struct CdpSession {
    browser: Browser,
    slow_mo: Duration,
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to open page")?;

        Ok(Box::new(CdpPage { page, slow_mo: self.slow_mo }))
    }

    async fn close(&mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .context("Failed to close browser session")?;
        Ok(())
    }
}

/// One page (tab) within a CDP session.
pub struct CdpPage {
    page: Page,
    slow_mo: Duration,
}

impl CdpPage {
    /// Optional fixed delay before every command, for watching captures
    /// happen against a headed browser.
    async fn pace(&self) {
        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.pace().await;
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| anyhow!("invalid viewport parameters: {}", e))?;
        self.page
            .execute(params)
            .await
            .context("Failed to set viewport")?;
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.pace().await;
        self.page
            .set_user_agent(user_agent)
            .await
            .context("Failed to set user agent")?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<NavigationResponse> {
        self.pace().await;
        self.page
            .goto(url)
            .await
            .context(format!("Failed to navigate to {}", url))?;

        // Main-frame response; absent for about:/data: URLs and some
        // error pages, which callers see as status 0.
        let request = self
            .page
            .wait_for_navigation_response()
            .await
            .context("Failed waiting for navigation response")?;

        let response = request.as_ref().and_then(|r| r.response.as_ref());
        Ok(match response {
            Some(response) => NavigationResponse {
                status: response.status as u16,
                status_text: Some(response.status_text.clone()).filter(|text| !text.is_empty()),
            },
            None => {
                warn!("no main-frame response observed for {}", url);
                NavigationResponse { status: 0, status_text: None }
            }
        })
    }

    async fn evaluate(&self, expression: &str) -> Result<()> {
        self.pace().await;
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow!("invalid evaluate parameters: {}", e))?;
        self.page
            .evaluate(params)
            .await
            .context("Script evaluation failed")?;
        Ok(())
    }

    async fn screenshot(
        &self,
        format: ImageFormat,
        quality: Option<u32>,
        full_page: bool,
    ) -> Result<Vec<u8>> {
        self.pace().await;
        let format = match format {
            ImageFormat::Png => CaptureScreenshotFormat::Png,
            ImageFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
        };
        let mut params = ScreenshotParams::builder()
            .format(format)
            .full_page(full_page);
        if let Some(quality) = quality {
            params = params.quality(quality as i64);
        }
        let bytes = self
            .page
            .screenshot(params.build())
            .await
            .context("Failed to capture screenshot")?;
        Ok(bytes)
    }

    async fn content(&self) -> Result<String> {
        self.pace().await;
        self.page
            .content()
            .await
            .context("Failed to serialize page HTML")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.context("Failed to close page")?;
        Ok(())
    }
}
