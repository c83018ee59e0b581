//! eoka-backed implementation of [`PageDriver`].

use super::{PageDriver, Rect};
use crate::config::BrowserConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use eoka::{Browser, Page, StealthConfig};
use tracing::debug;

/// Drives a real Chrome session over CDP.
pub struct CdpDriver {
    browser: Browser,
    page: Page,
}

impl CdpDriver {
    /// Launch a browser from config.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let stealth = StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
            viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        Ok(Self { browser, page })
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| Error::Navigation(format!("{url}: {e}")))?;
        // The portal is a SPA; traffic may never go fully idle, so this is
        // best-effort with its own bound.
        let _ = self.page.wait_for_network_idle(500, 10_000).await;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.page.fill(selector, value).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page.click(selector).await?;
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> Result<serde_json::Value> {
        let value: serde_json::Value = self.page.evaluate(js).await?;
        Ok(value)
    }

    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        self.page
            .wait_for(selector, timeout_ms)
            .await
            .map(|_| ())
            .map_err(|e| Error::Timeout(format!("waiting for '{selector}': {e}")))
    }

    async fn settle(&self, ms: u64) {
        self.page.wait(ms).await;
    }

    async fn bounding_box(&self, selector: &str) -> Result<Option<Rect>> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({});
                if (!el) return null;
                const rect = el.getBoundingClientRect();
                return {{ x: rect.x, y: rect.y, width: rect.width, height: rect.height }};
            }})()"#,
            serde_json::to_string(selector).unwrap()
        );
        let value = self.evaluate(&js).await?;
        if value.is_null() {
            return Ok(None);
        }
        let rect: Rect = serde_json::from_value(value)
            .map_err(|e| Error::Driver(format!("bounding box parse error: {e}")))?;
        Ok(Some(rect))
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        // Move the real cursor first so hover styling fires, then click
        // whatever is under the point.
        self.page
            .session()
            .dispatch_mouse_event(eoka::cdp::MouseEventType::MouseMoved, x, y, None, None)
            .await?;
        self.page.wait(100).await;

        let js = format!(
            r#"(() => {{
                const el = document.elementFromPoint({x}, {y});
                if (!el) return false;
                const opts = {{ bubbles: true, cancelable: true, clientX: {x}, clientY: {y} }};
                el.dispatchEvent(new MouseEvent('mousedown', opts));
                el.dispatchEvent(new MouseEvent('mouseup', opts));
                el.dispatchEvent(new MouseEvent('click', opts));
                return true;
            }})()"#
        );
        let hit = self.evaluate(&js).await?;
        if hit.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(Error::Driver(format!("no element at ({x:.0}, {y:.0})")))
        }
    }

    async fn dispatch_key(&self, selector: &str, key: &str) -> Result<()> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                for (const type of ['keydown', 'keypress', 'keyup']) {{
                    el.dispatchEvent(new KeyboardEvent(type, {{ key: {key}, bubbles: true }}));
                }}
                return true;
            }})()"#,
            sel = serde_json::to_string(selector).unwrap(),
            key = serde_json::to_string(key).unwrap()
        );
        let hit = self.evaluate(&js).await?;
        if hit.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(Error::Driver(format!("cannot focus '{selector}'")))
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}
