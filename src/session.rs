//! Exclusive portal session: acquire (launch + login), act, release.

use crate::config::Config;
use crate::driver::{CdpDriver, PageDriver};
use crate::engine::{ActionKind, ActionOutcome, Engine};
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// One logged-in portal session. Owns the browser exclusively for its
/// lifetime; all page interaction within it is strictly sequential.
///
/// The portal allows one logical session per credential set, so callers must
/// serialize invocations that share credentials — one outstanding action at
/// a time. The session itself does not implement that lock.
pub struct Session {
    driver: Box<dyn PageDriver>,
    config: Config,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Launch a browser, navigate to the portal and log in.
    ///
    /// The browser is released before returning on any acquisition failure.
    pub async fn open(config: Config) -> Result<Self> {
        let driver = CdpDriver::launch(&config.browser).await?;
        Self::open_with_driver(Box::new(driver), config).await
    }

    /// Log in over an already-launched driver.
    ///
    /// On login failure the configured failure screenshot is captured while
    /// the page still shows what went wrong, then the driver is released.
    pub async fn open_with_driver(driver: Box<dyn PageDriver>, config: Config) -> Result<Self> {
        let session = Self { driver, config };
        match session.login().await {
            Ok(()) => Ok(session),
            Err(e) => {
                warn!("login failed: {e}");
                let screenshot = session
                    .config
                    .on_failure
                    .as_ref()
                    .and_then(|f| f.screenshot.clone());
                if let Some(path) = screenshot {
                    if let Err(shot_err) = session.capture_failure(&path).await {
                        warn!("failure screenshot also failed: {shot_err}");
                    }
                }
                if let Err(close_err) = session.close().await {
                    warn!("browser close after failed login also failed: {close_err}");
                }
                Err(e)
            }
        }
    }

    /// Build a session over an already-logged-in page, skipping login.
    /// Useful for embedding the engine behind a different driver.
    pub fn with_driver(driver: Box<dyn PageDriver>, config: Config) -> Self {
        Self { driver, config }
    }

    async fn login(&self) -> Result<()> {
        info!("opening portal: {}", self.config.portal.url);
        self.driver.navigate(&self.config.portal.url).await?;

        debug!("submitting credentials");
        self.driver
            .fill(
                &self.config.login.username_field,
                &self.config.portal.username,
            )
            .await?;
        self.driver
            .fill(
                &self.config.login.password_field,
                &self.config.portal.password,
            )
            .await?;
        self.driver.click(&self.config.login.submit).await?;

        let timeout = self.config.timing.dashboard_timeout_ms;
        if let Err(wait_err) = self
            .driver
            .wait_for(&self.config.widget.container, timeout)
            .await
        {
            // Distinguish "stuck on the login form" from "past login but the
            // widget never appeared".
            let probe = format!(
                "/* login-probe */ !!document.querySelector({})",
                serde_json::to_string(&self.config.login.password_field).unwrap()
            );
            let stuck = self
                .driver
                .evaluate(&probe)
                .await
                .map(|v| v.as_bool().unwrap_or(false))
                .unwrap_or(false);
            return Err(if stuck {
                Error::Credentials("login did not progress past the login form".into())
            } else {
                Error::Widget(format!(
                    "not present within {timeout}ms after login: {wait_err}"
                ))
            });
        }

        // The widget container exists before its controls finish rendering.
        self.driver.settle(self.config.timing.settle_ms).await;
        info!("dashboard ready");
        Ok(())
    }

    /// Run one attendance action. Action-level failures come back inside the
    /// outcome; only infrastructure failures were possible earlier, in
    /// [`Session::open`].
    pub async fn perform(&self, kind: ActionKind) -> ActionOutcome {
        Engine::new(self.driver.as_ref(), &self.config).perform(kind).await
    }

    /// Capture a diagnostic screenshot, substituting `{timestamp}` in the
    /// path template. Returns the written path.
    pub async fn capture_failure(&self, path_template: &str) -> Result<String> {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let path = path_template.replace("{timestamp}", &timestamp);
        let data = self.driver.screenshot().await?;
        std::fs::write(&path, data)?;
        info!("saved failure screenshot: {path}");
        Ok(path)
    }

    /// Release the browser. Required on every exit path.
    pub async fn close(self) -> Result<()> {
        self.driver.close().await
    }
}
