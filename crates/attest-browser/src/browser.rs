//! Browser lifecycle management using Chrome DevTools Protocol

use async_trait::async_trait;
use attest_core::config::BrowserWindowConfig;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

use crate::error::{AttestError, Result};
use crate::page::PageControl;

const READY_POLL: Duration = Duration::from_millis(100);

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Element lookup timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self::from(&BrowserWindowConfig::default())
    }
}

impl From<&BrowserWindowConfig> for BrowserConfig {
    fn from(window: &BrowserWindowConfig) -> Self {
        Self {
            headless: window.headless,
            window_width: window.window_width,
            window_height: window.window_height,
            user_agent: None,
            timeout_seconds: 30,
        }
    }
}

/// Active browser session with Chrome DevTools Protocol
///
/// One session backs one verification run; every step shares its tab.
pub struct BrowserSession {
    /// Underlying browser instance (kept alive for tab lifetime)
    #[allow(dead_code)]
    browser: Browser,
    tab: Arc<Tab>,
    config: BrowserConfig,
}

impl BrowserSession {
    /// Launch a new browser instance with default window settings
    pub async fn launch() -> Result<Self> {
        Self::launch_with_config(BrowserConfig::default()).await
    }

    /// Launch browser with custom configuration
    pub async fn launch_with_config(config: BrowserConfig) -> Result<Self> {
        info!(
            "Launching browser (headless: {}, size: {}x{})",
            config.headless, config.window_width, config.window_height
        );

        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .idle_browser_timeout(Duration::from_secs(config.timeout_seconds.max(60) * 10))
            .build()
            .map_err(|e| AttestError::Browser(format!("Failed to launch browser: {}", e)))?;

        let user_agent_arg: Option<String> =
            config.user_agent.as_ref().map(|ua| format!("--user-agent={}", ua));
        if let Some(ref ua_arg) = user_agent_arg {
            launch_options.args.push(OsStr::new(ua_arg));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AttestError::Browser(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| AttestError::Browser(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(config.timeout_seconds));

        info!("Browser launched successfully");

        Ok(Self {
            browser,
            tab,
            config,
        })
    }

    /// Connect to an existing browser instance
    ///
    /// # Arguments
    /// * `port` - Chrome DevTools Protocol port (typically 9222)
    pub async fn connect(port: u16) -> Result<Self> {
        info!("Connecting to existing browser on port {}", port);

        let browser = Browser::connect(format!("http://127.0.0.1:{}", port))
            .map_err(|e| AttestError::Browser(format!("Failed to connect to browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| AttestError::Browser(format!("Failed to create tab: {}", e)))?;

        info!("Connected to browser successfully");

        Ok(Self {
            browser,
            tab,
            config: BrowserConfig::default(),
        })
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Close the browser session
    pub async fn close(self) -> Result<()> {
        info!("Closing browser session");
        Ok(())
    }
}

#[async_trait]
impl PageControl for BrowserSession {
    #[instrument(skip(self))]
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);

        self.tab
            .navigate_to(url)
            .map_err(|e| AttestError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| AttestError::Timeout(format!("Navigation timeout for {}: {}", url, e)))?;

        info!("Navigated to {}", url);
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        debug!("Reloading page");

        self.tab
            .reload(false, None)
            .map_err(|e| AttestError::Browser(format!("Failed to reload: {}", e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| AttestError::Timeout(format!("Reload timeout: {}", e)))?;
        Ok(())
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            let state = self.evaluate("document.readyState").await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                debug!("Page not idle after {:?} (readyState: {})", timeout, state);
                return Ok(());
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        debug!("Evaluating JavaScript ({} chars)", script.len());

        let result = self
            .tab
            .evaluate(script, true)
            .map_err(|e| AttestError::Browser(format!("JavaScript evaluation failed: {}", e)))?;

        Ok(result.value.unwrap_or(Value::Null))
    }

    async fn current_url(&self) -> Result<String> {
        let result = self.evaluate("window.location.href").await?;
        Ok(result.as_str().unwrap_or("").to_string())
    }

    async fn title(&self) -> Result<String> {
        let result = self.evaluate("document.title").await?;
        Ok(result.as_str().unwrap_or("").to_string())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        debug!("Pressing key {}", key);
        self.tab
            .press_key(key)
            .map_err(|e| AttestError::Browser(format!("Failed to press {}: {}", key, e)))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        debug!("Clicking {}", selector);
        let element = self
            .tab
            .find_element(selector)
            .map_err(|_| AttestError::ElementNotFound(selector.to_string()))?;
        element
            .click()
            .map_err(|e| AttestError::Browser(format!("Failed to click {}: {}", selector, e)))?;
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        debug!("BrowserSession dropped, browser will be cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert_eq!(config.window_width, 1440);
        assert_eq!(config.window_height, 900);
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_config_from_window() {
        let window = BrowserWindowConfig {
            headless: false,
            window_width: 1024,
            window_height: 768,
        };
        let config = BrowserConfig::from(&window);

        assert!(!config.headless);
        assert_eq!(config.window_width, 1024);
        assert!(config.user_agent.is_none());
    }
}
