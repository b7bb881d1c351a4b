use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Settings;
use crate::detector::FeedSurface;
use crate::error::HarvestError;

/// `base` + query with spaces turned into `+`. Nothing else is escaped.
pub fn search_url(base: &str, query: &str) -> String {
    format!("{}{}", base, query.replace(' ', "+"))
}

/// A launched Chromium plus the task pumping its CDP connection.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(settings: &Settings) -> std::result::Result<Self, HarvestError> {
        let mut builder = BrowserConfig::builder().arg(format!("--lang={}", settings.lang));
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(HarvestError::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });
        debug!(headless = settings.headless, "Browser launched");

        Ok(BrowserSession { browser, handler })
    }

    pub async fn open(&self, url: &str) -> Result<Page> {
        info!(url, "Opening search page");
        let page = self
            .browser
            .new_page(url)
            .await
            .with_context(|| format!("Failed to open {}", url))?;
        page.wait_for_navigation()
            .await
            .with_context(|| format!("Navigation to {} did not finish", url))?;
        Ok(page)
    }

    pub async fn close(mut self) -> std::result::Result<(), HarvestError> {
        self.browser.close().await?;
        self.browser
            .wait()
            .await
            .map_err(|e| HarvestError::Browser(e.to_string()))?;
        self.handler.abort();
        Ok(())
    }
}

/// The feed container of a live page, read and scrolled through in-page evaluation.
pub struct PageFeed<'a> {
    page: &'a Page,
    selector_js: String,
}

impl<'a> PageFeed<'a> {
    pub fn new(page: &'a Page, selector: &str) -> Result<Self> {
        Ok(PageFeed {
            page,
            selector_js: serde_json::to_string(selector)?,
        })
    }

    pub async fn snapshot(&self) -> Result<String> {
        self.page
            .content()
            .await
            .context("Failed to read page content")
    }
}

#[async_trait]
impl<'a> FeedSurface for PageFeed<'a> {
    async fn extent(&mut self) -> Result<Option<u64>> {
        let js = format!(
            "document.querySelector({})?.scrollHeight ?? -1",
            self.selector_js
        );
        let height: f64 = self
            .page
            .evaluate(js)
            .await
            .context("Failed to read feed extent")?
            .into_value()?;
        Ok((height >= 0.0).then_some(height as u64))
    }

    async fn scroll_by(&mut self, distance: u64) -> Result<()> {
        let js = format!(
            "document.querySelector({})?.scrollBy(0, {}) ?? true",
            self.selector_js, distance
        );
        self.page
            .evaluate(js)
            .await
            .context("Failed to scroll feed")?;
        Ok(())
    }
}
