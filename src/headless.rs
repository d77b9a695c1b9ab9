//! Headless-browser rendering of script-heavy pages.
//!
//! Pages are rendered by a Chromium binary run as a child process with
//! `--dump-dom`. A [`RenderPool`] caps how many render at once; every stage
//! has a time budget and running out of it is an error, never a retry.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::error::{Result, ViewerError};

/// Time allowed for each stage of a headless render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderBudget {
    /// Waiting for a browser slot and starting the browser.
    pub launch: Duration,
    /// Loading the document.
    pub navigation: Duration,
    /// Letting scripts settle after load.
    pub load: Duration,
}

impl Default for RenderBudget {
    fn default() -> Self {
        RenderBudget {
            launch: Duration::from_secs(30),
            navigation: Duration::from_secs(30),
            load: Duration::from_secs(10),
        }
    }
}

/// Something that can turn a URL into post-JavaScript HTML.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, budget: &RenderBudget) -> Result<String>;
}

/// Drives a Chromium-compatible binary in headless mode.
pub struct ChromeRenderer {
    binary: PathBuf,
}

impl ChromeRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        ChromeRenderer {
            binary: binary.into(),
        }
    }

    fn command(&self, url: &str, budget: &RenderBudget, profile: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-first-run")
            .arg("--mute-audio")
            .arg("--hide-scrollbars")
            .arg(format!("--user-data-dir={}", profile.display()))
            .arg(format!("--timeout={}", budget.navigation.as_millis()))
            .arg(format!("--virtual-time-budget={}", budget.load.as_millis()))
            .arg("--dump-dom")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str, budget: &RenderBudget) -> Result<String> {
        let profile = tempfile::tempdir()?;

        let child = self
            .command(url, budget, profile.path())
            .spawn()
            .map_err(|e| {
                ViewerError::Render(format!(
                    "could not start {}: {e}",
                    self.binary.display()
                ))
            })?;

        // Hard stop for a browser that never settles on its own. The pool's
        // outer limit also covers the load budget.
        let output = timeout(budget.navigation, child.wait_with_output())
            .await
            .map_err(|_| ViewerError::RenderTimeout {
                stage: "navigation",
                after: budget.navigation,
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ViewerError::Render(format!(
                "browser exited with {}: {}",
                output.status,
                stderr.lines().last().unwrap_or_default()
            )));
        }

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if html.trim().is_empty() {
            return Err(ViewerError::Render("browser returned an empty page".into()));
        }
        Ok(html)
    }
}

/// Bounded set of concurrent headless renders.
#[derive(Clone)]
pub struct RenderPool {
    renderer: Arc<dyn PageRenderer>,
    slots: Arc<Semaphore>,
    budget: RenderBudget,
}

impl RenderPool {
    pub fn new(renderer: Arc<dyn PageRenderer>, max_concurrent: usize, budget: RenderBudget) -> Self {
        RenderPool {
            renderer,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            budget,
        }
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Render `url`, waiting at most the launch budget for a free slot and at
    /// most the navigation plus load budget for the page.
    ///
    /// # Errors
    /// * `RenderTimeout` when a stage runs out of time
    /// * `Render` when the browser fails
    pub async fn render(&self, url: &str) -> Result<String> {
        let budget = self.budget;
        let _permit = timeout(budget.launch, self.slots.acquire())
            .await
            .map_err(|_| ViewerError::RenderTimeout {
                stage: "launch",
                after: budget.launch,
            })?
            .map_err(|_| ViewerError::Render("render pool is closed".into()))?;

        log::debug!("rendering {url} ({} slots left)", self.available());
        let limit = budget.navigation + budget.load;
        match timeout(limit, self.renderer.render(url, &budget)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("headless render of {url} timed out after {}s", limit.as_secs());
                Err(ViewerError::RenderTimeout {
                    stage: "load",
                    after: limit,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy(Duration);

    #[async_trait]
    impl PageRenderer for Sleepy {
        async fn render(&self, url: &str, _budget: &RenderBudget) -> Result<String> {
            tokio::time::sleep(self.0).await;
            Ok(format!("<html><body>{url}</body></html>"))
        }
    }

    fn budget(ms: u64) -> RenderBudget {
        RenderBudget {
            launch: Duration::from_millis(ms),
            navigation: Duration::from_millis(ms),
            load: Duration::from_millis(ms),
        }
    }

    #[tokio::test]
    async fn completes_within_budget() {
        let pool = RenderPool::new(Arc::new(Sleepy(Duration::ZERO)), 2, budget(500));
        let html = pool.render("https://example.com/").await.unwrap();
        assert!(html.contains("https://example.com/"));
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn slow_page_times_out() {
        let pool = RenderPool::new(Arc::new(Sleepy(Duration::from_secs(5))), 1, budget(20));
        match pool.render("https://slow.example/").await {
            Err(ViewerError::RenderTimeout { stage, .. }) => assert_eq!(stage, "load"),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn full_pool_times_out_at_launch() {
        let pool = RenderPool::new(Arc::new(Sleepy(Duration::from_millis(300))), 1, budget(200));
        let busy = pool.clone();
        let first = tokio::spawn(async move { busy.render("https://a.example/").await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        match pool.render("https://b.example/").await {
            Err(ViewerError::RenderTimeout { stage, .. }) => assert_eq!(stage, "launch"),
            other => panic!("expected launch timeout, got {other:?}"),
        }
        assert!(first.await.unwrap().is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_browser_times_out_during_navigation() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("hung-browser");
        std::fs::write(&binary, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let budget = RenderBudget {
            launch: Duration::from_secs(1),
            navigation: Duration::from_millis(200),
            load: Duration::from_secs(2),
        };
        let pool = RenderPool::new(Arc::new(ChromeRenderer::new(&binary)), 1, budget);
        match pool.render("https://hung.example/").await {
            Err(ViewerError::RenderTimeout { stage, after }) => {
                assert_eq!(stage, "navigation");
                assert_eq!(after, Duration::from_millis(200));
            }
            other => panic!("expected navigation timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_render_error() {
        let renderer = ChromeRenderer::new("/nonexistent/chromium-binary");
        assert!(matches!(
            renderer.render("https://example.com/", &budget(1000)).await,
            Err(ViewerError::Render(_))
        ));
    }
}
