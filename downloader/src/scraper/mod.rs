/// Browser-automation fallback for channel catalogs.
///
/// Used only when the metadata queries return nothing. The scraper loads the
/// channel page, dismisses the consent wall, expands lazy content and scrolls
/// until no more release tiles load, then filters the anchors on the page.
/// Every DOM access goes through [`PageDriver`], and every lookup is bounded.
pub mod links;
pub mod webdriver;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use discog_shared::errors::ScrapeError;
use discog_shared::models::Catalog;
use discog_shared::naming::sanitize_channel_name;

pub use links::{channel_handle, channel_root_url, collect_release_links};
pub use webdriver::{WebDriverLauncher, WebDriverPage};

/// Consent button labels, tried in order.
pub const CONSENT_LABELS: &[&str] = &[
    "Accept all",
    "Reject all",
    "Alle akzeptieren",
    "Alle ablehnen",
    "Tout accepter",
    "Tout refuser",
    "Aceptar todo",
    "Rechazar todo",
    "Accetta tutto",
    "Alles accepteren",
    "Aceitar tudo",
    "Zaakceptuj wszystko",
    "Принять все",
];

/// Opaque reference to an element in the driven page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// DOM capabilities the scraper needs from a browser session.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError>;

    /// Consent button with the given label, waiting at most `wait`.
    async fn find_consent_button(
        &mut self,
        label: &str,
        wait: Duration,
    ) -> Result<Option<ElementHandle>, ScrapeError>;

    /// The "show more" control of the channel page, if present.
    async fn find_show_more_control(&mut self, wait: Duration) -> Result<Option<ElementHandle>, ScrapeError>;

    /// Text of the channel name heading.
    async fn channel_name_heading(&mut self, wait: Duration) -> Result<Option<String>, ScrapeError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), ScrapeError>;

    /// Click through script, bypassing overlays.
    async fn script_click(&mut self, element: &ElementHandle) -> Result<(), ScrapeError>;

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), ScrapeError>;

    async fn page_height(&mut self) -> Result<u64, ScrapeError>;

    async fn scroll_to_bottom(&mut self) -> Result<(), ScrapeError>;

    async fn scroll_by(&mut self, dy: i64) -> Result<(), ScrapeError>;

    /// Hrefs of anchors that look like playlist or watch links.
    async fn extract_candidate_links(&mut self) -> Result<Vec<String>, ScrapeError>;

    async fn close(&mut self) -> Result<(), ScrapeError>;
}

/// Starts browser sessions.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, ScrapeError>;
}

/// What a scrape produced. Empty on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeOutcome {
    pub links: Catalog,
    pub channel_name: Option<String>,
}

/// Channel scraping as seen by the resolver.
#[async_trait]
pub trait ChannelScraper: Send + Sync {
    async fn scrape(&self, channel_url: &str) -> ScrapeOutcome;
}

/// Waits and bounds for each scrape stage.
#[derive(Debug, Clone)]
pub struct ScrapeTiming {
    pub consent_wait: Duration,
    pub show_more_wait: Duration,
    pub heading_wait: Duration,
    pub scroll_settle: Duration,
    pub bounce_settle: Duration,
    pub final_settle: Duration,
    pub bounce_offset: i64,
    pub max_scroll_rounds: usize,
}

impl Default for ScrapeTiming {
    fn default() -> Self {
        Self {
            consent_wait: Duration::from_secs(2),
            show_more_wait: Duration::from_secs(5),
            heading_wait: Duration::from_secs(5),
            scroll_settle: Duration::from_secs(3),
            bounce_settle: Duration::from_secs(1),
            final_settle: Duration::from_secs(5),
            bounce_offset: 1000,
            max_scroll_rounds: 8,
        }
    }
}

impl ScrapeTiming {
    /// Same stages without any waiting.
    pub fn instant() -> Self {
        Self {
            consent_wait: Duration::ZERO,
            show_more_wait: Duration::ZERO,
            heading_wait: Duration::ZERO,
            scroll_settle: Duration::ZERO,
            bounce_settle: Duration::ZERO,
            final_settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStage {
    Launch,
    Load,
    ConsentDismissal,
    NameExtraction,
    Expansion,
    IncrementalScroll,
    LinkExtraction,
    Teardown,
}

impl fmt::Display for ScrapeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScrapeStage::Launch => "launch",
            ScrapeStage::Load => "load",
            ScrapeStage::ConsentDismissal => "consent dismissal",
            ScrapeStage::NameExtraction => "name extraction",
            ScrapeStage::Expansion => "expansion",
            ScrapeStage::IncrementalScroll => "incremental scroll",
            ScrapeStage::LinkExtraction => "link extraction",
            ScrapeStage::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

type StageResult<T> = Result<T, (ScrapeStage, ScrapeError)>;

/// Scrapes a channel page through a [`DriverFactory`].
pub struct CatalogScraper {
    factory: Arc<dyn DriverFactory>,
    timing: ScrapeTiming,
}

impl CatalogScraper {
    pub fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            factory,
            timing: ScrapeTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: ScrapeTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Run every stage against one fresh session. Never fails; the session is always closed.
    pub async fn scrape_channel(&self, channel_url: &str) -> ScrapeOutcome {
        let root = channel_root_url(channel_url);
        info!("Scraping channel page {}", root);

        let mut driver = match self.factory.launch().await {
            Ok(driver) => driver,
            Err(e) => {
                warn!("Scraper failed during {} for {}: {}", ScrapeStage::Launch, root, e);
                return ScrapeOutcome::default();
            }
        };

        let result = self.run_stages(driver.as_mut(), &root).await;

        if let Err(e) = driver.close().await {
            debug!("Scraper {} for {}: {}", ScrapeStage::Teardown, root, e);
        }

        match result {
            Ok(outcome) => {
                info!("Scraper found {} release links for {}", outcome.links.len(), root);
                outcome
            }
            Err((stage, e)) => {
                warn!("Scraper failed during {} for {}: {}", stage, root, e);
                ScrapeOutcome::default()
            }
        }
    }

    async fn run_stages(&self, driver: &mut dyn PageDriver, root: &str) -> StageResult<ScrapeOutcome> {
        driver
            .navigate(root)
            .await
            .map_err(|e| (ScrapeStage::Load, e))?;

        self.dismiss_consent(driver).await;
        let channel_name = self.extract_name(driver).await;
        self.expand(driver).await;
        if let Err(e) = self.scroll_all(driver).await {
            warn!("Scraper {} stopped early: {}", ScrapeStage::IncrementalScroll, e);
        }

        let hrefs = driver
            .extract_candidate_links()
            .await
            .map_err(|e| (ScrapeStage::LinkExtraction, e))?;
        debug!("Scraper saw {} candidate anchors", hrefs.len());

        Ok(ScrapeOutcome {
            links: collect_release_links(hrefs),
            channel_name,
        })
    }

    async fn dismiss_consent(&self, driver: &mut dyn PageDriver) {
        for label in CONSENT_LABELS {
            match driver.find_consent_button(label, self.timing.consent_wait).await {
                Ok(Some(button)) => {
                    if driver.click(&button).await.is_err() {
                        if let Err(e) = driver.script_click(&button).await {
                            debug!("Consent button '{}' could not be clicked: {}", label, e);
                            continue;
                        }
                    }
                    debug!("Dismissed consent with '{}'", label);
                    return;
                }
                Ok(None) => {}
                Err(e) => debug!("Consent lookup '{}' failed: {}", label, e),
            }
        }
        debug!("No consent wall found");
    }

    async fn extract_name(&self, driver: &mut dyn PageDriver) -> Option<String> {
        match driver.channel_name_heading(self.timing.heading_wait).await {
            Ok(Some(raw)) => {
                let name = sanitize_channel_name(&raw);
                (!name.is_empty()).then_some(name)
            }
            Ok(None) => {
                warn!("Scraper {}: no channel heading found", ScrapeStage::NameExtraction);
                None
            }
            Err(e) => {
                warn!("Scraper {} failed: {}", ScrapeStage::NameExtraction, e);
                None
            }
        }
    }

    async fn expand(&self, driver: &mut dyn PageDriver) {
        let control = match driver.find_show_more_control(self.timing.show_more_wait).await {
            Ok(Some(control)) => control,
            Ok(None) => return,
            Err(e) => {
                debug!("Scraper {}: {}", ScrapeStage::Expansion, e);
                return;
            }
        };

        if let Err(e) = driver.scroll_into_view(&control).await {
            debug!("Could not scroll 'show more' into view: {}", e);
        }
        match driver.click(&control).await {
            Ok(()) => {}
            Err(ScrapeError::ClickIntercepted) => {
                if let Err(e) = driver.script_click(&control).await {
                    warn!("Scraper {} failed: {}", ScrapeStage::Expansion, e);
                }
            }
            Err(e) => warn!("Scraper {} failed: {}", ScrapeStage::Expansion, e),
        }
    }

    async fn scroll_all(&self, driver: &mut dyn PageDriver) -> Result<(), ScrapeError> {
        let t = &self.timing;
        let mut last_height = driver.page_height().await?;

        for round in 1..=t.max_scroll_rounds {
            driver.scroll_to_bottom().await?;
            tokio::time::sleep(t.scroll_settle).await;
            let height = driver.page_height().await?;
            debug!("Scroll round {}: height {} -> {}", round, last_height, height);
            if height <= last_height {
                break;
            }
            last_height = height;
        }

        driver.scroll_by(-t.bounce_offset).await?;
        tokio::time::sleep(t.bounce_settle).await;
        driver.scroll_to_bottom().await?;
        tokio::time::sleep(t.bounce_settle).await;

        driver.scroll_to_bottom().await?;
        tokio::time::sleep(t.final_settle).await;
        Ok(())
    }
}

#[async_trait]
impl ChannelScraper for CatalogScraper {
    async fn scrape(&self, channel_url: &str) -> ScrapeOutcome {
        self.scrape_channel(channel_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct PageLog {
        navigated: Vec<String>,
        clicks: Vec<String>,
        script_clicks: Vec<String>,
        scrolls_to_bottom: usize,
        closed: bool,
    }

    #[derive(Clone)]
    struct FakePage {
        log: Arc<Mutex<PageLog>>,
        consent_label: Option<&'static str>,
        heading: Option<String>,
        show_more: bool,
        intercept_click: bool,
        heights: Vec<u64>,
        /// Height reads that succeed before `page_height` starts failing.
        height_reads_left: Option<usize>,
        links: Result<Vec<String>, ()>,
        fail_navigate: bool,
    }

    impl FakePage {
        fn new(links: &[&str]) -> Self {
            Self {
                log: Arc::new(Mutex::new(PageLog::default())),
                consent_label: None,
                heading: Some("Some Artist - Topic".into()),
                show_more: false,
                intercept_click: false,
                heights: vec![1000, 2000, 3000, 3000],
                height_reads_left: None,
                links: Ok(links.iter().map(|s| s.to_string()).collect()),
                fail_navigate: false,
            }
        }
    }

    #[async_trait]
    impl PageDriver for FakePage {
        async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError> {
            if self.fail_navigate {
                return Err(ScrapeError::Transport("connection refused".into()));
            }
            self.log.lock().unwrap().navigated.push(url.to_string());
            Ok(())
        }

        async fn find_consent_button(&mut self, label: &str, _wait: Duration) -> Result<Option<ElementHandle>, ScrapeError> {
            Ok((self.consent_label == Some(label)).then(|| ElementHandle(format!("consent:{}", label))))
        }

        async fn find_show_more_control(&mut self, _wait: Duration) -> Result<Option<ElementHandle>, ScrapeError> {
            Ok(self.show_more.then(|| ElementHandle("more".into())))
        }

        async fn channel_name_heading(&mut self, _wait: Duration) -> Result<Option<String>, ScrapeError> {
            match &self.heading {
                Some(h) => Ok(Some(h.clone())),
                None => Err(ScrapeError::NoSuchElement("heading".into())),
            }
        }

        async fn click(&mut self, element: &ElementHandle) -> Result<(), ScrapeError> {
            if self.intercept_click {
                return Err(ScrapeError::ClickIntercepted);
            }
            self.log.lock().unwrap().clicks.push(element.0.clone());
            Ok(())
        }

        async fn script_click(&mut self, element: &ElementHandle) -> Result<(), ScrapeError> {
            self.log.lock().unwrap().script_clicks.push(element.0.clone());
            Ok(())
        }

        async fn scroll_into_view(&mut self, _element: &ElementHandle) -> Result<(), ScrapeError> {
            Ok(())
        }

        async fn page_height(&mut self) -> Result<u64, ScrapeError> {
            match self.height_reads_left.as_mut() {
                Some(0) => return Err(ScrapeError::Transport("script timeout".into())),
                Some(left) => *left -= 1,
                None => {}
            }
            if self.heights.len() > 1 {
                Ok(self.heights.remove(0))
            } else {
                Ok(self.heights.first().copied().unwrap_or(0))
            }
        }

        async fn scroll_to_bottom(&mut self) -> Result<(), ScrapeError> {
            self.log.lock().unwrap().scrolls_to_bottom += 1;
            Ok(())
        }

        async fn scroll_by(&mut self, _dy: i64) -> Result<(), ScrapeError> {
            Ok(())
        }

        async fn extract_candidate_links(&mut self) -> Result<Vec<String>, ScrapeError> {
            self.links
                .clone()
                .map_err(|_| ScrapeError::SessionClosed)
        }

        async fn close(&mut self) -> Result<(), ScrapeError> {
            self.log.lock().unwrap().closed = true;
            Ok(())
        }
    }

    struct FakeFactory {
        page: Option<FakePage>,
    }

    #[async_trait]
    impl DriverFactory for FakeFactory {
        async fn launch(&self) -> Result<Box<dyn PageDriver>, ScrapeError> {
            match &self.page {
                Some(page) => Ok(Box::new(page.clone())),
                None => Err(ScrapeError::Transport("no driver".into())),
            }
        }
    }

    fn scraper(page: Option<FakePage>) -> CatalogScraper {
        CatalogScraper::new(Arc::new(FakeFactory { page })).with_timing(ScrapeTiming::instant())
    }

    #[tokio::test]
    async fn test_scrape_collects_links_and_name() {
        let page = FakePage::new(&[
            "/playlist?list=OLAK5uy_aaaaaaaaaaa",
            "/playlist?list=OLAK5uy_bbbbbbbbbbb",
            "/playlist?list=OLAK5uy_ccccccccccc",
            "/playlist?list=OLAK5uy_aaaaaaaaaaa",
        ]);
        let log = page.log.clone();

        let outcome = scraper(Some(page))
            .scrape("https://www.youtube.com/@artist/releases")
            .await;

        assert_eq!(outcome.links.len(), 3);
        assert_eq!(outcome.channel_name.as_deref(), Some("Some Artist"));
        let log = log.lock().unwrap();
        assert_eq!(log.navigated, vec!["https://www.youtube.com/@artist"]);
        assert!(log.closed);
        // 2 growth rounds, 1 flat round, bounce down, final
        assert_eq!(log.scrolls_to_bottom, 5);
    }

    #[tokio::test]
    async fn test_consent_and_intercepted_show_more() {
        let mut page = FakePage::new(&[]);
        page.consent_label = Some("Tout accepter");
        page.show_more = true;
        page.intercept_click = true;
        let log = page.log.clone();

        scraper(Some(page)).scrape("https://www.youtube.com/@artist").await;

        let log = log.lock().unwrap();
        assert_eq!(log.script_clicks, vec!["consent:Tout accepter", "more"]);
    }

    #[tokio::test]
    async fn test_missing_heading_is_tolerated() {
        let mut page = FakePage::new(&["/watch?v=AAAAAAAAAAA"]);
        page.heading = None;

        let outcome = scraper(Some(page)).scrape("https://www.youtube.com/@artist").await;

        assert_eq!(outcome.channel_name, None);
        assert_eq!(outcome.links.urls(), vec!["https://www.youtube.com/watch?v=AAAAAAAAAAA"]);
    }

    #[tokio::test]
    async fn test_failures_yield_empty_outcome_and_close_session() {
        let mut page = FakePage::new(&["/playlist?list=OLAK5uy_aaaaaaaaaaa"]);
        page.fail_navigate = true;
        let log = page.log.clone();
        let outcome = scraper(Some(page)).scrape("https://www.youtube.com/@artist").await;
        assert_eq!(outcome, ScrapeOutcome::default());
        assert!(log.lock().unwrap().closed);

        let mut page = FakePage::new(&[]);
        page.links = Err(());
        let log = page.log.clone();
        let outcome = scraper(Some(page)).scrape("https://www.youtube.com/@artist").await;
        assert_eq!(outcome, ScrapeOutcome::default());
        assert!(log.lock().unwrap().closed);

        let outcome = scraper(None).scrape("https://www.youtube.com/@artist").await;
        assert_eq!(outcome, ScrapeOutcome::default());
    }

    #[tokio::test]
    async fn test_scroll_stops_after_max_rounds_on_endless_page() {
        let mut page = FakePage::new(&["/playlist?list=OLAK5uy_aaaaaaaaaaa"]);
        page.heights = (1..=50).map(|n| n * 1000).collect();
        let log = page.log.clone();

        let outcome = scraper(Some(page)).scrape("https://www.youtube.com/@artist").await;

        assert_eq!(outcome.links.len(), 1);
        // every round grows, so the loop ends on the round limit, then bounce and final
        assert_eq!(ScrapeTiming::default().max_scroll_rounds, 8);
        assert_eq!(log.lock().unwrap().scrolls_to_bottom, 8 + 2);
    }

    #[tokio::test]
    async fn test_height_error_mid_scroll_still_extracts_links() {
        let mut page = FakePage::new(&[
            "/playlist?list=OLAK5uy_aaaaaaaaaaa",
            "/playlist?list=OLAK5uy_bbbbbbbbbbb",
        ]);
        page.height_reads_left = Some(2);
        let log = page.log.clone();

        let outcome = scraper(Some(page)).scrape("https://www.youtube.com/@artist").await;

        assert_eq!(outcome.links.len(), 2);
        assert_eq!(outcome.channel_name.as_deref(), Some("Some Artist"));
        let log = log.lock().unwrap();
        // initial read and round 1 succeed, round 2 fails after its scroll
        assert_eq!(log.scrolls_to_bottom, 2);
        assert!(log.closed);
    }
}
