/// W3C WebDriver backend (chromedriver) for [`PageDriver`].
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Map, Value};
use tracing::debug;

use discog_shared::errors::ScrapeError;

use super::{DriverFactory, ElementHandle, PageDriver};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const SHOW_MORE_SELECTOR: &str = "tp-yt-paper-button#expand, \
truncated-text button, yt-description-preview-view-model button";

const HEADING_SELECTOR: &str = "yt-dynamic-text-view-model h1, \
ytd-channel-name#channel-name yt-formatted-string, #channel-header #text";

const LINKS_SCRIPT: &str = "return Array.from(document.querySelectorAll('a[href]'))\
.map(a => a.getAttribute('href'))\
.filter(h => h && (h.includes('playlist?') || h.includes('watch?')));";

// ====== TRANSPORT ======

/// Send a WebDriver command and unwrap its `value`.
async fn send(request: RequestBuilder) -> Result<Value, ScrapeError> {
    let response = request
        .send()
        .await
        .map_err(|e| ScrapeError::Transport(e.to_string()))?;
    let status = response.status();
    let mut body: Value = response
        .json()
        .await
        .map_err(|e| ScrapeError::Transport(e.to_string()))?;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        Ok(value)
    } else {
        Err(ScrapeError::from_driver_value(&value))
    }
}

fn element_id(value: &Value) -> Option<ElementHandle> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementHandle(id.to_string()))
}

fn element_ref(element: &ElementHandle) -> Value {
    let mut map = Map::new();
    map.insert(ELEMENT_KEY.to_string(), Value::String(element.0.clone()));
    Value::Object(map)
}

// ====== LAUNCHER ======

/// Starts headless Chrome sessions through a chromedriver endpoint.
pub struct WebDriverLauncher {
    client: Client,
    endpoint: String,
    user_agent: String,
}

impl WebDriverLauncher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// New-session payload: headless, no GPU, spoofed agent, no automation markers.
    pub fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": [
                            "--headless=new",
                            "--disable-gpu",
                            "--disable-dev-shm-usage",
                            "--window-size=1920,1080",
                            format!("--user-agent={}", self.user_agent),
                            "--disable-blink-features=AutomationControlled",
                        ],
                        "excludeSwitches": ["enable-automation"],
                        "useAutomationExtension": false,
                    }
                }
            }
        })
    }
}

#[async_trait]
impl DriverFactory for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, ScrapeError> {
        let value = send(
            self.client
                .post(format!("{}/session", self.endpoint))
                .json(&self.capabilities()),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ScrapeError::Protocol {
                code: "session not created".to_string(),
                message: "response carried no sessionId".to_string(),
            })?
            .to_string();
        debug!("WebDriver session {} started", session_id);

        Ok(Box::new(WebDriverPage {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            session_id,
            closed: false,
        }))
    }
}

// ====== PAGE ======

/// One live WebDriver session.
pub struct WebDriverPage {
    client: Client,
    base: String,
    session_id: String,
    closed: bool,
}

impl WebDriverPage {
    async fn post(&self, path: &str, body: Value) -> Result<Value, ScrapeError> {
        if self.closed {
            return Err(ScrapeError::SessionClosed);
        }
        send(self.client.post(format!("{}{}", self.base, path)).json(&body)).await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, ScrapeError> {
        self.post("/execute/sync", json!({ "script": script, "args": args })).await
    }

    async fn find_once(&self, using: &str, selector: &str) -> Result<Option<ElementHandle>, ScrapeError> {
        match self.post("/element", json!({ "using": using, "value": selector })).await {
            Ok(value) => Ok(element_id(&value)),
            Err(e) if e.is_missing() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Poll for an element until `wait` has elapsed. Always tries at least once.
    async fn wait_for(
        &self,
        using: &str,
        selector: &str,
        wait: Duration,
    ) -> Result<Option<ElementHandle>, ScrapeError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(element) = self.find_once(using, selector).await? {
                return Ok(Some(element));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageDriver for WebDriverPage {
    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError> {
        self.post("/url", json!({ "url": url })).await.map(|_| ())
    }

    async fn find_consent_button(
        &mut self,
        label: &str,
        wait: Duration,
    ) -> Result<Option<ElementHandle>, ScrapeError> {
        let xpath = format!(
            "//button[normalize-space()='{0}' or normalize-space(@aria-label)='{0}' or .//span[normalize-space()='{0}']]",
            label
        );
        self.wait_for("xpath", &xpath, wait).await
    }

    async fn find_show_more_control(&mut self, wait: Duration) -> Result<Option<ElementHandle>, ScrapeError> {
        self.wait_for("css selector", SHOW_MORE_SELECTOR, wait).await
    }

    async fn channel_name_heading(&mut self, wait: Duration) -> Result<Option<String>, ScrapeError> {
        let Some(heading) = self.wait_for("css selector", HEADING_SELECTOR, wait).await? else {
            return Ok(None);
        };
        if self.closed {
            return Err(ScrapeError::SessionClosed);
        }
        let text = send(
            self.client
                .get(format!("{}/element/{}/text", self.base, heading.0)),
        )
        .await?;
        Ok(text.as_str().map(str::trim).filter(|t| !t.is_empty()).map(String::from))
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), ScrapeError> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .await
            .map(|_| ())
    }

    async fn script_click(&mut self, element: &ElementHandle) -> Result<(), ScrapeError> {
        self.execute("arguments[0].click();", vec![element_ref(element)])
            .await
            .map(|_| ())
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), ScrapeError> {
        self.execute("arguments[0].scrollIntoView({block: 'center'});", vec![element_ref(element)])
            .await
            .map(|_| ())
    }

    async fn page_height(&mut self) -> Result<u64, ScrapeError> {
        let value = self
            .execute("return document.documentElement.scrollHeight;", Vec::new())
            .await?;
        value
            .as_u64()
            .or_else(|| value.as_f64().map(|h| h.max(0.0) as u64))
            .ok_or_else(|| ScrapeError::Protocol {
                code: "javascript error".to_string(),
                message: format!("unexpected page height {}", value),
            })
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), ScrapeError> {
        self.execute("window.scrollTo(0, document.documentElement.scrollHeight);", Vec::new())
            .await
            .map(|_| ())
    }

    async fn scroll_by(&mut self, dy: i64) -> Result<(), ScrapeError> {
        self.execute("window.scrollBy(0, arguments[0]);", vec![json!(dy)])
            .await
            .map(|_| ())
    }

    async fn extract_candidate_links(&mut self) -> Result<Vec<String>, ScrapeError> {
        let value = self.execute(LINKS_SCRIPT, Vec::new()).await?;
        Ok(value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        send(self.client.delete(self.base.as_str())).await?;
        debug!("WebDriver session {} closed", self.session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        let launcher = WebDriverLauncher::new("http://localhost:9515/").with_user_agent("UA/1.0");
        let caps = launcher.capabilities();
        let options = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"];

        let args: Vec<&str> = options["args"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(args.contains(&"--headless=new"));
        assert!(args.contains(&"--disable-gpu"));
        assert!(args.contains(&"--user-agent=UA/1.0"));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled"));
        assert_eq!(options["excludeSwitches"], json!(["enable-automation"]));
        assert_eq!(options["useAutomationExtension"], json!(false));
        assert_eq!(launcher.endpoint, "http://localhost:9515");
    }

    #[test]
    fn test_element_references() {
        let value = element_ref(&ElementHandle("abc-123".into()));
        assert_eq!(value[ELEMENT_KEY], json!("abc-123"));
        assert_eq!(element_id(&value), Some(ElementHandle("abc-123".into())));
        assert_eq!(element_id(&json!({})), None);
    }

    #[tokio::test]
    async fn test_unreachable_driver_is_transport_error() {
        let launcher = WebDriverLauncher::new("http://127.0.0.1:9");
        match launcher.launch().await {
            Err(ScrapeError::Transport(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("session should not start"),
        }
    }
}
