//! Browser control via Chrome DevTools Protocol (CDP).
//!
//! One [`CdpBrowser`] is one task's browser session: it connects to a running
//! Chrome on the configured debugging port (or launches one), opens its own
//! tab, and closes that tab on [`release`](BrowserControl::release).
//!
//! ```text
//!   ToolInvoker
//!       │
//!       ▼
//!   CdpBrowser     ← BrowserControl impl, lazily opens a Session
//!       │
//!       ├── Session   ← tab id + optional launched process
//!       │
//!       └── CdpClient ← /json HTTP endpoints + one WebSocket per command
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use trawl_config::schema::BrowserConfig;
use trawl_core::{BrowserControl, InteractionKind, ToolFault};

use crate::schema::{WaitCondition, parse_wait_condition};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ─── CDP Client ──────────────────────────────────────────────────

/// Low-level CDP client: `/json` HTTP endpoints plus JSON-RPC over the
/// target's WebSocket debugger URL.
struct CdpClient {
    base_url: String,
    http: reqwest::Client,
    next_id: AtomicI64,
    command_timeout: Duration,
}

impl CdpClient {
    fn new(port: u16) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            http: reqwest::Client::new(),
            next_id: AtomicI64::new(1),
            command_timeout: Duration::from_secs(30),
        }
    }

    async fn list_targets(&self) -> Result<Vec<Value>, ToolFault> {
        let url = format!("{}/json/list", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolFault::protocol(format!("CDP list targets failed: {e}")))?
            .json()
            .await
            .map_err(|e| ToolFault::protocol(format!("CDP parse targets failed: {e}")))
    }

    /// Open a new page target and return its id.
    async fn new_target(&self) -> Result<String, ToolFault> {
        let url = format!("{}/json/new?about:blank", self.base_url);
        let resp: Value = self
            .http
            .put(&url)
            .send()
            .await
            .map_err(|e| ToolFault::protocol(format!("CDP new target failed: {e}")))?
            .json()
            .await
            .map_err(|e| ToolFault::protocol(format!("CDP parse new target failed: {e}")))?;
        resp["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ToolFault::protocol("CDP new target returned no id"))
    }

    async fn close_target(&self, target_id: &str) -> Result<(), ToolFault> {
        let url = format!("{}/json/close/{}", self.base_url, target_id);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolFault::protocol(format!("CDP close target failed: {e}")))?;
        Ok(())
    }

    async fn ws_url(&self, target_id: &str) -> Result<String, ToolFault> {
        let targets = self.list_targets().await?;
        targets
            .iter()
            .find(|t| t["id"].as_str() == Some(target_id))
            .and_then(|t| t["webSocketDebuggerUrl"].as_str())
            .map(str::to_string)
            .ok_or_else(|| ToolFault::not_found(format!("target {target_id} not found or no WS URL")))
    }

    /// Send one CDP command and wait for the response carrying its id.
    async fn send(&self, target_id: &str, method: &str, params: Value) -> Result<Value, ToolFault> {
        let ws_url = self.ws_url(target_id).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = json!({ "id": id, "method": method, "params": params });

        let (mut ws, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| ToolFault::protocol(format!("WebSocket connect failed: {e}")))?;
        ws.send(Message::Text(message.to_string().into()))
            .await
            .map_err(|e| ToolFault::protocol(format!("WebSocket send failed: {e}")))?;

        // Chrome may interleave event notifications before our response.
        let result = tokio::time::timeout(self.command_timeout, async {
            while let Some(msg) = ws.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Ok(resp) = serde_json::from_str::<Value>(&text)
                            && resp.get("id").and_then(|v| v.as_i64()) == Some(id)
                        {
                            return Ok(resp);
                        }
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        return Err(ToolFault::protocol(format!("WebSocket read error: {e}")));
                    }
                }
            }
            Err(ToolFault::protocol("WebSocket closed before response received"))
        })
        .await;

        let _ = ws.close(None).await;

        let resp = match result {
            Ok(r) => r?,
            Err(_) => {
                return Err(ToolFault::timeout(format!(
                    "CDP {method} timed out ({}s)",
                    self.command_timeout.as_secs()
                )));
            }
        };
        if let Some(err) = resp.get("error") {
            return Err(ToolFault::protocol(format!("CDP {method} error: {err}")));
        }
        Ok(resp["result"].clone())
    }
}

// ─── Session ─────────────────────────────────────────────────────

struct Session {
    cdp: CdpClient,
    target_id: String,
    port: u16,
    /// Set when this session launched Chrome itself.
    process: Option<tokio::process::Child>,
}

impl Session {
    async fn open(config: &BrowserConfig) -> Result<Self, ToolFault> {
        let cdp = CdpClient::new(config.cdp_port);
        let process = match cdp.list_targets().await {
            Ok(_) => {
                info!(port = config.cdp_port, "connected to existing browser");
                None
            }
            Err(_) => Some(launch(config, &cdp).await?),
        };
        let target_id = cdp.new_target().await?;
        debug!(target = %target_id, "opened browser tab");
        Ok(Self {
            cdp,
            target_id,
            port: config.cdp_port,
            process,
        })
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, ToolFault> {
        let result = self
            .cdp
            .send(
                &self.target_id,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            return Err(ToolFault::protocol(format!("page script threw: {details}")));
        }
        Ok(result["result"]["value"].clone())
    }

    /// Evaluate a script that returns `JSON.stringify(...)` and parse it.
    async fn evaluate_json(&self, expression: &str) -> Result<Value, ToolFault> {
        let raw = self.evaluate(expression).await?;
        let text = raw
            .as_str()
            .ok_or_else(|| ToolFault::protocol("page script returned a non-string value"))?;
        serde_json::from_str(text)
            .map_err(|e| ToolFault::protocol(format!("page script returned invalid JSON: {e}")))
    }

    async fn wait_until(&self, predicate: &str) -> Result<(), ToolFault> {
        loop {
            if self.evaluate(predicate).await?.as_bool() == Some(true) {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn press_key(&self, key: &str) -> Result<(), ToolFault> {
        for kind in ["keyDown", "keyUp"] {
            let mut params = json!({ "type": kind, "key": key });
            if key.chars().count() == 1 {
                params["text"] = Value::String(key.to_string());
            }
            self.cdp
                .send(&self.target_id, "Input.dispatchKeyEvent", params)
                .await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.cdp.close_target(&self.target_id).await {
            warn!(error = %e.reason, "failed to close browser tab");
        }
        if let Some(ref mut proc) = self.process {
            let _ = proc.kill().await;
            info!(port = self.port, "browser process killed");
            let _ = tokio::fs::remove_dir_all(profile_dir(self.port)).await;
        }
    }
}

fn profile_dir(port: u16) -> PathBuf {
    std::env::temp_dir().join(format!("trawl-chrome-{port}"))
}

async fn launch(config: &BrowserConfig, cdp: &CdpClient) -> Result<tokio::process::Child, ToolFault> {
    let chrome_bin = find_chrome_binary(config.chrome_path.as_deref())?;
    let port = config.cdp_port;
    info!(binary = %chrome_bin.display(), port, headless = config.headless, "launching browser");

    let mut cmd = tokio::process::Command::new(&chrome_bin);
    cmd.arg(format!("--remote-debugging-port={port}"))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--window-size=1920,1080")
        .arg(format!("--user-data-dir={}", profile_dir(port).display()));
    if config.headless {
        cmd.arg("--headless=new");
    }
    cmd.arg("about:blank");

    let process = cmd
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ToolFault::protocol(format!(
                "failed to launch Chrome at '{}': {e}",
                chrome_bin.display()
            ))
        })?;

    let deadline = Duration::from_secs(config.launch_timeout_secs);
    let start = std::time::Instant::now();
    loop {
        if start.elapsed() > deadline {
            return Err(ToolFault::timeout(format!(
                "Chrome failed to start within {} seconds",
                config.launch_timeout_secs
            )));
        }
        match cdp.list_targets().await {
            Ok(_) => break,
            Err(_) => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
    info!(port, "browser ready");
    Ok(process)
}

// ─── Page scripts ────────────────────────────────────────────────

/// Shared helpers injected ahead of every page script: element naming and
/// selector derivation. Selector preference: `#id`, `tag[name=...]`,
/// `a[href='...']`, a tag that is unique on the page, then an
/// nth-of-type path.
const PAGE_HELPERS: &str = r#"
const __slug = (s) => (s || '').toLowerCase().replace(/[^a-z0-9]+/g, ' ').trim().split(' ').filter(Boolean).slice(0, 3).join('_');
const __label = (el) => (el.getAttribute('aria-label') || el.textContent || el.value || el.placeholder || el.name || el.id || el.alt || el.title || '').trim();
const __suffix = (el) => {
  const tag = el.tagName.toLowerCase();
  if (/^h[1-6]$/.test(tag)) return 'heading';
  if (tag === 'a') return 'link';
  if (tag === 'button' || el.getAttribute('role') === 'button' || (tag === 'input' && ['submit','button'].includes(el.type))) return 'button';
  if (tag === 'input' || tag === 'textarea' || tag === 'select') return 'field';
  if (tag === 'img') return 'image';
  return tag;
};
const __candidates = () => Array.from(document.querySelectorAll('h1, h2, h3, a[href], button, input, textarea, select, img[alt], [role="button"]'))
  .filter(el => { const r = el.getBoundingClientRect(); return r.width > 0 || r.height > 0; });
const __names = () => {
  const seen = {};
  let firstHeading = true;
  return __candidates().map(el => {
    let name;
    if (el.tagName === 'H1' && firstHeading) { name = 'heading'; firstHeading = false; }
    else { const base = __slug(__label(el)); name = base ? base + '_' + __suffix(el) : __suffix(el); }
    seen[name] = (seen[name] || 0) + 1;
    if (seen[name] > 1) name = name + '_' + seen[name];
    return { el, name };
  });
};
const __unique = (sel, el) => { try { const m = document.querySelectorAll(sel); return m.length === 1 && m[0] === el; } catch (e) { return false; } };
const __selector = (el) => {
  const tag = el.tagName.toLowerCase();
  if (el.id && __unique('#' + CSS.escape(el.id), el)) return '#' + CSS.escape(el.id);
  const name = el.getAttribute('name');
  if (name && __unique(tag + '[name="' + name + '"]', el)) return tag + '[name="' + name + '"]';
  const href = el.getAttribute('href');
  if (tag === 'a' && href && !href.includes("'") && __unique("a[href='" + href + "']", el)) return "a[href='" + href + "']";
  if (__unique(tag, el)) return tag;
  let path = '';
  let node = el;
  for (let depth = 0; depth < 6 && node && node !== document.body; depth++) {
    const t = node.tagName.toLowerCase();
    if (node.id) { path = '#' + CSS.escape(node.id) + (path ? ' > ' + path : ''); break; }
    const sibs = Array.from(node.parentElement ? node.parentElement.children : []).filter(c => c.tagName === node.tagName);
    const part = t + ':nth-of-type(' + (sibs.indexOf(node) + 1) + ')';
    path = path ? part + ' > ' + path : part;
    node = node.parentElement;
  }
  return path;
};
"#;

fn snapshot_script() -> String {
    format!(
        r#"(() => {{
            {PAGE_HELPERS}
            const elements = __names().slice(0, 200).map(({{ el, name }}) => ({{
                name,
                tag: el.tagName.toLowerCase(),
                role: el.getAttribute('role') || el.type || el.tagName.toLowerCase(),
                text: __label(el).slice(0, 120),
            }}));
            return JSON.stringify({{ url: location.href, title: document.title, elements }});
        }})()"#
    )
}

fn extract_script(hint: &str) -> String {
    let hint = serde_json::to_string(hint).unwrap_or_else(|_| "\"\"".into());
    format!(
        r#"(() => {{
            {PAGE_HELPERS}
            const hint = {hint};
            const wanted = __slug(hint.replace(/_/g, ' '));
            const named = __names();
            let hit = named.find(n => n.name === hint) || named.find(n => __slug(n.name.replace(/_/g, ' ')) === wanted);
            if (!hit) {{
                const words = wanted.split('_').filter(w => w.length > 2);
                hit = named.find(n => words.length && words.every(w => __slug(__label(n.el)).includes(w)));
            }}
            if (!hit) return JSON.stringify({{ hint, matches: 0 }});
            const selector = __selector(hit.el);
            if (!selector) return JSON.stringify({{ hint, matches: 0 }});
            return JSON.stringify({{
                hint,
                selector,
                tag: hit.el.tagName.toLowerCase(),
                text: __label(hit.el).slice(0, 120),
            }});
        }})()"#
    )
}

fn interact_script(kind: InteractionKind, target: &str, value: Option<&str>) -> String {
    let target = serde_json::to_string(target).unwrap_or_else(|_| "\"\"".into());
    let value = serde_json::to_string(&value).unwrap_or_else(|_| "null".into());
    let kind = kind.as_str();
    format!(
        r#"(() => {{
            let el = null;
            try {{ el = document.querySelector({target}); }} catch (e) {{}}
            if (!el) return JSON.stringify({{ found: false }});
            el.scrollIntoView({{ block: 'center' }});
            const value = {value};
            switch ('{kind}') {{
                case 'click': el.click(); break;
                case 'hover': el.dispatchEvent(new MouseEvent('mouseover', {{ bubbles: true }})); break;
                case 'press': el.focus(); break;
                case 'fill':
                case 'select':
                    el.focus();
                    el.value = value;
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    break;
            }}
            return JSON.stringify({{ found: true, tag: el.tagName.toLowerCase() }});
        }})()"#
    )
}

// ─── Browser ─────────────────────────────────────────────────────

/// `BrowserControl` over a live Chrome instance.
pub struct CdpBrowser {
    config: BrowserConfig,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl CdpBrowser {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            session: tokio::sync::Mutex::new(None),
        }
    }

    async fn ensure<'a>(&self, slot: &'a mut Option<Session>) -> Result<&'a Session, ToolFault> {
        if slot.is_none() {
            *slot = Some(Session::open(&self.config).await?);
        }
        slot.as_ref()
            .ok_or_else(|| ToolFault::protocol("browser session unavailable"))
    }
}

#[async_trait]
impl BrowserControl for CdpBrowser {
    async fn navigate(&self, url: &str) -> Result<Value, ToolFault> {
        let mut slot = self.session.lock().await;
        let session = self.ensure(&mut slot).await?;
        let result = session
            .cdp
            .send(&session.target_id, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(err) = result["errorText"].as_str().filter(|e| !e.is_empty()) {
            return Err(ToolFault::not_found(format!("navigation to {url} failed: {err}")));
        }
        session
            .wait_until("document.readyState === 'complete'")
            .await?;
        let page = session
            .evaluate_json("JSON.stringify({ url: location.href, title: document.title })")
            .await?;
        info!(url, "navigated");
        Ok(page)
    }

    async fn snapshot(&self) -> Result<Value, ToolFault> {
        let mut slot = self.session.lock().await;
        let session = self.ensure(&mut slot).await?;
        session.evaluate_json(&snapshot_script()).await
    }

    async fn extract_fact(&self, hint: &str) -> Result<Value, ToolFault> {
        let mut slot = self.session.lock().await;
        let session = self.ensure(&mut slot).await?;
        let result = session.evaluate_json(&extract_script(hint)).await?;
        if result.get("selector").and_then(|s| s.as_str()).is_none() {
            return Err(ToolFault::not_found(format!("no element on the page matches '{hint}'")));
        }
        Ok(result)
    }

    async fn interact(
        &self,
        kind: InteractionKind,
        target: &str,
        value: Option<&str>,
    ) -> Result<Value, ToolFault> {
        let mut slot = self.session.lock().await;
        let session = self.ensure(&mut slot).await?;
        let result = session
            .evaluate_json(&interact_script(kind, target, value))
            .await?;
        if result["found"].as_bool() != Some(true) {
            return Err(ToolFault::not_found(format!("element not found: {target}")));
        }
        if kind == InteractionKind::Press {
            session.press_key(value.unwrap_or_default()).await?;
        }
        Ok(json!({ "performed": kind.as_str(), "target": target }))
    }

    async fn wait(&self, condition: &str) -> Result<Value, ToolFault> {
        let parsed = parse_wait_condition(condition)?;
        let mut slot = self.session.lock().await;
        let session = self.ensure(&mut slot).await?;
        match parsed {
            WaitCondition::Load => {
                session
                    .wait_until("document.readyState === 'complete'")
                    .await?
            }
            WaitCondition::Selector(css) => {
                let css = serde_json::to_string(&css).unwrap_or_else(|_| "\"\"".into());
                session
                    .wait_until(&format!("document.querySelector({css}) !== null"))
                    .await?
            }
            WaitCondition::Idle(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
        Ok(json!({ "condition": condition, "satisfied": true }))
    }

    async fn release(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            session.shutdown().await;
            debug!("browser session released");
        }
    }
}

/// Locate a Chrome/Chromium binary: explicit config path first, then the
/// usual install locations, then `PATH`.
pub fn find_chrome_binary(explicit: Option<&Path>) -> Result<PathBuf, ToolFault> {
    if let Some(p) = explicit {
        if p.exists() {
            return Ok(p.to_path_buf());
        }
        return Err(ToolFault::not_found(format!(
            "configured chrome_path {} does not exist",
            p.display()
        )));
    }

    let candidates = [
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        // Linux
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
    ];

    for candidate in &candidates {
        if Path::new(candidate).exists() {
            return Ok(PathBuf::from(candidate));
        }
        if let Ok(output) = std::process::Command::new("which").arg(candidate).output()
            && output.status.success()
        {
            return Ok(PathBuf::from(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ));
        }
    }

    Err(ToolFault::not_found(
        "Chrome/Chromium not found. Install Chrome or set browser.chrome_path.",
    ))
}
