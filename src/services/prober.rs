// src/services/prober.rs

//! Stock prober service.
//!
//! Signs in to the retailer once per session and tests each product page for
//! the in-stock marker element.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use scraper::{ElementRef, Html};

use crate::error::{AppError, Result};
use crate::models::{Item, LoginConfig, ProberConfig};
use crate::services::auth::{CodePrompt, validate_code};
use crate::utils::http::{self, Page};
use crate::utils::resolve;

/// Yields one "in stock" observation per item.
#[async_trait]
pub trait StockProber: Send + Sync {
    /// Make sure the session is signed in; cheap when it already is.
    async fn login(&mut self, login: &LoginConfig) -> Result<()>;

    /// Load the item's page and report whether it is in stock.
    ///
    /// A page without the marker is out of stock, not an error.
    async fn probe(&mut self, item: &Item) -> Result<bool>;

    /// URL of the most recent request, for diagnostics.
    fn last_url(&self) -> Option<&str>;

    /// Write the most recent page to `dir` for post-mortem inspection.
    async fn dump_page(&self, dir: &Path, context: &str) -> Result<Option<PathBuf>>;

    /// Release the session. Later calls fail.
    async fn close(&mut self);
}

/// A form found on a page, reduced to what is needed to submit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageForm {
    /// Absolute submit URL
    pub action: String,
    /// Names of the visible inputs, in document order
    pub fields: Vec<String>,
    /// Hidden inputs to send back unchanged
    pub hidden: Vec<(String, String)>,
}

impl PageForm {
    fn with_values(&self, values: impl IntoIterator<Item = String>) -> Vec<(String, String)> {
        let mut data = self.hidden.clone();
        data.extend(self.fields.iter().cloned().zip(values));
        data
    }
}

/// Prober backed by a cookie-keeping HTTP session.
pub struct HttpProber {
    client: Option<Client>,
    in_stock_selector: String,
    prompt: Box<dyn CodePrompt>,
    last_url: Option<String>,
    last_body: Option<String>,
}

impl HttpProber {
    /// Create a prober; the selector is checked up front.
    pub fn new(config: &ProberConfig, prompt: Box<dyn CodePrompt>) -> Result<Self> {
        http::parse_selector(&config.in_stock_selector)?;
        Ok(Self {
            client: Some(http::create_session_client(config)?),
            in_stock_selector: config.in_stock_selector.clone(),
            prompt,
            last_url: None,
            last_body: None,
        })
    }

    fn client(&self) -> Result<Client> {
        self.client
            .clone()
            .ok_or_else(|| AppError::probe(self.last_url().unwrap_or("-"), "session is closed"))
    }

    async fn get(&mut self, url: &str) -> Result<Page> {
        let client = self.client()?;
        self.last_url = Some(url.to_string());
        let page = http::fetch_page(&client, url).await?;
        self.remember(&page);
        Ok(page)
    }

    async fn submit(&mut self, form: &PageForm, data: &[(String, String)]) -> Result<Page> {
        let client = self.client()?;
        self.last_url = Some(form.action.clone());
        let page = http::submit_form(&client, &form.action, data).await?;
        self.remember(&page);
        Ok(page)
    }

    fn remember(&mut self, page: &Page) {
        self.last_url = Some(page.url.clone());
        self.last_body = Some(page.body.clone());
    }
}

#[async_trait]
impl StockProber for HttpProber {
    async fn login(&mut self, login: &LoginConfig) -> Result<()> {
        let page = self.get(&login.login_url).await?;
        if title_contains(&page.body, &login.authenticated_title) {
            log::debug!("Session already signed in");
            return Ok(());
        }

        log::info!("Signing in as {}", login.user);
        let form = login_form(&page)?
            .ok_or_else(|| AppError::auth("login form elements not found"))?;
        let data = form.with_values([login.user.clone(), login.pass.clone()]);
        let mut page = self.submit(&form, &data).await?;

        if let Some(form) = code_form(&page)? {
            let code = self.prompt.code("Authentication App Code: ")?;
            validate_code(&code, form.fields.len())?;

            let digits: Vec<String> = if form.fields.len() > 1 {
                code.chars().map(String::from).collect()
            } else {
                vec![code]
            };
            let data = form.with_values(digits);
            page = self.submit(&form, &data).await?;
        }

        if !title_contains(&page.body, &login.success_title) {
            return Err(AppError::auth(format!(
                "sign-in did not reach a page titled '{}'",
                login.success_title
            )));
        }

        log::info!("Signed in");
        Ok(())
    }

    async fn probe(&mut self, item: &Item) -> Result<bool> {
        let page = self.get(&item.url).await?;
        let in_stock = has_marker(&page.body, &self.in_stock_selector)?;
        log::debug!("check {} -> {}", item.name, in_stock);
        Ok(in_stock)
    }

    fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    async fn dump_page(&self, dir: &Path, context: &str) -> Result<Option<PathBuf>> {
        let Some(body) = &self.last_body else {
            return Ok(None);
        };

        tokio::fs::create_dir_all(dir).await?;
        let index = Utc::now().timestamp_subsec_nanos() % 100;
        let path = dir.join(format!("{context}_{index:02}.htm"));
        tokio::fs::write(&path, body).await?;
        Ok(Some(path))
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            log::info!("Prober session released");
        }
    }
}

/// Whether the page contains an element matching `selector`.
pub fn has_marker(body: &str, selector: &str) -> Result<bool> {
    let selector = http::parse_selector(selector)?;
    let document = Html::parse_document(body);
    Ok(document.select(&selector).next().is_some())
}

fn title_contains(body: &str, needle: &str) -> bool {
    let document = Html::parse_document(body);
    http::page_title(&document).contains(needle)
}

/// The username/password form, if the page has one.
pub fn login_form(page: &Page) -> Result<Option<PageForm>> {
    let document = Html::parse_document(&page.body);
    let user_sel = http::parse_selector(r#"input[name="username"]"#)?;
    let pass_sel = http::parse_selector(r#"input[name="password"]"#)?;

    let (Some(user), Some(_)) = (
        document.select(&user_sel).next(),
        document.select(&pass_sel).next(),
    ) else {
        return Ok(None);
    };

    let form = enclosing_form(user);
    Ok(Some(PageForm {
        action: form_action(form, &page.url),
        fields: vec!["username".into(), "password".into()],
        hidden: form.map(hidden_inputs).transpose()?.unwrap_or_default(),
    }))
}

/// The one-time code form, if the page asks for one.
///
/// Codes are entered either into one input or one input per digit.
pub fn code_form(page: &Page) -> Result<Option<PageForm>> {
    let document = Html::parse_document(&page.body);
    let tel_sel = http::parse_selector(r#"input[type="tel"]"#)?;

    let inputs: Vec<ElementRef> = document.select(&tel_sel).collect();
    let Some(first) = inputs.first() else {
        return Ok(None);
    };

    let fields = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let attrs = input.value();
            attrs
                .attr("name")
                .map(str::to_string)
                .or_else(|| attrs.attr("data-id").map(|id| format!("code{id}")))
                .unwrap_or_else(|| format!("code{i}"))
        })
        .collect();

    let form = enclosing_form(*first);
    Ok(Some(PageForm {
        action: form_action(form, &page.url),
        fields,
        hidden: form.map(hidden_inputs).transpose()?.unwrap_or_default(),
    }))
}

fn enclosing_form(input: ElementRef<'_>) -> Option<ElementRef<'_>> {
    input
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "form")
}

fn form_action(form: Option<ElementRef<'_>>, page_url: &str) -> String {
    form.and_then(|f| f.value().attr("action"))
        .filter(|action| !action.trim().is_empty())
        .and_then(|action| resolve(page_url, action))
        .unwrap_or_else(|| page_url.to_string())
}

fn hidden_inputs(form: ElementRef<'_>) -> Result<Vec<(String, String)>> {
    let hidden_sel = http::parse_selector(r#"input[type="hidden"][name]"#)?;
    Ok(form
        .select(&hidden_sel)
        .filter_map(|input| {
            let attrs = input.value();
            Some((
                attrs.attr("name")?.to_string(),
                attrs.attr("value").unwrap_or("").to_string(),
            ))
        })
        .collect())
}
