// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::ProberConfig;

/// A fetched page: final URL after redirects plus its markup.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

/// Create a cookie-keeping HTTP client for a signed-in session.
pub fn create_session_client(config: &ProberConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .cookie_store(true)
        .build()?;
    Ok(client)
}

/// Fetch a page, failing on transport errors and non-success statuses.
pub async fn fetch_page(client: &Client, url: &str) -> Result<Page> {
    let response = client.get(url).send().await?.error_for_status()?;
    let url = response.url().to_string();
    let body = response.text().await?;
    Ok(Page { url, body })
}

/// Submit a url-encoded form and return the resulting page.
pub async fn submit_form(client: &Client, url: &str, fields: &[(String, String)]) -> Result<Page> {
    let response = client
        .post(url)
        .form(fields)
        .send()
        .await?
        .error_for_status()?;
    let url = response.url().to_string();
    let body = response.text().await?;
    Ok(Page { url, body })
}

/// Parse a CSS selector, reporting the offending text on failure.
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::selector(selector, format!("{e:?}")))
}

/// Text of the document `<title>`, trimmed; empty when absent.
pub fn page_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}
