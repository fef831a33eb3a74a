//! Offset pagination as used by IBM Cloud v3 collection APIs.
//!
//! A page carries its items under a named key and, when more pages exist, a
//! `next` object with the `start` token (and an `href` that repeats it).

use crate::error::Result;
use crate::ibm::client::IbmClient;
use crate::ibm::http::RequestOptions;
use serde_json::Value;
use std::collections::HashSet;

/// One page of a collection
pub struct Page {
    pub items: Vec<Value>,
    pub next_start: Option<String>,
}

/// `start` token of the next page, if any
pub fn next_start(body: &Value) -> Option<String> {
    let next = body.get("next")?;
    if let Some(start) = next.get("start").and_then(|v| v.as_str()) {
        return Some(start.to_string());
    }
    let href = next.get("href").and_then(|v| v.as_str())?;
    let parsed = url::Url::parse(href).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "start")
        .map(|(_, v)| v.into_owned())
}

/// Fetch one page
pub async fn fetch_page(
    client: &IbmClient,
    url: &str,
    items_key: &str,
    query: &[(&str, &str)],
    start: Option<&str>,
) -> Result<(Page, Value)> {
    let mut params: Vec<(&str, &str)> = query.to_vec();
    if let Some(token) = start {
        params.push(("start", token));
    }

    let response = client
        .get(
            url,
            RequestOptions {
                query: &params,
                ..Default::default()
            },
        )
        .await?;

    let items = response
        .body
        .get(items_key)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let next_start = next_start(&response.body);

    Ok((Page { items, next_start }, response.body))
}

/// Fetch every page, returning all items and the body of the first page
pub async fn fetch_all(
    client: &IbmClient,
    url: &str,
    items_key: &str,
    query: &[(&str, &str)],
) -> Result<(Vec<Value>, Value)> {
    let (first, first_body) = fetch_page(client, url, items_key, query, None).await?;
    let mut all_items = first.items;
    let mut start = first.next_start;
    let mut seen: HashSet<String> = HashSet::new();
    let mut pages = 1;

    while let Some(token) = start {
        // A server cycling through tokens would loop forever
        if !seen.insert(token.clone()) {
            tracing::warn!("{} handed out page token {:?} again, stopping", url, token);
            break;
        }
        let (page, _) = fetch_page(client, url, items_key, query, Some(&token)).await?;
        pages += 1;
        all_items.extend(page.items);
        start = page.next_start;
    }

    tracing::debug!("Fetched {} {} across {} pages", all_items.len(), items_key, pages);
    Ok((all_items, first_body))
}
