//! Paginated collections
//!
//! Turns a list endpoint into a lazy stream of pages. Page-number
//! (`pageNum` + `links[rel=next]`) and page-token (`nextPageToken`)
//! conventions are both understood.

use super::http::{ApiRequest, NoopRecorder, Transport};
use crate::error::TransportError;
use futures::stream::{self, Stream};
use serde_json::Value;

/// Where the next page comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Number(u32),
    Token(String),
}

struct PageState {
    cursor: Option<Cursor>,
    fetched: u32,
}

/// Lazily fetch every page of `path`.
///
/// The stream is finite and not restartable: calling `pages` again re-issues
/// all requests. A transport failure is yielded once and ends the stream;
/// pages already yielded stay valid.
pub fn pages(
    transport: &Transport,
    path: String,
    page_size: u32,
    max_pages: u32,
) -> impl Stream<Item = Result<Vec<Value>, TransportError>> + '_ {
    let initial = PageState {
        cursor: Some(Cursor::Number(1)),
        fetched: 0,
    };

    stream::unfold(initial, move |state| {
        let path = path.clone();
        async move {
            let cursor = state.cursor?;

            if state.fetched >= max_pages {
                tracing::warn!("{}: stopping after {} pages (safety limit)", path, max_pages);
                return None;
            }

            let mut request = ApiRequest::get(path.as_str()).with_query("itemsPerPage", page_size);
            request = match &cursor {
                Cursor::Number(n) => request.with_query("pageNum", n),
                Cursor::Token(token) => request.with_query("pageToken", token),
            };

            match transport.send(&request, &NoopRecorder).await {
                Ok(response) => {
                    let (items, next) = parse_page(&response.body, &cursor);
                    if items.is_empty() {
                        return None;
                    }
                    tracing::debug!("{}: page {} with {} records", path, state.fetched + 1, items.len());
                    let next_state = PageState {
                        cursor: next,
                        fetched: state.fetched + 1,
                    };
                    Some((Ok(items), next_state))
                }
                Err(e) => {
                    let done = PageState {
                        cursor: None,
                        fetched: state.fetched + 1,
                    };
                    Some((Err(e), done))
                }
            }
        }
    })
}

/// Extract the records of one page and the cursor for the next one
pub fn parse_page(body: &Value, current: &Cursor) -> (Vec<Value>, Option<Cursor>) {
    let items = match body {
        Value::Array(arr) => arr.clone(),
        _ => body
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
    };

    let has_next_link = body
        .get("links")
        .and_then(|v| v.as_array())
        .map(|links| {
            links
                .iter()
                .any(|link| link.get("rel").and_then(|r| r.as_str()) == Some("next"))
        })
        .unwrap_or(false);

    let next = if has_next_link {
        match current {
            Cursor::Number(n) => Some(Cursor::Number(n + 1)),
            // A token-paged endpoint that also sends links still pages by token
            Cursor::Token(_) => token_of(body).map(Cursor::Token),
        }
    } else {
        token_of(body).map(Cursor::Token)
    };

    (items, next)
}

fn token_of(body: &Value) -> Option<String> {
    body.get("nextPageToken")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
