//! Cursor-based pagination over API list endpoints.
//!
//! SmugMug list responses carry a `Pages.NextPage` URI; an empty or absent
//! value ends the traversal. Records accumulate in remote-declared order. Any
//! client error aborts the whole traversal, discarding partial results.

use std::collections::HashSet;

use serde::de::DeserializeOwned;

use super::{ApiClient, ApiError};

/// A well-behaved server terminates long before this; hitting the cap means
/// the cursor chain is broken.
const MAX_PAGES: usize = 10_000;

/// A decoded list page: its records and the next-page URI, if any.
pub trait Page: DeserializeOwned {
    type Record;

    fn into_page(self) -> (Vec<Self::Record>, Option<String>);
}

/// Walk the next-page cursor from `start` until exhaustion and return all
/// records in page order.
pub async fn fetch_all_pages<P: Page>(
    api: &ApiClient,
    start: &str,
) -> Result<Vec<P::Record>, ApiError> {
    let mut records = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut uri = start.to_string();

    loop {
        if !visited.insert(uri.clone()) {
            return Err(ApiError::PageRevisited { uri });
        }
        if visited.len() > MAX_PAGES {
            return Err(ApiError::TooManyPages {
                start: start.to_string(),
                limit: MAX_PAGES,
            });
        }

        let page: P = api.get(&uri).await?;
        let (mut batch, next) = page.into_page();
        records.append(&mut batch);

        match next {
            Some(next) if !next.is_empty() => uri = next,
            _ => return Ok(records),
        }
    }
}

#[cfg(test)]
mod tests {
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde::Deserialize;

    use super::*;
    use crate::api::tests::test_client;

    #[derive(Debug, Deserialize)]
    struct NumbersPage {
        items: Vec<u32>,
        #[serde(default)]
        next: String,
    }

    impl Page for NumbersPage {
        type Record = u32;

        fn into_page(self) -> (Vec<u32>, Option<String>) {
            (self.items, Some(self.next))
        }
    }

    #[tokio::test]
    async fn test_single_page() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/list"))
                .respond_with(json_encoded(serde_json::json!({"items": [1, 2]}))),
        );
        let client = test_client(&server);
        let records = fetch_all_pages::<NumbersPage>(&client, "/list").await.unwrap();
        assert_eq!(records, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_chained_pages_concatenate_in_order() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/list/1"))
                .respond_with(json_encoded(
                    serde_json::json!({"items": [1, 2], "next": "/list/2"}),
                )),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/list/2"))
                .respond_with(json_encoded(
                    serde_json::json!({"items": [3], "next": "/list/3"}),
                )),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/list/3"))
                .respond_with(json_encoded(serde_json::json!({"items": [4, 5], "next": ""}))),
        );
        let client = test_client(&server);
        let records = fetch_all_pages::<NumbersPage>(&client, "/list/1").await.unwrap();
        assert_eq!(records, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_client_failure_discards_partial_results() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/list/1")).respond_with(
                json_encoded(serde_json::json!({"items": [1], "next": "/list/2"})),
            ),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/list/2"))
                .times(3)
                .respond_with(status_code(500)),
        );
        let client = test_client(&server);
        let result = fetch_all_pages::<NumbersPage>(&client, "/list/1").await;
        assert!(matches!(result, Err(ApiError::Exhausted { .. })));
    }

    #[tokio::test]
    async fn test_self_referencing_cursor_is_a_protocol_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/loop"))
                .respond_with(json_encoded(serde_json::json!({"items": [1], "next": "/loop"}))),
        );
        let client = test_client(&server);
        let result = fetch_all_pages::<NumbersPage>(&client, "/loop").await;
        match result {
            Err(ApiError::PageRevisited { uri }) => assert_eq!(uri, "/loop"),
            other => panic!("expected revisit error, got {other:?}"),
        }
    }
}
