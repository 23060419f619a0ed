use thiserror::Error;

use crate::auth::SignError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("can't get empty url")]
    EmptyUrl,

    #[error("signing request for {url}: {source}")]
    Sign {
        url: String,
        #[source]
        source: SignError,
    },

    /// Every attempt failed; carries each attempt's cause in order.
    #[error("GET {url} failed after {attempts} attempts: {}", .causes.join("; "))]
    Exhausted {
        url: String,
        attempts: u32,
        causes: Vec<String>,
    },

    /// The server handed back a next-page URI already consumed in this
    /// traversal. Following it would loop forever.
    #[error("pagination revisited {uri}")]
    PageRevisited { uri: String },

    #[error("pagination starting at {start} exceeded {limit} pages")]
    TooManyPages { start: String, limit: usize },
}
