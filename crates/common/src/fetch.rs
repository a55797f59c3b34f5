//! Paginated bulk lookup of users
//!
//! The fetcher splits a UID list into pages of at most `page_size` and
//! issues one bulk lookup per page, strictly in order. Callers pull pages
//! with [`Pages::next_page`] and process each record before asking for the
//! next page, so an error from either side stops the remaining lookups.

use std::slice::Chunks;

use crate::deadline::Deadline;
use crate::provider::{IdentityProvider, ProviderError, UserRecord};

pub struct BatchFetcher<'a> {
    provider: &'a dyn IdentityProvider,
    page_size: usize,
    deadline: &'a Deadline,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(
        provider: &'a dyn IdentityProvider,
        page_size: usize,
        deadline: &'a Deadline,
    ) -> Self {
        Self {
            provider,
            page_size: page_size.max(1),
            deadline,
        }
    }

    pub fn pages(&self, uids: &'a [String]) -> Pages<'a> {
        Pages {
            provider: self.provider,
            deadline: self.deadline,
            chunks: uids.chunks(self.page_size),
            missing: Vec::new(),
            fetched: 0,
        }
    }
}

/// Pull-based cursor over the pages of one fetch
pub struct Pages<'a> {
    provider: &'a dyn IdentityProvider,
    deadline: &'a Deadline,
    chunks: Chunks<'a, String>,
    missing: Vec<String>,
    fetched: usize,
}

impl<'a> Pages<'a> {
    /// Look up the next page, `None` once every UID was requested
    pub async fn next_page(&mut self) -> Result<Option<Vec<UserRecord>>, ProviderError> {
        let Some(chunk) = self.chunks.next() else {
            return Ok(None);
        };

        let result = self.deadline.run(self.provider.bulk_get(chunk)).await?;
        self.fetched += 1;

        tracing::debug!(
            "fetched page {}: {} found, {} missing",
            self.fetched,
            result.found.len(),
            result.not_found.len()
        );

        self.missing.extend(result.not_found);
        Ok(Some(result.found))
    }

    pub fn into_missing(self) -> Vec<String> {
        self.missing
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::provider::MemoryIdentityProvider;

    fn backing_store(n: usize) -> MemoryIdentityProvider {
        let provider = MemoryIdentityProvider::new();
        for i in 0..n {
            provider.insert_user(UserRecord {
                uid: format!("u{:03}", i),
                email: format!("user{}@example.com", i),
                display_name: String::new(),
                custom_claims: Default::default(),
            });
        }
        provider
    }

    fn deadline() -> Deadline {
        Deadline::new(Duration::from_secs(12), CancellationToken::new())
    }

    async fn fetch_all<'a>(
        fetcher: &BatchFetcher<'a>,
        uids: &'a [String],
    ) -> Result<(Vec<UserRecord>, Vec<String>), ProviderError> {
        let mut pages = fetcher.pages(uids);
        let mut records = Vec::new();
        while let Some(page) = pages.next_page().await? {
            records.extend(page);
        }
        Ok((records, pages.into_missing()))
    }

    #[tokio::test]
    async fn test_pagination_covers_every_uid_once() {
        for (n, page_size) in [(0, 100), (1, 100), (100, 100), (101, 100), (250, 100), (7, 3)] {
            let provider = backing_store(n);
            let deadline = deadline();
            let uids: Vec<String> = (0..n).map(|i| format!("u{:03}", i)).collect();

            let fetcher = BatchFetcher::new(&provider, page_size, &deadline);
            let (records, missing) = fetch_all(&fetcher, &uids).await.unwrap();

            assert_eq!(
                provider.bulk_get_calls(),
                n.div_ceil(page_size),
                "n={n} page={page_size}"
            );
            assert_eq!(records.len(), n);
            let unique: HashSet<_> = records.iter().map(|r| r.uid.clone()).collect();
            assert_eq!(unique.len(), n);
            assert!(missing.is_empty());
        }
    }

    #[tokio::test]
    async fn test_last_page_holds_the_remainder() {
        let provider = backing_store(7);
        let deadline = deadline();
        let uids: Vec<String> = (0..7).map(|i| format!("u{:03}", i)).collect();

        let fetcher = BatchFetcher::new(&provider, 3, &deadline);
        let mut pages = fetcher.pages(&uids);
        let mut sizes = Vec::new();
        while let Some(page) = pages.next_page().await.unwrap() {
            sizes.push(page.len());
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(provider.bulk_get_calls(), 3);
    }

    #[tokio::test]
    async fn test_reports_exactly_the_missing_uids() {
        let provider = backing_store(5);
        let deadline = deadline();
        let uids = vec![
            "u000".to_string(),
            "gone-1".to_string(),
            "u004".to_string(),
            "gone-2".to_string(),
        ];

        let fetcher = BatchFetcher::new(&provider, 2, &deadline);
        let (records, missing) = fetch_all(&fetcher, &uids).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(missing, vec!["gone-1", "gone-2"]);
    }

    #[tokio::test]
    async fn test_empty_input_issues_no_lookup() {
        let provider = backing_store(3);
        let deadline = deadline();
        let fetcher = BatchFetcher::new(&provider, 100, &deadline);

        let (records, missing) = fetch_all(&fetcher, &[]).await.unwrap();
        assert!(records.is_empty());
        assert!(missing.is_empty());
        assert_eq!(provider.bulk_get_calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_aborts_fetch() {
        let provider = backing_store(3);
        let deadline = deadline();
        let uids: Vec<String> = (0..150).map(|i| format!("u{:03}", i)).collect();

        // pages above the provider's bulk limit are rejected
        let fetcher = BatchFetcher::new(&provider, 150, &deadline);
        assert!(fetch_all(&fetcher, &uids).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let provider = backing_store(3);
        provider.set_delay(Some(Duration::from_secs(30)));
        let deadline = deadline();
        let uids = vec!["u000".to_string()];

        let fetcher = BatchFetcher::new(&provider, 100, &deadline);
        assert!(matches!(
            fetch_all(&fetcher, &uids).await,
            Err(ProviderError::Timeout)
        ));
    }
}
