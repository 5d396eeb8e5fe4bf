//! Integration tests for the ingestion flow
//!
//! Covers cache hits, budget accounting across success and failure paths,
//! cancellation, batches and conversation turns.

use std::sync::Arc;
use std::time::Duration;

use newsdesk_memory::compression::{CompressionLevel, Compressor, SummaryStyle};
use newsdesk_memory::error::MemoryError;
use newsdesk_memory::memory::{IngestRequest, ManagerSettings};
use newsdesk_memory::testing::{StaticFetcher, article, test_manager, test_manager_with};
use newsdesk_memory::VectorIndex;

const MARKETS_URL: &str = "https://news.example.com/markets/rally";

mod cache_tests {
    use super::*;

    #[tokio::test]
    async fn test_second_ingest_is_cache_hit_with_zero_budget() {
        let fetcher = Arc::new(StaticFetcher::new().with(MARKETS_URL, article("markets", 60)));
        let manager = test_manager_with(
            Arc::clone(&fetcher),
            Compressor::default(),
            500,
            ManagerSettings::default(),
        );
        let session = manager.open_session(Some(5_000));

        let first = manager
            .ingest(&session, MARKETS_URL, SummaryStyle::Balanced, 500)
            .await
            .unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.access_count, 1);
        assert!(first.size <= 525);
        assert_eq!(first.charged, first.size);
        let used_after_first = session.budget_status().used;
        assert_eq!(used_after_first, first.size);

        let second = manager
            .ingest(&session, MARKETS_URL, SummaryStyle::Balanced, 500)
            .await
            .unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.charged, 0);
        assert_eq!(second.access_count, 2);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(session.budget_status().used, used_after_first);
        assert_eq!(fetcher.calls(), 1, "cache hit must not fetch");
    }

    #[tokio::test]
    async fn test_tracking_variants_share_cache_entry() {
        let fetcher = StaticFetcher::new().with(MARKETS_URL, article("markets", 10));
        let manager = test_manager(fetcher);
        let session = manager.open_session(None);

        manager
            .ingest(&session, MARKETS_URL, SummaryStyle::Brief, 300)
            .await
            .unwrap();
        let variant = "HTTPS://News.Example.com/markets/rally/?utm_source=newsletter#top";
        let report = manager
            .ingest(&session, variant, SummaryStyle::Brief, 300)
            .await
            .unwrap();
        assert!(report.cache_hit);
        assert_eq!(manager.index().len().await, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_charges_each_session_once() {
        let fetcher = StaticFetcher::new().with(MARKETS_URL, article("markets", 30));
        let manager = test_manager(fetcher);
        let morning = manager.open_session(None);
        let evening = manager.open_session(None);

        let stored = manager
            .ingest(&morning, MARKETS_URL, SummaryStyle::Detailed, 400)
            .await
            .unwrap();
        let morning_used = morning.budget_status().used;

        let first = manager
            .ingest(&evening, MARKETS_URL, SummaryStyle::Detailed, 400)
            .await
            .unwrap();
        assert!(first.cache_hit);
        assert!(first.charged > 0);
        assert_eq!(first.charged, stored.size);
        assert_eq!(first.text, stored.text);
        assert_eq!(evening.budget_status().used, first.charged);

        let again = manager
            .ingest(&evening, MARKETS_URL, SummaryStyle::Detailed, 400)
            .await
            .unwrap();
        assert!(again.cache_hit);
        assert_eq!(again.charged, 0);
        assert_eq!(evening.budget_status().used, first.charged);
        assert_eq!(morning.budget_status().used, morning_used);
    }

    #[tokio::test]
    async fn test_oversized_cached_item_is_recompressed_to_budget() {
        let fetcher = StaticFetcher::new().with(MARKETS_URL, article("markets", 60));
        let manager = test_manager(fetcher);
        let morning = manager.open_session(None);
        let evening = manager.open_session(None);

        let stored = manager
            .ingest(&morning, MARKETS_URL, SummaryStyle::Balanced, 1_000)
            .await
            .unwrap();
        assert!(stored.size > 105);

        let view = manager
            .ingest(&evening, MARKETS_URL, SummaryStyle::Brief, 100)
            .await
            .unwrap();
        assert!(view.cache_hit);
        assert!(view.size <= 105, "view of {} chars", view.size);
        assert_eq!(view.level, CompressionLevel::Truncated);
        assert_eq!(view.text.chars().count(), view.size);
        assert_eq!(view.charged, view.size);
        assert_eq!(evening.budget_status().used, view.size);

        let item = manager.index().get(&stored.fingerprint).await.unwrap().unwrap();
        assert_eq!(item.size(), stored.size);
        assert_eq!(item.access_count, 2);
    }

    #[tokio::test]
    async fn test_cache_hit_over_session_capacity_is_rejected() {
        let fetcher = StaticFetcher::new().with(MARKETS_URL, article("markets", 30));
        let manager = test_manager(fetcher);
        let morning = manager.open_session(None);
        let cramped = manager.open_session(Some(100));

        let stored = manager
            .ingest(&morning, MARKETS_URL, SummaryStyle::Detailed, 400)
            .await
            .unwrap();
        assert!(stored.size > 100);

        let err = manager
            .ingest(&cramped, MARKETS_URL, SummaryStyle::Detailed, 400)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::BudgetExceeded { .. }));

        let status = cramped.budget_status();
        assert_eq!((status.used, status.reserved), (0, 0));
        let item = manager.index().get(&stored.fingerprint).await.unwrap().unwrap();
        assert_eq!(item.access_count, 1);
    }

    #[tokio::test]
    async fn test_lookup_by_content_id() {
        let fetcher = StaticFetcher::new().with(MARKETS_URL, article("markets", 20));
        let manager = test_manager(fetcher);
        let session = manager.open_session(None);

        let report = manager
            .ingest(&session, MARKETS_URL, SummaryStyle::Balanced, 400)
            .await
            .unwrap();
        let item = manager
            .get_by_content_id(&report.content_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.fingerprint, report.fingerprint);
        assert_eq!(item.compressed_text, report.text);
        assert_eq!(item.source_ref, report.source_ref);

        assert!(manager.get_by_content_id("00000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_params_separate_cache_entries() {
        let fetcher = StaticFetcher::new().with(MARKETS_URL, article("markets", 10));
        let manager = test_manager(fetcher);
        let session = manager.open_session(None);

        let plain = manager
            .ingest_request(&session, IngestRequest::new(MARKETS_URL).with_budget(200))
            .await
            .unwrap();
        let localized = manager
            .ingest_request(
                &session,
                IngestRequest::new(MARKETS_URL)
                    .with_budget(200)
                    .with_params(vec![("lang".into(), "de".into())]),
            )
            .await
            .unwrap();
        assert!(!localized.cache_hit);
        assert_ne!(plain.fingerprint, localized.fingerprint);
    }
}

mod budget_accounting_tests {
    use super::*;

    #[tokio::test]
    async fn test_over_budget_ingest_leaves_state_unchanged() {
        let fetcher = Arc::new(StaticFetcher::new().with(MARKETS_URL, article("markets", 60)));
        let manager = test_manager_with(
            Arc::clone(&fetcher),
            Compressor::default(),
            500,
            ManagerSettings::default(),
        );
        let session = manager.open_session(Some(1_000));

        manager
            .ingest_text(
                &session,
                "turn:desk-1:1",
                &"a".repeat(300),
                SummaryStyle::Brief,
                300,
            )
            .await
            .unwrap();
        assert_eq!(session.budget_status().used, 300);

        let err = manager
            .ingest(&session, MARKETS_URL, SummaryStyle::Balanced, 800)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::BudgetExceeded { .. }));
        assert!(err.reason().starts_with("over budget"));

        let status = session.budget_status();
        assert_eq!(status.used, 300);
        assert_eq!(status.reserved, 0);
        assert_eq!(fetcher.calls(), 0, "over-budget requests must not fetch");
    }

    #[tokio::test]
    async fn test_fetch_failure_releases_reservation() {
        let manager = test_manager(StaticFetcher::new());
        let session = manager.open_session(Some(2_000));

        let err = manager
            .ingest(&session, "https://unreachable.example.org/a", SummaryStyle::Balanced, 500)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Fetch(_)));
        assert!(err.reason().starts_with("source unreachable"));

        let status = session.budget_status();
        assert_eq!((status.used, status.reserved), (0, 0));
        assert!(manager.index().is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_source_is_rejected() {
        let manager = test_manager(StaticFetcher::new());
        let session = manager.open_session(None);

        for bad in ["", "ftp://example.com/file", "http://", "turn:desk:notanumber"] {
            let err = manager
                .ingest(&session, bad, SummaryStyle::Balanced, 500)
                .await
                .unwrap_err();
            assert!(
                err.reason().starts_with("invalid source"),
                "{bad:?} gave {}",
                err.reason()
            );
        }
        assert_eq!(session.budget_status().reserved, 0);
    }

    #[tokio::test]
    async fn test_cancelled_ingest_releases_reservation() {
        let fetcher = StaticFetcher::new()
            .with(MARKETS_URL, article("markets", 20))
            .with_delay(Duration::from_secs(2));
        let manager = test_manager(fetcher);
        let session = manager.open_session(Some(2_000));

        let attempt = tokio::time::timeout(
            Duration::from_millis(50),
            manager.ingest(&session, MARKETS_URL, SummaryStyle::Balanced, 500),
        )
        .await;
        assert!(attempt.is_err(), "ingest should still be fetching");

        let status = session.budget_status();
        assert_eq!((status.used, status.reserved), (0, 0));
        assert!(manager.index().is_empty().await);
    }

    #[tokio::test]
    async fn test_long_brief_article_fits_ceiling() {
        let long: String = article("markets", 220).chars().take(10_000).collect();
        assert_eq!(long.chars().count(), 10_000);
        let fetcher = StaticFetcher::new().with(MARKETS_URL, long);
        let manager = test_manager(fetcher);
        let session = manager.open_session(Some(24_000));

        let report = manager
            .ingest(&session, MARKETS_URL, SummaryStyle::Brief, 500)
            .await
            .unwrap();
        assert_eq!(report.raw_size, 10_000);
        assert_eq!(report.level, CompressionLevel::Truncated);
        assert!(report.charged <= 525, "charged {}", report.charged);
        assert_eq!(report.charged, report.size);
        let status = session.budget_status();
        assert_eq!(status.used, report.charged);
        assert_eq!(status.reserved, 0);
    }

    #[tokio::test]
    async fn test_charge_matches_compressed_size() {
        let fetcher = StaticFetcher::new().with(MARKETS_URL, article("markets", 60));
        let manager = test_manager(fetcher);
        let session = manager.open_session(Some(10_000));

        let report = manager
            .ingest(&session, MARKETS_URL, SummaryStyle::Brief, 700)
            .await
            .unwrap();
        assert_eq!(report.level, CompressionLevel::Truncated);
        assert!(report.size <= 700);
        assert_eq!(session.budget_status().used, report.size);
        assert_eq!(session.budget_status().reserved, 0);
    }
}

mod batch_tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_reports_in_request_order() {
        let fetcher = StaticFetcher::new()
            .with("https://a.example.com/1", article("energy", 20))
            .with("https://b.example.com/2", article("elections", 20))
            .with("https://c.example.com/3", article("football", 20));
        let manager = test_manager(fetcher);
        let session = manager.open_session(Some(10_000));

        let requests = vec![
            IngestRequest::new("https://a.example.com/1").with_budget(400),
            IngestRequest::new("https://missing.example.com/x").with_budget(400),
            IngestRequest::new("https://b.example.com/2").with_budget(400),
            IngestRequest::new("https://c.example.com/3").with_budget(400),
        ];
        let results = manager.ingest_batch(&session, requests).await;

        assert_eq!(results.len(), 4);
        assert!(results[1].is_err());
        let charged: usize = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|r| r.charged)
            .sum();
        assert_eq!(results[0].as_ref().unwrap().source_ref, "https://a.example.com/1");
        assert_eq!(results[3].as_ref().unwrap().source_ref, "https://c.example.com/3");
        assert_eq!(session.budget_status().used, charged);
        assert_eq!(manager.index().len().await, 3);
    }

    #[tokio::test]
    async fn test_batch_never_overruns_capacity() {
        let mut fetcher = StaticFetcher::new();
        for i in 0..10 {
            fetcher = fetcher.with(
                &format!("https://wire.example.com/story/{i}"),
                article(&format!("topic{i}"), 40),
            );
        }
        let manager = test_manager(fetcher);
        let session = manager.open_session(Some(2_000));

        let requests = (0..10)
            .map(|i| {
                IngestRequest::new(format!("https://wire.example.com/story/{i}"))
                    .with_style(SummaryStyle::Balanced)
                    .with_budget(500)
            })
            .collect();
        let results = manager.ingest_batch(&session, requests).await;

        let mut charged = 0;
        for result in &results {
            match result {
                Ok(report) => charged += report.charged,
                Err(MemoryError::BudgetExceeded { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let status = session.budget_status();
        assert!(results.iter().any(|r| r.is_err()));
        assert_eq!(status.reserved, 0);
        assert_eq!(status.used, charged);
        assert!(status.used <= status.capacity);
    }
}

mod conversation_tests {
    use super::*;

    #[tokio::test]
    async fn test_turn_text_is_ingested_without_fetching() {
        let fetcher = Arc::new(StaticFetcher::new());
        let manager = test_manager_with(
            Arc::clone(&fetcher),
            Compressor::default(),
            500,
            ManagerSettings::default(),
        );
        let session = manager.open_session(None);

        let report = manager
            .ingest_text(
                &session,
                "turn:morning-brief:3",
                "The reader asked for more coverage of local elections.",
                SummaryStyle::Balanced,
                500,
            )
            .await
            .unwrap();

        assert_eq!(report.level, CompressionLevel::None);
        assert_eq!(report.source_ref, "turn:morning-brief:3");
        assert!(report.content_id.starts_with("cnt_turn_"));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_turn_without_text_is_unfetchable() {
        let manager = test_manager(StaticFetcher::new());
        let session = manager.open_session(None);
        let err = manager
            .ingest(&session, "turn:morning-brief:4", SummaryStyle::Balanced, 500)
            .await
            .unwrap_err();
        assert!(err.reason().starts_with("source unreachable"));
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected() {
        let manager = test_manager(StaticFetcher::new());
        let session = manager.open_session(None);
        let err = manager
            .ingest_text(&session, "turn:desk:1", "   ", SummaryStyle::Brief, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Fetch(_)));
        assert_eq!(session.budget_status().reserved, 0);
    }
}

mod eviction_tests {
    use super::*;

    #[tokio::test]
    async fn test_ingest_reports_evictions() {
        let fetcher = StaticFetcher::new()
            .with("https://a.example.com/1", article("energy", 5))
            .with("https://a.example.com/2", article("climate", 5))
            .with("https://a.example.com/3", article("transport", 5));
        let manager = test_manager_with(
            Arc::new(fetcher),
            Compressor::default(),
            2,
            ManagerSettings::default(),
        );
        let session = manager.open_session(None);

        for url in ["https://a.example.com/1", "https://a.example.com/2"] {
            let report = manager
                .ingest(&session, url, SummaryStyle::Balanced, 1_000)
                .await
                .unwrap();
            assert!(report.evicted.is_empty());
        }
        let third = manager
            .ingest(&session, "https://a.example.com/3", SummaryStyle::Balanced, 1_000)
            .await
            .unwrap();
        assert_eq!(third.evicted.len(), 1);
        assert_eq!(manager.index().len().await, 2);
    }
}
