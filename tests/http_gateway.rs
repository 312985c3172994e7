//! HTTP collection gateway tests against a local mockito server.

#![cfg(feature = "http-client")]

use std::sync::Arc;

use serde_json::json;

use archi_pipeline::collector::http::HttpCollectionGateway;
use archi_pipeline::collector::{BatchCollector, CollectionGateway};
use archi_pipeline::config::CollectorConfig;

fn gateway(endpoint: &str, retry_attempts: u32) -> HttpCollectionGateway {
    HttpCollectionGateway::new(&CollectorConfig {
        endpoint: Some(endpoint.to_string()),
        timeout_ms: 2_000,
        retry_attempts,
        retry_delay_ms: 1,
    })
    .unwrap()
}

mod fetch_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn decodes_record_and_stamps_identity() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/apps/billing")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "app_id": "something-else",
                    "name": "Billing",
                    "language": "rust",
                    "dependencies": ["ledger"],
                    "databases": null,
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let outcome = gateway(&server.url(), 3).fetch("billing").await;
        mock.assert_async().await;

        assert!(outcome.success);
        let record = outcome.record.unwrap();
        assert_eq!(record.app_id, "billing");
        assert_eq!(record.name, "Billing");
        assert_eq!(record.language.as_deref(), Some("rust"));
        assert_eq!(record.dependencies, vec!["ledger".to_string()]);
        assert!(record.databases.is_empty());
        assert!(record.collected_at.is_some());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/apps/ghost")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let outcome = gateway(&server.url(), 3).fetch("ghost").await;
        mock.assert_async().await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("collection service returned status 404")
        );
    }

    #[tokio::test]
    async fn server_errors_are_retried_up_to_the_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/apps/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let outcome = gateway(&server.url(), 3).fetch("flaky").await;
        mock.assert_async().await;

        assert!(!outcome.success);
        assert!(outcome.error_message.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn malformed_body_becomes_failed_outcome() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/apps/broken")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let outcome = gateway(&server.url(), 1).fetch("broken").await;
        assert!(!outcome.success);
        assert!(outcome
            .error_message
            .unwrap()
            .starts_with("failed to decode collected record"));
    }

    #[tokio::test]
    async fn reserved_characters_stay_inside_the_identifier() {
        let mut server = mockito::Server::new_async().await;
        let plain = server
            .mock("GET", "/api/v1/apps/billing")
            .with_status(200)
            .with_body(json!({ "name": "Billing" }).to_string())
            .expect(0)
            .create_async()
            .await;
        let sharded = server
            .mock("GET", "/api/v1/apps/billing%3Fshard%3D2")
            .with_status(200)
            .with_body(json!({ "name": "Billing shard 2" }).to_string())
            .expect(1)
            .create_async()
            .await;
        let nested = server
            .mock("GET", "/api/v1/apps/team%2Fbilling")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let gateway = gateway(&server.url(), 1);
        let outcome = gateway.fetch("billing?shard=2").await;
        let missing = gateway.fetch("team/billing").await;

        sharded.assert_async().await;
        nested.assert_async().await;
        plain.assert_async().await;
        let record = outcome.record.unwrap();
        assert_eq!(record.app_id, "billing?shard=2");
        assert_eq!(record.name, "Billing shard 2");
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn unreachable_service_never_raises() {
        let outcome = gateway("http://127.0.0.1:1", 2).fetch("a1").await;
        assert!(!outcome.success);
        assert_eq!(outcome.app_id, "a1");
        assert!(outcome
            .error_message
            .unwrap()
            .starts_with("collection request failed"));
    }
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn healthy_service() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        assert!(gateway(&server.url(), 1).health_check().await);
    }

    #[tokio::test]
    async fn unhealthy_service() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(500)
            .create_async()
            .await;

        assert!(!gateway(&server.url(), 1).health_check().await);
        assert!(!gateway("http://127.0.0.1:1", 1).health_check().await);
    }
}

mod batch_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn batch_collection_over_http_skips_failures() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for id in ["a1", "a3"] {
            let mock = server
                .mock("GET", format!("/api/v1/apps/{id}").as_str())
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(json!({ "name": id.to_uppercase() }).to_string())
                .create_async()
                .await;
            mocks.push(mock);
        }
        let _missing = server
            .mock("GET", "/api/v1/apps/a2")
            .with_status(404)
            .create_async()
            .await;

        let collector = BatchCollector::new(Arc::new(gateway(&server.url(), 1)), 2, 2);
        let ids: Vec<String> = ["a1", "a2", "a3"].iter().map(|s| s.to_string()).collect();
        let mut records = collector.collect(&ids, |_| {}).await;
        records.sort_by(|a, b| a.app_id.cmp(&b.app_id));

        let names: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.app_id.as_str(), r.name.as_str()))
            .collect();
        assert_eq!(names, vec![("a1", "A1"), ("a3", "A3")]);
    }
}
