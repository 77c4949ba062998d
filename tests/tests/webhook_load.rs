mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;
    use std::time::Duration;
    use surge::prelude::*;

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn paced_run_against_healthy_endpoint() -> anyhow::Result<()> {
        init().await;
        let before = mock_service::received();

        let outcome = dispatcher("/webhook", Duration::from_secs(2))?
            .run(&scenario(5, 20, 2))
            .await?;

        assert!((39..=41).contains(&outcome.issued), "issued {}", outcome.issued);
        assert_eq!(outcome.stats.total_requests(), outcome.issued);
        assert_eq!(outcome.stats.successful(), outcome.issued);
        assert!(outcome.stats.is_consistent());
        assert_eq!(outcome.dropped(), 0);
        assert!(mock_service::received() - before >= outcome.issued);

        let report = outcome.report();
        assert_eq!(report.success_rate, 100.);
        assert!(report.min_response_time > 0.);
        assert!(report.actual_duration_seconds >= 4.);
        Ok(())
    }

    #[test]
    #[ntest::timeout(30_000)]
    fn mock_service_outlives_each_test_runtime() -> anyhow::Result<()> {
        for _ in 0..2 {
            let runtime = tokio::runtime::Runtime::new()?;
            let outcome = runtime.block_on(async {
                init().await;
                dispatcher("/webhook", Duration::from_secs(1))?
                    .run(&scenario(1, 5, 1))
                    .await
                    .map_err(anyhow::Error::from)
            })?;
            drop(runtime);

            assert!(outcome.issued > 0);
            assert_eq!(outcome.stats.successful(), outcome.issued);
        }
        Ok(())
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn server_errors_are_recorded_per_request() -> anyhow::Result<()> {
        init().await;

        let outcome = dispatcher("/status/503", Duration::from_secs(2))?
            .run(&scenario(3, 10, 1))
            .await?;

        assert_eq!(outcome.stats.successful(), 0);
        assert_eq!(outcome.stats.failed(), outcome.issued);
        assert!(outcome
            .stats
            .errors()
            .iter()
            .all(|e| e.status_code == Some(503)
                && e.message == "Request failed with status code 503"));
        Ok(())
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn rate_limited_endpoint_fails_some() -> anyhow::Result<()> {
        init().await;

        let outcome = dispatcher(
            "/limited/5/scenario/rate_limited_endpoint_fails_some",
            Duration::from_secs(2),
        )?
        .run(&scenario(4, 50, 2))
        .await?;

        assert!(outcome.stats.successful() > 0);
        assert!(outcome.stats.failed() > outcome.stats.successful());
        assert!(outcome
            .report()
            .error_counts()
            .iter()
            .any(|(message, _)| message == "Request failed with status code 429"));
        Ok(())
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn slow_responses_past_the_drain_are_dropped() -> anyhow::Result<()> {
        init().await;

        let outcome = dispatcher("/delay/ms/3000", Duration::from_millis(500))?
            .run(&scenario(2, 5, 1))
            .await?;

        assert_eq!(outcome.stats.total_requests(), 0);
        assert!(outcome.report().is_empty());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(outcome.dropped(), outcome.issued);
        Ok(())
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn unreachable_endpoint_records_connection_failures() -> anyhow::Result<()> {
        init().await;

        let config = RunConfig::new("http://127.0.0.1:1/webhook".parse()?)
            .start_delay(Duration::ZERO)
            .drain_window(Duration::from_secs(1));
        let dispatcher = Dispatcher::new(WebhookGenerator::new(), HttpTransport::new()?, config);
        let outcome = dispatcher.run(&scenario(2, 5, 1)).await?;

        assert_eq!(outcome.stats.failed(), outcome.issued);
        assert!(outcome
            .stats
            .errors()
            .iter()
            .all(|e| e.status_code.is_none() && e.message.starts_with("Connection failed")));
        Ok(())
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn unknown_scenario_is_rejected() -> anyhow::Result<()> {
        init().await;

        let err = dispatcher("/webhook", Duration::ZERO)?
            .run_named(&ScenarioRegistry::default(), "extreme")
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Unknown scenario: extreme. Available: light, medium, heavy, stress, custom"
        );
        assert!(matches!(err, RunError::Scenario(_)));
        Ok(())
    }
}
