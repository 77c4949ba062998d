mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;
    use std::time::Duration;
    use surge::prelude::*;
    use time::OffsetDateTime;

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn finished_run_is_persisted() -> anyhow::Result<()> {
        init().await;

        let scenario = scenario(3, 10, 1);
        let outcome = dispatcher("/jitter/ms/20", Duration::from_secs(1))?
            .run(&scenario)
            .await?;
        let report = outcome.report();

        let dir = std::env::temp_dir().join(format!("surge-it-{}", std::process::id()));
        let paths = ReportWriter::new(&dir)
            .write(&report, &scenario, OffsetDateTime::now_utc())?;

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.json)?)?;
        assert_eq!(json["scenario"]["name"], "Custom Test");
        assert_eq!(json["results"]["totalRequests"], outcome.stats.total_requests());
        assert_eq!(
            json["results"]["perEntityBreakdown"]
                .as_array()
                .unwrap()
                .iter()
                .map(|e| e["total"].as_u64().unwrap())
                .sum::<u64>(),
            outcome.stats.total_requests()
        );

        let markdown = std::fs::read_to_string(&paths.markdown)?;
        assert!(markdown.contains("## Per-Merchant Breakdown"));
        assert!(paths
            .markdown
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("Custom Test_"));

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }
}
