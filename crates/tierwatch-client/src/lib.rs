pub mod extract;
pub mod fetcher;

pub use extract::HtmlCharacterParser;
pub use fetcher::ReqwestFetcher;

use tierwatch_core::config::{SourceKind, UpstreamConfig};
use tierwatch_core::error::AppError;
use tierwatch_core::retry::RetryingFetcher;
use tierwatch_core::source::{Endpoints, LiveSource, SelectedSource};
use tierwatch_core::synthetic::SyntheticSource;

/// The character source binaries run with.
pub type AppSource = SelectedSource<RetryingFetcher<ReqwestFetcher>, HtmlCharacterParser>;

/// Build the configured source. Called once at startup.
pub fn build_source(config: &UpstreamConfig, kind: SourceKind) -> Result<AppSource, AppError> {
    match kind {
        SourceKind::Synthetic => {
            tracing::info!("Using synthetic character source");
            Ok(SelectedSource::Synthetic(SyntheticSource))
        }
        SourceKind::Live => {
            let fetcher = RetryingFetcher::new(ReqwestFetcher::from_config(config)?, config.retry.clone());
            let parser = HtmlCharacterParser::new()?;
            tracing::info!(
                servers = ?config.servers.names().collect::<Vec<_>>(),
                max_attempts = config.retry.max_attempts,
                "Using live character source"
            );
            Ok(SelectedSource::Live(LiveSource::new(
                fetcher,
                parser,
                Endpoints::from_config(config),
                config.detail_timeout,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use tierwatch_core::traits::CharacterSource;

    use super::*;

    #[tokio::test]
    async fn test_synthetic_source_needs_no_network() {
        let source = build_source(&UpstreamConfig::default(), SourceKind::Synthetic).unwrap();
        let c = source.fetch_character("Siel", "Aria").await.unwrap();
        assert!(c.is_synthetic);
        assert!(matches!(source, SelectedSource::Synthetic(_)));
    }

    #[test]
    fn test_live_source_builds_from_defaults() {
        let source = build_source(&UpstreamConfig::default(), SourceKind::Live).unwrap();
        assert!(matches!(source, SelectedSource::Live(_)));
    }

    #[test]
    fn test_bad_proxy_fails_at_startup() {
        let config = UpstreamConfig {
            proxy: Some("http://[::bad".into()),
            ..UpstreamConfig::default()
        };
        assert!(build_source(&config, SourceKind::Live).is_err());
    }
}
