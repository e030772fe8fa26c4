//! HTTP collaborators for slotwatch
//!
//! Concrete implementations of the core capability traits:
//! - [`ReqwestFetcher`]: browser-like page and API fetching
//! - [`HtmlPageParser`] / [`ApiResponseParser`]: document interpretation
//! - [`TelegramNotifier`]: Bot API delivery

pub mod api;
pub mod error;
pub mod fetcher;
pub mod html;
pub mod telegram;

use std::sync::Arc;

use slotwatch_core::{
    AcquisitionPipeline, AcquisitionStrategy, DirectFetchStrategy, Fetcher, MonitorConfig,
    SecondaryApiStrategy,
};

pub use api::ApiResponseParser;
pub use error::{HttpError, Result};
pub use fetcher::{ReqwestFetcher, BROWSER_USER_AGENT};
pub use html::HtmlPageParser;
pub use telegram::{TelegramConfig, TelegramNotifier};

/// The production strategy order: direct page fetch, then the secondary API.
///
/// Both strategies share one fetcher so the connection pool is reused. API
/// requests are bounded by [`MonitorConfig::api_endpoint_timeout`].
pub fn standard_pipeline(config: &MonitorConfig) -> Result<AcquisitionPipeline> {
    let fetcher: Arc<dyn Fetcher> = Arc::new(ReqwestFetcher::with_timeout(config.strategy_timeout)?);

    let strategies: Vec<Arc<dyn AcquisitionStrategy>> = vec![
        Arc::new(DirectFetchStrategy::new(
            Arc::clone(&fetcher),
            Arc::new(HtmlPageParser::new()),
        )),
        Arc::new(
            SecondaryApiStrategy::new(
                fetcher,
                Arc::new(ApiResponseParser::new()),
                config.api_endpoints.clone(),
            )
            .with_request_timeout(config.api_endpoint_timeout()),
        ),
    ];

    Ok(AcquisitionPipeline::new(strategies, config.strategy_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    use slotwatch_core::fakes::StaticFetcher;
    use slotwatch_core::FetchResponse;

    #[tokio::test]
    async fn test_error_page_falls_through_to_api() {
        let config = MonitorConfig::default();
        let ctx = config.acquisition_context();

        for status in [404, 429] {
            let fetcher = Arc::new(StaticFetcher::new());
            fetcher.respond(
                &ctx.page_url(),
                FetchResponse::new(status, "<html><body><h1>404 Not Found</h1></body></html>"),
            );
            fetcher.respond(
                &ctx.endpoint_url("/api/sites/available"),
                FetchResponse::new(
                    200,
                    r#"{"sites":[{"name":"C존 A1","zone":"C ZONE","available":true}]}"#,
                ),
            );

            let strategies: Vec<Arc<dyn AcquisitionStrategy>> = vec![
                Arc::new(DirectFetchStrategy::new(
                    fetcher.clone(),
                    Arc::new(HtmlPageParser::new()),
                )),
                Arc::new(SecondaryApiStrategy::new(
                    fetcher.clone(),
                    Arc::new(ApiResponseParser::new()),
                    config.api_endpoints.clone(),
                )),
            ];
            let pipeline = AcquisitionPipeline::new(strategies, config.strategy_timeout);
            let result = pipeline.run(&ctx).await;

            assert_eq!(result.resolved_by, Some(SecondaryApiStrategy::NAME));
            assert_eq!(result.items.len(), 1);
            assert_eq!(result.items[0].name, "C존 A1");
            assert_eq!(fetcher.requested_urls().len(), 4);
        }
    }

    #[test]
    fn test_standard_pipeline_order() {
        let pipeline = standard_pipeline(&MonitorConfig::default()).unwrap();
        assert_eq!(
            pipeline.strategy_names(),
            vec![DirectFetchStrategy::NAME, SecondaryApiStrategy::NAME]
        );
    }
}
