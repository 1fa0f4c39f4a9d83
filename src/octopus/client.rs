use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use reqwest::{Client, Url};
use std::time::Duration;

use crate::config::OctopusConfig;
use crate::error::{AgileWatchError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::octopus::TariffSource;
use crate::octopus::types::{Region, UnitRate, UnitRatesPage};

/// Upper bound on followed `next` links for one fetch
const MAX_PAGES: usize = 10;

/// Octopus Energy REST client for Agile unit rates
pub struct OctopusClient {
    api_key: String,
    base_url: String,
    product_code: String,
    region: Region,
    client: Client,
    logger: StructuredLogger,
}

impl OctopusClient {
    /// Create a client with its own reusable HTTP session
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        product_code: impl Into<String>,
        region: Region,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("agilewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgileWatchError::config(format!("Failed to build HTTP client: {}", e)))?;
        let logger = get_logger_with_context(
            LogContext::new("octopus").with_field("region", region.to_string()),
        );
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            product_code: product_code.into(),
            region,
            client,
            logger,
        })
    }

    /// Build a client from the `octopus` configuration section
    pub fn from_config(cfg: &OctopusConfig) -> Result<Self> {
        let region = Region::parse(&cfg.region)?;
        Self::new(
            cfg.api_url.clone(),
            cfg.api_key.clone(),
            cfg.product_code.clone(),
            region,
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Full tariff code, e.g. `E-1R-AGILE-18-02-21-C`
    pub fn tariff_code(&self) -> String {
        format!("E-1R-{}-{}", self.product_code, self.region)
    }

    /// URL of the standard-unit-rates listing for the configured tariff
    pub fn unit_rates_url(&self) -> String {
        format!(
            "{}/products/{}/electricity-tariffs/{}/standard-unit-rates/",
            self.base_url,
            self.product_code,
            self.tariff_code()
        )
    }

    /// True when `link` shares scheme, host and port with the configured base URL
    fn same_origin(&self, link: &str) -> bool {
        match (Url::parse(&self.base_url), Url::parse(link)) {
            (Ok(base), Ok(link)) => base.origin() == link.origin(),
            _ => false,
        }
    }

    async fn get_page(&self, url: &str, params: &[(&str, String)]) -> Result<UnitRatesPage> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.api_key, Some(""))
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            self.logger
                .error(&format!("Tariff API returned status {}", status.as_u16()));
            return Err(AgileWatchError::data_unavailable(format!(
                "Unexpected response status ({})",
                status.as_u16()
            )));
        }

        let body = response.bytes().await?;
        self.logger
            .debug(&format!("Tariff API acquired {} bytes", body.len()));
        UnitRatesPage::from_slice(&body).map_err(|e| {
            AgileWatchError::data_unavailable(format!("Undecodable tariff response: {}", e))
        })
    }

    /// Fetch all unit rates valid between the two instants, following pagination
    pub async fn unit_rates(
        &self,
        period_from: &DateTime<Tz>,
        period_to: &DateTime<Tz>,
    ) -> Result<Vec<UnitRate>> {
        let params = vec![
            (
                "period_from",
                period_from.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (
                "period_to",
                period_to.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ];

        let mut page = self.get_page(&self.unit_rates_url(), &params).await?;
        let mut rates = std::mem::take(&mut page.results);
        let mut pages = 1;
        while let Some(next) = page.next.take() {
            if pages >= MAX_PAGES {
                self.logger.warn(&format!(
                    "Stopped following pagination after {} pages",
                    MAX_PAGES
                ));
                break;
            }
            // The credential only goes back to the configured host
            if !self.same_origin(&next) {
                self.logger
                    .error(&format!("Refusing pagination link to foreign origin: {}", next));
                return Err(AgileWatchError::data_unavailable(format!(
                    "Pagination link outside {}: {}",
                    self.base_url, next
                )));
            }
            // `next` already carries the query string
            page = self.get_page(&next, &[]).await?;
            rates.append(&mut page.results);
            pages += 1;
        }

        self.logger.info(&format!(
            "Tariff API acquired {} rates over {} page(s)",
            rates.len(),
            pages
        ));
        Ok(rates)
    }
}

#[async_trait]
impl TariffSource for OctopusClient {
    async fn fetch(
        &self,
        period_from: &DateTime<Tz>,
        period_to: &DateTime<Tz>,
    ) -> Result<Vec<UnitRate>> {
        self.unit_rates(period_from, period_to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::London;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const PATH: &str =
        "/products/AGILE-18-02-21/electricity-tariffs/E-1R-AGILE-18-02-21-C/standard-unit-rates/";

    fn client(url: String) -> OctopusClient {
        OctopusClient::new(
            url,
            "sk_test",
            "AGILE-18-02-21",
            Region::C,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn span() -> (DateTime<Tz>, DateTime<Tz>) {
        (
            London.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            London.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn builds_tariff_code_and_url() {
        let c = client("https://api.example.test/v1/".to_string());
        assert_eq!(c.tariff_code(), "E-1R-AGILE-18-02-21-C");
        assert_eq!(
            c.unit_rates_url(),
            format!("https://api.example.test/v1{}", PATH)
        );
    }

    #[tokio::test]
    async fn fetch_sends_period_and_basic_auth() {
        let mut server = Server::new_async().await;
        // base64("sk_test:")
        let mock = server
            .mock("GET", PATH)
            .match_header("authorization", "Basic c2tfdGVzdDo=")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("period_from".into(), "2024-01-01T00:00:00Z".into()),
                Matcher::UrlEncoded("period_to".into(), "2024-01-03T00:00:00Z".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "count": 2,
                    "next": null,
                    "previous": null,
                    "results": [
                        {"value_exc_vat": 9.5, "value_inc_vat": 9.975,
                         "valid_from": "2024-01-01T00:30:00Z", "valid_to": "2024-01-01T01:00:00Z"},
                        {"value_exc_vat": -2.0, "value_inc_vat": -2.1,
                         "valid_from": "2024-01-01T00:00:00Z", "valid_to": "2024-01-01T00:30:00Z"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (from, to) = span();
        let rates = client(server.url()).fetch(&from, &to).await.unwrap();
        assert_eq!(rates.len(), 2);
        assert!((rates[0].value_inc_vat - 9.975).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_follows_next_links() {
        let mut server = Server::new_async().await;
        let next = format!("{}/page2?page=2", server.url());
        let first = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "count": 2,
                    "next": next,
                    "results": [
                        {"value_inc_vat": 1.0, "valid_from": "2024-01-01T00:00:00Z"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/page2")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(
                json!({
                    "count": 2,
                    "next": null,
                    "results": [
                        {"value_inc_vat": 2.0, "valid_from": "2024-01-01T00:30:00Z"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (from, to) = span();
        let rates = client(server.url()).fetch(&from, &to).await.unwrap();
        assert_eq!(rates.len(), 2);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn next_link_to_other_host_is_not_followed() {
        let mut server = Server::new_async().await;
        let mut elsewhere = Server::new_async().await;
        let next = format!("{}/page2?page=2", elsewhere.url());
        let _first = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "count": 2,
                    "next": next,
                    "results": [
                        {"value_inc_vat": 1.0, "valid_from": "2024-01-01T00:00:00Z"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let foreign = elsewhere
            .mock("GET", "/page2")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let (from, to) = span();
        let err = client(server.url()).fetch(&from, &to).await.unwrap_err();
        assert!(matches!(err, AgileWatchError::DataUnavailable { .. }));
        foreign.assert_async().await;
    }

    #[test]
    fn same_origin_compares_scheme_host_and_port() {
        let c = client("https://api.example.test/v1".to_string());
        assert!(c.same_origin("https://api.example.test/v1/products/?page=2"));
        assert!(!c.same_origin("http://api.example.test/v1/products/?page=2"));
        assert!(!c.same_origin("https://evil.example.test/v1/products/?page=2"));
        assert!(!c.same_origin("https://api.example.test:8443/v1/"));
        assert!(!c.same_origin("not a url"));
    }

    #[tokio::test]
    async fn non_success_status_is_data_unavailable() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let (from, to) = span();
        let err = client(server.url()).fetch(&from, &to).await.unwrap_err();
        assert!(matches!(err, AgileWatchError::DataUnavailable { .. }));
        assert!(err.to_string().contains("503"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn undecodable_body_is_data_unavailable() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let (from, to) = span();
        let err = client(server.url()).fetch(&from, &to).await.unwrap_err();
        assert!(err.is_data_unavailable());
    }

    #[tokio::test]
    async fn transport_failure_is_data_unavailable() {
        // Nothing listens on port 9 locally
        let (from, to) = span();
        let err = client("http://127.0.0.1:9".to_string())
            .fetch(&from, &to)
            .await
            .unwrap_err();
        assert!(matches!(err, AgileWatchError::DataUnavailable { .. }));
    }
}
