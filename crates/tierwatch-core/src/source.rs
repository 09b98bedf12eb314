//! The live acquisition pipeline and the process-wide source selection.
//!
//! A live lookup is a two-page walk: the listing page locates the character
//! (or the upstream answers with JSON and we are done), then the detail
//! page enriches it. Anything that goes wrong on the detail step degrades to
//! the listing row instead of failing the lookup.

use std::time::Duration;

use crate::config::{ServerDirectory, UpstreamConfig};
use crate::error::AppError;
use crate::listing::{ListingOutcome, ListingQuery};
use crate::models::FetchedCharacter;
use crate::synthetic::SyntheticSource;
use crate::traits::{CharacterParser, CharacterSource, Fetcher};

/// Upstream URL templates plus the server directory they are filled from.
///
/// Templates use `{server_id}`, `{name}` and `{char_key}` placeholders.
#[derive(Debug, Clone)]
pub struct Endpoints {
    listing: String,
    detail: String,
    servers: ServerDirectory,
}

impl Endpoints {
    pub fn new(
        listing: impl Into<String>,
        detail: impl Into<String>,
        servers: ServerDirectory,
    ) -> Self {
        Self {
            listing: listing.into(),
            detail: detail.into(),
            servers,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(
            config.listing_url.clone(),
            config.detail_url.clone(),
            config.servers.clone(),
        )
    }

    /// Unknown servers get an empty id; the listing then spans all servers.
    pub fn listing_url(&self, server: &str, name: &str) -> String {
        self.listing
            .replace("{server_id}", &encode(self.server_id(server)))
            .replace("{name}", &encode(name))
    }

    pub fn detail_url(&self, server: &str, char_key: &str) -> String {
        self.detail
            .replace("{server_id}", &encode(self.server_id(server)))
            .replace("{char_key}", &encode(char_key))
    }

    pub fn local_label(&self, server: &str) -> Option<&str> {
        self.servers.get(server)?.local_label.as_deref()
    }

    fn server_id(&self, server: &str) -> &str {
        self.servers
            .get(server)
            .map(|e| e.upstream_id.as_str())
            .unwrap_or("")
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Live [`CharacterSource`]: fetch, locate, navigate, extract.
#[derive(Clone)]
pub struct LiveSource<F, P> {
    fetcher: F,
    parser: P,
    endpoints: Endpoints,
    detail_timeout: Duration,
}

impl<F: Fetcher, P: CharacterParser> LiveSource<F, P> {
    pub fn new(fetcher: F, parser: P, endpoints: Endpoints, detail_timeout: Duration) -> Self {
        Self {
            fetcher,
            parser,
            endpoints,
            detail_timeout,
        }
    }
}

impl<F: Fetcher, P: CharacterParser> CharacterSource for LiveSource<F, P> {
    async fn fetch_character(
        &self,
        server: &str,
        name: &str,
    ) -> Result<FetchedCharacter, AppError> {
        let url = self.endpoints.listing_url(server, name);
        tracing::info!(%server, %name, %url, "Fetching listing");
        let body = self.fetcher.fetch(&url).await?;

        let query = ListingQuery {
            server,
            name,
            local_label: self.endpoints.local_label(server),
        };
        let row = match self.parser.parse_listing(&body, &query)? {
            ListingOutcome::Complete(character) => return Ok(character),
            ListingOutcome::Row(row) => row,
        };

        let Some(char_key) = row.char_key.clone() else {
            tracing::warn!(%server, %name, "Listing row has no detail key, using row data");
            return Ok(row.into_character(server));
        };

        let detail_url = self.endpoints.detail_url(server, &char_key);
        tracing::debug!(%server, %name, url = %detail_url, "Navigating to detail page");
        match tokio::time::timeout(self.detail_timeout, self.fetcher.fetch(&detail_url)).await {
            Ok(Ok(detail)) => {
                if let Some(character) = self.parser.parse_detail(&detail, &row, server) {
                    return Ok(character);
                }
                tracing::warn!(%server, %name, "Detail page unusable, using row data");
            }
            Ok(Err(e)) => {
                tracing::warn!(%server, %name, error = %e, "Detail fetch failed, using row data");
            }
            Err(_) => {
                tracing::warn!(
                    %server,
                    %name,
                    timeout_ms = %self.detail_timeout.as_millis(),
                    "Detail navigation timed out, using row data"
                );
            }
        }
        Ok(row.into_character(server))
    }
}

/// The source chosen once at startup.
#[derive(Clone)]
pub enum SelectedSource<F, P> {
    Live(LiveSource<F, P>),
    Synthetic(SyntheticSource),
}

impl<F: Fetcher, P: CharacterParser> CharacterSource for SelectedSource<F, P> {
    async fn fetch_character(
        &self,
        server: &str,
        name: &str,
    ) -> Result<FetchedCharacter, AppError> {
        match self {
            SelectedSource::Live(source) => source.fetch_character(server, name).await,
            SelectedSource::Synthetic(source) => source.fetch_character(server, name).await,
        }
    }
}
