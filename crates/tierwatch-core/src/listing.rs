//! Intermediate shapes produced while reading the upstream listing page.

use crate::models::{CharacterProfile, FetchedCharacter};

/// Level reported when only the listing row is available.
pub const LISTING_FALLBACK_LEVEL: i32 = 60;

/// What we are looking for on a listing page.
#[derive(Debug, Clone, Copy)]
pub struct ListingQuery<'a> {
    pub server: &'a str,
    pub name: &'a str,
    /// Server name as the listing prints it; constrains exact matches.
    pub local_label: Option<&'a str>,
}

/// The listing row that matched a query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingRow {
    pub name: String,
    pub server_label: Option<String>,
    pub race: Option<String>,
    pub class_name: String,
    pub power: i64,
    /// Upstream id needed for detail navigation.
    pub char_key: Option<String>,
    pub image_url: Option<String>,
}

impl ListingRow {
    /// Degraded record built from the row alone.
    pub fn into_character(self, server: &str) -> FetchedCharacter {
        let raw_payload = serde_json::json!({
            "name": self.name,
            "server_label": self.server_label,
            "race": self.race,
            "class": self.class_name,
            "power": self.power,
            "img_src": self.image_url,
            "source": "listing",
        });
        FetchedCharacter {
            server: server.to_string(),
            name: self.name,
            class_name: self.class_name,
            race: self.race,
            level: LISTING_FALLBACK_LEVEL,
            power: self.power,
            stats: None,
            raw_payload: Some(raw_payload),
            profile: CharacterProfile {
                image_url: self.image_url,
                equipment: Vec::new(),
            },
            is_synthetic: false,
        }
    }
}

/// Result of reading the first upstream response.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingOutcome {
    /// The upstream answered with structured data; no detail step needed.
    Complete(FetchedCharacter),
    /// An HTML listing row matched; detail navigation may enrich it.
    Row(ListingRow),
}

/// True when the body should be read as JSON rather than HTML.
pub fn looks_like_json(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}
