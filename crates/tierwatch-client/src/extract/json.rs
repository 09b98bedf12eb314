//! Structured (JSON) upstream responses.
//!
//! The upstream has answered with several shapes over time: a bare object,
//! a search-result list, and objects wrapped in `data` or `result`. Every
//! logical field has a few known names.

use serde_json::{Map, Value};
use tierwatch_core::error::AppError;
use tierwatch_core::listing::ListingQuery;
use tierwatch_core::models::{CharacterProfile, FetchedCharacter, StatBundle};

use super::numeric::coerce;

const NAME: &[&str] = &["name", "characterName"];
const CLASS: &[&str] = &["class", "className", "job"];
const LEVEL: &[&str] = &["level", "characterLevel"];
const POWER: &[&str] = &["power", "combatPower", "rating"];
const STATS: &[&str] = &["stats", "attributes"];
const IMAGE: &[&str] = &["imageUrl", "image", "profileImage"];

/// Known spellings of each canonical stat.
const STAT_ALIASES: &[(&str, &[&str])] = &[
    ("attack", &["attack", "attackPower", "ap"]),
    ("damage_amp", &["damage_amp", "damageAmp", "magicBoost", "magic_boost"]),
    ("crit_rate", &["crit_rate", "critRate", "crit", "critical"]),
    ("crit_damage", &["crit_damage", "critDamage", "criticalDamage"]),
    ("attack_speed", &["attack_speed", "attackSpeed"]),
    ("defense", &["defense", "def", "physicalDefense"]),
    ("damage_reduction", &["damage_reduction", "damageReduction"]),
    ("hp", &["hp", "maxHp", "health"]),
];

/// Parse a JSON listing body into a complete character.
pub fn parse_character(body: &str, query: &ListingQuery<'_>) -> Result<FetchedCharacter, AppError> {
    let root: Value = serde_json::from_str(body).map_err(|e| {
        tracing::warn!(server = %query.server, name = %query.name, error = %e, "Malformed JSON response");
        AppError::ParseError("Invalid JSON structure".into())
    })?;

    let data = unwrap_envelope(root, query)?;
    let Value::Object(data) = data else {
        return Err(AppError::ParseError("Invalid JSON structure".into()));
    };

    let name = first_str(&data, NAME).unwrap_or(query.name).to_string();
    let class_name = first_str(&data, CLASS).unwrap_or("Unknown").to_string();
    let level = first_number(&data, LEVEL).unwrap_or(1).clamp(0, i32::MAX as i64) as i32;
    let power = first_number(&data, POWER).unwrap_or(0).max(0);
    let stats = STATS
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_object))
        .and_then(normalize_stats);
    let image_url = first_str(&data, IMAGE).map(str::to_string);

    tracing::info!(%name, level, power, has_stats = stats.is_some(), "Parsed JSON response");

    Ok(FetchedCharacter {
        server: query.server.to_string(),
        name,
        class_name,
        race: data.get("race").and_then(Value::as_str).map(str::to_string),
        level,
        power,
        stats,
        raw_payload: Some(Value::Object(data)),
        profile: CharacterProfile {
            image_url,
            equipment: Vec::new(),
        },
        is_synthetic: false,
    })
}

/// Map raw stat keys to canonical names. Unknown numeric keys are kept in
/// `extra`; non-numeric values are dropped. `None` when nothing is numeric.
pub fn normalize_stats(raw: &Map<String, Value>) -> Option<StatBundle> {
    let mut bundle = StatBundle::default();
    let mut found = false;
    for (key, value) in raw {
        let Some(n) = coerce(value) else {
            continue;
        };
        let canonical = STAT_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&key.as_str()))
            .map(|(canonical, _)| *canonical)
            .unwrap_or(key.as_str());
        bundle.set(canonical, n);
        found = true;
    }
    found.then_some(bundle)
}

fn unwrap_envelope(mut value: Value, query: &ListingQuery<'_>) -> Result<Value, AppError> {
    loop {
        value = match value {
            Value::Array(items) => match items.into_iter().next() {
                Some(first) => first,
                None => {
                    tracing::warn!(server = %query.server, name = %query.name, "Empty result list");
                    return Err(AppError::NotFound(format!("{}/{}", query.server, query.name)));
                }
            },
            Value::Object(mut map) => {
                if let Some(inner) = map.remove("data").or_else(|| map.remove("result")) {
                    inner
                } else {
                    return Ok(Value::Object(map));
                }
            }
            other => return Ok(other),
        };
    }
}

fn first_str<'a>(data: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| data.get(*k).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

fn first_number(data: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| data.get(*k).and_then(coerce))
}
