//! HTML extraction for the ranking listing and the character detail page.
//!
//! Each piece of the page is located by an ordered list of strategies; the
//! first one that yields something wins. A listing whose rows match none of
//! the row strategies is treated as a layout change.

use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use tierwatch_core::error::AppError;
use tierwatch_core::listing::{
    LISTING_FALLBACK_LEVEL, ListingOutcome, ListingQuery, ListingRow, looks_like_json,
};
use tierwatch_core::models::{CharacterProfile, EquipmentItem, FetchedCharacter, StatBundle};
use tierwatch_core::traits::CharacterParser;
use url::Url;

use super::json;
use super::numeric::{parse_level, parse_number};

/// Text the upstream shows instead of a character that does not exist.
const PAGE_NOT_FOUND_TEXT: &str = "페이지를 찾을 수 없습니다";

/// Detail-page stat labels, matched by substring in this order.
const STAT_LABELS: &[(&str, &str)] = &[
    ("치명타 피해", "crit_damage"),
    ("치명타", "crit_rate"),
    ("공격 속도", "attack_speed"),
    ("공격력", "attack"),
    ("마법 증폭력", "damage_amp"),
    ("피해 증폭", "damage_amp"),
    ("피해 감소", "damage_reduction"),
    ("방어력", "defense"),
    ("생명력", "hp"),
    ("Crit Damage", "crit_damage"),
    ("Crit", "crit_rate"),
    ("Attack Speed", "attack_speed"),
    ("Attack", "attack"),
    ("Damage Amp", "damage_amp"),
    ("Damage Reduction", "damage_reduction"),
    ("Defense", "defense"),
    ("HP", "hp"),
];

struct Selectors {
    row: Selector,
    cell: Selector,
    img: Selector,
    row_name: Selector,
    row_server: Selector,
    row_race: Selector,
    row_class: Selector,
    row_power: Selector,
    page_error: Selector,
    stat_item: Selector,
    stat_title: Selector,
    stat_value: Selector,
    profile_images: Vec<Selector>,
    equip_slots: Selector,
    equip_headers: Selector,
    equip_header_items: Selector,
    equip_list_items: Selector,
    item_name: Selector,
    info: Selector,
    info_level: Selector,
    info_class: Selector,
}

impl Selectors {
    fn compile() -> Result<Self, AppError> {
        Ok(Self {
            row: parse("tr")?,
            cell: parse("td")?,
            img: parse("img")?,
            row_name: parse(".title .text")?,
            row_server: parse(".server")?,
            row_race: parse(".race")?,
            row_class: parse(".class")?,
            row_power: parse(".power")?,
            page_error: parse(".page_error, .page-error")?,
            stat_item: parse(".status_list li, .status-list li")?,
            stat_title: parse(".tit")?,
            stat_value: parse(".val")?,
            profile_images: vec![
                parse(".character-frame img")?,
                parse(".profile_img img")?,
                parse(".character_img img")?,
            ],
            equip_slots: parse(".equip_slot, .item_slot, .slot_item")?,
            equip_headers: parse("h3, h4, strong")?,
            equip_header_items: parse("li, div[class*='slot']")?,
            equip_list_items: parse(".equip-list li, .equip_list li")?,
            item_name: parse(".name, .item_name")?,
            info: parse(".character_info, .profile_info")?,
            info_level: parse(".level, .lv")?,
            info_class: parse(".class, .job")?,
        })
    }
}

fn parse(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::ConfigError(format!("Invalid selector '{css}': {e}")))
}

type RowStrategy = fn(&Selectors, ElementRef<'_>) -> Option<ListingRow>;

/// Ways to read a listing row, most specific first.
const ROW_STRATEGIES: &[(&str, RowStrategy)] = &[
    ("class_selectors", row_from_classes),
    ("column_offsets", row_from_columns),
];

type EquipmentStrategy = for<'a> fn(&Selectors, &'a Html) -> Vec<ElementRef<'a>>;

/// Ways to find equipment slots on the detail page.
const EQUIPMENT_STRATEGIES: &[(&str, EquipmentStrategy)] = &[
    ("slot_classes", equipment_by_slot_class),
    ("section_header", equipment_by_header),
    ("equip_list", equipment_by_list),
];

/// [`CharacterParser`] for the upstream's server-rendered pages.
///
/// JSON bodies are delegated to the alias-aware JSON extractor.
#[derive(Clone)]
pub struct HtmlCharacterParser {
    selectors: Arc<Selectors>,
}

impl HtmlCharacterParser {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            selectors: Arc::new(Selectors::compile()?),
        })
    }
}

impl CharacterParser for HtmlCharacterParser {
    fn parse_listing(
        &self,
        body: &str,
        query: &ListingQuery<'_>,
    ) -> Result<ListingOutcome, AppError> {
        if looks_like_json(body) {
            return json::parse_character(body, query).map(ListingOutcome::Complete);
        }

        let document = Html::parse_document(body);
        let s = &*self.selectors;

        let mut data_rows = 0usize;
        let mut rows = Vec::new();
        for tr in document.select(&s.row) {
            if tr.select(&s.cell).next().is_none() {
                continue;
            }
            data_rows += 1;
            if let Some(row) = ROW_STRATEGIES.iter().find_map(|(_, strategy)| strategy(s, tr)) {
                rows.push(row);
            }
        }

        if data_rows > 0 && rows.is_empty() {
            tracing::error!(
                target: "structure_change",
                server = %query.server,
                name = %query.name,
                data_rows,
                strategies = ?ROW_STRATEGIES.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
                "Listing rows match no known layout"
            );
            return Err(AppError::ParseError("Structure mismatch".into()));
        }

        match select_row(rows, query) {
            Some(row) => {
                tracing::info!(
                    name = %row.name,
                    class = %row.class_name,
                    power = row.power,
                    has_key = row.char_key.is_some(),
                    "Parsed listing row"
                );
                Ok(ListingOutcome::Row(row))
            }
            None => {
                tracing::warn!(server = %query.server, name = %query.name, "Character not found in listing");
                Err(AppError::NotFound(format!("{}/{}", query.server, query.name)))
            }
        }
    }

    fn parse_detail(
        &self,
        body: &str,
        row: &ListingRow,
        server: &str,
    ) -> Option<FetchedCharacter> {
        let document = Html::parse_document(body);
        let s = &*self.selectors;

        if body.contains(PAGE_NOT_FOUND_TEXT) || document.select(&s.page_error).next().is_some() {
            tracing::warn!(%server, name = %row.name, "Detail page reports page error");
            return None;
        }

        let Some((stats, labels)) = read_stats(s, &document) else {
            tracing::error!(
                target: "structure_change",
                %server,
                name = %row.name,
                "Detail page has no stat list"
            );
            return None;
        };

        let image_url = s
            .profile_images
            .iter()
            .find_map(|sel| document.select(sel).find_map(|img| attr(img, "src")))
            .or_else(|| row.image_url.clone());

        let equipment = read_equipment(s, &document);

        let info = document.select(&s.info).next();
        let level = info
            .and_then(|el| el.select(&s.info_level).next())
            .and_then(|el| parse_level(&text(el)))
            .map(|lv| lv.clamp(0, i32::MAX as i64) as i32)
            .unwrap_or(LISTING_FALLBACK_LEVEL);
        let class_name = info
            .and_then(|el| el.select(&s.info_class).next())
            .map(text)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| row.class_name.clone());

        tracing::info!(
            %server,
            name = %row.name,
            level,
            equipment = equipment.len(),
            "Parsed detail page"
        );

        let raw_payload = serde_json::json!({
            "name": row.name,
            "server_label": row.server_label,
            "race": row.race,
            "class": class_name,
            "level": level,
            "power": row.power,
            "stats": labels,
            "char_key": row.char_key,
            "source": "detail",
        });

        Some(FetchedCharacter {
            server: server.to_string(),
            name: row.name.clone(),
            class_name,
            race: row.race.clone(),
            level,
            power: row.power,
            stats: Some(stats),
            raw_payload: Some(raw_payload),
            profile: CharacterProfile {
                image_url,
                equipment,
            },
            is_synthetic: false,
        })
    }
}

/// Prefer an exact (case-insensitive) name match, then the first row whose
/// name contains the query. Rows on another server are skipped when both
/// sides know the local label.
fn select_row(rows: Vec<ListingRow>, query: &ListingQuery<'_>) -> Option<ListingRow> {
    let wanted = query.name.to_lowercase();
    let on_server = |row: &ListingRow| match (query.local_label, row.server_label.as_deref()) {
        (Some(label), Some(row_label)) => label == row_label,
        _ => true,
    };

    let mut partial = None;
    for row in rows.into_iter().filter(|r| on_server(r)) {
        let name = row.name.to_lowercase();
        if name == wanted {
            return Some(row);
        }
        if partial.is_none() && name.contains(&wanted) {
            partial = Some(row);
        }
    }
    partial
}

fn row_from_classes(s: &Selectors, tr: ElementRef<'_>) -> Option<ListingRow> {
    let name = first_text(tr, &s.row_name)?;
    let class_name = first_text(tr, &s.row_class)?;
    let power = first_text(tr, &s.row_power).and_then(|p| parse_number(&p))?;
    let (char_key, image_url) = row_image(s, tr);
    Some(ListingRow {
        name,
        server_label: first_text(tr, &s.row_server),
        race: first_text(tr, &s.row_race),
        class_name,
        power: power.max(0),
        char_key,
        image_url,
    })
}

/// Leading rank/diff columns vary in count; the trailing
/// name, server, race, class, power columns do not.
fn row_from_columns(s: &Selectors, tr: ElementRef<'_>) -> Option<ListingRow> {
    let cells: Vec<String> = tr.select(&s.cell).map(text).collect();
    let n = cells.len();
    if n < 5 {
        return None;
    }
    let name = cells[n - 5].clone();
    if name.is_empty() {
        return None;
    }
    let (char_key, image_url) = row_image(s, tr);
    Some(ListingRow {
        name,
        server_label: non_empty(&cells[n - 4]),
        race: non_empty(&cells[n - 3]),
        class_name: cells[n - 2].clone(),
        power: parse_number(&cells[n - 1]).unwrap_or(0).max(0),
        char_key,
        image_url,
    })
}

fn row_image(s: &Selectors, tr: ElementRef<'_>) -> (Option<String>, Option<String>) {
    let src = tr.select(&s.img).find_map(|img| attr(img, "src"));
    let key = src.as_deref().and_then(char_key_from_src);
    (key, src)
}

/// The per-character key is carried as `charKey=<digits>` in the row image URL.
pub fn char_key_from_src(src: &str) -> Option<String> {
    let base = Url::parse("https://listing.invalid/").ok()?;
    let url = base.join(src).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "charKey")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
}

/// Stat bundle plus the labels as printed, or `None` when the list is absent.
fn read_stats(s: &Selectors, document: &Html) -> Option<(StatBundle, serde_json::Map<String, serde_json::Value>)> {
    let mut bundle = StatBundle::default();
    let mut labels = serde_json::Map::new();
    let mut seen = false;
    for li in document.select(&s.stat_item) {
        let (Some(title), Some(value)) = (first_text(li, &s.stat_title), first_text(li, &s.stat_value))
        else {
            continue;
        };
        seen = true;
        let number = parse_number(&value).unwrap_or(0);
        labels.insert(title.clone(), serde_json::Value::String(value));
        match STAT_LABELS.iter().find(|(label, _)| title.contains(label)) {
            Some((_, key)) => bundle.set(key, number),
            None => bundle.set(&title, number),
        }
    }
    seen.then_some((bundle, labels))
}

fn read_equipment(s: &Selectors, document: &Html) -> Vec<EquipmentItem> {
    let Some((strategy, slots)) = EQUIPMENT_STRATEGIES
        .iter()
        .map(|(name, strategy)| (*name, strategy(s, document)))
        .find(|(_, slots)| !slots.is_empty())
    else {
        return Vec::new();
    };
    tracing::debug!(strategy, slots = slots.len(), "Equipment located");

    slots
        .into_iter()
        .filter_map(|slot| first_text(slot, &s.item_name))
        .map(|name| EquipmentItem {
            enhance_level: enhance_level(&name),
            name,
        })
        .collect()
}

fn equipment_by_slot_class<'a>(s: &Selectors, document: &'a Html) -> Vec<ElementRef<'a>> {
    document.select(&s.equip_slots).collect()
}

fn equipment_by_header<'a>(s: &Selectors, document: &'a Html) -> Vec<ElementRef<'a>> {
    document
        .select(&s.equip_headers)
        .filter(|h| text(*h).contains("장비"))
        .filter_map(|h| {
            h.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "div")
        })
        .map(|container| container.select(&s.equip_header_items).collect::<Vec<_>>())
        .find(|items| !items.is_empty())
        .unwrap_or_default()
}

fn equipment_by_list<'a>(s: &Selectors, document: &'a Html) -> Vec<ElementRef<'a>> {
    document.select(&s.equip_list_items).collect()
}

/// `+12 Sword of Light` is enhanced to 12.
fn enhance_level(name: &str) -> i32 {
    name.strip_prefix('+')
        .map(|rest| rest.chars().take_while(char::is_ascii_digit).collect::<String>())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

fn text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect::<Vec<_>>().concat()
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(text)
        .filter(|t| !t.is_empty())
}

fn attr(el: ElementRef<'_>, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
