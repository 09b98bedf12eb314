//! Deterministic placeholder characters.
//!
//! Used as the configured source in development and as the last resort of
//! the resolution policy. The same `(server, name)` always yields the same
//! character, so repeated placeholder answers never contradict each other.

use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::models::{CharacterProfile, FetchedCharacter, StatBundle};
use crate::traits::CharacterSource;

const CLASSES: [&str; 4] = ["Warrior", "Mage", "Ranger", "Priest"];

/// [`CharacterSource`] that never touches the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticSource;

impl CharacterSource for SyntheticSource {
    async fn fetch_character(
        &self,
        server: &str,
        name: &str,
    ) -> Result<FetchedCharacter, AppError> {
        let character = synthesize(server, name);
        tracing::info!(%server, %name, "Generated synthetic character");
        Ok(character)
    }
}

/// Build the placeholder for `(server, name)`.
pub fn synthesize(server: &str, name: &str) -> FetchedCharacter {
    let mut rng = SeededRng::for_identity(server, name);

    let class_name = CLASSES[rng.below(CLASSES.len() as u64) as usize];
    let level = rng.between(1, 100);
    let power = rng.between(10_000, 500_000);
    let stats = StatBundle {
        attack: rng.between(300, 1200),
        damage_amp: rng.between(50, 300),
        crit_rate: rng.between(20, 100),
        crit_damage: rng.between(150, 300),
        attack_speed: rng.between(80, 150),
        defense: rng.between(300, 1200),
        damage_reduction: rng.between(30, 100),
        hp: rng.between(5000, 20_000),
        ..Default::default()
    };

    // Shaped like an upstream payload, formatted numbers included.
    let raw_payload = serde_json::json!({
        "characterName": name,
        "serverName": server,
        "className": class_name,
        "level": level.to_string(),
        "combatPower": group_thousands(power),
        "stats": {
            "attack": group_thousands(stats.attack),
            "damageAmp": stats.damage_amp.to_string(),
            "critRate": format!("{}%", stats.crit_rate),
            "critDamage": format!("{}%", stats.crit_damage),
            "attackSpeed": stats.attack_speed.to_string(),
            "defense": group_thousands(stats.defense),
            "damageReduction": format!("{}%", stats.damage_reduction),
            "hp": group_thousands(stats.hp),
        }
    });

    FetchedCharacter {
        server: server.to_string(),
        name: name.to_string(),
        class_name: class_name.to_string(),
        race: None,
        level: level as i32,
        power,
        stats: Some(stats),
        raw_payload: Some(raw_payload),
        profile: CharacterProfile::default(),
        is_synthetic: true,
    }
}

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Length-prefixed so `("a:b", "c")` and `("a", "b:c")` seed differently.
fn identity_seed(server: &str, name: &str) -> String {
    format!("{}:{server}:{name}", server.len())
}

/// xorshift64 seeded from a SHA-256 of the identity.
struct SeededRng(u64);

impl SeededRng {
    fn for_identity(server: &str, name: &str) -> Self {
        let digest = Sha256::digest(identity_seed(server, name).as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        // xorshift must not start at zero.
        Self(u64::from_le_bytes(seed) | 1)
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }

    /// Inclusive range.
    fn between(&mut self, low: i64, high: i64) -> i64 {
        low + self.below((high - low + 1) as u64) as i64
    }
}
