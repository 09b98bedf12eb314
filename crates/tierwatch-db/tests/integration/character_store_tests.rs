use chrono::Utc;
use tierwatch_core::models::{
    Contributions, RankingEntry, RankingSnapshot, ScoreUpdate, ServerAverageStats, StatBundle,
};
use tierwatch_core::testutil::sample_fetched;
use tierwatch_core::traits::{CharacterStore, ScoringStore};
use tierwatch_db::CharacterRepository;

use crate::integration::common::setup_test_db;

fn score(character_id: i64, power_index: i64, tier_rank: &str) -> ScoreUpdate {
    ScoreUpdate {
        character_id,
        power_index,
        contributions: Contributions {
            attack: 40,
            damage_amp: 20,
            crit: 20,
            attack_speed: 10,
            survive: 10,
        },
        tier_rank: tier_rank.to_string(),
        percentile: 12.5,
    }
}

#[tokio::test]
async fn save_and_get_character() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    let saved = repo
        .save_character(&sample_fetched("Siel", "Aria"))
        .await
        .unwrap();
    assert!(saved.id > 0);
    assert!(saved.score.is_none());

    let loaded = repo.get_character("Siel", "Aria").await.unwrap().unwrap();
    assert_eq!(loaded.id, saved.id);
    assert_eq!(loaded.class_name, "Mage");
    assert_eq!(loaded.power, 120_000);
    assert_eq!(loaded.stats.unwrap().attack, 650);
    assert!(!loaded.is_synthetic);
}

#[tokio::test]
async fn get_missing_character_returns_none() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    assert!(repo.get_character("Siel", "Nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn identity_is_case_sensitive_and_per_server() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    let a = repo.save_character(&sample_fetched("Siel", "Aria")).await.unwrap();
    let b = repo.save_character(&sample_fetched("Siel", "aria")).await.unwrap();
    let c = repo.save_character(&sample_fetched("Israphel", "Aria")).await.unwrap();

    assert_ne!(a.id, b.id);
    assert_ne!(a.id, c.id);
}

#[tokio::test]
async fn upsert_overwrites_fields_and_keeps_score() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    let first = repo.save_character(&sample_fetched("Siel", "Aria")).await.unwrap();
    repo.save_score(&score(first.id, 1500, "A")).await.unwrap();

    let mut updated = sample_fetched("Siel", "Aria");
    updated.level = 50;
    updated.power = 150_000;
    let second = repo.save_character(&updated).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.level, 50);
    assert_eq!(second.power, 150_000);
    assert!(second.fetched_at >= first.fetched_at);
    let kept = second.score.expect("score should survive the upsert");
    assert_eq!(kept.power_index, 1500);
    assert_eq!(kept.tier_rank, "A");
}

#[tokio::test]
async fn each_save_with_stats_appends_history() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    repo.save_character(&sample_fetched("Siel", "Aria")).await.unwrap();
    let mut stronger = sample_fetched("Siel", "Aria");
    stronger.power = 130_000;
    repo.save_character(&stronger).await.unwrap();

    let mut no_stats = sample_fetched("Siel", "Aria");
    no_stats.stats = None;
    repo.save_character(&no_stats).await.unwrap();

    let history = repo.stat_history("Siel", "Aria", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].power, 130_000);
    assert_eq!(history[1].power, 120_000);

    let limited = repo.stat_history("Siel", "Aria", 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn save_without_stats_keeps_stored_stats() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    repo.save_character(&sample_fetched("Siel", "Aria")).await.unwrap();
    let mut listing_only = sample_fetched("Siel", "Aria");
    listing_only.stats = None;
    listing_only.power = 125_000;
    let saved = repo.save_character(&listing_only).await.unwrap();

    assert_eq!(saved.power, 125_000);
    assert_eq!(saved.stats.expect("stats should survive").attack, 650);

    let scorable = repo.scorable_characters().await.unwrap();
    assert_eq!(scorable.len(), 1);
    assert_eq!(scorable[0].name, "Aria");
}

#[tokio::test]
async fn purge_removes_synthetic_rows_and_their_history() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    repo.save_character(&sample_fetched("Siel", "Real")).await.unwrap();
    let mut fake = sample_fetched("Siel", "Ghost");
    fake.is_synthetic = true;
    repo.save_character(&fake).await.unwrap();

    assert_eq!(repo.purge_synthetic().await.unwrap(), 1);
    assert!(repo.get_character("Siel", "Ghost").await.unwrap().is_none());
    assert!(repo.stat_history("Siel", "Ghost", 10).await.unwrap().is_empty());
    assert!(repo.get_character("Siel", "Real").await.unwrap().is_some());
    assert_eq!(repo.purge_synthetic().await.unwrap(), 0);
}

#[tokio::test]
async fn scorable_characters_skip_rows_without_stats() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    repo.save_character(&sample_fetched("Siel", "Aria")).await.unwrap();
    let mut bare = sample_fetched("Siel", "Bare");
    bare.stats = None;
    repo.save_character(&bare).await.unwrap();

    let scorable = repo.scorable_characters().await.unwrap();
    assert_eq!(scorable.len(), 1);
    assert_eq!(scorable[0].name, "Aria");
    assert_eq!(scorable[0].stats.hp, 11_000);
}

#[tokio::test]
async fn server_averages_are_replaced_per_server() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    let mut averages = ServerAverageStats {
        server: "Siel".into(),
        averages: StatBundle::population_defaults(),
        sample_size: 4,
        updated_at: Utc::now(),
    };
    repo.replace_server_averages(&averages).await.unwrap();
    averages.sample_size = 9;
    averages.averages.attack = 700;
    repo.replace_server_averages(&averages).await.unwrap();

    let stored = repo.server_averages().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].sample_size, 9);
    assert_eq!(stored[0].averages.attack, 700);
}

#[tokio::test]
async fn ranked_entries_order_by_power_index() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    let a = repo.save_character(&sample_fetched("Siel", "Aria")).await.unwrap();
    let b = repo.save_character(&sample_fetched("Siel", "Bran")).await.unwrap();
    let c = repo.save_character(&sample_fetched("Israphel", "Cato")).await.unwrap();
    repo.save_character(&sample_fetched("Siel", "Unscored")).await.unwrap();

    repo.apply_scores(&[score(a.id, 900, "B"), score(b.id, 1800, "S"), score(c.id, 1200, "A")])
        .await
        .unwrap();

    let siel = repo.ranked_entries(Some("Siel")).await.unwrap();
    let names: Vec<_> = siel.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["Bran", "Aria"]);

    let all = repo.ranked_entries(None).await.unwrap();
    let names: Vec<_> = all.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["Bran", "Cato", "Aria"]);

    assert_eq!(repo.power_indices("Siel").await.unwrap().len(), 2);
}

#[tokio::test]
async fn ranking_snapshot_is_swapped_whole() {
    let (pool, _container) = setup_test_db().await;
    let repo = CharacterRepository::new(pool);

    let entry = |name: &str, power_index: i64| RankingEntry {
        rank: 0,
        name: name.into(),
        server: "Siel".into(),
        class_name: "Mage".into(),
        level: 45,
        power: 100_000,
        power_index,
        tier_rank: "A".into(),
    };

    let first = RankingSnapshot::from_ordered("Siel", vec![entry("Aria", 900)], 100);
    repo.replace_ranking_snapshot(&first).await.unwrap();
    let second = RankingSnapshot::from_ordered(
        "Siel",
        vec![entry("Bran", 1800), entry("Aria", 900)],
        1,
    );
    repo.replace_ranking_snapshot(&second).await.unwrap();

    let stored = repo.ranking_snapshot("Siel").await.unwrap().unwrap();
    assert_eq!(stored.entries.len(), 2);
    assert_eq!(stored.entries[0].rank, 1);
    assert_eq!(stored.top.len(), 1);
    assert_eq!(stored.top[0].name, "Bran");
    assert!(repo.ranking_snapshot("all").await.unwrap().is_none());
}
