use crate::models::{ServerAverageStats, StatBundle, narrow};

/// Averages to score a character on `server` against.
///
/// Uses the server's own means when it has a sample, otherwise the
/// sample-size-weighted mean over every server, otherwise fixed defaults.
pub fn baseline_for(server: &str, all: &[ServerAverageStats]) -> StatBundle {
    if let Some(own) = all
        .iter()
        .find(|a| a.server == server && a.sample_size > 0)
    {
        return own.averages.clone();
    }
    weighted_average(all).unwrap_or_else(StatBundle::population_defaults)
}

/// Sample-size-weighted mean across servers (integer division).
pub fn weighted_average(all: &[ServerAverageStats]) -> Option<StatBundle> {
    let total: i128 = all.iter().map(|a| i128::from(a.sample_size.max(0))).sum();
    if total == 0 {
        return None;
    }
    let mut out = StatBundle::default();
    for key in StatBundle::KEYS {
        let weighted: i128 = all
            .iter()
            .map(|a| i128::from(a.averages.get(key).unwrap_or(0)) * i128::from(a.sample_size.max(0)))
            .sum();
        out.set(key, narrow(weighted.div_euclid(total)));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn averages(server: &str, attack: i64, sample_size: i64) -> ServerAverageStats {
        ServerAverageStats {
            server: server.into(),
            averages: StatBundle {
                attack,
                ..StatBundle::population_defaults()
            },
            sample_size,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn prefers_the_servers_own_averages() {
        let all = [averages("Siel", 800, 20), averages("Israphel", 400, 20)];
        assert_eq!(baseline_for("Siel", &all).attack, 800);
    }

    #[test]
    fn falls_back_to_weighted_population_mean() {
        let all = [
            averages("Siel", 900, 30),
            averages("Israphel", 500, 10),
            averages("Ex", 100, 0),
        ];
        // (900*30 + 500*10) / 40 = 800
        assert_eq!(baseline_for("Ex", &all).attack, 800);
        assert_eq!(baseline_for("Nezakan", &all).attack, 800);
    }

    #[test]
    fn weighted_average_survives_huge_averages() {
        let all = [
            averages("Siel", i64::MAX, i64::MAX),
            averages("Israphel", i64::MAX, 3),
        ];
        assert_eq!(weighted_average(&all).unwrap().attack, i64::MAX);
    }

    #[test]
    fn falls_back_to_defaults_without_population() {
        assert_eq!(baseline_for("Siel", &[]), StatBundle::population_defaults());
        assert_eq!(
            baseline_for("Siel", &[averages("Siel", 900, 0)]),
            StatBundle::population_defaults()
        );
    }
}
