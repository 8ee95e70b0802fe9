//! # Leaderboard Queries
//!
//! Point lookups and top-K ranking over the counter matrix. Rankings merge
//! persisted values with caller-supplied live overrides: an override
//! replaces the persisted value for its entity, and entities unknown to
//! the matrix enter the board when their override is positive.

use crate::matrix::MatrixStore;
use crate::model::{LeaderboardRow, MetricKey};
use crate::registry::IdRegistry;
use std::collections::HashMap;
use uuid::Uuid;

/// Current counter value for one (entity, metric) pair; 0 when either key
/// was never assigned or the cell was never written.
pub fn stat_of(
    registry: &IdRegistry,
    matrix: &MatrixStore,
    entity: Uuid,
    key: &MetricKey,
) -> i32 {
    let Some(entity) = registry.entity_id(entity) else {
        return 0;
    };
    let Some(metric) = registry.metric_id(key.as_str()) else {
        return 0;
    };
    matrix.read(metric, entity)
}

/// One page of the leaderboard for a metric, sorted descending by value.
///
/// Pages are 1-based. Ties keep enumeration order (persisted rows in dense
/// id order, then override-only rows), which is consistent within a call;
/// a page beyond the result set is empty. A metric that was never assigned
/// an id has no rows.
pub fn top(
    registry: &IdRegistry,
    matrix: &MatrixStore,
    key: &MetricKey,
    page: usize,
    page_size: usize,
    overrides: &HashMap<Uuid, i32>,
) -> Vec<LeaderboardRow> {
    let Some(metric) = registry.metric_id(key.as_str()) else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    let mut row_of: HashMap<Uuid, usize> = HashMap::new();
    matrix.for_each_in_metric(metric, registry.entity_count(), |id, value| {
        if let Some(entity) = registry.entity_at(id) {
            row_of.insert(entity, rows.len());
            rows.push(LeaderboardRow { entity, value });
        }
    });

    for (&entity, &value) in overrides {
        match row_of.get(&entity) {
            Some(&at) => rows[at].value = value,
            None if value > 0 => rows.push(LeaderboardRow { entity, value }),
            None => {}
        }
    }
    // Boards only show positive counters; an override may have zeroed a row.
    rows.retain(|row| row.value > 0);
    rows.sort_by(|a, b| b.value.cmp(&a.value));

    let start = page.saturating_sub(1) * page_size;
    if start >= rows.len() {
        return Vec::new();
    }
    let end = (start + page_size).min(rows.len());
    rows[start..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use tempfile::tempdir;

    struct Fixture {
        registry: IdRegistry,
        matrix: MatrixStore,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let config = StoreConfig::compact();
        let registry = IdRegistry::open(dir.path(), config.max_entities).unwrap();
        let matrix = MatrixStore::open(&dir.path().join("data.bin"), &config).unwrap();
        Fixture {
            registry,
            matrix,
            _dir: dir,
        }
    }

    impl Fixture {
        fn put(&self, entity: Uuid, key: &str, value: i32) {
            let id = self.registry.get_or_create_entity(entity).unwrap();
            let metric = self.registry.get_or_create_metric(key).unwrap();
            self.matrix.write(metric, id, value).unwrap();
        }
    }

    #[test]
    fn point_lookup_round_trips() {
        let fx = fixture();
        let a = Uuid::new_v4();
        fx.put(a, "mined/stone", 42);

        let key = MetricKey::from_full("mined/stone");
        assert_eq!(stat_of(&fx.registry, &fx.matrix, a, &key), 42);
        assert_eq!(stat_of(&fx.registry, &fx.matrix, Uuid::new_v4(), &key), 0);
        assert_eq!(
            stat_of(&fx.registry, &fx.matrix, a, &MetricKey::from_full("mined/dirt")),
            0
        );
    }

    #[test]
    fn rows_sort_descending() {
        let fx = fixture();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        fx.put(a, "killed/zombie", 10);
        fx.put(b, "killed/zombie", 30);

        let key = MetricKey::from_full("killed/zombie");
        let rows = top(&fx.registry, &fx.matrix, &key, 1, 10, &HashMap::new());
        assert_eq!(
            rows,
            vec![
                LeaderboardRow { entity: b, value: 30 },
                LeaderboardRow { entity: a, value: 10 },
            ]
        );
    }

    #[test]
    fn unknown_metric_has_no_rows() {
        let fx = fixture();
        fx.put(Uuid::new_v4(), "mined/stone", 5);
        let rows = top(
            &fx.registry,
            &fx.matrix,
            &MetricKey::from_full("mined/obsidian"),
            1,
            10,
            &HashMap::new(),
        );
        assert!(rows.is_empty());
    }

    #[test]
    fn pages_concatenate_to_the_full_ranking() {
        let fx = fixture();
        let key = MetricKey::from_full("mined/stone");
        for value in 1..=9 {
            fx.put(Uuid::new_v4(), "mined/stone", value);
        }

        let full = top(&fx.registry, &fx.matrix, &key, 1, 100, &HashMap::new());
        assert_eq!(full.len(), 9);

        let mut paged = Vec::new();
        for page in 1..=3 {
            paged.extend(top(&fx.registry, &fx.matrix, &key, page, 4, &HashMap::new()));
        }
        assert_eq!(paged, full);

        assert!(top(&fx.registry, &fx.matrix, &key, 4, 4, &HashMap::new()).is_empty());
    }

    #[test]
    fn overrides_replace_persisted_values() {
        let fx = fixture();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        fx.put(a, "killed/zombie", 10);
        fx.put(b, "killed/zombie", 30);

        let overrides = HashMap::from([(a, 50)]);
        let key = MetricKey::from_full("killed/zombie");
        let rows = top(&fx.registry, &fx.matrix, &key, 1, 10, &overrides);
        assert_eq!(
            rows,
            vec![
                LeaderboardRow { entity: a, value: 50 },
                LeaderboardRow { entity: b, value: 30 },
            ]
        );
    }

    #[test]
    fn positive_override_inserts_a_new_row() {
        let fx = fixture();
        let persisted = Uuid::new_v4();
        let live = Uuid::new_v4();
        fx.put(persisted, "killed/zombie", 10);

        let overrides = HashMap::from([(live, 4)]);
        let key = MetricKey::from_full("killed/zombie");
        let rows = top(&fx.registry, &fx.matrix, &key, 1, 10, &overrides);
        assert_eq!(
            rows,
            vec![
                LeaderboardRow { entity: persisted, value: 10 },
                LeaderboardRow { entity: live, value: 4 },
            ]
        );
    }

    #[test]
    fn override_to_zero_drops_the_row() {
        let fx = fixture();
        let a = Uuid::new_v4();
        fx.put(a, "killed/zombie", 10);

        let overrides = HashMap::from([(a, 0)]);
        let key = MetricKey::from_full("killed/zombie");
        assert!(top(&fx.registry, &fx.matrix, &key, 1, 10, &overrides).is_empty());
    }

    #[test]
    fn ties_keep_enumeration_order_within_a_call() {
        let fx = fixture();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // Dense ids in registration order: a=0, b=1, c=2.
        fx.put(a, "mined/stone", 5);
        fx.put(b, "mined/stone", 5);
        fx.put(c, "mined/stone", 5);

        let key = MetricKey::from_full("mined/stone");
        let rows = top(&fx.registry, &fx.matrix, &key, 1, 10, &HashMap::new());
        assert_eq!(
            rows.iter().map(|row| row.entity).collect::<Vec<_>>(),
            vec![a, b, c]
        );
    }
}
