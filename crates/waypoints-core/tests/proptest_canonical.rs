use chrono::Duration;
use proptest::prelude::*;
use std::sync::Arc;
use waypoints_core::autolink::AutoLinker;
use waypoints_core::clock::ManualClock;
use waypoints_core::id::SequentialIds;
use waypoints_core::model::ItemKind;
use waypoints_core::repo::ItemRepository;
use waypoints_core::store::MemoryStore;
use waypoints_core::validate::NewItem;

const SPELLINGS: [&str; 4] = ["Design", "design", "DESIGN", "dEsIgN"];

fn arb_spelling() -> impl Strategy<Value = &'static str> {
    prop::sample::select(SPELLINGS.to_vec())
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    /// Members are created with arbitrary (often equal) clock steps and
    /// arbitrary casing; the oldest (first-inserted on ties) is canonical and
    /// exactly one enriched member says so.
    #[test]
    fn canonical_is_oldest_and_unique(
        steps in prop::collection::vec((0i64..3, arb_spelling()), 2..12),
        deleted in prop::collection::vec(any::<bool>(), 12),
    ) {
        let clock = Arc::new(ManualClock::from_millis(1_700_000_000_000));
        let store = MemoryStore::new();
        let repo = ItemRepository::new(&store, clock.clone(), Arc::new(SequentialIds::new("p")));

        let mut created = Vec::new();
        for (step, spelling) in &steps {
            clock.advance(Duration::milliseconds(*step));
            created.push(repo.create(&NewItem::new(*spelling, ItemKind::Waypoint)).expect("create"));
        }
        for (item, drop) in created.iter().zip(&deleted) {
            if *drop {
                repo.soft_delete(&item.id).expect("delete");
            }
        }

        let survivors: Vec<_> = created
            .iter()
            .zip(&deleted)
            .filter(|(_, drop)| !**drop)
            .map(|(item, _)| item.clone())
            .collect();

        let links = AutoLinker::new(&repo);
        let group = links.find_group("design").expect("group");
        prop_assert_eq!(
            group.iter().map(|i| i.id.clone()).collect::<Vec<_>>(),
            survivors.iter().map(|i| i.id.clone()).collect::<Vec<_>>()
        );

        let min_created = survivors.iter().map(|i| i.created_at).min();
        let canonical = links.canonical_for("DESIGN").expect("canonical");
        prop_assert_eq!(canonical.as_ref().map(|c| c.created_at), min_created);
        prop_assert_eq!(canonical.map(|c| c.id), survivors.first().map(|i| i.id.clone()));

        if survivors.len() >= 2 {
            let enriched = links.enrich(&survivors).expect("enrich");
            let canonical_count = enriched
                .iter()
                .filter(|e| e.is_canonical == Some(true))
                .count();
            prop_assert_eq!(canonical_count, 1);
            for e in &enriched {
                prop_assert_eq!(
                    e.linked_instances.as_ref().map(Vec::len),
                    Some(survivors.len() - 1)
                );
            }
        }
    }

    #[test]
    fn invalid_points_never_reach_the_store(points in i64::MIN..0) {
        let store = MemoryStore::new();
        let repo = ItemRepository::new(
            &store,
            Arc::new(ManualClock::from_millis(0)),
            Arc::new(SequentialIds::new("v")),
        );
        let err = repo
            .create(&NewItem::new("x", ItemKind::Step).with_points(points))
            .expect_err("negative points");
        prop_assert!(err.validation().is_some_and(|v| v.has_field("points")));
        prop_assert!(repo.get_all().expect("read").is_empty());
    }
}
