use colplan_common::{
    ClusteredGroup, Column, ColumnFilter, ColumnId, ColumnType, Datum, Endpoint, SargInterval, SargSequence, SecondaryIndex, StorageId, TableId, TableSchema,
};
use colplan_core::query::planner::{CostModel, SelectionMethod};
use colplan_core::reference::{Evaluator, MemoryTable};
use colplan_core::statistics::ColumnProfile;
use colplan_core::{Assignment, BitmapPlanComposer, IndexSelector, PlannerConfig, Projected, ScanRequest, StatisticsCollector};
use proptest::prelude::*;
use std::collections::BTreeMap;

const T: TableId = TableId(1);
const DELETION: StorageId = StorageId(9);

fn schema() -> TableSchema {
    TableSchema {
        id: T,
        name: "t".into(),
        columns: (0..3)
            .map(|i| Column {
                id: ColumnId(i),
                name: format!("c{i}"),
                ty: ColumnType::Integer,
                nullable: true,
            })
            .collect(),
        groups: vec![ClusteredGroup {
            id: StorageId(1),
            name: "g".into(),
            columns: (0..3).map(ColumnId).collect(),
        }],
    }
}

#[derive(Debug, Clone)]
struct Instance {
    indexes: Vec<SecondaryIndex>,
    filters: Vec<ColumnFilter>,
    stats: Vec<(f64, u64)>,
}

impl Instance {
    fn collector(&self) -> StatisticsCollector {
        let stats = StatisticsCollector::new();
        stats.set_row_count(T, 1_000_000.0);
        stats.set_page_count(StorageId(1), 20_000);
        stats.register_index(T, SecondaryIndex::deletion(DELETION, "del"));
        stats.set_page_count(DELETION, 2);
        for (column, (cardinality, _)) in self.stats.iter().enumerate() {
            stats.analyze_column(T, ColumnProfile::new(ColumnId(column as u32), *cardinality).with_range(0, 1000));
        }
        for (index, (_, pages)) in self.indexes.iter().zip(&self.stats) {
            stats.register_index(T, index.clone());
            stats.set_page_count(index.id, *pages);
        }
        stats
    }
}

fn instance() -> impl Strategy<Value = Instance> {
    let filter = prop::option::of((any::<bool>(), 0i64..900));
    let index = (0u32..3, prop::option::of(0u32..3));
    (
        prop::collection::vec(filter, 3),
        prop::collection::vec(index, 1..=3),
        prop::collection::vec((2.0f64..5000.0, 1u64..500), 3),
    )
        .prop_map(|(filters, indexes, stats)| {
            let filters = filters
                .into_iter()
                .enumerate()
                .filter_map(|(column, f)| {
                    let (point, low) = f?;
                    let sarg = if point {
                        SargSequence::point(Datum::Int(low))
                    } else {
                        SargSequence::interval(SargInterval::new(Endpoint::closed(Datum::Int(low)), Endpoint::closed(Datum::Int(low + 100))))
                    };
                    Some(ColumnFilter::new(ColumnId(column as u32), sarg))
                })
                .collect();
            let indexes = indexes
                .into_iter()
                .enumerate()
                .map(|(i, (first, second))| {
                    let mut keys = vec![ColumnId(first)];
                    if let Some(second) = second.filter(|s| *s != first) {
                        keys.push(ColumnId(second));
                    }
                    SecondaryIndex::unclustered(StorageId(10 + i as u64), &format!("i{i}"), keys, false)
                })
                .collect();
            Instance { indexes, filters, stats }
        })
}

/// Every assignment that respects the prefix invariant, built independently
/// of the selector's search.
fn enumerate(indexes: &[SecondaryIndex], filters: &colplan_common::FilterLists) -> Vec<Assignment> {
    let mut lengths: Vec<Vec<usize>> = vec![Vec::new()];
    for index in indexes {
        lengths = lengths
            .into_iter()
            .flat_map(|prefix| {
                (0..=index.key_len()).map(move |len| {
                    let mut next = prefix.clone();
                    next.push(len);
                    next
                })
            })
            .collect();
    }

    let mut out = Vec::new();
    'combos: for combo in lengths {
        let mut filter_to_index = BTreeMap::new();
        let mut matched = BTreeMap::new();
        for (index, len) in indexes.iter().zip(combo) {
            for pos in 0..len {
                let column = index.key_columns[pos];
                let Some(filter) = filters.get(column) else {
                    continue 'combos;
                };
                if filter_to_index.insert(column, index.id).is_some() || (pos + 1 < len && !filter.is_point()) {
                    continue 'combos;
                }
            }
            if len > 0 {
                matched.insert(index.id, len);
            }
        }
        out.push(Assignment::from_parts(filter_to_index, matched));
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_selector_matches_exhaustive_minimum(instance in instance()) {
        let stats = instance.collector();
        let config = PlannerConfig::default();
        let selection = IndexSelector::new(&stats, &config).select(&schema(), &instance.filters).unwrap();
        prop_assume!(selection.method == SelectionMethod::CostBased);

        let model = CostModel::new(&stats, &schema(), &config.cost).unwrap();
        let best = enumerate(&selection.indexes, &selection.filters)
            .iter()
            .filter_map(|a| model.assignment_cost(a, &selection.indexes, &selection.filters))
            .map(|c| c.total)
            .fold(f64::INFINITY, f64::min);
        let chosen = selection.cost.unwrap().total;
        prop_assert!(chosen <= best + 1e-9 * best.abs().max(1.0), "chosen {} > exhaustive {}", chosen, best);
    }

    #[test]
    fn prop_candidates_respect_prefix_invariant(instance in instance()) {
        let stats = instance.collector();
        let config = PlannerConfig::default();
        let selection = IndexSelector::new(&stats, &config).select(&schema(), &instance.filters).unwrap();
        selection.assignment.validate(&selection.indexes, &selection.filters).unwrap();

        for candidate in selection.candidates().unwrap() {
            prop_assert_eq!(candidate.matched_len, candidate.filters.len());
            for (pos, filter) in candidate.filters.iter().enumerate() {
                prop_assert_eq!(filter.column, candidate.index.key_columns[pos]);
                if pos + 1 < candidate.matched_len {
                    prop_assert!(filter.is_point());
                }
            }
        }
    }

    #[test]
    fn prop_composition_is_deterministic(instance in instance()) {
        let stats = instance.collector();
        let config = PlannerConfig::default();
        let composer = BitmapPlanComposer::new(&stats, &config);
        let projection = vec![Projected::Column(ColumnId(0)), Projected::Rid];

        let first = composer.compose(&ScanRequest::new(schema(), instance.filters.clone(), projection.clone())).unwrap();
        let mut reversed = instance.filters.clone();
        reversed.reverse();
        let second = composer.compose(&ScanRequest::new(schema(), reversed, projection)).unwrap();

        prop_assert_eq!(first.shape, second.shape);
        prop_assert_eq!(first.graph.fingerprint(), second.graph.fingerprint());
    }

    #[test]
    fn prop_deletion_only_scan_round_trips(rows in 1usize..120, deletes in prop::collection::btree_set(0u64..120, 0..40)) {
        let mut table = MemoryTable::new(schema(), SecondaryIndex::deletion(DELETION, "del"));
        for i in 0..rows as i64 {
            table.load(vec![Datum::Int(i), Datum::Int(i % 7), Datum::Null]).unwrap();
        }
        for rid in deletes {
            table.delete(colplan_common::Rid(rid));
        }
        let stats = StatisticsCollector::new();
        table.analyze(&stats);
        let config = PlannerConfig::default();

        let plan = BitmapPlanComposer::new(&stats, &config)
            .compose(&ScanRequest::new(schema(), Vec::new(), vec![Projected::Rid]))
            .unwrap();
        let stored = table.stored_row_count();
        let deleted_stored = table.rows().filter(|(rid, _)| table.is_deleted(*rid)).count() as u64;

        let mut eval = Evaluator::new(&mut table);
        eval.run(&plan.graph).unwrap();
        prop_assert_eq!(eval.rows(plan.root).unwrap().len() as u64, stored - deleted_stored);
    }
}

#[test]
fn test_identical_inputs_give_identical_graphs() {
    let instance = Instance {
        indexes: vec![
            SecondaryIndex::unclustered(StorageId(10), "i0", vec![ColumnId(0)], false),
            SecondaryIndex::unclustered(StorageId(11), "i1", vec![ColumnId(1), ColumnId(2)], false),
        ],
        filters: vec![
            ColumnFilter::new(ColumnId(1), SargSequence::point(Datum::Int(3))),
            ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(7))),
            ColumnFilter::new(ColumnId(2), SargSequence::point(Datum::Int(1))),
        ],
        stats: vec![(800.0, 40), (900.0, 40), (1000.0, 40)],
    };
    let stats = instance.collector();
    let config = PlannerConfig::default();

    let fingerprints: Vec<String> = (0..3)
        .map(|_| {
            let request = ScanRequest::new(schema(), instance.filters.clone(), vec![Projected::Column(ColumnId(0))]);
            BitmapPlanComposer::new(&stats, &config).compose(&request).unwrap().graph.fingerprint()
        })
        .collect();
    assert_eq!(fingerprints[0], fingerprints[1]);
    assert_eq!(fingerprints[1], fingerprints[2]);
}
