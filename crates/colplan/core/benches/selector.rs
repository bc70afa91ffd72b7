// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Index selection and plan composition benchmarks
//!
//! The cost-based search is exhaustive, so its running time grows with the
//! number of indexes whose leading key column carries a filter.

use colplan_common::{ClusteredGroup, Column, ColumnFilter, ColumnId, ColumnType, Datum, SargSequence, SecondaryIndex, StorageId, TableId, TableSchema};
use colplan_core::statistics::ColumnProfile;
use colplan_core::{BitmapPlanComposer, IndexSelector, PlannerConfig, Projected, ScanRequest, StatisticsCollector};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

const T: TableId = TableId(1);

fn schema(columns: u32) -> TableSchema {
    TableSchema {
        id: T,
        name: "bench".into(),
        columns: (0..columns)
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
            columns: (0..columns).map(ColumnId).collect(),
        }],
    }
}

/// One single-column and one two-column index per column, a point filter on
/// every column.
fn setup(columns: u32) -> (TableSchema, StatisticsCollector, Vec<ColumnFilter>) {
    let stats = StatisticsCollector::new();
    stats.set_row_count(T, 10_000_000.0);
    stats.set_page_count(StorageId(1), 400_000);
    stats.register_index(T, SecondaryIndex::deletion(StorageId(2), "del"));
    stats.set_page_count(StorageId(2), 16);

    for i in 0..columns {
        stats.analyze_column(T, ColumnProfile::new(ColumnId(i), 100.0 * (i + 1) as f64).with_range(0, 100_000));
        let single = SecondaryIndex::unclustered(StorageId(100 + i as u64), &format!("i{i}"), vec![ColumnId(i)], false);
        let pair = SecondaryIndex::unclustered(StorageId(200 + i as u64), &format!("i{i}_next"), vec![ColumnId(i), ColumnId((i + 1) % columns)], false);
        for index in [single, pair] {
            stats.set_page_count(index.id, 50 + 10 * i as u64);
            stats.register_index(T, index);
        }
    }

    let filters = (0..columns).map(|i| ColumnFilter::new(ColumnId(i), SargSequence::point(Datum::Int(i as i64)))).collect();
    (schema(columns), stats, filters)
}

fn bench_select(c: &mut Criterion) {
    let config = PlannerConfig::default();
    let mut group = c.benchmark_group("index_selection");

    for columns in [2u32, 3, 4, 5] {
        let (schema, stats, filters) = setup(columns);
        group.bench_with_input(BenchmarkId::from_parameter(columns), &columns, |b, _| {
            b.iter(|| IndexSelector::new(&stats, &config).select(black_box(&schema), black_box(&filters)).unwrap())
        });
    }

    group.finish();
}

fn bench_compose(c: &mut Criterion) {
    let config = PlannerConfig::default();
    let (schema, stats, filters) = setup(4);
    let request = ScanRequest::new(schema, filters, vec![Projected::Column(ColumnId(0)), Projected::Rid]);

    c.bench_function("compose_four_columns", |b| {
        b.iter(|| BitmapPlanComposer::new(&stats, &config).compose(black_box(&request)).unwrap())
    });
}

criterion_group!(benches, bench_select, bench_compose);
criterion_main!(benches);
