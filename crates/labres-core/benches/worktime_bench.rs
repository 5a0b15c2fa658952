//! Benchmarks for work-hour arithmetic and the borrow delay cascade.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use labres_core::borrow::BorrowPolicy;
use labres_core::{
    BorrowKind, BorrowRequest, EquipmentId, RecordId, UserId, WorkCalendar, WorkHours,
};
use std::hint::black_box;

fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn holiday_calendar() -> WorkCalendar {
    let spring = NaiveDate::from_ymd_opt(2025, 1, 28).unwrap();
    let national = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
    WorkCalendar::default()
        .with_holidays(spring.iter_days().take(8))
        .with_holidays(national.iter_days().take(8))
        .with_makeup_workdays([
            NaiveDate::from_ymd_opt(2025, 1, 26).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 8).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 28).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 11).unwrap(),
        ])
}

fn bench_work_hours(c: &mut Criterion) {
    let cal = holiday_calendar();
    let mut group = c.benchmark_group("work_hours_between");
    for days in [1_i64, 30, 365] {
        let start = at(2025, 1, 6, 10);
        let end = start + Duration::days(days);
        group.bench_with_input(BenchmarkId::from_parameter(days), &end, |b, end| {
            b.iter(|| cal.work_hours_between(black_box(start), black_box(*end)));
        });
    }
    group.finish();
}

fn bench_end_time(c: &mut Criterion) {
    let cal = holiday_calendar();
    let mut group = c.benchmark_group("end_time_for");
    for hours in [5_i64, 200, 2_000] {
        let amount = WorkHours::from_hours(hours);
        group.bench_with_input(BenchmarkId::from_parameter(hours), &amount, |b, amount| {
            b.iter(|| cal.end_time_for(black_box(at(2025, 1, 6, 10)), black_box(*amount)));
        });
    }
    group.finish();
}

fn bench_cascade(c: &mut Criterion) {
    let cal = holiday_calendar();
    let policy = BorrowPolicy::new(&cal);
    let equipment = labres_core::Equipment::new("EQ-1", "Tester");
    let mut group = c.benchmark_group("cascade");
    for queued in [10_u64, 100, 500] {
        let records: Vec<_> = (0..queued)
            .map(|i| {
                let start = at(2025, 3, 3, 9) + Duration::hours(i64::try_from(i).unwrap() * 5);
                let request = BorrowRequest {
                    user: UserId(i),
                    project: None,
                    section: None,
                    equipment_id: EquipmentId::new("EQ-1"),
                    start,
                    end: start + Duration::hours(4),
                    kind: BorrowKind::Normal,
                    remarks: None,
                };
                policy
                    .plan(&equipment, &[], &request)
                    .unwrap()
                    .record(RecordId(i + 1), request, start)
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(queued), &records, |b, records| {
            b.iter(|| {
                policy.cascade(
                    black_box(records),
                    &equipment.id,
                    at(2025, 3, 3, 9),
                    at(2025, 3, 3, 15),
                )
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_work_hours, bench_end_time, bench_cascade);
criterion_main!(benches);
