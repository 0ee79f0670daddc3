//! Benchmarks for flow assembly.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tupleflow::prelude::*;

fn build_report(width: usize) -> Result<PipeGraph, AssemblyError> {
    let extra: Vec<String> = (0..width).map(|i| format!("attr_{i}")).collect();
    let mut order_fields = vec!["order_id".to_string(), "cust_id".into(), "amount".into()];
    order_fields.extend(extra);

    let mut flow = Flow::new("bench");
    flow.source("orders", order_fields)?;
    flow.source("customers", ["cust_id", "name", "region"])?;
    flow.assembly("orders", |a| {
        a.primary("order_id")?.filter("$amount:double > 0")?;
        Ok(())
    })?;
    flow.assembly("customers", |a| {
        a.primary("cust_id")?;
        Ok(())
    })?;
    flow.assembly("report", |a| {
        a.join_with(
            &["orders", "customers"],
            "cust_id",
            JoinOptions::default().with_joiner(Joiner::Left),
            |g| {
                g.sum("amount", FieldType::Double)?.count(None)?;
                Ok(())
            },
        )?;
        a.branch("by_region", |b| {
            b.group_by_with("region", GroupByOptions::default(), |g| {
                g.sum("amount", FieldType::Double)?;
                Ok(())
            })?;
            Ok(())
        })?;
        Ok(())
    })?;
    flow.complete()
}

fn assembly_benchmark(c: &mut Criterion) {
    c.bench_function("join_report_narrow", |b| {
        b.iter(|| build_report(black_box(4)))
    });
    c.bench_function("join_report_wide", |b| {
        b.iter(|| build_report(black_box(64)))
    });

    let graph = build_report(16).unwrap();
    c.bench_function("fingerprint", |b| b.iter(|| black_box(&graph).fingerprint()));
}

criterion_group!(benches, assembly_benchmark);
criterion_main!(benches);
