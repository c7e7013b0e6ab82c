//! Benchmark output parsing.
//!
//! A result line looks like
//! `BenchmarkPut-8   1000000   150 ns/op   48 B/op   2 allocs/op`.
//! The memory columns are only present with `-benchmem`.

use testrig_common::BenchmarkRecord;

const NAME_PREFIX: &str = "Benchmark";
const NS_PER_OP: &str = "ns/op";

/// Parse every benchmark result line in `text`, in order of appearance.
pub fn parse_benchmarks(text: &str) -> Vec<BenchmarkRecord> {
    text.lines().filter_map(parse_benchmark_line).collect()
}

/// Parse a single line; `None` if it is not a benchmark result.
pub fn parse_benchmark_line(line: &str) -> Option<BenchmarkRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let name = *tokens.first()?;
    if !name.starts_with(NAME_PREFIX) || name.len() == NAME_PREFIX.len() {
        return None;
    }

    let ns_idx = tokens.iter().position(|t| *t == NS_PER_OP)?;
    if ns_idx < 2 {
        return None;
    }
    let ns_per_op: f64 = tokens[ns_idx - 1].parse().ok()?;

    let mut record = BenchmarkRecord::from_ns_per_op(strip_cpu_suffix(name), ns_per_op)?;
    if ns_idx >= 3 {
        record.iterations = tokens[1].parse().ok();
    }
    record.bytes_per_op = unit_value(&tokens, "B/op");
    record.allocs_per_op = unit_value(&tokens, "allocs/op");
    Some(record)
}

/// `BenchmarkPut-8` -> `BenchmarkPut`
fn strip_cpu_suffix(name: &str) -> &str {
    match name.rsplit_once('-') {
        Some((base, procs)) if !procs.is_empty() && procs.bytes().all(|b| b.is_ascii_digit()) => base,
        _ => name,
    }
}

fn unit_value(tokens: &[&str], unit: &str) -> Option<u64> {
    let idx = tokens.iter().position(|t| *t == unit)?;
    tokens.get(idx.checked_sub(1)?)?.parse().ok()
}
