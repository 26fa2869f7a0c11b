//! Timing harness for the group partition formula.
//!
//! The allocator runs on every poll of an active round, so it should stay
//! comfortably below a microsecond per member even for implausibly large
//! communities. Run with e.g. `cargo run -p benchmarks -- --population 100000`.

use std::time::Instant;

use anyhow::{ensure, Result};
use clap::Parser;
use rand::Rng;

use edenbot::allocator::{allocate, member_index_to_group};

#[derive(Debug, Parser)]
struct Args {
    /// Population size to partition.
    #[arg(long, default_value_t = 100_000)]
    population: usize,
    /// Number of groups to partition into.
    #[arg(long, default_value_t = 20_000)]
    groups: usize,
    /// Number of timing repetitions.
    #[arg(long, default_value_t = 10)]
    repetitions: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    ensure!(args.groups >= 1, "need at least one group");
    ensure!(
        args.groups <= args.population,
        "cannot have more groups than members"
    );

    // Sanity-check the shape before timing anything.
    let sizes = allocate(args.population, args.groups);
    let total: usize = sizes.iter().sum();
    ensure!(total == args.population, "sizes must sum to the population");

    let mut rng = rand::thread_rng();
    let mut nanos_per_member = Vec::new();
    for repetition in 0..args.repetitions {
        // Random visit order, so the timing is not an artifact of branch
        // prediction over a sorted index sequence.
        let mut indices: Vec<usize> = (0..args.population).collect();
        for i in (1..indices.len()).rev() {
            indices.swap(i, rng.gen_range(0..=i));
        }

        let start = Instant::now();
        let mut checksum = 0usize;
        for index in indices {
            checksum ^= member_index_to_group(index, args.population, args.groups);
        }
        let elapsed = start.elapsed();

        let per_member = elapsed.as_nanos() as f64 / args.population as f64;
        nanos_per_member.push(per_member);
        println!(
            "repetition {:>2}: {:>8.1} ns/member (checksum {checksum})",
            repetition + 1,
            per_member
        );
    }

    nanos_per_member.sort_by(|a, b| a.total_cmp(b));
    let median = nanos_per_member[nanos_per_member.len() / 2];
    println!(
        "population {} across {} groups: median {median:.1} ns/member",
        args.population, args.groups
    );
    Ok(())
}
