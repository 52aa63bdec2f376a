/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use dsi_progress_logger::no_logging;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use schimmy_rank::prelude::*;
use schimmy_rank::store::read_generation;
use schimmy_rank::utils::log_sum_exp_all;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

fn write_graph(path: &Path, graph: &[Vec<NodeId>]) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "# test graph")?;
    for (node, successors) in graph.iter().enumerate() {
        write!(file, "{}", node)?;
        for succ in successors {
            write!(file, " {}", succ)?;
        }
        writeln!(file)?;
    }
    Ok(())
}

/// Ingests `graph` into `base/iter0000`, laying it out by partition when the
/// strategy needs it.
fn setup(
    base: &Path,
    graph: &[Vec<NodeId>],
    strategy: Strategy,
    kind: PartitionerKind,
    num_partitions: usize,
) -> Result<()> {
    let input = base.join("graph.txt");
    write_graph(&input, graph)?;
    let counters = Counters::new();
    match strategy {
        Strategy::Basic => {
            build_records(&input, generation_dir(base, 0), graph.len(), &counters, no_logging![])?;
        }
        Strategy::Schimmy => {
            let raw = base.join("raw");
            build_records(&input, &raw, graph.len(), &counters, no_logging![])?;
            partition_graph(
                &raw,
                generation_dir(base, 0),
                kind,
                graph.len(),
                num_partitions,
                no_logging![],
            )?;
        }
    }
    assert_eq!(counters.get(Counter::NumNodes), graph.len() as u64);
    Ok(())
}

fn ranks(generation: impl AsRef<Path>) -> Result<BTreeMap<NodeId, f32>> {
    let mut ranks = BTreeMap::new();
    for record in read_generation(generation)? {
        assert_eq!(record.variant(), Variant::Complete);
        let rank = record.rank().unwrap();
        assert!(ranks.insert(record.id(), rank).is_none());
    }
    Ok(ranks)
}

fn total_probability(ranks: &BTreeMap<NodeId, f32>) -> f64 {
    ranks.values().map(|&rank| (rank as f64).exp()).sum()
}

fn random_graph(num_nodes: usize, seed: u64) -> Vec<Vec<NodeId>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..num_nodes)
        .map(|_| {
            // about one node in six is dangling
            let outdegree = rng.random_range(0..6);
            (0..outdegree)
                .map(|_| rng.random_range(0..num_nodes as NodeId))
                .collect()
        })
        .collect()
}

#[test]
fn test_cycle_conserves_mass() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let graph: Vec<Vec<NodeId>> = (0..10).map(|node| vec![(node + 1) % 10]).collect();
    setup(tmp.path(), &graph, Strategy::Basic, PartitionerKind::Hash, 3)?;

    let mut pr = PageRank::new(tmp.path(), graph.len())?;
    pr.num_partitions(3);
    let stats = pr.iterate(0, no_logging![])?;

    assert!(stats.total_mass.abs() < 1E-5, "{}", stats.total_mass);
    assert!(stats.missing_mass.abs() < 1E-5, "{}", stats.missing_mass);
    assert_eq!(stats.counters.get(Counter::MassMessages), 10);
    assert_eq!(stats.counters.get(Counter::MissingStructure), 0);

    // the uniform distribution is stationary on a cycle
    let ranks = ranks(generation_dir(tmp.path(), 1))?;
    assert_eq!(ranks.len(), 10);
    for &rank in ranks.values() {
        assert!((rank.exp() - 0.1).abs() < 1E-6);
    }
    assert!(!tmp.path().join("iter0001-pre").exists());
    assert!(!tmp.path().join("iter0001-mass").exists());
    Ok(())
}

#[test]
fn test_dangling_node() -> Result<()> {
    for strategy in [Strategy::Basic, Strategy::Schimmy] {
        let tmp = tempfile::tempdir()?;
        let graph = vec![vec![1], vec![]];
        setup(tmp.path(), &graph, strategy, PartitionerKind::Hash, 2)?;

        let mut pr = PageRank::new(tmp.path(), 2)?;
        pr.strategy(strategy).num_partitions(2);
        let stats = pr.run(0, 1)?;
        assert!((stats[0].missing_mass - 0.5).abs() < 1E-6);

        let ranks = ranks(generation_dir(tmp.path(), 1))?;
        assert!((ranks[&0].exp() - 0.2875).abs() < 1E-5, "{strategy}");
        assert!((ranks[&1].exp() - 0.7125).abs() < 1E-5, "{strategy}");
        assert!((total_probability(&ranks) - 1.0).abs() < 1E-4);
    }
    Ok(())
}

#[test]
fn test_separators_in_base_path() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let graph = random_graph(50, 1);

    let reference = tmp.path().join("reference");
    std::fs::create_dir(&reference)?;
    setup(&reference, &graph, Strategy::Basic, PartitionerKind::Hash, 3)?;
    PageRank::new(&reference, graph.len())?
        .num_partitions(3)
        .run(0, 2)?;
    let expected = ranks(generation_dir(&reference, 2))?;

    let base = tmp.path().join("web;crawl=0");
    std::fs::create_dir(&base)?;
    setup(&base, &graph, Strategy::Schimmy, PartitionerKind::Hash, 3)?;
    let stats = PageRank::new(&base, graph.len())?
        .strategy(Strategy::Schimmy)
        .num_partitions(3)
        .run(0, 2)?;
    assert_eq!(stats.len(), 2);
    assert!(stats
        .iter()
        .all(|s| s.counters.get(Counter::MissingStructure) == 0));

    let ranks = ranks(generation_dir(&base, 2))?;
    assert_eq!(ranks.len(), graph.len());
    assert!((total_probability(&ranks) - 1.0).abs() < 1E-4);
    for (node, rank) in &ranks {
        assert!((rank - expected[node]).abs() < 1E-4, "{node}");
    }
    Ok(())
}

#[test]
fn test_mass_is_preserved() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let graph = random_graph(300, 0);
    setup(tmp.path(), &graph, Strategy::Basic, PartitionerKind::Range, 4)?;

    let mut pr = PageRank::new(tmp.path(), graph.len())?;
    pr.partitioner(PartitionerKind::Range).num_partitions(4);
    let stats = pr.run(0, 5)?;
    assert_eq!(stats.len(), 5);
    for (i, s) in stats.iter().enumerate() {
        assert_eq!(s.iteration, i);
        assert!(s.missing_mass >= 0.0 && s.missing_mass <= 1.0);
        let ranks = ranks(generation_dir(tmp.path(), i + 1))?;
        assert_eq!(ranks.len(), graph.len());
        assert!((total_probability(&ranks) - 1.0).abs() < 1E-4);
        let lse = log_sum_exp_all(ranks.values().copied());
        assert!(lse.abs() < 1E-4, "{lse}");
    }
    Ok(())
}

#[test]
fn test_strategies_agree() -> Result<()> {
    let graph = random_graph(200, 1);
    let iterations = 4;

    let tmp = tempfile::tempdir()?;
    let reference = tmp.path().join("reference");
    std::fs::create_dir(&reference)?;
    setup(&reference, &graph, Strategy::Basic, PartitionerKind::Hash, 3)?;
    let mut pr = PageRank::new(&reference, graph.len())?;
    pr.num_partitions(3);
    pr.run(0, iterations)?;
    let expected = ranks(generation_dir(&reference, iterations))?;

    for strategy in [Strategy::Basic, Strategy::Schimmy] {
        for kind in [PartitionerKind::Hash, PartitionerKind::Range] {
            for (combiner, in_mapper_combiner) in [(false, false), (true, false), (false, true)] {
                let base = tmp.path().join(format!(
                    "{strategy}-{kind}-{combiner}-{in_mapper_combiner}"
                ));
                std::fs::create_dir(&base)?;
                setup(&base, &graph, strategy, kind, 5)?;

                let mut pr = PageRank::new(&base, graph.len())?;
                pr.strategy(strategy)
                    .partitioner(kind)
                    .num_partitions(5)
                    .combiner(combiner)
                    .in_mapper_combiner(in_mapper_combiner)
                    .batch_size(17);
                let stats = pr.run(0, iterations)?;

                let counters = stats[0].counters;
                if in_mapper_combiner {
                    assert!(counters.get(Counter::MassMessagesSaved) > 0);
                }
                if combiner {
                    assert!(
                        counters.get(Counter::MassMessagesReceived)
                            < counters.get(Counter::MassMessages)
                    );
                }

                let actual = ranks(generation_dir(&base, iterations))?;
                assert_eq!(actual.len(), expected.len());
                for (node, rank) in &expected {
                    assert!(
                        (actual[node] - rank).abs() < 1E-4,
                        "{base:?}: node {node} has rank {} instead of {}",
                        actual[node],
                        rank
                    );
                }
            }
        }
    }
    Ok(())
}

#[test]
fn test_missing_structure() -> Result<()> {
    for strategy in [Strategy::Basic, Strategy::Schimmy] {
        let tmp = tempfile::tempdir()?;
        // node 7 is a successor but has no record
        let graph = vec![vec![1, 7], vec![2], vec![0]];
        setup(tmp.path(), &graph, strategy, PartitionerKind::Hash, 2)?;

        let mut pr = PageRank::new(tmp.path(), 3)?;
        pr.strategy(strategy).num_partitions(2);
        let stats = pr.run(0, 1)?;
        assert_eq!(stats[0].counters.get(Counter::MissingStructure), 1);
        // half of the mass of node 0 is lost
        assert!((stats[0].missing_mass - 1.0 / 6.0).abs() < 1E-5);

        let ranks = ranks(generation_dir(tmp.path(), 1))?;
        assert_eq!(ranks.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!((total_probability(&ranks) - 1.0).abs() < 1E-4);
    }
    Ok(())
}

#[test]
fn test_resume() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let graph = random_graph(50, 2);
    setup(tmp.path(), &graph, Strategy::Basic, PartitionerKind::Hash, 2)?;

    let mut pr = PageRank::new(tmp.path(), graph.len())?;
    pr.num_partitions(2);
    pr.run(0, 2)?;
    let first = ranks(generation_dir(tmp.path(), 2))?;

    // leftovers of a failed attempt are removed
    std::fs::create_dir(tmp.path().join("iter0002-pre"))?;
    std::fs::create_dir(tmp.path().join("iter0002-mass"))?;
    pr.run(1, 2)?;
    let second = ranks(generation_dir(tmp.path(), 2))?;
    assert_eq!(second.len(), first.len());
    for (node, rank) in &first {
        assert!((second[node] - rank).abs() < 1E-6);
    }
    assert!(!tmp.path().join("iter0002-pre").exists());
    Ok(())
}

#[test]
fn test_invalid_configuration() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    assert!(PageRank::new(tmp.path(), 0).is_err());
    let mut pr = PageRank::new(tmp.path(), 10)?;
    assert!(pr.run(0, 1).is_err());
    assert!(pr.alpha(1.0).run(0, 1).is_err());
    assert!(pr.alpha(0.15).run(3, 3).is_err());
    Ok(())
}

#[cfg_attr(feature = "slow_tests", test)]
#[cfg_attr(not(feature = "slow_tests"), allow(dead_code))]
fn test_large_graph() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let graph = random_graph(100_000, 3);
    let tmp = tempfile::tempdir()?;
    let mut results = Vec::new();
    for strategy in [Strategy::Basic, Strategy::Schimmy] {
        let base = tmp.path().join(strategy.to_string());
        std::fs::create_dir(&base)?;
        setup(&base, &graph, strategy, PartitionerKind::Range, 8)?;
        let mut pr = PageRank::new(&base, graph.len())?;
        pr.strategy(strategy)
            .partitioner(PartitionerKind::Range)
            .num_partitions(8)
            .in_mapper_combiner(true)
            .batch_size(10_000);
        pr.run(0, 10)?;
        let ranks = ranks(generation_dir(&base, 10))?;
        assert!((total_probability(&ranks) - 1.0).abs() < 1E-3);
        results.push(ranks);
    }
    for (node, rank) in &results[0] {
        assert!((results[1][node].exp() - rank.exp()).abs() < 1E-6);
    }
    Ok(())
}
