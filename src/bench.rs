use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use hashbrown::HashSet;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::SystemTime;

use routeplanner::{read_graph_file, DecreaseKeyQueue, Dijkstra, Graph, IndexedHeap, KdTree, MapHeap, NearestSearch, NodeId};

#[derive(Parser, Debug)]
#[command(name = "bench")]
#[command(about = "Time Dijkstra runs and nearest-node queries on a graph description file.", long_about = None)]
struct Cli {
    /// Path to the graph description file
    #[arg(short, long)]
    input_file: String,

    /// Number of runs. Picks a new (deterministic) source id per run (0, 1, 2, 3, ...num_runs).
    #[arg(short, long)]
    num_runs: usize,

    /// Random nearest-node queries per run
    #[arg(long, default_value_t = 1000)]
    queries: usize,

    #[arg(short, long, value_enum, default_value_t = Queue::Indexed)]
    queue: Queue,

    #[arg(long)]
    tolerant: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Queue {
    Indexed,
    Map,
}

impl Queue {
    fn run(&self, graph: &Graph, num_runs: usize) -> Vec<f64> {
        match self {
            Queue::Indexed => time_dijkstra::<IndexedHeap>(graph, num_runs),
            Queue::Map => time_dijkstra::<MapHeap>(graph, num_runs),
        }
    }
}

fn elapsed_millis(now: SystemTime) -> Option<f64> {
    now.elapsed().ok().map(|elapsed| elapsed.as_secs_f64() * 1000.0)
}

fn time_dijkstra<Q: DecreaseKeyQueue>(graph: &Graph, num_runs: usize) -> Vec<f64> {
    let mut engine: Dijkstra<'_, Q> = Dijkstra::with_queue(graph);
    let mut duration_millis = Vec::new();
    for src_idx in (0..num_runs).filter(|&id| id < graph.node_count()) {
        let now = SystemTime::now();
        engine.reset();
        if let Err(e) = engine.calculate(src_idx) {
            warn!("Run from {} failed: {}", src_idx, e);
            continue;
        }
        if let Some(ms) = elapsed_millis(now) {
            duration_millis.push(ms);
        }
    }
    duration_millis
}

fn time_nearest(tree: &KdTree, num_runs: usize, queries: usize) -> (Vec<f64>, Vec<f64>, usize) {
    let bounds = tree.locations().bounds();
    let mut fast = NearestSearch::new(tree);
    let mut slow = NearestSearch::new(tree);
    let (mut fast_millis, mut slow_millis) = (Vec::new(), Vec::new());
    let mut mismatches = 0;

    for run in 0..num_runs {
        let points: Vec<(f64, f64)> = {
            let mut rng = StdRng::seed_from_u64(run as u64);
            (0..queries).filter_map(|_| bounds.sample(&mut rng)).collect()
        };

        let mut answers = Vec::with_capacity(points.len());
        let now = SystemTime::now();
        for &(lon, lat) in &points {
            let d = fast.nearest(lon, lat);
            answers.push((d, fast.ids().collect::<HashSet<NodeId>>()));
        }
        if let Some(ms) = elapsed_millis(now) {
            fast_millis.push(ms);
        }

        let now = SystemTime::now();
        for (&(lon, lat), (d, ids)) in points.iter().zip(&answers) {
            let expected = slow.nearest_iterative(lon, lat);
            if expected != *d || slow.ids().collect::<HashSet<NodeId>>() != *ids {
                mismatches += 1;
            }
        }
        if let Some(ms) = elapsed_millis(now) {
            slow_millis.push(ms);
        }
    }
    (fast_millis, slow_millis, mismatches)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stderr)
        .init();
    let cli = Cli::parse();

    let graph = read_graph_file(&cli.input_file, cli.tolerant).with_context(|| format!("reading {}", &cli.input_file))?;
    info!("Graph: {} nodes, {} directed edges", graph.node_count(), graph.edge_count());

    println!("dijkstra ms: {:?}", cli.queue.run(&graph, cli.num_runs));

    let now = SystemTime::now();
    let tree = KdTree::from_graph(&graph);
    if let Some(ms) = elapsed_millis(now) {
        println!("k-d tree build ms: {:.3}", ms);
    }
    if tree.is_empty() {
        return Ok(());
    }

    let (fast, slow, mismatches) = time_nearest(&tree, cli.num_runs, cli.queries);
    println!("k-d tree ms per {} queries: {:?}", cli.queries, fast);
    println!("linear scan ms per {} queries: {:?}", cli.queries, slow);
    if mismatches > 0 {
        warn!("{} nearest-node answers differ between k-d tree and linear scan", mismatches);
    }

    Ok(())
}
