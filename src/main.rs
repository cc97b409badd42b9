use anyhow::{bail, Context, Result};
use clap::{ArgAction, ArgGroup, Parser, ValueEnum};
use csv::Writer;
use hashbrown::HashSet;
use log::{error, info, warn, LevelFilter};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use routeplanner::geo::haversine_meters;
use routeplanner::{
    read_graph, read_graph_file, DecreaseKeyQueue, Dijkstra, Dispatcher, EngineError, KdTree, LoadError, Locations,
    MapHeap, Mode, NearestSearch, NodeId, Options, Request, RequestError,
};

#[derive(Parser, Debug)]
#[command(name = "routeplanner")]
#[command(about = "Load a road graph and answer shortest-distance and nearest-node requests.", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["one_to_one", "one_to_all", "one_to_many", "next_node_iterative", "next_node_fast", "verify"])
))]
#[command(group(ArgGroup::new("verbosity").args(["quiet", "warning", "verbose"])))]
struct Cli {
    /// Graph description file. Read from stdin if omitted.
    #[arg(short, long)]
    input_file: Option<PathBuf>,

    /// Request file. Read from stdin (after the graph, if that is on stdin too) if omitted.
    #[arg(short, long)]
    request_file: Option<PathBuf>,

    /// Result file. Written to stdout if omitted.
    #[arg(short, long)]
    output_file: Option<PathBuf>,

    /// Distances for `<source> <target>` request lines
    #[arg(long)]
    one_to_one: bool,

    /// Distances from SOURCE to every node
    #[arg(long, value_name = "SOURCE")]
    one_to_all: Option<NodeId>,

    /// Distances from SOURCE to each `<target>` request line
    #[arg(long, value_name = "SOURCE")]
    one_to_many: Option<NodeId>,

    /// Nearest nodes to each `<lat> <lon>` request line, by linear scan
    #[arg(long)]
    next_node_iterative: bool,

    /// Nearest nodes to each `<lat> <lon>` request line, by k-d tree
    #[arg(long)]
    next_node_fast: bool,

    /// Compare k-d tree and linear scan on COUNT random points
    #[arg(long, value_name = "COUNT")]
    verify: Option<usize>,

    /// Seed for --verify
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Append coordinates: the target's, or each path node's with --print-path
    #[arg(long)]
    print_location: bool,

    /// Append the distance of each path node (with --print-path)
    #[arg(long)]
    print_distance: bool,

    /// Append the node ids of the shortest path
    #[arg(long)]
    print_path: bool,

    /// Accept loosely formatted graphs, skipping malformed edges
    #[arg(long)]
    tolerant: bool,

    /// Also write --one-to-all results as `node_id,distance` CSV
    #[arg(long, requires = "one_to_all")]
    csv: Option<PathBuf>,

    /// Priority queue used by Dijkstra
    #[arg(long, value_enum, default_value_t = Queue::Indexed)]
    queue: Queue,

    /// Errors only
    #[arg(short, long)]
    quiet: bool,

    /// Warnings and errors (default)
    #[arg(short, long)]
    warning: bool,

    /// Progress and timings; repeat for per-request detail
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Queue {
    /// Position-indexed binary heap
    Indexed,
    /// orx-priority-queue heap with a position map
    Map,
}

impl Cli {
    fn mode(&self) -> Option<Mode> {
        if self.one_to_one {
            Some(Mode::OneToOne)
        } else if let Some(source) = self.one_to_all {
            Some(Mode::OneToAll(source))
        } else if let Some(source) = self.one_to_many {
            Some(Mode::OneToMany(source))
        } else if self.next_node_iterative {
            Some(Mode::NearestIterative)
        } else if self.next_node_fast {
            Some(Mode::NearestFast)
        } else {
            None
        }
    }

    fn options(&self) -> Options {
        Options {
            print_location: self.print_location,
            print_distance: self.print_distance,
            print_path: self.print_path,
        }
    }

    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        if self.warning {
            return LevelFilter::Warn;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

/// Process exit status for a failed run.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<LoadError>() {
        return match e {
            LoadError::BadHeader { .. } => 3,
            LoadError::BadNode { .. } => 4,
            LoadError::BadEdge { .. } => 5,
            LoadError::Io(_) => 1,
        };
    }
    if let Some(e) = err.downcast_ref::<RequestError>() {
        return match e {
            RequestError::Engine(_) => 2,
            RequestError::Io(_) => 1,
            _ => 6,
        };
    }
    if err.downcast_ref::<EngineError>().is_some() {
        return 2;
    }
    1
}

fn write_csv<Q: DecreaseKeyQueue>(dijkstra: &Dijkstra<'_, Q>, path: &Path) -> Result<()> {
    let mut wtr = Writer::from_path(path).with_context(|| format!("creating CSV {}", path.display()))?;
    wtr.write_record(["node_id", "distance"])?;
    let mut rows = 0;
    for (id, distance) in dijkstra.distances() {
        let val = match distance {
            Some(d) => d.to_string(),
            None => String::from("-1"),
        };
        wtr.write_record(&[id.to_string(), val])?;
        rows += 1;
    }
    wtr.flush()?;
    info!("Wrote distances for {} nodes to {}", rows, path.display());
    Ok(())
}

fn serve<Q, R, W>(
    mut dispatcher: Dispatcher<'_, Q>,
    request: &Request,
    input: R,
    output: &mut W,
    csv: Option<&Path>,
) -> Result<()>
where
    Q: DecreaseKeyQueue,
    R: BufRead,
    W: Write,
{
    let start = Instant::now();
    let answered = dispatcher.run(request, input, output)?;
    info!(
        "Answered {} requests in {:.3} s",
        answered,
        start.elapsed().as_secs_f64()
    );
    if let Some(path) = csv {
        write_csv(dispatcher.dijkstra(), path)?;
    }
    Ok(())
}

/// Compares k-d tree answers against a linear scan on random points inside
/// the bounding box of the graph.
fn verify(tree: &KdTree, count: usize, seed: u64) -> Result<()> {
    if tree.is_empty() {
        bail!("nothing to verify: the graph has no nodes");
    }
    let locations = tree.locations();
    let bounds = locations.bounds();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fast = NearestSearch::new(tree);
    let mut slow = NearestSearch::new(tree);
    let (mut fast_time, mut slow_time) = (Duration::ZERO, Duration::ZERO);
    let mut mismatches = 0usize;
    let mut farthest_m = 0.0_f64;

    for _ in 0..count {
        let Some((lon, lat)) = bounds.sample(&mut rng) else {
            bail!("cannot sample an empty bounding box");
        };

        let now = Instant::now();
        let d_fast = fast.nearest(lon, lat);
        fast_time += now.elapsed();

        let now = Instant::now();
        let d_slow = slow.nearest_iterative(lon, lat);
        slow_time += now.elapsed();

        let ids_fast: HashSet<NodeId> = fast.ids().collect();
        let ids_slow: HashSet<NodeId> = slow.ids().collect();
        if d_fast != d_slow || ids_fast != ids_slow {
            mismatches += 1;
            warn!(
                "Mismatch at ({}, {}): k-d tree {} {:?}, linear scan {} {:?}",
                lat, lon, d_fast, ids_fast, d_slow, ids_slow
            );
        }
        if let Some(&loc) = slow.found_locations().first() {
            farthest_m = farthest_m.max(haversine_meters([lon, lat], locations.point(loc)));
        }
    }

    println!(
        "{} random points: k-d tree {:.3} ms, linear scan {:.3} ms, {} mismatches",
        count,
        fast_time.as_secs_f64() * 1000.0,
        slow_time.as_secs_f64() * 1000.0,
        mismatches
    );
    info!("Farthest nearest node: {:.0} m", farthest_m);

    if mismatches > 0 {
        bail!("k-d tree disagrees with linear scan on {} of {} points", mismatches, count);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();

    let graph = match &cli.input_file {
        Some(path) => {
            read_graph_file(path, cli.tolerant).with_context(|| format!("reading graph {}", path.display()))?
        }
        None => read_graph(&mut stdin, cli.tolerant).context("reading graph from stdin")?,
    };

    let needs_tree = cli.verify.is_some() || cli.next_node_iterative || cli.next_node_fast;
    let tree = if needs_tree {
        KdTree::from_graph(&graph)
    } else {
        KdTree::build(Locations::default())
    };

    if let Some(count) = cli.verify {
        return verify(&tree, count, cli.seed);
    }

    let Some(mode) = cli.mode() else {
        bail!("no operation given");
    };
    let request = Request::new(mode).with_options(cli.options());

    let mut input: Box<dyn BufRead + '_> = match &cli.request_file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening requests {}", path.display()))?,
        )),
        None => Box::new(&mut stdin),
    };
    let mut output: Box<dyn Write + '_> = match &cli.output_file {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating output {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let csv = cli.csv.as_deref();
    match cli.queue {
        Queue::Indexed => serve(Dispatcher::new(&graph, &tree), &request, &mut input, &mut output, csv),
        Queue::Map => serve(
            Dispatcher::<MapHeap>::with_queue(&graph, &tree),
            &request,
            &mut input,
            &mut output,
            csv,
        ),
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}
