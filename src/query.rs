use log::debug;
use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::time::Instant;

use crate::dijkstra::Dijkstra;
use crate::error::RequestError;
use crate::graph::{Graph, NodeId};
use crate::heap::{DecreaseKeyQueue, IndexedHeap};
use crate::kdtree::{KdTree, NearestSearch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Body lines `src trg`.
    OneToOne,
    /// No body; every node with its distance from the source.
    OneToAll(NodeId),
    /// Body lines `trg`.
    OneToMany(NodeId),
    /// Body lines `lat lon`, answered by a linear scan.
    NearestIterative,
    /// Body lines `lat lon`, answered by the k-d tree.
    NearestFast,
}

/// Extra fields appended to each answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub print_location: bool,
    pub print_distance: bool,
    pub print_path: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub mode: Mode,
    pub options: Options,
}

impl Request {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            options: Options::default(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Parses `&`-separated operation tokens: `oto`, `ota`, `otm`, `nni`,
    /// `nnf` pick the mode (last one wins), `pl`, `pd`, `pp` switch on output
    /// options and a bare integer is the source for `ota`/`otm`.
    pub fn from_query(query: &str) -> Result<Self, RequestError> {
        #[derive(Clone, Copy)]
        enum Kind {
            Oto,
            Ota,
            Otm,
            Nni,
            Nnf,
        }

        let mut kind = None;
        let mut source = None;
        let mut options = Options::default();
        for token in query.split('&').filter(|t| !t.is_empty()) {
            match token {
                "oto" => kind = Some(Kind::Oto),
                "ota" => kind = Some(Kind::Ota),
                "otm" => kind = Some(Kind::Otm),
                "nni" => kind = Some(Kind::Nni),
                "nnf" => kind = Some(Kind::Nnf),
                "pl" => options.print_location = true,
                "pd" => options.print_distance = true,
                "pp" => options.print_path = true,
                other => match other.parse::<NodeId>() {
                    Ok(id) => source = Some(id),
                    Err(_) => return Err(RequestError::UnknownOperation(other.to_string())),
                },
            }
        }

        let needs_source = || {
            source.ok_or_else(|| RequestError::BadRequest {
                line: 0,
                reason: "no source node given".to_string(),
            })
        };
        let mode = match kind.ok_or(RequestError::MissingOperation)? {
            Kind::Oto => Mode::OneToOne,
            Kind::Ota => Mode::OneToAll(needs_source()?),
            Kind::Otm => Mode::OneToMany(needs_source()?),
            Kind::Nni => Mode::NearestIterative,
            Kind::Nnf => Mode::NearestFast,
        };
        Ok(Self { mode, options })
    }
}

fn bad_request(line: usize, reason: impl Into<String>) -> RequestError {
    RequestError::BadRequest {
        line,
        reason: reason.into(),
    }
}

fn parse_id(graph: &Graph, line: usize, value: &str) -> Result<NodeId, RequestError> {
    let id = value
        .parse::<NodeId>()
        .map_err(|_| bad_request(line, format!("'{value}' is not a node id")))?;
    graph
        .check(id)
        .map_err(|e| bad_request(line, e.to_string()))
}

fn parse_coordinate(line: usize, value: &str) -> Result<f64, RequestError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(bad_request(line, format!("'{value}' is not a coordinate"))),
    }
}

/// Calls `handle` with the 1-based line number and fields of every non-blank,
/// non-comment line.
fn for_each_line<R, F>(input: R, mut handle: F) -> Result<usize, RequestError>
where
    R: BufRead,
    F: FnMut(usize, &[&str]) -> Result<(), RequestError>,
{
    let mut answered = 0;
    for (index, text) in input.lines().enumerate() {
        let text = text?;
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        handle(index + 1, &fields)?;
        answered += 1;
    }
    Ok(answered)
}

/// Runs requests against one graph and its nearest-node index.
///
/// Holds the per-query state of both engines, so one dispatcher serves one
/// request stream at a time while the graph and tree stay shared.
pub struct Dispatcher<'g, Q = IndexedHeap> {
    dijkstra: Dijkstra<'g, Q>,
    nearest: NearestSearch<'g>,
}

impl<'g> Dispatcher<'g, IndexedHeap> {
    pub fn new(graph: &'g Graph, tree: &'g KdTree) -> Self {
        Self::with_queue(graph, tree)
    }
}

impl<'g, Q: DecreaseKeyQueue> Dispatcher<'g, Q> {
    pub fn with_queue(graph: &'g Graph, tree: &'g KdTree) -> Self {
        Self {
            dijkstra: Dijkstra::with_queue(graph),
            nearest: NearestSearch::new(tree),
        }
    }

    pub fn dijkstra(&self) -> &Dijkstra<'g, Q> {
        &self.dijkstra
    }

    pub fn nearest(&self) -> &NearestSearch<'g> {
        &self.nearest
    }

    /// Answers `request`, reading its body from `input` and writing one line
    /// per answer to `output`. Returns the number of answers written.
    pub fn run<R, W>(&mut self, request: &Request, input: R, output: &mut W) -> Result<usize, RequestError>
    where
        R: BufRead,
        W: Write,
    {
        let options = request.options;
        let graph = self.dijkstra.graph();
        let answered = match request.mode {
            Mode::OneToOne => for_each_line(input, |line, fields| {
                let [src, trg] = fields else {
                    return Err(bad_request(line, "expected '<source> <target>'"));
                };
                let source = parse_id(graph, line, src)?;
                let target = parse_id(graph, line, trg)?;
                self.prepare(source)?;
                self.write_distance(target, options, output)
            })?,
            Mode::OneToMany(source) => {
                self.prepare(source)?;
                for_each_line(input, |line, fields| {
                    let [trg] = fields else {
                        return Err(bad_request(line, "expected '<target>'"));
                    };
                    let target = parse_id(graph, line, trg)?;
                    self.write_distance(target, options, output)
                })?
            }
            Mode::OneToAll(source) => {
                self.prepare(source)?;
                for (id, distance) in self.dijkstra.distances() {
                    match distance {
                        Some(d) => writeln!(output, "{id} {d}")?,
                        None => writeln!(output, "{id} -1")?,
                    }
                }
                graph.node_count()
            }
            Mode::NearestIterative | Mode::NearestFast => {
                let fast = request.mode == Mode::NearestFast;
                for_each_line(input, |line, fields| {
                    let [lat, lon] = fields else {
                        return Err(bad_request(line, "expected '<latitude> <longitude>'"));
                    };
                    let lat = parse_coordinate(line, lat)?;
                    let lon = parse_coordinate(line, lon)?;
                    let start = Instant::now();
                    let distance = if fast {
                        self.nearest.nearest(lon, lat)
                    } else {
                        self.nearest.nearest_iterative(lon, lat)
                    };
                    debug!(
                        "Nearest to ({}, {}) at {} found in {:.3} ms",
                        lat,
                        lon,
                        distance,
                        start.elapsed().as_secs_f64() * 1000.0
                    );
                    self.write_nearest(distance, options, output)
                })?
            }
        };
        output.flush()?;
        Ok(answered)
    }

    fn prepare(&mut self, source: NodeId) -> Result<(), RequestError> {
        let start = Instant::now();
        if self.dijkstra.calculate_from(source)? {
            debug!(
                "Distances from {} calculated in {:.3} s ({} nodes settled)",
                source,
                start.elapsed().as_secs_f64(),
                self.dijkstra.settled_count()
            );
        }
        Ok(())
    }

    fn write_distance<W: Write>(&self, target: NodeId, options: Options, output: &mut W) -> Result<(), RequestError> {
        let graph = self.dijkstra.graph();
        let mut answer = match self.dijkstra.distance_to(target)? {
            Some(d) => d.to_string(),
            None => "-1".to_string(),
        };

        if options.print_path {
            for id in self.dijkstra.path_to(target)? {
                let _ = write!(answer, " {id}");
                if options.print_location {
                    let (lat, lon) = graph.coordinates_of(id)?;
                    let _ = write!(answer, " {lat} {lon}");
                }
                if options.print_distance {
                    if let Some(d) = self.dijkstra.distance_to(id)? {
                        let _ = write!(answer, " {d}");
                    }
                }
            }
        } else if options.print_location {
            let (lat, lon) = graph.coordinates_of(target)?;
            let _ = write!(answer, " {lat} {lon}");
        }

        writeln!(output, "{answer}")?;
        Ok(())
    }

    fn write_nearest<W: Write>(&self, distance: f64, options: Options, output: &mut W) -> Result<(), RequestError> {
        let locations = self.nearest.tree().locations();
        let mut answer = if distance.is_finite() {
            distance.to_string()
        } else {
            "-1".to_string()
        };
        for &loc in self.nearest.found_locations() {
            let [lon, lat] = locations.point(loc);
            for id in locations.ids(loc) {
                let _ = write!(answer, " {id}");
                if options.print_location {
                    let _ = write!(answer, " {lat} {lon}");
                }
            }
        }
        writeln!(output, "{answer}")?;
        Ok(())
    }
}
