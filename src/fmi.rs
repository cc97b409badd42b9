/*
Reader for the plain-text graph format:

    # comments and blank lines anywhere
    <node count>
    <edge count>
    <id> <id2> <lat> <lon> <elevation>     one line per node
    <src> <trg> <cost> <type> <maxspeed>   one line per edge

Only id, coordinates, endpoints and cost are kept. Edges are directed.
*/

use log::{info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use crate::error::{EngineError, LoadError};
use crate::graph::{Cost, Graph, GraphBuilder, NodeId};

// Upper bound on edges reserved up front from an untrusted header.
const MAX_PREALLOCATED_EDGES: usize = 1 << 24;

/// Content lines of the input with their 1-based line numbers.
struct ContentLines<R> {
    inner: std::io::Lines<R>,
    line: usize,
}

impl<R: BufRead> ContentLines<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: reader.lines(),
            line: 0,
        }
    }

    fn next_line(&mut self) -> Result<Option<(usize, String)>, LoadError> {
        for text in self.inner.by_ref() {
            let text = text?;
            self.line += 1;
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Ok(Some((self.line, trimmed.to_string())));
        }
        Ok(None)
    }
}

fn read_count<R: BufRead>(lines: &mut ContentLines<R>, what: &str) -> Result<(usize, usize), LoadError> {
    let (line, text) = lines.next_line()?.ok_or_else(|| LoadError::BadHeader {
        line: lines.line + 1,
        reason: format!("missing {what} count"),
    })?;
    let mut fields = text.split_whitespace();
    let count = fields
        .next()
        .and_then(|f| f.parse::<usize>().ok())
        .ok_or_else(|| LoadError::BadHeader {
            line,
            reason: format!("{what} count '{text}' is not a non-negative integer"),
        })?;
    if fields.next().is_some() {
        return Err(LoadError::BadHeader {
            line,
            reason: format!("expected a single {what} count, got '{text}'"),
        });
    }
    Ok((line, count))
}

fn field<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("{name} '{value}' is not a valid number"))
}

fn parse_node(text: &str, tolerant: bool) -> Result<(NodeId, f64, f64), String> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let (id, lat, lon) = match fields.len() {
        5 => (fields[0], fields[2], fields[3]),
        n if tolerant && n > 5 => (fields[0], fields[2], fields[3]),
        4 if tolerant => (fields[0], fields[2], fields[3]),
        3 if tolerant => (fields[0], fields[1], fields[2]),
        n => return Err(format!("expected 5 fields, found {n}")),
    };
    let id = field::<NodeId>(id, "id")?;
    let lat = field::<f64>(lat, "latitude")?;
    let lon = field::<f64>(lon, "longitude")?;
    if !lat.is_finite() || !lon.is_finite() {
        return Err(format!("coordinates ({lat}, {lon}) are not finite"));
    }
    Ok((id, lat, lon))
}

fn parse_edge(text: &str, node_count: usize, tolerant: bool) -> Result<(NodeId, NodeId, Cost), String> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let n = fields.len();
    if n != 5 && !(tolerant && n >= 3) {
        return Err(format!("expected 5 fields, found {n}"));
    }
    let source = field::<NodeId>(fields[0], "source")?;
    let target = field::<NodeId>(fields[1], "target")?;
    let cost = field::<Cost>(fields[2], "cost")?;
    for id in [source, target] {
        if id >= node_count {
            return Err(format!("node id {id} out of range (graph has {node_count} nodes)"));
        }
    }
    Ok((source, target, cost))
}

/// Reads a graph description.
///
/// Reading stops after the last declared edge, so the rest of `reader` can
/// carry something else, such as requests on a shared stdin.
///
/// With `tolerant`, node and edge lines may carry extra trailing fields or
/// lack the informative ones, and malformed edges are skipped with a warning
/// instead of failing the load.
pub fn read_graph<R: BufRead>(reader: R, tolerant: bool) -> Result<Graph, LoadError> {
    let start = Instant::now();
    let mut lines = ContentLines::new(reader);

    let (header_line, node_count) = read_count(&mut lines, "node")?;
    let (_, edge_count) = read_count(&mut lines, "edge")?;
    let mut builder = GraphBuilder::try_with_edge_capacity(node_count, edge_count.min(MAX_PREALLOCATED_EDGES))
        .map_err(|e| LoadError::BadHeader {
            line: header_line,
            reason: format!("cannot hold {node_count} nodes: {e}"),
        })?;

    for read in 0..node_count {
        let (line, text) = lines.next_line()?.ok_or_else(|| LoadError::BadNode {
            line: lines.line + 1,
            reason: format!("expected {node_count} nodes, input ends after {read}"),
        })?;
        let (id, lat, lon) = parse_node(&text, tolerant).map_err(|reason| LoadError::BadNode { line, reason })?;
        builder.add_node(id, lat, lon).map_err(|e| LoadError::BadNode {
            line,
            reason: e.to_string(),
        })?;
    }

    let mut skipped = 0usize;
    for read in 0..edge_count {
        let (line, text) = lines.next_line()?.ok_or_else(|| LoadError::BadEdge {
            line: lines.line + 1,
            reason: format!("expected {edge_count} edges, input ends after {read}"),
        })?;
        match parse_edge(&text, node_count, tolerant) {
            Ok((source, target, cost)) => builder.add_edge(source, target, cost).map_err(|e| LoadError::BadEdge {
                line,
                reason: e.to_string(),
            })?,
            Err(reason) if tolerant => {
                warn!("Skipping edge on line {}: {}", line, reason);
                skipped += 1;
            }
            Err(reason) => return Err(LoadError::BadEdge { line, reason }),
        }
    }

    let graph = builder.build().map_err(|e| match e {
        EngineError::MissingNode { id } => LoadError::BadNode {
            line: lines.line,
            reason: format!("node {id} never given"),
        },
        other => LoadError::BadNode {
            line: lines.line,
            reason: other.to_string(),
        },
    })?;

    info!(
        "Read {} nodes and {} edges in {:.3} s",
        graph.node_count(),
        graph.edge_count(),
        start.elapsed().as_secs_f64()
    );
    if skipped > 0 {
        warn!("Skipped {} malformed edges", skipped);
    }
    Ok(graph)
}

pub fn read_graph_file<P: AsRef<Path>>(path: P, tolerant: bool) -> Result<Graph, LoadError> {
    let file = File::open(path.as_ref())?;
    read_graph(BufReader::new(file), tolerant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
# Id : 1
# Timestamp : 0

4
5
0 100 48.0 9.0 250
1 101 48.0 9.1 251
2 102 48.1 9.1 252
3 103 48.1 9.0 253
0 1 10 2 50
1 2 20 2 50
2 3 30 2 50
3 0 40 2 50
0 2 100 1 30
";

    fn load(text: &str, tolerant: bool) -> Result<Graph, LoadError> {
        read_graph(text.as_bytes(), tolerant)
    }

    fn error_line(err: LoadError) -> (&'static str, usize) {
        match err {
            LoadError::BadHeader { line, .. } => ("header", line),
            LoadError::BadNode { line, .. } => ("node", line),
            LoadError::BadEdge { line, .. } => ("edge", line),
            LoadError::Io(_) => ("io", 0),
        }
    }

    #[test]
    fn reads_sample_graph() {
        let graph = load(SAMPLE, false).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 5);
        assert_eq!(graph.coordinates_of(2).unwrap(), (48.1, 9.1));
        let targets: Vec<_> = graph.edges_of(0).unwrap().iter().map(|e| (e.target, e.cost)).collect();
        assert_eq!(targets, vec![(1, 10), (2, 100)]);
    }

    #[test]
    fn nodes_may_come_in_any_order() {
        let graph = load("2\n1\n1 0 1.0 2.0 0\n0 0 3.0 4.0 0\n1 0 7 0 0\n", false).unwrap();
        assert_eq!(graph.coordinates_of(0).unwrap(), (3.0, 4.0));
        assert_eq!(graph.edges_of(1).unwrap()[0].target, 0);
    }

    #[test]
    fn empty_graph_is_valid() {
        let graph = load("0\n0\n", false).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn header_errors() {
        assert_eq!(error_line(load("", false).unwrap_err()), ("header", 1));
        assert_eq!(error_line(load("x\n0\n", false).unwrap_err()), ("header", 1));
        assert_eq!(error_line(load("# c\n1\n-2\n", false).unwrap_err()), ("header", 3));
        assert_eq!(error_line(load("1 2\n0\n", true).unwrap_err()), ("header", 1));
        // A node count no allocation can hold.
        assert_eq!(
            error_line(load("# big\n18446744073709551615\n0\n", false).unwrap_err()),
            ("header", 2)
        );
    }

    #[test]
    fn node_errors() {
        // Missing node line.
        assert_eq!(error_line(load("2\n0\n0 0 1.0 1.0 0\n", false).unwrap_err()), ("node", 4));
        // Duplicate id.
        assert_eq!(
            error_line(load("2\n0\n0 0 1.0 1.0 0\n0 0 1.0 1.0 0\n", false).unwrap_err()),
            ("node", 4)
        );
        // Out of range id.
        assert_eq!(error_line(load("1\n0\n5 0 1.0 1.0 0\n", false).unwrap_err()), ("node", 3));
        // Bad coordinate.
        assert_eq!(error_line(load("1\n0\n0 0 north 1.0 0\n", false).unwrap_err()), ("node", 3));
        assert_eq!(error_line(load("1\n0\n0 0 NaN 1.0 0\n", true).unwrap_err()), ("node", 3));
        // Wrong field count is only fatal in strict mode.
        assert_eq!(error_line(load("1\n0\n0 1.0 1.0\n", false).unwrap_err()), ("node", 3));
        assert!(load("1\n0\n0 1.0 1.0\n", true).is_ok());
    }

    #[test]
    fn edge_errors_are_fatal_when_strict() {
        let base = "2\n1\n0 0 1.0 1.0 0\n1 0 2.0 2.0 0\n";
        for edge in ["0 7 1 0 0", "0 1 -3 0 0", "0 1 1.5 0 0", "0 1 1", "0 1 1 0 0 extra"] {
            let err = load(&format!("{base}{edge}\n"), false).unwrap_err();
            assert_eq!(error_line(err), ("edge", 5), "{edge}");
        }
        assert_eq!(error_line(load(base, false).unwrap_err()), ("edge", 5));
    }

    #[test]
    fn stops_after_the_last_edge() {
        let mut input = "1\n1\n0 0 1.0 1.0 0\n0 0 2 0 0\n0 0\n5\n".as_bytes();
        let graph = read_graph(&mut input, false).unwrap();
        assert_eq!(graph.edge_count(), 1);
        let mut rest = String::new();
        std::io::Read::read_to_string(&mut input, &mut rest).unwrap();
        assert_eq!(rest, "0 0\n5\n");
    }

    #[test]
    fn tolerant_mode_skips_bad_edges() {
        let text = "2\n4\n0 0 1.0 1.0 0\n1 0 2.0 2.0 0\n0 7 1 0 0\n0 1 -3 0 0\n0 1 4\n1 0 5 0 0 extra\n";
        let graph = load(text, true).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edges_of(0).unwrap()[0].cost, 4);
        assert_eq!(graph.edges_of(1).unwrap()[0].cost, 5);
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let graph = read_graph_file(file.path(), false).unwrap();
        assert_eq!(graph.node_count(), 4);

        let missing = read_graph_file(file.path().with_extension("missing"), false);
        assert!(matches!(missing, Err(LoadError::Io(_))));
    }
}
