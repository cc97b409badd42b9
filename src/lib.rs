//! Road-network queries: shortest distances with Dijkstra and nearest-node
//! lookups with a 2-d tree, over graphs read from plain-text descriptions.

pub mod brute;
pub mod dijkstra;
pub mod error;
pub mod fmi;
pub mod geo;
pub mod graph;
pub mod heap;
pub mod kdtree;
pub mod locations;
pub mod query;

pub use dijkstra::{dijkstra_all, Dijkstra};
pub use error::{EngineError, LoadError, RequestError};
pub use fmi::{read_graph, read_graph_file};
pub use graph::{Cost, Distance, Edge, Graph, GraphBuilder, Node, NodeId, UNREACHABLE};
pub use heap::{DecreaseKeyQueue, IndexedHeap, MapHeap};
pub use kdtree::{KdTree, NearestSearch};
pub use locations::Locations;
pub use query::{Dispatcher, Mode, Options, Request};
