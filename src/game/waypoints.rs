//! Waypoint navigation graph
//!
//! Built once per map from the standing tiles. Edges connect node pairs that
//! see each other, are close enough and do not climb too high. Graph search is
//! Dijkstra with an insertion counter as the final tie-break, so equal-cost
//! paths always resolve the same way.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[cfg(feature = "parallel_nav")]
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::debug;

use crate::game::constants::nav::{
    CLIMB_COST_FACTOR, MAX_CLIMB, MAX_EDGE_LENGTH, REPLAN_COOLDOWN, REPLAN_INTERVAL,
    REPLAN_THRESHOLD, WAYPOINT_REACHED,
};
use crate::game::world::{TileMap, WorldQuery};
use crate::util::vec2::Vec2;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub to: NodeId,
    pub cost: u32,
}

type Edges = SmallVec<[Edge; 8]>;

/// Read-only navigation graph over static geometry
#[derive(Debug, Clone, Default)]
pub struct WaypointGraph {
    nodes: Vec<Vec2>,
    adjacency: Vec<Edges>,
}

/// Traversal cost; upward movement is more expensive than falling
fn edge_cost(from: Vec2, to: Vec2) -> u32 {
    let climb = (from.y - to.y).max(0.0);
    let cost = from.distance_to(to) + climb * (CLIMB_COST_FACTOR - 1.0);
    (cost.round() as u32).max(1)
}

fn edges_from(world: &dyn WorldQuery, nodes: &[Vec2], i: NodeId) -> Edges {
    let from = nodes[i];
    let mut edges = Edges::new();
    for (j, &to) in nodes.iter().enumerate() {
        if i == j {
            continue;
        }
        if from.distance_sq_to(to) > MAX_EDGE_LENGTH * MAX_EDGE_LENGTH {
            continue;
        }
        if from.y - to.y > MAX_CLIMB {
            continue;
        }
        if !world.has_line_of_sight(from, to) {
            continue;
        }
        edges.push(Edge {
            to: j,
            cost: edge_cost(from, to),
        });
    }
    edges
}

impl WaypointGraph {
    /// Sample the standing tiles of `map` and connect them
    pub fn build(map: &TileMap) -> Self {
        Self::from_points(map, map.standing_points())
    }

    pub fn from_points(world: &dyn WorldQuery, nodes: Vec<Vec2>) -> Self {
        #[cfg(feature = "parallel_nav")]
        let adjacency: Vec<Edges> = (0..nodes.len())
            .into_par_iter()
            .map(|i| edges_from(world, &nodes, i))
            .collect();

        #[cfg(not(feature = "parallel_nav"))]
        let adjacency: Vec<Edges> = (0..nodes.len())
            .map(|i| edges_from(world, &nodes, i))
            .collect();

        let graph = Self { nodes, adjacency };
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "waypoint graph built"
        );
        graph
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(SmallVec::len).sum()
    }

    #[inline]
    pub fn position(&self, node: NodeId) -> Option<Vec2> {
        self.nodes.get(node).copied()
    }

    pub fn edges(&self, node: NodeId) -> &[Edge] {
        match self.adjacency.get(node) {
            Some(edges) => edges,
            None => &[],
        }
    }

    /// Closest node with a clear line to `pos`, ties by node index
    pub fn nearest_node(&self, world: &dyn WorldQuery, pos: Vec2) -> Option<NodeId> {
        let mut best: Option<(f32, NodeId)> = None;
        for (i, &node) in self.nodes.iter().enumerate() {
            let d = node.distance_sq_to(pos);
            if best.is_some_and(|(bd, _)| d >= bd) {
                continue;
            }
            if world.has_line_of_sight(pos, node) {
                best = Some((d, i));
            }
        }
        best.map(|(_, i)| i)
    }

    /// Shortest node sequence from `start` to `goal`, both included
    pub fn find_path(&self, start: NodeId, goal: NodeId) -> Option<Vec<NodeId>> {
        let n = self.nodes.len();
        if start >= n || goal >= n {
            return None;
        }

        let mut dist = vec![u32::MAX; n];
        let mut prev: Vec<Option<NodeId>> = vec![None; n];
        let mut heap = BinaryHeap::new();
        let mut seq: u64 = 0;

        dist[start] = 0;
        heap.push(Reverse((0u32, seq, start)));

        while let Some(Reverse((cost, _, node))) = heap.pop() {
            if node == goal {
                break;
            }
            if cost > dist[node] {
                continue;
            }
            for edge in self.edges(node) {
                let next = cost.saturating_add(edge.cost);
                if next < dist[edge.to] {
                    dist[edge.to] = next;
                    prev[edge.to] = Some(node);
                    seq += 1;
                    heap.push(Reverse((next, seq, edge.to)));
                }
            }
        }

        if dist[goal] == u32::MAX {
            return None;
        }
        let mut path = vec![goal];
        let mut cur = goal;
        while let Some(p) = prev[cur] {
            path.push(p);
            cur = p;
        }
        path.reverse();
        Some(path)
    }

    /// Waypoint positions leading from `from` to `to`, ending at `to`
    pub fn route(&self, world: &dyn WorldQuery, from: Vec2, to: Vec2) -> Option<Vec<Vec2>> {
        let start = self.nearest_node(world, from)?;
        let goal = self.nearest_node(world, to)?;
        let nodes = self.find_path(start, goal)?;
        let mut points: Vec<Vec2> = nodes.into_iter().filter_map(|n| self.position(n)).collect();
        points.push(to);
        Some(points)
    }
}

/// Per-bot cached route with bounded re-planning
#[derive(Debug, Clone, Default)]
pub struct PathCache {
    destination: Option<Vec2>,
    points: Vec<Vec2>,
    cursor: usize,
    last_plan: Option<u64>,
    replans: u32,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self {
            replans: self.replans,
            ..Self::default()
        };
    }

    #[inline]
    pub fn destination(&self) -> Option<Vec2> {
        self.destination
    }

    /// Total recomputes so far
    #[inline]
    pub fn replans(&self) -> u32 {
        self.replans
    }

    fn wants_replan(&self, destination: Vec2, tick: u64) -> bool {
        let moved = match self.destination {
            None => true,
            Some(d) => d.distance_to(destination) > REPLAN_THRESHOLD,
        };
        let stale = self
            .last_plan
            .map_or(true, |t| tick >= t + REPLAN_INTERVAL);
        moved || stale
    }

    fn cooled_down(&self, tick: u64) -> bool {
        self.last_plan
            .map_or(true, |t| tick >= t + REPLAN_COOLDOWN)
    }

    /// Next point to steer toward. `None` means no route exists and the
    /// caller should steer straight at the destination.
    pub fn next_waypoint(
        &mut self,
        graph: &WaypointGraph,
        world: &dyn WorldQuery,
        pos: Vec2,
        destination: Vec2,
        tick: u64,
    ) -> Option<Vec2> {
        if self.wants_replan(destination, tick) && self.cooled_down(tick) {
            self.destination = Some(destination);
            self.points = graph.route(world, pos, destination).unwrap_or_default();
            self.cursor = 0;
            self.last_plan = Some(tick);
            self.replans += 1;
        }

        while let Some(p) = self.points.get(self.cursor) {
            if p.distance_to(pos) > WAYPOINT_REACHED || self.cursor + 1 == self.points.len() {
                break;
            }
            self.cursor += 1;
        }
        self.points.get(self.cursor).copied()
    }
}
