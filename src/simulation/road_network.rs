//! Grid road network: segments, occupancy and routing
//!
//! The grid is built once from `SimConfig` and never changes shape. Internal
//! segments also live in a petgraph graph used for shortest-hop routing.

use anyhow::{Context, Result};
use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap};

use super::config::SimConfig;
use super::error::EngineError;
use super::intersection::{PhaseDurations, SimIntersection};
use super::segment::{Endpoint, JamPolicy, SimSegment};
use super::types::{Direction, GridCoord, IntersectionId, SegmentId, SimId};
use super::weather::WeatherState;

/// Edge data for the routing graph
#[derive(Debug, Clone, Copy)]
pub struct SegmentEdge {
    pub segment_id: SegmentId,
    /// Every grid hop costs the same
    pub weight: u32,
}

/// A segment's jam flag changed this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JamTransition {
    pub segment: SegmentId,
    pub jammed: bool,
}

pub struct SimRoadNetwork {
    cols: usize,
    rows: usize,

    /// Directed graph over internal segments
    graph: DiGraph<IntersectionId, SegmentEdge>,
    intersection_to_node: HashMap<IntersectionId, NodeIndex>,
    node_to_intersection: HashMap<NodeIndex, IntersectionId>,

    /// Cached path results
    path_cache: HashMap<IntersectionId, HashMap<IntersectionId, Vec<IntersectionId>>>,

    segments: BTreeMap<SegmentId, SimSegment>,
    coords: HashMap<IntersectionId, GridCoord>,
    by_coord: HashMap<GridCoord, IntersectionId>,

    /// Boundary -> intersection segments where vehicles spawn
    entry_segments: Vec<SegmentId>,
    /// Intersection -> boundary segments where routes end
    exit_segments: Vec<SegmentId>,

    jam_policy: JamPolicy,
}

impl SimRoadNetwork {
    /// Build the grid and the intersections that sit on it
    pub fn build_grid(config: &SimConfig) -> (Self, Vec<SimIntersection>) {
        let mut network = SimRoadNetwork {
            cols: config.grid_cols,
            rows: config.grid_rows,
            graph: DiGraph::new(),
            intersection_to_node: HashMap::new(),
            node_to_intersection: HashMap::new(),
            path_cache: HashMap::new(),
            segments: BTreeMap::new(),
            coords: HashMap::new(),
            by_coord: HashMap::new(),
            entry_segments: Vec::new(),
            exit_segments: Vec::new(),
            jam_policy: JamPolicy {
                enter_ratio: config.jam_enter_ratio,
                enter_ticks: config.jam_enter_ticks,
                clear_ratio: config.jam_clear_ratio,
                clear_ticks: config.jam_clear_ticks,
            },
        };

        let durations = PhaseDurations::new(
            config.default_green_secs,
            config.yellow_secs,
            config.all_red_secs,
        );

        let mut intersections = Vec::with_capacity(config.grid_cols * config.grid_rows);
        for row in 0..config.grid_rows {
            for col in 0..config.grid_cols {
                let coord = GridCoord::new(col, row);
                let id = IntersectionId(SimId(row * config.grid_cols + col));
                network.add_intersection(id, coord);
                intersections.push(SimIntersection::new(id, coord, durations));
            }
        }

        let mut next_segment = 0usize;
        let mut new_segment_id = || {
            let id = SegmentId(SimId(next_segment));
            next_segment += 1;
            id
        };

        for index in 0..intersections.len() {
            let id = intersections[index].id;
            let coord = intersections[index].coord;
            for direction in Direction::ALL {
                match coord.step(direction, config.grid_cols, config.grid_rows) {
                    Some(neighbor_coord) => {
                        let neighbor = network.by_coord[&neighbor_coord];
                        let segment_id = new_segment_id();
                        // arrives at the neighbour from the side facing us
                        let approach = direction.opposite();
                        network.add_segment(SimSegment::new(
                            segment_id,
                            Endpoint::Intersection(id),
                            Endpoint::Intersection(neighbor),
                            Some(approach),
                            config.segment_capacity,
                            config.base_speed,
                        ));
                        let neighbor_index = neighbor.0 .0;
                        intersections[neighbor_index].approaches[approach.index()] =
                            Some(segment_id);
                    }
                    None => {
                        let entry = new_segment_id();
                        network.add_segment(SimSegment::new(
                            entry,
                            Endpoint::Boundary,
                            Endpoint::Intersection(id),
                            Some(direction),
                            config.boundary_capacity,
                            config.base_speed,
                        ));
                        intersections[index].approaches[direction.index()] = Some(entry);
                        network.entry_segments.push(entry);

                        let exit = new_segment_id();
                        network.add_segment(SimSegment::new(
                            exit,
                            Endpoint::Intersection(id),
                            Endpoint::Boundary,
                            None,
                            config.boundary_capacity,
                            config.base_speed,
                        ));
                        network.exit_segments.push(exit);
                    }
                }
            }
        }

        (network, intersections)
    }

    fn add_intersection(&mut self, id: IntersectionId, coord: GridCoord) {
        let node_index = self.graph.add_node(id);
        self.intersection_to_node.insert(id, node_index);
        self.node_to_intersection.insert(node_index, id);
        self.coords.insert(id, coord);
        self.by_coord.insert(coord, id);
    }

    fn add_segment(&mut self, segment: SimSegment) {
        if let (Endpoint::Intersection(start), Endpoint::Intersection(end)) =
            (segment.start, segment.end)
        {
            let start_node = self.intersection_to_node[&start];
            let end_node = self.intersection_to_node[&end];
            self.graph.add_edge(
                start_node,
                end_node,
                SegmentEdge {
                    segment_id: segment.id,
                    weight: 1,
                },
            );
        }
        self.segments.insert(segment.id, segment);
        self.path_cache.clear();
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn get_segment(&self, segment_id: SegmentId) -> Option<&SimSegment> {
        self.segments.get(&segment_id)
    }

    pub fn segments(&self) -> impl Iterator<Item = &SimSegment> {
        self.segments.values()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn intersection_count(&self) -> usize {
        self.intersection_to_node.len()
    }

    pub fn entry_segments(&self) -> &[SegmentId] {
        &self.entry_segments
    }

    pub fn exit_segments(&self) -> &[SegmentId] {
        &self.exit_segments
    }

    pub fn coord_of(&self, intersection_id: IntersectionId) -> Option<GridCoord> {
        self.coords.get(&intersection_id).copied()
    }

    pub fn intersection_at(&self, coord: GridCoord) -> Option<IntersectionId> {
        self.by_coord.get(&coord).copied()
    }

    /// The intersection adjacent to `intersection_id` on side `direction`
    pub fn neighbor(
        &self,
        intersection_id: IntersectionId,
        direction: Direction,
    ) -> Option<IntersectionId> {
        let coord = self.coord_of(intersection_id)?;
        let next = coord.step(direction, self.cols, self.rows)?;
        self.intersection_at(next)
    }

    /// Finds the segment connecting two adjacent intersections
    pub fn find_segment_between(
        &self,
        from_intersection: IntersectionId,
        to_intersection: IntersectionId,
    ) -> Result<SegmentId> {
        let from_node = self
            .intersection_to_node
            .get(&from_intersection)
            .with_context(|| format!("Intersection {} not found", from_intersection))?;

        let to_node = self
            .intersection_to_node
            .get(&to_intersection)
            .with_context(|| format!("Intersection {} not found", to_intersection))?;

        self.graph
            .edges(*from_node)
            .find(|edge| edge.target() == *to_node)
            .map(|edge| edge.weight().segment_id)
            .with_context(|| {
                format!(
                    "No segment connecting {} to {}",
                    from_intersection, to_intersection
                )
            })
    }

    /// Finds a shortest-hop path between two intersections using A* with a
    /// null heuristic. The returned path excludes `start`.
    pub fn find_path(
        &mut self,
        start: IntersectionId,
        end: IntersectionId,
    ) -> Option<Vec<IntersectionId>> {
        if start == end {
            return Some(vec![]);
        }

        if let Some(path) = self.path_cache.get(&start).and_then(|paths| paths.get(&end)) {
            return Some(path.clone());
        }

        let start_node = self.intersection_to_node.get(&start)?;
        let end_node = self.intersection_to_node.get(&end)?;

        let (_, node_path) = astar(
            &self.graph,
            *start_node,
            |node| node == *end_node,
            |edge| edge.weight().weight,
            |_| 0,
        )?;

        let path: Vec<IntersectionId> = node_path
            .iter()
            .skip(1)
            .filter_map(|node_idx| self.node_to_intersection.get(node_idx).copied())
            .collect();

        self.path_cache
            .entry(start)
            .or_default()
            .insert(end, path.clone());

        Some(path)
    }

    /// A vehicle joined the segment
    pub fn enter_segment(&mut self, segment_id: SegmentId) -> Result<(), EngineError> {
        self.segments
            .get_mut(&segment_id)
            .map(SimSegment::enter)
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!("entered unknown segment {}", segment_id))
            })
    }

    /// A vehicle left the segment
    pub fn leave_segment(&mut self, segment_id: SegmentId) -> Result<(), EngineError> {
        self.segments
            .get_mut(&segment_id)
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!("left unknown segment {}", segment_id))
            })?
            .leave()
    }

    /// Refresh weather-adjusted speed limits
    pub fn apply_weather(&mut self, weather: WeatherState) {
        let multiplier = weather.speed_multiplier();
        for segment in self.segments.values_mut() {
            segment.speed_limit = segment.base_speed_limit * multiplier;
        }
    }

    /// Run one tick of jam hysteresis over every segment. Worse weather
    /// inflates the observed density so jams form sooner.
    pub fn update_jams(&mut self, weather: WeatherState) -> Vec<JamTransition> {
        let policy = self.jam_policy;
        let multiplier = weather.jam_multiplier();

        self.segments
            .values_mut()
            .filter_map(|segment| {
                let pressure = segment.density() * multiplier;
                segment.observe(pressure, &policy).map(|jammed| JamTransition {
                    segment: segment.id,
                    jammed,
                })
            })
            .collect()
    }

    /// Overwrite a segment's occupancy directly. Test scaffolding for
    /// jam scenarios; normal flow only uses `enter_segment`/`leave_segment`.
    #[cfg(test)]
    pub fn force_occupancy(&mut self, segment_id: SegmentId, occupancy: u32) {
        if let Some(segment) = self.segments.get_mut(&segment_id) {
            segment.occupancy = occupancy;
        }
    }
}
