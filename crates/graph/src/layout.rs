use std::collections::HashSet;
use std::f64::consts::PI;

use force_graph::{EdgeData, ForceGraph, NodeData, SimulationParameters};
use serde::{Deserialize, Serialize};

use crate::builder::KnowledgeGraph;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub width: f64,
    pub height: f64,
    /// Blank border kept around the drawing.
    pub margin: f64,
    pub iterations: usize,
    pub time_step: f32,
    pub force_charge: f32,
    pub force_spring: f32,
    pub force_max: f32,
    pub node_speed: f32,
    pub damping_factor: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            margin: 60.0,
            iterations: 400,
            time_step: 0.035,
            force_charge: 150.0,
            force_spring: 0.05,
            force_max: 100.0,
            node_speed: 3000.0,
            damping_factor: 0.9,
        }
    }
}

/// Node positions in viewport coordinates, indexed like [`KnowledgeGraph::nodes`].
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub width: f64,
    pub height: f64,
    pub positions: Vec<(f64, f64)>,
}

/// Seed nodes on a circle, run the force simulation for a fixed number of steps,
/// then scale the result into the viewport. Deterministic for a given graph.
pub fn layout(graph: &KnowledgeGraph, config: &LayoutConfig) -> Layout {
    let n = graph.node_count();
    let (cx, cy) = (config.width / 2.0, config.height / 2.0);
    let radius = (config.width.min(config.height) / 2.0 - config.margin).max(1.0);

    let seeds: Vec<(f64, f64)> = (0..n)
        .map(|i| {
            if n == 1 {
                return (cx, cy);
            }
            let angle = (i as f64) * 2.0 * PI / n as f64;
            (cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect();

    if n < 2 {
        return Layout {
            width: config.width,
            height: config.height,
            positions: seeds,
        };
    }

    let mut simulation: ForceGraph<usize, ()> = ForceGraph::new(SimulationParameters {
        force_charge: config.force_charge,
        force_spring: config.force_spring,
        force_max: config.force_max,
        node_speed: config.node_speed,
        damping_factor: config.damping_factor,
    });

    let handles: Vec<_> = seeds
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| {
            simulation.add_node(NodeData {
                x: x as f32,
                y: y as f32,
                mass: 10.0,
                is_anchor: false,
                user_data: i,
            })
        })
        .collect();

    // One spring per connected pair; loops and parallel edges add nothing to the layout.
    let mut springs = HashSet::new();
    for (source, target, _) in graph.indexed_edges() {
        if source != target && springs.insert((source.min(target), source.max(target))) {
            simulation.add_edge(handles[source], handles[target], EdgeData::default());
        }
    }

    for _ in 0..config.iterations {
        simulation.update(config.time_step);
    }

    let mut positions = seeds.clone();
    simulation.visit_nodes(|node| {
        let (x, y) = (node.x() as f64, node.y() as f64);
        if x.is_finite() && y.is_finite() {
            positions[node.data.user_data] = (x, y);
        }
    });

    Layout {
        width: config.width,
        height: config.height,
        positions: fit_to_viewport(positions, config),
    }
}

fn fit_to_viewport(positions: Vec<(f64, f64)>, config: &LayoutConfig) -> Vec<(f64, f64)> {
    let (min_x, max_x, min_y, max_y) = positions.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(lx, hx, ly, hy), &(x, y)| (lx.min(x), hx.max(x), ly.min(y), hy.max(y)),
    );

    let inner_w = (config.width - 2.0 * config.margin).max(1.0);
    let inner_h = (config.height - 2.0 * config.margin).max(1.0);
    let span_x = (max_x - min_x).max(f64::EPSILON);
    let span_y = (max_y - min_y).max(f64::EPSILON);
    let scale = (inner_w / span_x).min(inner_h / span_y);

    // Centre the scaled drawing inside the margins.
    let offset_x = config.margin + (inner_w - span_x * scale) / 2.0;
    let offset_y = config.margin + (inner_h - span_y * scale) / 2.0;

    positions
        .into_iter()
        .map(|(x, y)| (offset_x + (x - min_x) * scale, offset_y + (y - min_y) * scale))
        .collect()
}
