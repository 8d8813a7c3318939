//! Deterministic domain-clustered layout.
//!
//! # Responsibility
//! - Place principles on a circle of domain sectors, clustered by primary
//!   domain, and attach visual weights (node size, color, edge thickness).
//!
//! # Invariants
//! - Pure: no I/O, no randomness, no clock. Output depends only on the input
//!   values; principles are sorted by id and edges by key before use.
//! - Sectors tile `[0, 2π)` exactly once: consecutive, gap-free, the last one
//!   ends at `TAU`.
//! - Node size is non-decreasing in degree; edge thickness is non-decreasing
//!   in weight.
//! - A domain's color depends only on its rank in the name-ordered domain set.

use crate::model::domain::{domain_name_key, Domain, DomainId};
use crate::model::edge::Edge;
use crate::model::principle::{Principle, PrincipleId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::f64::consts::TAU;

/// Palette cycled over name-ordered domains.
pub const DOMAIN_PALETTE: [&str; 15] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9", "#F8B500", "#00CED1", "#FF69B4", "#32CD32", "#FF8C00",
];
/// Color for principles/edges whose domain is not in the domain set.
pub const FALLBACK_COLOR: &str = "#CCCCCC";

const GROUP_RADIUS: f64 = 3.0;
const RING_SPACING: f64 = 0.8;
const NODES_PER_RING: usize = 8;
const MIN_NODE_SIZE: f64 = 12.0;
const MAX_NODE_SIZE: f64 = 40.0;
const EDGE_THICKNESS_PER_WEIGHT: f64 = 1.5;
const MIN_EDGE_THICKNESS: f64 = 1.0;
const MAX_EDGE_THICKNESS: f64 = 6.0;

/// Render data for one principle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePlacement {
    pub id: PrincipleId,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub color: String,
    pub degree: usize,
    pub primary_domain_id: DomainId,
}

/// Render data for one edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStroke {
    pub a: PrincipleId,
    pub b: PrincipleId,
    pub weight: u32,
    pub thickness: f64,
    pub color: String,
}

/// Angular slot owned by one primary-domain group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSector {
    pub domain_id: DomainId,
    pub start_angle: f64,
    pub end_angle: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub member_count: usize,
}

/// Legend entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainColor {
    pub domain_id: DomainId,
    pub name: String,
    pub color: String,
}

/// Complete layout payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLayout {
    /// Sorted by principle id.
    pub nodes: Vec<NodePlacement>,
    /// Sorted by `(a, b)`; only edges with both endpoints placed.
    pub edges: Vec<EdgeStroke>,
    /// In angular order.
    pub sectors: Vec<DomainSector>,
    /// In name order.
    pub legend: Vec<DomainColor>,
}

impl GraphLayout {
    pub fn node(&self, id: PrincipleId) -> Option<&NodePlacement> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// Name-ordered domain ranking; rank drives palette color and group order.
#[derive(Debug, Clone)]
struct DomainRanking<'d> {
    ordered: Vec<&'d Domain>,
    rank: HashMap<DomainId, usize>,
}

impl<'d> DomainRanking<'d> {
    fn new(domains: &'d [Domain]) -> Self {
        let mut ordered: Vec<&Domain> = domains.iter().collect();
        ordered.sort_by(|left, right| {
            domain_name_key(&left.name)
                .cmp(&domain_name_key(&right.name))
                .then_with(|| left.name.cmp(&right.name))
                .then_with(|| left.id.cmp(&right.id))
        });
        ordered.dedup_by_key(|domain| domain.id);
        let rank = ordered
            .iter()
            .enumerate()
            .map(|(index, domain)| (domain.id, index))
            .collect();
        Self { ordered, rank }
    }

    /// Unknown domains sort after every known one.
    fn rank_of(&self, id: DomainId) -> usize {
        self.rank.get(&id).copied().unwrap_or(self.ordered.len())
    }

    fn color_of(&self, id: DomainId) -> &'static str {
        self.rank
            .get(&id)
            .map_or(FALLBACK_COLOR, |rank| domain_color(*rank))
    }
}

/// Returns the palette color for a name-ordered domain rank.
pub fn domain_color(rank: usize) -> &'static str {
    DOMAIN_PALETTE[rank % DOMAIN_PALETTE.len()]
}

/// Maps a node degree to a render size in `[12, 40]`.
pub fn node_size(degree: usize, max_degree: usize) -> f64 {
    if max_degree == 0 {
        return MIN_NODE_SIZE;
    }
    let ratio = degree.min(max_degree) as f64 / max_degree as f64;
    MIN_NODE_SIZE + ratio * (MAX_NODE_SIZE - MIN_NODE_SIZE)
}

/// Maps an edge weight to a stroke thickness in `[1, 6]`.
pub fn edge_thickness(weight: u32) -> f64 {
    (f64::from(weight) * EDGE_THICKNESS_PER_WEIGHT).clamp(MIN_EDGE_THICKNESS, MAX_EDGE_THICKNESS)
}

/// Computes the layout of a graph snapshot.
///
/// Principles without domains cannot exist in storage; if one is passed in it
/// is skipped rather than placed.
pub fn layout(principles: &[Principle], edges: &[Edge], domains: &[Domain]) -> GraphLayout {
    let ranking = DomainRanking::new(domains);

    let mut placed: Vec<&Principle> = principles
        .iter()
        .filter(|principle| principle.primary_domain().is_some())
        .collect();
    placed.sort_by_key(|principle| principle.id);
    placed.dedup_by_key(|principle| principle.id);
    let placed_ids: HashSet<PrincipleId> = placed.iter().map(|principle| principle.id).collect();

    let mut visible: Vec<&Edge> = edges
        .iter()
        .filter(|edge| placed_ids.contains(&edge.a) && placed_ids.contains(&edge.b))
        .collect();
    visible.sort_by_key(|edge| edge.key());
    visible.dedup_by_key(|edge| edge.key());

    let mut degree: HashMap<PrincipleId, usize> = HashMap::new();
    for edge in &visible {
        *degree.entry(edge.a).or_default() += 1;
        *degree.entry(edge.b).or_default() += 1;
    }
    let degree_of = |id: PrincipleId| degree.get(&id).copied().unwrap_or(0);
    let max_degree = degree.values().copied().max().unwrap_or(0);

    // (rank, domain id) keeps group order independent of input order.
    let mut groups: BTreeMap<(usize, DomainId), Vec<&Principle>> = BTreeMap::new();
    for principle in &placed {
        if let Some(primary) = principle.primary_domain() {
            groups
                .entry((ranking.rank_of(primary), primary))
                .or_default()
                .push(principle);
        }
    }

    let total = placed.len();
    let group_count = groups.len();
    let group_radius = if group_count > 1 { GROUP_RADIUS } else { 0.0 };
    let mut sectors = Vec::with_capacity(group_count);
    let mut nodes = Vec::with_capacity(total);
    let mut cursor = 0.0_f64;
    let mut assigned = 0_usize;

    for (group_index, ((_, domain_id), mut members)) in groups.into_iter().enumerate() {
        assigned += members.len();
        let start_angle = cursor;
        let end_angle = if group_index + 1 == group_count {
            TAU
        } else {
            TAU * assigned as f64 / total as f64
        };
        cursor = end_angle;

        let mid_angle = (start_angle + end_angle) / 2.0;
        let center_x = group_radius * mid_angle.cos();
        let center_y = group_radius * mid_angle.sin();

        members.sort_by(|left, right| {
            degree_of(right.id)
                .cmp(&degree_of(left.id))
                .then_with(|| left.id.cmp(&right.id))
        });
        let color = ranking.color_of(domain_id);
        for (index, member) in members.iter().enumerate() {
            let (x, y) = ring_position(index, members.len(), center_x, center_y);
            let member_degree = degree_of(member.id);
            nodes.push(NodePlacement {
                id: member.id,
                x,
                y,
                size: node_size(member_degree, max_degree),
                color: color.to_string(),
                degree: member_degree,
                primary_domain_id: domain_id,
            });
        }

        sectors.push(DomainSector {
            domain_id,
            start_angle,
            end_angle,
            center_x,
            center_y,
            member_count: members.len(),
        });
    }
    nodes.sort_by_key(|node| node.id);

    let edges = visible
        .iter()
        .map(|edge| EdgeStroke {
            a: edge.a,
            b: edge.b,
            weight: edge.weight,
            thickness: edge_thickness(edge.weight),
            color: edge_color(edge, &ranking).to_string(),
        })
        .collect();

    let legend = ranking
        .ordered
        .iter()
        .map(|domain| DomainColor {
            domain_id: domain.id,
            name: domain.name.clone(),
            color: ranking.color_of(domain.id).to_string(),
        })
        .collect();

    GraphLayout {
        nodes,
        edges,
        sectors,
        legend,
    }
}

fn edge_color(edge: &Edge, ranking: &DomainRanking<'_>) -> &'static str {
    edge.shared_domain_ids
        .iter()
        .min_by_key(|id| (ranking.rank_of(**id), **id))
        .map_or(FALLBACK_COLOR, |id| ranking.color_of(*id))
}

/// Concentric rings of `NODES_PER_RING` around a group center.
fn ring_position(index: usize, group_size: usize, center_x: f64, center_y: f64) -> (f64, f64) {
    if group_size == 1 {
        return (center_x, center_y);
    }
    let ring = index / NODES_PER_RING;
    let slot = index % NODES_PER_RING;
    let in_ring = NODES_PER_RING.min(group_size - ring * NODES_PER_RING);
    let radius = RING_SPACING * (ring + 1) as f64;
    let angle = TAU * slot as f64 / in_ring as f64;
    (center_x + radius * angle.cos(), center_y + radius * angle.sin())
}
