//! Spatial grouping of recognized lines
//!
//! Sail numbers are often printed across two stacked rows of similar
//! height. Lines whose vertical centers are close relative to their
//! heights are merged so the joined text can be read as one number.

use super::{FragmentGroup, RawFragment, Region};

/// Default adjacency factor applied to the mean height of two regions
pub const DEFAULT_ADJACENCY_FACTOR: f32 = 1.5;

/// Whether two fragments sit on vertically adjacent rows.
///
/// Adjacent when the distance between region centers is strictly less
/// than `factor` times the mean of the two region heights.
pub fn is_adjacent(a: &RawFragment, b: &RawFragment, factor: f32) -> bool {
    let distance = (a.region.center_y() - b.region.center_y()).abs();
    let mean_height = (a.region.height() + b.region.height()) / 2.0;
    distance < factor * mean_height
}

/// Greedy single-pass clustering.
///
/// Each unvisited fragment seeds a group and absorbs every later unvisited
/// fragment adjacent to the seed. Adjacency is not transitive: a fragment
/// close only to a non-seed member starts its own group.
pub fn group_fragments(fragments: &[RawFragment], factor: f32) -> Vec<FragmentGroup> {
    let mut visited = vec![false; fragments.len()];
    let mut groups = Vec::new();

    for (seed_idx, seed) in fragments.iter().enumerate() {
        if visited[seed_idx] {
            continue;
        }
        visited[seed_idx] = true;

        let mut members = vec![seed.clone()];

        for (idx, other) in fragments.iter().enumerate().skip(seed_idx + 1) {
            if !visited[idx] && is_adjacent(seed, other, factor) {
                visited[idx] = true;
                members.push(other.clone());
            }
        }

        let region = Region::union(members.iter().map(|f| &f.region));
        groups.push(FragmentGroup { members, region });
    }

    groups
}
