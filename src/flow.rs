use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::str::FromStr;

use crate::grid::{DIR_EAST, DIR_NONE, DIR_NORTH, DIR_SOUTH, DIR_WEST, Grid, dir_reverse, step};
use crate::rng::Rng;

// Depression-filling flow routing. Two solvers produce the same contract:
// every cell gets a cardinal outflow direction whose downstream path reaches
// the grid border, a lake-surface elevation >= the DEM, and an inclusive
// upstream drainage count.
//
// The semirandom solver follows Cordonnier, Bovy & Braun,
// "A versatile, linear complexity algorithm for flow routing in topographies
// with depressions" (Earth Surf. Dynam. 7, 2019).

/// Amplitude of the uniform perturbation that breaks ties on flats in the
/// priority-flood solver.
pub const TIE_BREAK_AMPLITUDE: f32 = 0.0625;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowMethod {
    PriorityFlood,
    Semirandom,
}

impl FromStr for FlowMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "priority-flood" => Ok(FlowMethod::PriorityFlood),
            "semirandom" => Ok(FlowMethod::Semirandom),
            _ => Err(()),
        }
    }
}

/// Route flow on `dem`: returns (dirs, lakes, rivers).
pub fn flow(dem: &Grid<f32>, method: FlowMethod, rng: &mut Rng) -> (Grid<u8>, Grid<f32>, Grid<u32>) {
    let (dirs, lakes) = match method {
        FlowMethod::PriorityFlood => priority_flood(dem, rng, TIE_BREAK_AMPLITUDE),
        FlowMethod::Semirandom => semirandom(dem, rng),
    };
    let rivers = accumulate(&dirs);
    (dirs, lakes, rivers)
}

/// Entry for the flood min-heap (inverted for BinaryHeap max behavior).
/// `altmax` carries the highest elevation seen on the path from the border,
/// i.e. the lake surface a cell must be flooded to before it can drain.
#[derive(Clone, Copy)]
struct FloodEntry {
    alt: f32,
    altmax: f32,
    y: u32,
    x: u32,
}

impl FloodEntry {
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.alt
            .partial_cmp(&other.alt)
            .unwrap_or(Ordering::Equal)
            .then(
                self.altmax
                    .partial_cmp(&other.altmax)
                    .unwrap_or(Ordering::Equal),
            )
            .then(self.y.cmp(&other.y))
            .then(self.x.cmp(&other.x))
    }
}

impl PartialEq for FloodEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }
}
impl Eq for FloodEntry {}

impl PartialOrd for FloodEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for FloodEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse so the lowest (alt, altmax, y, x) pops first
        other.key_cmp(self)
    }
}

/// Priority-flood solver (Planchon-Darboux / Barnes et al., Dijkstra-style).
///
/// The DEM is bordered with a one-cell sentinel margin whose two outer rings
/// carry outward directions, so border cells of the real grid drain off-grid
/// and are the flood seeds. A uniform perturbation of amplitude `tie_break`
/// (0 disables it) makes drainage on flats deterministic for a given seed.
pub fn priority_flood(dem: &Grid<f32>, rng: &mut Rng, tie_break: f32) -> (Grid<u8>, Grid<f32>) {
    let w = dem.w;
    let h = dem.h;
    let mw = w + 2;
    let mh = h + 2;

    let mut dem_margin = Grid::<f32>::new(mw, mh);
    for y in 0..h {
        for x in 0..w {
            dem_margin.set(x + 1, y + 1, dem.get(x, y));
        }
    }
    if tie_break > 0.0 {
        for v in dem_margin.data.iter_mut() {
            *v += rng.next_f32() * tie_break;
        }
    }

    // Outward directions on the two outer rings; later assignments win on
    // the overlapping corners.
    let mut dirs_margin = Grid::<u8>::new(mw, mh);
    for y in [mh - 2, mh - 1] {
        for x in 0..mw {
            dirs_margin.set(x, y, DIR_SOUTH);
        }
    }
    for x in [mw - 2, mw - 1] {
        for y in 0..mh {
            dirs_margin.set(x, y, DIR_EAST);
        }
    }
    for y in [0, 1] {
        for x in 0..mw {
            dirs_margin.set(x, y, DIR_NORTH);
        }
    }
    for x in [0, 1] {
        for y in 0..mh {
            dirs_margin.set(x, y, DIR_WEST);
        }
    }

    // Seed with the real grid's border ring (margin coordinates).
    let mut heap = BinaryHeap::new();
    let seed = |x: usize, y: usize, heap: &mut BinaryHeap<FloodEntry>| {
        let alt = dem_margin.get(x, y);
        heap.push(FloodEntry {
            alt,
            altmax: alt,
            y: y as u32,
            x: x as u32,
        });
    };
    for x in 1..=w {
        seed(x, 1, &mut heap);
        seed(x, h, &mut heap);
    }
    for y in 2..h {
        seed(1, y, &mut heap);
        seed(w, y, &mut heap);
    }

    let mut lakes = Grid::<f32>::new(w, h);

    while let Some(e) = heap.pop() {
        let (x, y) = (e.x as usize, e.y as usize);
        let lake = e.alt.max(e.altmax);
        lakes.set(x - 1, y - 1, lake);

        // Unclaimed neighbors drain back toward the popped cell.
        let neighbors = [
            (x, y - 1, DIR_SOUTH),
            (x - 1, y, DIR_EAST),
            (x, y + 1, DIR_NORTH),
            (x + 1, y, DIR_WEST),
        ];
        for (nx, ny, d) in neighbors {
            if dirs_margin.get(nx, ny) == DIR_NONE {
                dirs_margin.set(nx, ny, d);
                heap.push(FloodEntry {
                    alt: dem_margin.get(nx, ny),
                    altmax: lake,
                    y: ny as u32,
                    x: nx as u32,
                });
            }
        }
    }

    let mut dirs = Grid::<u8>::new(w, h);
    for y in 0..h {
        for x in 0..w {
            dirs.set(x, y, dirs_margin.get(x + 1, y + 1));
        }
    }
    (dirs, lakes)
}

const OCEAN: i64 = -1;

/// Spill edge between two adjacent basins. `horiz` edges separate (y, x-1)
/// from (y, x); vertical edges separate (y-1, x) from (y, x). Ocean edges use
/// x == w (resp. y == h) for the off-grid side.
#[derive(Clone, Copy, Debug)]
struct Spill {
    horiz: bool,
    x: u32,
    y: u32,
}

#[derive(Clone, Copy)]
struct BasinEdge {
    elev: f32,
    spill: Spill,
}

/// Semirandom solver: local probabilistic descent, then Planar-Boruvka basin
/// merging to drain the depressions.
pub fn semirandom(dem: &Grid<f32>, rng: &mut Rng) -> (Grid<u8>, Grid<f32>) {
    let w = dem.w;
    let h = dem.h;

    // Local directions: pick a downhill neighbor with probability
    // proportional to the positive drop. Cells with no downhill neighbor are
    // singular and anchor a basin.
    let mut dirs = Grid::<u8>::new(w, h);
    let mut singular: Vec<(usize, usize)> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let z = dem.get(x, y);
            // Drop order matches the direction codes: S, E, N, W.
            let drops = [
                if y + 1 < h { (z - dem.get(x, y + 1)).max(0.0) } else { 0.0 },
                if x + 1 < w { (z - dem.get(x + 1, y)).max(0.0) } else { 0.0 },
                if y > 0 { (z - dem.get(x, y - 1)).max(0.0) } else { 0.0 },
                if x > 0 { (z - dem.get(x - 1, y)).max(0.0) } else { 0.0 },
            ];
            let psum: f32 = drops.iter().sum();
            if psum <= 0.0 {
                singular.push((x, y));
                continue;
            }
            let mut r = rng.next_f32() * psum;
            let mut dir = DIR_NONE;
            for (i, &p) in drops.iter().enumerate() {
                if r < p {
                    dir = i as u8 + 1;
                    break;
                }
                r -= p;
            }
            if dir == DIR_NONE {
                // Floating-point slack pushed r past the last bucket.
                for (i, &p) in drops.iter().enumerate().rev() {
                    if p > 0.0 {
                        dir = i as u8 + 1;
                        break;
                    }
                }
            }
            dirs.set(x, y, dir);
        }
    }

    // Flood-fill each basin upstream from its singular cell.
    let nsing = singular.len();
    let mut basin_id = Grid::<u32>::new_with(w, h, u32::MAX);
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for (i, &(sx, sy)) in singular.iter().enumerate() {
        stack.push((sx, sy));
        while let Some((cx, cy)) = stack.pop() {
            basin_id.set(cx, cy, i as u32);
            for d in [DIR_SOUTH, DIR_EAST, DIR_NORTH, DIR_WEST] {
                if let Some((nx, ny)) = step(cx, cy, d, w, h) {
                    if dirs.get(nx, ny) == dir_reverse(d) {
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }

    // Minimum spill edge for every pair of adjacent basins; the ocean is
    // basin -1 and touches the whole border.
    let mut links: HashMap<(i64, i64), BasinEdge> = HashMap::new();
    let add_link = |links: &mut HashMap<(i64, i64), BasinEdge>,
                        b0: i64,
                        b1: i64,
                        elev: f32,
                        spill: Spill| {
        let key = (b0.min(b1), b0.max(b1));
        let edge = BasinEdge { elev, spill };
        links
            .entry(key)
            .and_modify(|e| {
                if elev < e.elev {
                    *e = edge;
                }
            })
            .or_insert(edge);
    };

    for y in 0..h {
        let mut b0 = basin_id.get(0, y) as i64;
        add_link(
            &mut links,
            OCEAN,
            b0,
            dem.get(0, y),
            Spill { horiz: true, x: 0, y: y as u32 },
        );
        for x in 1..w {
            let b1 = basin_id.get(x, y) as i64;
            if b1 != b0 {
                add_link(
                    &mut links,
                    b0,
                    b1,
                    dem.get(x - 1, y).max(dem.get(x, y)),
                    Spill { horiz: true, x: x as u32, y: y as u32 },
                );
            }
            b0 = b1;
        }
        add_link(
            &mut links,
            OCEAN,
            b0,
            dem.get(w - 1, y),
            Spill { horiz: true, x: w as u32, y: y as u32 },
        );
    }
    for x in 0..w {
        let mut b0 = basin_id.get(x, 0) as i64;
        add_link(
            &mut links,
            OCEAN,
            b0,
            dem.get(x, 0),
            Spill { horiz: false, x: x as u32, y: 0 },
        );
        for y in 1..h {
            let b1 = basin_id.get(x, y) as i64;
            if b1 != b0 {
                add_link(
                    &mut links,
                    b0,
                    b1,
                    dem.get(x, y - 1).max(dem.get(x, y)),
                    Spill { horiz: false, x: x as u32, y: y as u32 },
                );
            }
            b0 = b1;
        }
        add_link(
            &mut links,
            OCEAN,
            b0,
            dem.get(x, h - 1),
            Spill { horiz: false, x: x as u32, y: h as u32 },
        );
    }

    // Basin spanning tree, then walk it from the ocean: each basin's lake
    // surface is the highest spill crossed on the way in, and its flow is
    // re-oriented to exit through the spill edge.
    let tree = planar_boruvka(links);

    let mut by_node: HashMap<i64, Vec<(i64, f32, Spill)>> = HashMap::new();
    for (b1, b2, e) in &tree {
        by_node.entry(*b1).or_default().push((*b2, e.elev, e.spill));
        by_node.entry(*b2).or_default().push((*b1, e.elev, e.spill));
    }
    for nbrs in by_node.values_mut() {
        nbrs.sort_unstable_by_key(|(b, _, _)| *b);
    }

    let mut basin_lake = vec![f32::NEG_INFINITY; nsing];
    let mut entered = vec![false; nsing];
    let mut walk: Vec<(i64, f32)> = vec![(OCEAN, f32::NEG_INFINITY)];
    while let Some((b, lake)) = walk.pop() {
        if b >= 0 {
            basin_lake[b as usize] = lake;
        }
        let Some(nbrs) = by_node.remove(&b) else { continue };
        for (b2, elev, spill) in nbrs {
            if b2 == OCEAN || entered[b2 as usize] {
                continue;
            }
            entered[b2 as usize] = true;
            walk.push((b2, lake.max(elev)));
            reorient(&mut dirs, &basin_id, b2, spill);
        }
    }

    let mut lakes = Grid::<f32>::new(w, h);
    for i in 0..w * h {
        let b = basin_id.data[i] as usize;
        lakes.data[i] = dem.data[i].max(basin_lake[b]);
    }

    (dirs, lakes)
}

/// Reverse the flow path of basin `b2` so it exits through its spill edge.
/// The chain of old local directions is walked down to the singular cell,
/// each cell receiving the reverse of the direction it was entered by.
fn reorient(dirs: &mut Grid<u8>, basin_id: &Grid<u32>, b2: i64, spill: Spill) {
    let w = dirs.w;
    let h = dirs.h;
    let (sx, sy) = (spill.x as usize, spill.y as usize);

    let in_basin = sx < w && sy < h && basin_id.get(sx, sy) as i64 == b2;
    let (mut x, mut y, mut carry) = if in_basin {
        // Escape across the edge in the negative direction.
        (sx, sy, if spill.horiz { DIR_WEST } else { DIR_NORTH })
    } else if spill.horiz {
        (sx - 1, sy, DIR_EAST)
    } else {
        (sx, sy - 1, DIR_SOUTH)
    };

    loop {
        let old = dirs.get(x, y);
        dirs.set(x, y, carry);
        if old == DIR_NONE {
            break;
        }
        let Some((nx, ny)) = step(x, y, old, w, h) else {
            debug_assert!(false, "local flow direction left the grid");
            break;
        };
        x = nx;
        y = ny;
        carry = dir_reverse(old);
    }
}

/// Planar Boruvka over the basin adjacency graph: repeatedly contract a
/// low-degree basin along its minimum spill edge until one node remains.
/// Returns the spanning-tree edges with their original basin ids.
fn planar_boruvka(links: HashMap<(i64, i64), BasinEdge>) -> Vec<(i64, i64, BasinEdge)> {
    const THRESHOLD: usize = 8;

    let mut adj: HashMap<i64, HashMap<i64, (i64, i64, BasinEdge)>> = HashMap::new();
    for ((b1, b2), e) in links {
        adj.entry(b1).or_default().insert(b2, (b1, b2, e));
        adj.entry(b2).or_default().insert(b1, (b1, b2, e));
    }

    // LIFO worklist of low-degree nodes with exact membership: a node is
    // pushed when its degree drops to the threshold, unlisted (lazily) when a
    // merge pushes it back above. Seeded in ascending id order so basins are
    // consumed before the ocean sentinel.
    let mut low: Vec<i64> = adj
        .iter()
        .filter(|(_, nbrs)| nbrs.len() <= THRESHOLD)
        .map(|(&b, _)| b)
        .collect();
    low.sort_unstable();
    let mut in_low: std::collections::HashSet<i64> = low.iter().copied().collect();

    let mut n = adj.len();
    let mut tree = Vec::with_capacity(n.saturating_sub(1));

    while n > 1 {
        let b1 = loop {
            match low.pop() {
                Some(b) => {
                    if in_low.remove(&b) {
                        break b;
                    }
                    // Stale entry: unlisted since it was pushed.
                }
                None => {
                    // Planarity guarantees a low-degree node exists; rescan.
                    let mut ids: Vec<i64> = adj.keys().copied().collect();
                    ids.sort_unstable();
                    break *ids
                        .iter()
                        .min_by_key(|id| adj[id].len())
                        .expect("basin graph exhausted early");
                }
            }
        };

        let lnk1 = adj.remove(&b1).expect("popped basin already merged");
        let (&b2, &min_edge) = lnk1
            .iter()
            .min_by(|(ka, (_, _, ea)), (kb, (_, _, eb))| {
                ea.elev
                    .partial_cmp(&eb.elev)
                    .unwrap_or(Ordering::Equal)
                    .then(ka.cmp(kb))
            })
            .expect("merged basin lost all neighbors");
        tree.push(min_edge);

        // Merge b1 into b2: transfer b1's neighbors, each keeping the better
        // of its two incident edges.
        if let Some(l2) = adj.get_mut(&b2) {
            l2.remove(&b1);
        }
        let mut keys: Vec<i64> = lnk1.keys().copied().filter(|&k| k != b2).collect();
        keys.sort_unstable();
        for k in keys {
            let v = lnk1[&k];
            let keep_existing = adj
                .get(&b2)
                .and_then(|l2| l2.get(&k))
                .is_some_and(|(_, _, e2)| e2.elev <= v.2.elev);
            if keep_existing {
                if let Some(bk) = adj.get_mut(&k) {
                    bk.remove(&b1);
                }
            } else {
                if let Some(l2) = adj.get_mut(&b2) {
                    l2.insert(k, v);
                }
                if let Some(bk) = adj.get_mut(&k) {
                    bk.remove(&b1);
                    bk.insert(b2, v);
                }
            }
            if adj.get(&k).is_some_and(|bk| bk.len() <= THRESHOLD) && in_low.insert(k) {
                low.push(k);
            }
        }
        let deg2 = adj.get(&b2).map_or(0, |l2| l2.len());
        if in_low.contains(&b2) {
            if deg2 > THRESHOLD {
                in_low.remove(&b2);
            }
        } else if deg2 <= THRESHOLD && in_low.insert(b2) {
            low.push(b2);
        }

        n -= 1;
    }

    tree
}

/// Drainage accumulation: every cell contributes 1 plus its upstream
/// sub-tree. Iterative donor-count walk from the source cells; the recursive
/// form overflows the stack on large grids.
pub fn accumulate(dirs: &Grid<u8>) -> Grid<u32> {
    let w = dirs.w;
    let h = dirs.h;

    let mut ndonors = Grid::<u8>::new(w, h);
    for y in 0..h {
        for x in 0..w {
            if let Some((nx, ny)) = step(x, y, dirs.get(x, y), w, h) {
                let i = ndonors.idx(nx, ny);
                ndonors.data[i] += 1;
            }
        }
    }

    let mut rivers = Grid::<u32>::new_with(w, h, 1);
    for y in 0..h {
        for x in 0..w {
            if ndonors.get(x, y) > 0 {
                continue;
            }
            let (mut cx, mut cy) = (x, y);
            let mut acc = rivers.get(cx, cy);
            loop {
                let Some((nx, ny)) = step(cx, cy, dirs.get(cx, cy), w, h) else {
                    break;
                };
                cx = nx;
                cy = ny;
                acc += rivers.get(cx, cy);
                rivers.set(cx, cy, acc);
                // A junction with donors still pending finishes later.
                if ndonors.get(cx, cy) > 1 {
                    let i = ndonors.idx(cx, cy);
                    ndonors.data[i] -= 1;
                    break;
                }
            }
        }
    }

    rivers
}
