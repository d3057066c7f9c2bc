use crate::grid::{DIR_EAST, DIR_NONE, DIR_NORTH, DIR_SOUTH, DIR_WEST, Grid, dir_reverse, step};

// River tension "twist": vertices are nudged so grid edges align with river
// courses, treating every river segment as an elastic whose tension grows
// with its flux. The offsets deform the render grid only; the rasters keep
// their orthogonal topology.

/// Signed flux across every grid edge. `bounds_h` is (w-1) x h and carries
/// E/W flow between (x, y) and (x+1, y); `bounds_v` is w x (h-1) and carries
/// S/N flow between (x, y) and (x, y+1). Positive along +x / +y.
pub fn make_bounds(dirs: &Grid<u8>, rivers: &Grid<u32>) -> (Grid<i32>, Grid<i32>) {
    let w = dirs.w;
    let h = dirs.h;
    let mut bounds_h = Grid::<i32>::new(w - 1, h);
    let mut bounds_v = Grid::<i32>::new(w, h - 1);

    for y in 0..h {
        for x in 0..w {
            let q = rivers.get(x, y) as i32;
            match dirs.get(x, y) {
                DIR_EAST if x + 1 < w => {
                    let i = bounds_h.idx(x, y);
                    bounds_h.data[i] += q;
                }
                DIR_WEST if x > 0 => {
                    let i = bounds_h.idx(x - 1, y);
                    bounds_h.data[i] -= q;
                }
                DIR_SOUTH if y + 1 < h => {
                    let i = bounds_v.idx(x, y);
                    bounds_v.data[i] += q;
                }
                DIR_NORTH if y > 0 => {
                    let i = bounds_v.idx(x, y - 1);
                    bounds_v.data[i] -= q;
                }
                _ => {}
            }
        }
    }

    (bounds_h, bounds_v)
}

/// Vertices that must not move: border cells whose flow exits the grid
/// (outlets anchor the network), and cells no neighbor drains into (stream
/// tips and dry ground have nothing pulling on them).
pub fn fixed_vertices(dirs: &Grid<u8>) -> Grid<bool> {
    let w = dirs.w;
    let h = dirs.h;
    let mut fixed = Grid::<bool>::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let d = dirs.get(x, y);
            let exits = d != DIR_NONE && step(x, y, d, w, h).is_none();

            let mut receives = false;
            for nd in [DIR_SOUTH, DIR_EAST, DIR_NORTH, DIR_WEST] {
                if let Some((nx, ny)) = step(x, y, nd, w, h) {
                    if dirs.get(nx, ny) == dir_reverse(nd) {
                        receives = true;
                        break;
                    }
                }
            }

            fixed.set(x, y, exits || !receives);
        }
    }

    fixed
}

/// Relax per-vertex offsets for `n` iterations of step `d`. Each edge pulls
/// its endpoints with tension |flux|; the longitudinal component restores the
/// unit rest length (the `1 +` term) while the transverse component drags
/// neighbors sideways. Forces are direction-normalized so big rivers decide
/// where vertices go, not how far.
pub fn twist(
    bounds_h: &Grid<i32>,
    bounds_v: &Grid<i32>,
    fixed: &Grid<bool>,
    d: f32,
    n: usize,
) -> (Grid<f32>, Grid<f32>) {
    let w = fixed.w;
    let h = fixed.h;
    let mut offset_x = Grid::<f32>::new(w, h);
    let mut offset_y = Grid::<f32>::new(w, h);

    let mut force_x = Grid::<f32>::new(w, h);
    let mut force_y = Grid::<f32>::new(w, h);

    for _ in 0..n {
        force_x.data.fill(0.0);
        force_y.data.fill(0.0);

        // Horizontal edges: longitudinal pull along x, plus the transverse
        // drag vertical edges exert on offset_x.
        for y in 0..h {
            for x in 0..w - 1 {
                let t = bounds_h.get(x, y).unsigned_abs() as f32;
                if t == 0.0 {
                    continue;
                }
                let f = t * (1.0 + offset_x.get(x + 1, y) - offset_x.get(x, y));
                let i0 = force_x.idx(x, y);
                let i1 = force_x.idx(x + 1, y);
                force_x.data[i0] += f;
                force_x.data[i1] -= f;

                let g = t * (offset_y.get(x + 1, y) - offset_y.get(x, y));
                force_y.data[i0] += g;
                force_y.data[i1] -= g;
            }
        }
        // Vertical edges: longitudinal pull along y, transverse drag on
        // offset_x.
        for y in 0..h - 1 {
            for x in 0..w {
                let t = bounds_v.get(x, y).unsigned_abs() as f32;
                if t == 0.0 {
                    continue;
                }
                let f = t * (1.0 + offset_y.get(x, y + 1) - offset_y.get(x, y));
                let i0 = force_y.idx(x, y);
                let i1 = force_y.idx(x, y + 1);
                force_y.data[i0] += f;
                force_y.data[i1] -= f;

                let g = t * (offset_x.get(x, y + 1) - offset_x.get(x, y));
                force_x.data[i0] += g;
                force_x.data[i1] -= g;
            }
        }

        for i in 0..w * h {
            if fixed.data[i] {
                continue;
            }
            let fx = force_x.data[i];
            let fy = force_y.data[i];
            let mut len = fx.hypot(fy);
            if len == 0.0 {
                len = 1.0;
            }
            offset_x.data[i] += fx * d / len;
            offset_y.data[i] += fy * d / len;
        }
    }

    (offset_x, offset_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::accumulate;

    #[test]
    fn no_flow_means_no_offsets() {
        let dirs = Grid::<u8>::new(6, 6);
        let rivers = Grid::<u32>::new_with(6, 6, 1);
        let (bh, bv) = make_bounds(&dirs, &rivers);
        assert!(bh.data.iter().all(|&v| v == 0));
        assert!(bv.data.iter().all(|&v| v == 0));

        let fixed = fixed_vertices(&dirs);
        // Nothing receives flow, so everything is fixed.
        assert!(fixed.data.iter().all(|&f| f));

        let (ox, oy) = twist(&bh, &bv, &fixed, 0.1, 8);
        assert!(ox.data.iter().all(|&v| v == 0.0));
        assert!(oy.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn bounds_signs_follow_flow_direction() {
        let mut dirs = Grid::<u8>::new(5, 5);
        let mut rivers = Grid::<u32>::new_with(5, 5, 1);
        dirs.set(1, 1, DIR_EAST);
        rivers.set(1, 1, 7);
        dirs.set(3, 2, DIR_WEST);
        rivers.set(3, 2, 4);
        dirs.set(2, 3, DIR_SOUTH);
        rivers.set(2, 3, 9);
        dirs.set(0, 2, DIR_NORTH);
        rivers.set(0, 2, 5);

        let (bh, bv) = make_bounds(&dirs, &rivers);
        assert_eq!(bh.get(1, 1), 7); // east flow, positive
        assert_eq!(bh.get(2, 2), -4); // west flow, negative
        assert_eq!(bv.get(2, 3), 9); // south flow, positive
        assert_eq!(bv.get(0, 1), -5); // north flow, negative
    }

    #[test]
    fn fixed_vertices_stay_put_on_a_river() {
        // One straight west-flowing river across the middle row.
        let n = 7;
        let mut dirs = Grid::<u8>::new(n, n);
        let mid = n / 2;
        for x in 0..n {
            dirs.set(x, mid, DIR_WEST);
        }
        let rivers = accumulate(&dirs);
        let fixed = fixed_vertices(&dirs);

        // The outlet exits the grid: fixed. Off-river cells: fixed. The
        // easternmost cell is the stream tip, nothing drains into it: fixed.
        assert!(fixed.get(0, mid));
        assert!(fixed.get(3, 0));
        assert!(fixed.get(n - 1, mid));
        // Mid-river cells are moveable.
        assert!(!fixed.get(3, mid));

        let (bh, bv) = make_bounds(&dirs, &rivers);
        let (ox, oy) = twist(&bh, &bv, &fixed, 0.1, 5);
        for y in 0..n {
            for x in 0..n {
                if fixed.get(x, y) {
                    assert_eq!(ox.get(x, y), 0.0, "fixed vertex ({x},{y}) moved");
                    assert_eq!(oy.get(x, y), 0.0, "fixed vertex ({x},{y}) moved");
                }
            }
        }
        // Offsets stay within a cell.
        for i in 0..n * n {
            assert!(ox.data[i].abs() <= 0.5 + 1e-6);
            assert!(oy.data[i].abs() <= 0.5 + 1e-6);
        }
    }
}
