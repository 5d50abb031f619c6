//! ASCII plotting of a calibrated locus for terminal output.
//!
//! Fixed-size character grids with deterministic output, so plots can be
//! covered by golden tests.
//!
//! Two views:
//! - locus map: strain shade over the (triaxiality, invariant) plane, with the
//!   cut-off boundary `|`, the plane-stress curve `~` and specimen markers
//! - profiles: strain vs triaxiality along constant-invariant mesh rows
//!   (`1`, `2`, `3`) and along the plane-stress curve `~`, with specimen markers

use crate::domain::{CalibrationResult, LocusField, PlotOptions};
use crate::models::cut_off_triaxiality;

/// Shade ramp from low to high strain; undefined cells stay blank.
const SHADES: &[char] = &['.', ':', '-', '=', '+', '*', '#', '%', '@'];
const CUT_OFF: char = '|';
const PLANE_STRESS: char = '~';
const PROFILE_MARKS: [char; 3] = ['1', '2', '3'];

/// Top-down view of the fitted surface.
pub fn render_locus_map(result: &CalibrationResult, options: &PlotOptions) -> String {
    let width = options.width.max(10);
    let height = options.height.max(5);
    let [x_min, x_max] = options.x_lim;
    let [y_min, y_max] = options.y_lim;
    let [z_min, z_max] = options.z_lim;

    let mut grid = vec![vec![' '; width]; height];

    for (row, cells) in grid.iter_mut().enumerate() {
        let inv = unmap_y(row, y_min, y_max, height);
        for (col, cell) in cells.iter_mut().enumerate() {
            let tri = unmap_x(col, x_min, x_max, width);
            if let Some(ef) = sample_surface(&result.surface, tri, inv) {
                *cell = shade(ef, z_min, z_max);
            }
        }
    }

    if options.plot_cut_off_plane {
        for (row, cells) in grid.iter_mut().enumerate() {
            let inv = unmap_y(row, y_min, y_max, height);
            let c = cut_off_triaxiality(&result.parameters, inv);
            if c.is_finite() && c >= x_min && c <= x_max {
                cells[map_x(c, x_min, x_max, width)] = CUT_OFF;
            }
        }
    }

    if options.plot_plane_stress_curve {
        let curve: Vec<(f64, f64)> = result
            .plane_stress
            .triaxiality
            .iter()
            .zip(&result.plane_stress.invariant)
            .map(|(&t, &i)| (t, i))
            .collect();
        draw_polyline(&mut grid, &curve, options.x_lim, options.y_lim, PLANE_STRESS);
    }

    let mut legend = Vec::new();
    if options.plot_approximated_points {
        let points = &result.points;
        for i in 0..points.len() {
            let mark = marker(options, i);
            put(&mut grid, points.triaxiality[i], points.invariant[i], options.x_lim, options.y_lim, mark);
            legend.push(format!("{mark} {}", points.names[i]));
        }
    }

    let mut out = String::new();
    out.push_str(&format!("{}\n", options.plot_title));
    out.push_str(&format!(
        "Map: x={} [{x_min:.3}, {x_max:.3}] | y={} [{y_min:.3}, {y_max:.3}] | shade={} [{z_min:.3}, {z_max:.3}]\n",
        options.x_label, options.y_label, options.z_label
    ));
    push_grid(&mut out, grid);

    let ramp: String = SHADES.iter().collect();
    out.push_str(&format!("shade low->high: {ramp} (blank = undefined)\n"));
    if options.plot_cut_off_plane {
        out.push_str(&format!("{CUT_OFF} cut-off plane\n"));
    }
    if options.plot_plane_stress_curve {
        out.push_str(&format!("{PLANE_STRESS} plane stress\n"));
    }
    for line in legend {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Strain vs triaxiality along constant-invariant rows and the plane-stress curve.
pub fn render_profiles(result: &CalibrationResult, options: &PlotOptions) -> String {
    let width = options.width.max(10);
    let height = options.height.max(5);
    let [x_min, x_max] = options.x_lim;
    let [z_min, z_max] = options.z_lim;
    let x_lim = options.x_lim;
    let z_lim = options.z_lim;

    let mut grid = vec![vec![' '; width]; height];
    let mut legend = Vec::new();

    if options.plot_constant_invariant_curves {
        for (mark, row) in PROFILE_MARKS.iter().zip(profile_rows(&result.surface)) {
            let curve: Vec<(f64, f64)> = (0..result.surface.fracture_strain.ncols())
                .map(|col| {
                    (
                        result.surface.triaxiality[(row, col)],
                        result.surface.fracture_strain[(row, col)],
                    )
                })
                .collect();
            draw_polyline(&mut grid, &curve, x_lim, z_lim, *mark);
            let inv = result.surface.invariant[(row, 0)];
            legend.push(format!("{mark} {} = {inv:.3}", options.y_label));
        }
    }

    if options.plot_plane_stress_curve {
        let curve: Vec<(f64, f64)> = result
            .plane_stress
            .triaxiality
            .iter()
            .zip(&result.plane_stress.fracture_strain)
            .map(|(&t, &ef)| (t, ef))
            .collect();
        draw_polyline(&mut grid, &curve, x_lim, z_lim, PLANE_STRESS);
        legend.push(format!("{PLANE_STRESS} plane stress"));
    }

    if options.plot_approximated_points {
        let points = &result.points;
        for i in 0..points.len() {
            let mark = marker(options, i);
            put(&mut grid, points.triaxiality[i], points.measured_strain[i], x_lim, z_lim, mark);
            legend.push(format!("{mark} {}", points.names[i]));
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Profiles: x={} [{x_min:.3}, {x_max:.3}] | y={} [{z_min:.3}, {z_max:.3}]\n",
        options.x_label, options.z_label
    ));
    push_grid(&mut out, grid);
    for line in legend {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn push_grid(out: &mut String, grid: Vec<Vec<char>>) {
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
}

/// First, middle and last mesh rows (deduplicated for tiny meshes).
fn profile_rows(field: &LocusField) -> Vec<usize> {
    let n = field.fracture_strain.nrows();
    if n == 0 {
        return Vec::new();
    }
    let mut rows = vec![0, n / 2, n - 1];
    rows.dedup();
    rows
}

fn marker(options: &PlotOptions, i: usize) -> char {
    if options.marker_styles.is_empty() {
        return 'o';
    }
    options.marker_styles[i % options.marker_styles.len()]
        .chars()
        .next()
        .unwrap_or('o')
}

fn shade(ef: f64, z_min: f64, z_max: f64) -> char {
    let span = z_max - z_min;
    let u = if span > 0.0 { ((ef - z_min) / span).clamp(0.0, 1.0) } else { 1.0 };
    let idx = (u * (SHADES.len() as f64 - 1.0)).round() as usize;
    SHADES[idx.min(SHADES.len() - 1)]
}

/// Nearest mesh value at (tri, inv), or `None` outside the mesh or where undefined.
fn sample_surface(field: &LocusField, tri: f64, inv: f64) -> Option<f64> {
    let (rows, cols) = field.fracture_strain.shape();
    if rows == 0 || cols == 0 {
        return None;
    }
    let col = nearest_index(field.triaxiality[(0, 0)], field.triaxiality[(0, cols - 1)], cols, tri)?;
    let row = nearest_index(field.invariant[(0, 0)], field.invariant[(rows - 1, 0)], rows, inv)?;
    let ef = field.fracture_strain[(row, col)];
    ef.is_finite().then_some(ef)
}

/// Index of the uniform-axis sample closest to `v`.
fn nearest_index(first: f64, last: f64, n: usize, v: f64) -> Option<usize> {
    let (lo, hi) = (first.min(last), first.max(last));
    if !(v >= lo && v <= hi) {
        return None;
    }
    if n == 1 || last == first {
        return Some(0);
    }
    let u = (v - first) / (last - first);
    Some(((u * (n as f64 - 1.0)).round() as usize).min(n - 1))
}

fn in_range(v: f64, [lo, hi]: [f64; 2]) -> bool {
    v.is_finite() && v >= lo && v <= hi
}

fn put(grid: &mut [Vec<char>], x: f64, y: f64, x_lim: [f64; 2], y_lim: [f64; 2], ch: char) {
    if !(in_range(x, x_lim) && in_range(y, y_lim)) {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();
    let col = map_x(x, x_lim[0], x_lim[1], width);
    let row = map_y(y, y_lim[0], y_lim[1], height);
    grid[row][col] = ch;
}

/// Connect consecutive in-range points; undefined or out-of-range points break the line.
fn draw_polyline(grid: &mut [Vec<char>], points: &[(f64, f64)], x_lim: [f64; 2], y_lim: [f64; 2], ch: char) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in points {
        if !(in_range(x, x_lim) && in_range(y, y_lim)) {
            prev = None;
            continue;
        }
        let col = map_x(x, x_lim[0], x_lim[1], width);
        let row = map_y(y, y_lim[0], y_lim[1], height);
        match prev {
            Some((c0, r0)) => draw_line(grid, c0, r0, col, row, ch),
            None => grid[row][col] = ch,
        }
        prev = Some((col, row));
    }
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn unmap_x(col: usize, x_min: f64, x_max: f64, width: usize) -> f64 {
    x_min + col as f64 / (width.max(2) as f64 - 1.0) * (x_max - x_min)
}

fn unmap_y(row: usize, y_min: f64, y_max: f64, height: usize) -> f64 {
    y_max - row as f64 / (height.max(2) as f64 - 1.0) * (y_max - y_min)
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0 && (y0 as usize) < grid.len() && x0 >= 0 && (x0 as usize) < grid[0].len() {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
