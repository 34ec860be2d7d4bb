// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Clean windows (component E): rectangular regions of the map CLEAN is
//! allowed to place components in.
//!
//! An empty window list means "the whole map is fair game", matching
//! the convention that a fresh observation with no windows defined
//! still cleans normally.

use std::io::{BufRead, Write};

use ndarray::Array2;
use thiserror::Error;

use crate::units::SkyUnit;

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("IO error reading/writing a window file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse window file at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// A rectangular clean window, in pixel indices, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanWindow {
    pub x_min: usize,
    pub x_max: usize,
    pub y_min: usize,
    pub y_max: usize,
}

impl CleanWindow {
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// A square window of half-width `radius` pixels centred on `(x, y)`,
    /// clamped to `[0, nx) x [0, ny)`.
    pub fn around(x: usize, y: usize, radius: usize, nx: usize, ny: usize) -> Self {
        CleanWindow {
            x_min: x.saturating_sub(radius),
            x_max: (x + radius).min(nx - 1),
            y_min: y.saturating_sub(radius),
            y_max: (y + radius).min(ny - 1),
        }
    }
}

/// The set of active clean windows.
#[derive(Clone, Debug, Default)]
pub struct WindowList {
    pub windows: Vec<CleanWindow>,
}

impl WindowList {
    /// Whether CLEAN may place a component at `(x, y)`: true if there are
    /// no windows at all, or `(x, y)` falls in at least one of them.
    pub fn admits(&self, x: usize, y: usize) -> bool {
        self.windows.is_empty() || self.windows.iter().any(|w| w.contains(x, y))
    }

    pub fn add(&mut self, window: CleanWindow) {
        self.windows.push(window);
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }

    /// Add a window of half-width `radius` pixels around the current
    /// peak of `residual`, restricted to pixels already admitted by the
    /// existing window list (so repeated calls tighten around
    /// successive peaks rather than re-finding the same one once it's
    /// already windowed).
    pub fn peakwin(&mut self, residual: &Array2<f64>, radius: usize) -> Option<CleanWindow> {
        let (ny, nx) = residual.dim();
        let mut best = None;
        let mut best_val = f64::MIN;
        for ((y, x), &val) in residual.indexed_iter() {
            if !self.admits(x, y) {
                continue;
            }
            let mag = val.abs();
            if mag > best_val {
                best_val = mag;
                best = Some((x, y));
            }
        }
        let (x, y) = best?;
        let window = CleanWindow::around(x, y, radius, nx, ny);
        self.add(window);
        Some(window)
    }
}

/// Write windows as `xmin xmax ymin ymax` in milli-arcseconds relative to
/// the map centre pixel `(cx, cy)` with cell size `cell_size` (radians).
pub fn write_windows<W: Write>(
    mut w: W,
    list: &WindowList,
    cx: usize,
    cy: usize,
    cell_size: f64,
) -> Result<(), WindowError> {
    let unit = SkyUnit::MilliArcsec;
    writeln!(w, "! xmin xmax ymin ymax (mas, relative to map centre)")?;
    for win in &list.windows {
        let to_mas = |pix: usize, centre: usize| unit.from_radians((pix as f64 - centre as f64) * cell_size);
        writeln!(
            w,
            "{:.6e} {:.6e} {:.6e} {:.6e}",
            to_mas(win.x_min, cx),
            to_mas(win.x_max, cx),
            to_mas(win.y_min, cy),
            to_mas(win.y_max, cy),
        )?;
    }
    Ok(())
}

/// Read windows previously written by [`write_windows`].
pub fn read_windows<R: BufRead>(
    r: R,
    cx: usize,
    cy: usize,
    cell_size: f64,
) -> Result<WindowList, WindowError> {
    let unit = SkyUnit::MilliArcsec;
    let mut list = WindowList::default();
    for (idx, line) in r.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('!') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(WindowError::Parse {
                line: line_no,
                reason: format!("expected 4 fields, got {}", fields.len()),
            });
        }
        let parse = |s: &str| -> Result<f64, WindowError> {
            s.parse::<f64>().map_err(|e| WindowError::Parse {
                line: line_no,
                reason: e.to_string(),
            })
        };
        let from_mas = |mas: f64, centre: usize| -> usize {
            (centre as f64 + unit.to_radians(mas) / cell_size).round().max(0.0) as usize
        };
        let x_min = from_mas(parse(fields[0])?, cx);
        let x_max = from_mas(parse(fields[1])?, cx);
        let y_min = from_mas(parse(fields[2])?, cy);
        let y_max = from_mas(parse(fields[3])?, cy);
        list.add(CleanWindow {
            x_min: x_min.min(x_max),
            x_max: x_min.max(x_max),
            y_min: y_min.min(y_max),
            y_max: y_min.max(y_max),
        });
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn empty_list_admits_everything() {
        let list = WindowList::default();
        assert!(list.admits(0, 0));
        assert!(list.admits(1000, 1000));
    }

    #[test]
    fn nonempty_list_restricts_to_windows() {
        let mut list = WindowList::default();
        list.add(CleanWindow {
            x_min: 10,
            x_max: 20,
            y_min: 10,
            y_max: 20,
        });
        assert!(list.admits(15, 15));
        assert!(!list.admits(0, 0));
    }

    #[test]
    fn peakwin_finds_the_admitted_peak() {
        let mut residual = Array2::zeros((32, 32));
        residual[(5, 5)] = 10.0;
        residual[(20, 20)] = 5.0;
        let mut list = WindowList::default();
        let win = list.peakwin(&residual, 2).unwrap();
        assert!(win.contains(5, 5));
        assert!(!win.contains(20, 20));
    }

    #[test]
    fn window_round_trips_through_text() {
        let mut list = WindowList::default();
        list.add(CleanWindow {
            x_min: 100,
            x_max: 140,
            y_min: 90,
            y_max: 150,
        });
        let cell = 1.0e-9;
        let mut buf = Vec::new();
        write_windows(&mut buf, &list, 128, 128, cell).unwrap();
        let read_back = read_windows(Cursor::new(buf), 128, 128, cell).unwrap();
        assert_eq!(read_back.windows.len(), 1);
        let w = read_back.windows[0];
        assert!((w.x_min as i64 - 100).abs() <= 1);
        assert!((w.x_max as i64 - 140).abs() <= 1);
    }
}
