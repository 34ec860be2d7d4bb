// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! 2-D FFT helpers built on `rustfft`'s 1-D planner, applied row-then-
//! column. Grid sizes are not required to be a power of two; `rustfft`'s
//! mixed-radix planner handles arbitrary lengths, just less efficiently.

use ndarray::Array2;
use num_complex::Complex64;
use rustfft::FftPlanner;

/// Swap quadrants so the DC term moves from the corner to the centre (or
/// back; the operation is its own inverse for even dimensions).
pub fn fftshift2(grid: &mut Array2<Complex64>) {
    let (ny, nx) = grid.dim();
    let shifted = Array2::from_shape_fn((ny, nx), |(y, x)| {
        let sy = (y + ny / 2) % ny;
        let sx = (x + nx / 2) % nx;
        grid[(sy, sx)]
    });
    *grid = shifted;
}

/// Inverse 2-D FFT: UV-plane grid to image-plane map. `rustfft` does not
/// normalize, so the result is scaled by `1 / (nx * ny)`.
pub fn ifft2(mut grid: Array2<Complex64>) -> Array2<Complex64> {
    let (ny, nx) = grid.dim();
    let mut planner = FftPlanner::new();
    let fft_x = planner.plan_fft_inverse(nx);
    let fft_y = planner.plan_fft_inverse(ny);

    for mut row in grid.rows_mut() {
        let mut buf: Vec<Complex64> = row.iter().copied().collect();
        fft_x.process(&mut buf);
        for (dst, src) in row.iter_mut().zip(buf) {
            *dst = src;
        }
    }
    for mut col in grid.columns_mut() {
        let mut buf: Vec<Complex64> = col.iter().copied().collect();
        fft_y.process(&mut buf);
        for (dst, src) in col.iter_mut().zip(buf) {
            *dst = src;
        }
    }

    let scale = 1.0 / (nx * ny) as f64;
    grid.mapv_inplace(|c| c * scale);
    grid
}

/// Forward 2-D FFT: image-plane map to UV-plane grid. Used by the
/// restorer to re-grid a restored image's residual back onto the UV
/// plane for self-cal closure diagnostics.
pub fn fft2(mut grid: Array2<Complex64>) -> Array2<Complex64> {
    let (ny, nx) = grid.dim();
    let mut planner = FftPlanner::new();
    let fft_x = planner.plan_fft_forward(nx);
    let fft_y = planner.plan_fft_forward(ny);

    for mut row in grid.rows_mut() {
        let mut buf: Vec<Complex64> = row.iter().copied().collect();
        fft_x.process(&mut buf);
        for (dst, src) in row.iter_mut().zip(buf) {
            *dst = src;
        }
    }
    for mut col in grid.columns_mut() {
        let mut buf: Vec<Complex64> = col.iter().copied().collect();
        fft_y.process(&mut buf);
        for (dst, src) in col.iter_mut().zip(buf) {
            *dst = src;
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_then_inverse_is_identity() {
        let nx = 8;
        let ny = 8;
        let mut grid = Array2::from_shape_fn((ny, nx), |(y, x)| {
            Complex64::new((x as f64) - (y as f64) * 0.5, 0.0)
        });
        let original = grid.clone();
        grid = fft2(grid);
        grid = ifft2(grid);
        for (a, b) in grid.iter().zip(original.iter()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn shift_is_involution_for_even_dims() {
        let mut grid = Array2::from_shape_fn((4, 4), |(y, x)| Complex64::new((y * 4 + x) as f64, 0.0));
        let original = grid.clone();
        fftshift2(&mut grid);
        fftshift2(&mut grid);
        assert_eq!(grid, original);
    }
}
