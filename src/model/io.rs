// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `.mod`/`.cmod` text format: one line per component, fields in polar
//! form (flux, radius, position angle) the way difmap's own model files
//! are laid out, converted to/from this crate's Cartesian `(x, y)`
//! internal representation on the way in and out.

use std::fmt::Write as _;
use std::io::{BufRead, Write};

use super::{Component, ComponentShape, FreeParams, Model, ModelError};
use crate::units::SkyUnit;

fn shape_code(shape: ComponentShape) -> u8 {
    match shape {
        ComponentShape::Delta => 0,
        ComponentShape::Gaussian => 1,
        ComponentShape::Disk => 2,
        ComponentShape::Ring => 3,
        ComponentShape::Sphere => 4,
    }
}

fn shape_from_code(code: u8, line: usize) -> Result<ComponentShape, ModelError> {
    match code {
        0 => Ok(ComponentShape::Delta),
        1 => Ok(ComponentShape::Gaussian),
        2 => Ok(ComponentShape::Disk),
        3 => Ok(ComponentShape::Ring),
        4 => Ok(ComponentShape::Sphere),
        other => Err(ModelError::Parse {
            line,
            reason: format!("unknown component type code {}", other),
        }),
    }
}

fn free_flags_to_string(free: FreeParams) -> String {
    [free.flux, free.x, free.y, free.major, free.minor, free.phi]
        .iter()
        .map(|&b| if b { '1' } else { '0' })
        .collect()
}

fn free_flags_from_str(s: &str, line: usize) -> Result<FreeParams, ModelError> {
    let bits: Vec<bool> = s.chars().map(|c| c == '1').collect();
    if bits.len() != 6 {
        return Err(ModelError::Parse {
            line,
            reason: format!("expected 6 free-parameter flags, got {:?}", s),
        });
    }
    Ok(FreeParams {
        flux: bits[0],
        x: bits[1],
        y: bits[2],
        major: bits[3],
        minor: bits[4],
        phi: bits[5],
    })
}

/// Write a model in `.mod`/`.cmod` text form. Positions are written as
/// polar `(radius, theta)` in milli-arcseconds/degrees, matching the
/// convention components are normally inspected in.
pub fn write_model<W: Write>(mut w: W, model: &Model) -> Result<(), ModelError> {
    writeln!(
        w,
        "! flux(Jy) radius(mas) theta(deg) major(mas) minor(mas) phi(deg) type freq(GHz) spec-index free"
    )?;
    let unit = SkyUnit::MilliArcsec;
    for c in &model.components {
        let radius = (c.x * c.x + c.y * c.y).sqrt();
        let theta = c.x.atan2(c.y).to_degrees();
        let mut line = String::new();
        write!(
            line,
            "{:.6e} {:.6e} {:.6e} {:.6e} {:.6e} {:.6e} {} {:.6e} {:.6e} {}",
            c.flux,
            unit.from_radians(radius),
            theta,
            unit.from_radians(c.major),
            unit.from_radians(c.minor),
            c.phi.to_degrees(),
            shape_code(c.shape),
            c.freq_ref / 1.0e9,
            c.spectral_index,
            free_flags_to_string(c.free),
        )
        .unwrap();
        writeln!(w, "{}", line)?;
    }
    Ok(())
}

/// Read a model previously written by [`write_model`]. Blank lines and
/// lines beginning with `!` are ignored.
pub fn read_model<R: BufRead>(r: R) -> Result<Model, ModelError> {
    let unit = SkyUnit::MilliArcsec;
    let mut model = Model::default();
    for (idx, line) in r.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('!') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 10 {
            return Err(ModelError::Parse {
                line: line_no,
                reason: format!("expected 10 fields, got {}", fields.len()),
            });
        }
        let parse_f64 = |s: &str| -> Result<f64, ModelError> {
            s.parse::<f64>().map_err(|e| ModelError::Parse {
                line: line_no,
                reason: e.to_string(),
            })
        };
        let flux = parse_f64(fields[0])?;
        let radius = unit.to_radians(parse_f64(fields[1])?);
        let theta = parse_f64(fields[2])?.to_radians();
        let major = unit.to_radians(parse_f64(fields[3])?);
        let minor = unit.to_radians(parse_f64(fields[4])?);
        let phi = parse_f64(fields[5])?.to_radians();
        let shape_code: u8 = fields[6].parse().map_err(|_| ModelError::Parse {
            line: line_no,
            reason: format!("bad type code {:?}", fields[6]),
        })?;
        let shape = shape_from_code(shape_code, line_no)?;
        let freq_ref = parse_f64(fields[7])? * 1.0e9;
        let spectral_index = parse_f64(fields[8])?;
        let free = free_flags_from_str(fields[9], line_no)?;

        model.components.push(Component {
            shape,
            flux,
            x: radius * theta.sin(),
            y: radius * theta.cos(),
            major,
            minor,
            phi,
            freq_ref,
            spectral_index,
            free,
        });
    }
    Ok(model)
}
