// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command-line entry point.
//!
//! This binary wires up logging and an [`Observation`] from parsed
//! [`Settings`], then either drives the default non-interactive imaging
//! pass (invert, clean, commit, restore) or, if one of [`Verb`]'s
//! subcommands was given, dispatches that single verb instead. The
//! interactive command language and its scripting layer are not
//! implemented here; this is the scriptable subset a batch pipeline or
//! an end-to-end test can drive one verb at a time.

use std::fs::File;
use std::io::{BufReader, BufWriter};

use clap::Parser;
use log::{error, info};

use difmap::config::{EditAction, Settings, SnapshotAction, Verb, WindowAction};
use difmap::context::{Observation, PhaseCentre};
use difmap::edit::EditOp;
use difmap::projection::Projection;
use difmap::restore::RestoreParams;
use difmap::selection::{ChannelRange, ChannelRangeList, Polarization};
use difmap::snapshot::{ParamValue, Snapshot};
use difmap::visibility::io::{InMemoryVisibilityIo, VisibilityIo};
use difmap::visibility::VisibilityStore;
use difmap::windows::{read_windows, write_windows, CleanWindow};
use difmap::DifmapError;

fn run() -> Result<(), DifmapError> {
    let settings = Settings::parse();
    if let Err(e) = difmap::logging::init(settings.verbose) {
        eprintln!("failed to initialize logging: {}", e);
    }

    info!("starting difmap with mapsize {}x{}", settings.mapsize_x, settings.mapsize_y);

    let mut obs = Observation::new(
        settings.clone(),
        PhaseCentre {
            ra0: 0.0,
            dec0: 0.0,
            projection: Projection::Sin,
        },
    );

    // The interactive front-end supplies a real VisibilityIo backed by a
    // UV FITS reader; without `--input` this binary has nothing to
    // image unless a verb that doesn't need data was given (e.g.
    // `snapshot load`).
    if let Some(path) = &settings.input {
        info!("loading visibilities from {}", path);
        let mut io = InMemoryVisibilityIo::new(VisibilityStore::default());
        let store = io.read()?;
        obs.observe(store);
    } else if settings.command.is_none() {
        info!("no --input given; nothing to image");
        return Ok(());
    }

    obs.mapsize(settings.mapsize_x, settings.mapsize_y, settings.cell_size_radians())?;
    obs.set_weighting(settings.weighting_params())?;

    match settings.command.clone() {
        None => run_default_pipeline(&mut obs, &settings)?,
        Some(verb) => run_verb(&mut obs, verb)?,
    }

    Ok(())
}

/// The non-interactive batch pass this binary ran before verb dispatch
/// existed: invert, clean, commit, restore. Kept as the no-subcommand
/// default so existing callers aren't broken.
fn run_default_pipeline(obs: &mut Observation, settings: &Settings) -> Result<(), DifmapError> {
    obs.invert()?;

    let clean_result = obs.clean(settings.clean_params())?;
    info!(
        "clean deposited {} components, {} Jy total, peak residual {:.3e} Jy",
        clean_result.n_components, clean_result.total_flux, clean_result.peak_residual
    );
    obs.commit_clean();

    let (bmaj, bmin, pa) = obs
        .grid
        .as_ref()
        .expect("mapsize was called above")
        .estimate_beam()?;
    obs.restore(
        RestoreParams {
            bmaj,
            bmin,
            pa,
            primary_beam_fwhm: None,
            noresid: false,
            dosm: false,
        },
        1.0e9,
    )?;

    info!("restored map ready at generation {}", obs.model_gen());
    Ok(())
}

fn run_verb(obs: &mut Observation, verb: Verb) -> Result<(), DifmapError> {
    match verb {
        Verb::Invert => {
            obs.invert()?;
            info!("inverted to a dirty map/beam at vis generation {}", obs.vis_gen());
        }
        Verb::Clean { gain, niter, cutoff } => {
            let params = difmap::clean::CleanParams { gain, niter, cutoff };
            let result = obs.clean(params)?;
            info!(
                "clean deposited {} components, {} Jy total, peak residual {:.3e} Jy",
                result.n_components, result.total_flux, result.peak_residual
            );
        }
        Verb::Keep => {
            obs.commit_clean();
            info!("committed tentative components at model generation {}", obs.model_gen());
        }
        Verb::Restore { noresid, dosm } => {
            let (bmaj, bmin, pa) = obs.grid.as_ref().ok_or(DifmapError::NoMap)?.estimate_beam()?;
            obs.restore(
                RestoreParams {
                    bmaj,
                    bmin,
                    pa,
                    primary_beam_fwhm: None,
                    noresid,
                    dosm,
                },
                1.0e9,
            )?;
            info!("restored map ready at generation {}", obs.model_gen());
        }
        Verb::Selfcal { if_index, freq } => {
            let results = obs.selfcal(if_index, freq, obs.settings.selfcal_params())?;
            for (i, r) in results.iter().enumerate() {
                info!(
                    "selfcal interval {}: {} iterations, max update {:.3e}, {} flagged",
                    i, r.iterations, r.max_update, r.flagged
                );
            }
        }
        Verb::Gscale { if_index, freq, dophs } => {
            let scales = obs.gscale(if_index, freq, dophs)?;
            for (i, scale) in scales.iter().enumerate() {
                info!("gscale sub-array {}: scale {:.6}", i, scale);
            }
        }
        Verb::Select { polarization, start, end, available } => {
            let pol = Polarization::parse(&polarization).ok_or_else(|| {
                DifmapError::OutOfRange(format!("unrecognised polarization {:?}", polarization))
            })?;
            let channels = match (start, end) {
                (Some(s), Some(e)) => ChannelRangeList(vec![ChannelRange { start: s, end: e }]),
                _ => ChannelRangeList::all(obs.vis.total_nchan()),
            };
            let available_pols: Vec<Polarization> = if available.is_empty() {
                vec![pol]
            } else {
                available.split(',').filter_map(Polarization::parse).collect()
            };
            obs.select(pol, channels, &available_pols)?;
            info!("selected polarization {} over {} channels", pol.name(), obs.vis.total_nchan());
        }
        Verb::Shift { east, north } => {
            obs.shift(east, north);
            info!("shifted phase centre by ({:e}, {:e}) rad", east, north);
        }
        Verb::Shiftto { east, north } => {
            obs.shiftto(east, north);
            info!("shiftto toward ({:e}, {:e}) rad", east, north);
        }
        Verb::Uncalib { amp, phs } => {
            obs.uncalib(amp, phs);
            info!("uncalibrated (amp={}, phs={})", amp, phs);
        }
        Verb::Window { action } => match action {
            WindowAction::Add { x, y, radius } => {
                let grid = obs.grid.as_ref().ok_or(DifmapError::NoMap)?;
                let (nx, ny) = (grid.nx, grid.ny);
                obs.windows.add(CleanWindow::around(x, y, radius, nx, ny));
                info!("added a clean window around ({}, {}), radius {}", x, y, radius);
            }
            WindowAction::Clear => {
                obs.windows.clear();
                info!("cleared all clean windows");
            }
            WindowAction::Save { path } => {
                let grid = obs.grid.as_ref().ok_or(DifmapError::NoMap)?;
                let f = BufWriter::new(File::create(&path)?);
                write_windows(f, &obs.windows, grid.nx / 2, grid.ny / 2, grid.cell_size)
                    .map_err(|e| DifmapError::StateRequired(e.to_string()))?;
                info!("wrote clean windows to {}", path);
            }
            WindowAction::Load { path } => {
                let grid = obs.grid.as_ref().ok_or(DifmapError::NoMap)?;
                let f = BufReader::new(File::open(&path)?);
                obs.windows = read_windows(f, grid.nx / 2, grid.ny / 2, grid.cell_size)
                    .map_err(|e| DifmapError::StateRequired(e.to_string()))?;
                info!("read clean windows from {}", path);
            }
        },
        Verb::Edit { action } => match action {
            EditAction::Flag { sub, integ } => {
                obs.ed_integ(EditOp {
                    sub,
                    integ,
                    baseline: None,
                    if_chan: None,
                    flag: true,
                });
                info!("queued a flag edit for sub-array {} integration {}", sub, integ);
            }
            EditAction::Unflag { sub, integ } => {
                obs.ed_integ(EditOp {
                    sub,
                    integ,
                    baseline: None,
                    if_chan: None,
                    flag: false,
                });
                info!("queued an unflag edit for sub-array {} integration {}", sub, integ);
            }
            EditAction::Flush => {
                let changed = obs.ed_flush()?;
                info!("flushed edit queue, {} samples changed", changed);
            }
        },
        Verb::Snapshot { action } => match action {
            SnapshotAction::Save { path } => {
                let mut snap = Snapshot::default();
                snap.save("gain", ParamValue::Float(obs.settings.gain));
                snap.save("niter", ParamValue::Int(obs.settings.niter as i64));
                snap.save("cutoff", ParamValue::Float(obs.settings.cutoff));
                snap.save("mintel", ParamValue::Int(obs.settings.mintel as i64));
                let f = BufWriter::new(File::create(&path)?);
                snap.write(f).map_err(|e| DifmapError::StateRequired(e.to_string()))?;
                info!("wrote parameter snapshot to {}", path);
            }
            SnapshotAction::Load { path } => {
                let f = BufReader::new(File::open(&path)?);
                obs.snapshot =
                    Snapshot::read(f).map_err(|e| DifmapError::StateRequired(e.to_string()))?;
                info!("read parameter snapshot from {}", path);
            }
        },
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}
