// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Angular/UV unit conversions.
//!
//! All internal storage is radians (sky) and wavelengths (UV). The user
//! may ask for a different display unit, but the map unit and the UV
//! unit are paired in lockstep: a user who selects milli-arcseconds for
//! the map sees mega-wavelengths on the UV plane, and so on. This
//! lockstep pairing is grounded on `difmap_src/units.c`'s `unit_table`.

use crate::constants::PI;

/// A paired (map-angle unit, UV-distance unit) as offered to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkyUnit {
    /// Milli-arcseconds on the map; mega-wavelengths on the UV plane.
    MilliArcsec,
    /// Arcseconds on the map; kilo-wavelengths on the UV plane.
    Arcsec,
    /// Arcminutes on the map; kilo-wavelengths on the UV plane.
    Arcmin,
}

impl SkyUnit {
    /// The unit table is ordered with the default listed first, matching
    /// `unit_table[]` in `units.c`.
    pub const TABLE: [SkyUnit; 3] = [SkyUnit::MilliArcsec, SkyUnit::Arcsec, SkyUnit::Arcmin];

    /// Name as accepted/printed by the command surface.
    pub fn name(self) -> &'static str {
        match self {
            SkyUnit::MilliArcsec => "mas",
            SkyUnit::Arcsec => "arcsec",
            SkyUnit::Arcmin => "arcmin",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::TABLE.iter().copied().find(|u| u.name() == name)
    }

    /// Factor to multiply radians by to get this map unit.
    pub fn map_conv(self) -> f64 {
        match self {
            SkyUnit::MilliArcsec => rtomas(),
            SkyUnit::Arcsec => rtoas(),
            SkyUnit::Arcmin => rtoam(),
        }
    }

    /// Factor to multiply wavelengths by to get this UV unit.
    pub fn uv_conv(self) -> f64 {
        match self {
            SkyUnit::MilliArcsec => 1.0e-6, // mega-wavelengths
            SkyUnit::Arcsec | SkyUnit::Arcmin => 1.0e-3, // kilo-wavelengths
        }
    }

    /// The name of the paired UV unit.
    pub fn uv_name(self) -> &'static str {
        match self {
            SkyUnit::MilliArcsec => "Mlambda",
            SkyUnit::Arcsec | SkyUnit::Arcmin => "klambda",
        }
    }

    /// Convert a value in radians to this unit.
    pub fn from_radians(self, radians: f64) -> f64 {
        radians * self.map_conv()
    }

    /// Convert a value in this unit back to radians.
    pub fn to_radians(self, value: f64) -> f64 {
        value / self.map_conv()
    }

    /// Convert a value in wavelengths to this unit's paired UV unit.
    pub fn uv_from_wavelengths(self, wavelengths: f64) -> f64 {
        wavelengths * self.uv_conv()
    }

    /// Convert a value in this unit's paired UV unit back to wavelengths.
    pub fn uv_to_wavelengths(self, value: f64) -> f64 {
        value / self.uv_conv()
    }
}

impl Default for SkyUnit {
    fn default() -> Self {
        SkyUnit::TABLE[0]
    }
}

/// Radians to milli-arcseconds.
fn rtomas() -> f64 {
    (180.0 * 3600.0 * 1000.0 / PI) as f64
}

/// Radians to arcseconds.
fn rtoas() -> f64 {
    180.0 * 3600.0 / PI
}

/// Radians to arcminutes.
fn rtoam() -> f64 {
    180.0 * 60.0 / PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mas_round_trip() {
        let unit = SkyUnit::MilliArcsec;
        let rad = 1.234e-8;
        let mas = unit.from_radians(rad);
        assert_relative_eq!(unit.to_radians(mas), rad, epsilon = 1e-20);
    }

    #[test]
    fn default_is_mas() {
        assert_eq!(SkyUnit::default(), SkyUnit::MilliArcsec);
        assert_eq!(SkyUnit::default().uv_name(), "Mlambda");
    }

    #[test]
    fn parse_round_trip() {
        for u in SkyUnit::TABLE {
            assert_eq!(SkyUnit::parse(u.name()), Some(u));
        }
        assert_eq!(SkyUnit::parse("parsec"), None);
    }

    #[test]
    fn lockstep_uv_pairing() {
        // arcsec and arcmin both pair with kilo-wavelengths; mas pairs with
        // mega-wavelengths. This is the lockstep table from units.c.
        assert_eq!(SkyUnit::Arcsec.uv_conv(), SkyUnit::Arcmin.uv_conv());
        assert_ne!(SkyUnit::MilliArcsec.uv_conv(), SkyUnit::Arcsec.uv_conv());
    }
}
