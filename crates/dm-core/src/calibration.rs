//! Spatial and intensity calibrations.

/// Affine mapping from a stored sample index to a physical quantity.
///
/// `physical = (index - origin) * scale`, expressed in `units`. One
/// calibration applies per spatial dimension; a separate one may apply to
/// the sample values themselves (intensity).
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Index-space origin.
    pub origin: f64,
    /// Physical units per index step. A stored value of exactly 0.0 is
    /// invalid input and is normalized to 1.0 on read.
    pub scale: f64,
    /// Unit label, e.g. "nm". May be empty or non-ASCII.
    pub units: String,
}

impl Calibration {
    /// Creates a calibration triple.
    pub fn new(origin: f64, scale: f64, units: impl Into<String>) -> Self {
        Self {
            origin,
            scale,
            units: units.into(),
        }
    }

    /// The identity calibration: origin 0, scale 1, no units.
    pub fn identity() -> Self {
        Self::new(0.0, 1.0, "")
    }

    /// Returns a copy with a zero scale replaced by 1.0.
    ///
    /// Some producers emit `scale == 0.0` erroneously; a zero scale would
    /// collapse the axis, so readers substitute the identity scale.
    pub fn normalized(&self) -> Self {
        Self {
            origin: self.origin,
            scale: if self.scale == 0.0 { 1.0 } else { self.scale },
            units: self.units.clone(),
        }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_scale_normalization() {
        let c = Calibration::new(2.0, 0.0, "nm").normalized();
        assert_eq!(c.scale, 1.0);
        assert_eq!(c.origin, 2.0);
        assert_eq!(c.units, "nm");

        let c = Calibration::new(2.0, 3.5, "nm").normalized();
        assert_eq!(c.scale, 3.5);
    }

    #[test]
    fn test_identity_default() {
        assert_eq!(Calibration::default(), Calibration::new(0.0, 1.0, ""));
    }
}
