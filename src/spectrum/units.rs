//! Conversion of caller-supplied frequencies into cycles/pixel.
//!
//! A frequency `f` in 1/unit becomes `f · (unit per pixel)` in 1/pixel:
//!
//! - angular: one pixel spans `pixel_scale_deg` degrees
//! - physical: one pixel spans `distance · pixel_scale_rad` parsecs

use crate::domain::{ScaleConfig, SpatialFrequency};
use crate::error::AnalysisError;

/// Convert `freq` to cycles/pixel using `scale`.
pub fn to_pixel_frequency(freq: SpatialFrequency, scale: &ScaleConfig) -> Result<f64, AnalysisError> {
    let value = match freq {
        SpatialFrequency::PerPixel(f) => f,
        SpatialFrequency::PerDegree(f) => f * pixel_scale_deg(scale)?,
        SpatialFrequency::PerParsec(f) => f * pixel_size_pc(scale)?,
    };
    if !value.is_finite() || value < 0.0 {
        return Err(AnalysisError::invalid(format!(
            "Frequency {freq:?} converts to an invalid pixel frequency {value}."
        )));
    }
    Ok(value)
}

/// Express a pixel frequency in the unit of `like`.
pub fn from_pixel_frequency(
    pixel_freq: f64,
    like: SpatialFrequency,
    scale: &ScaleConfig,
) -> Result<SpatialFrequency, AnalysisError> {
    Ok(match like {
        SpatialFrequency::PerPixel(_) => SpatialFrequency::PerPixel(pixel_freq),
        SpatialFrequency::PerDegree(_) => {
            SpatialFrequency::PerDegree(pixel_freq / pixel_scale_deg(scale)?)
        }
        SpatialFrequency::PerParsec(_) => {
            SpatialFrequency::PerParsec(pixel_freq / pixel_size_pc(scale)?)
        }
    })
}

fn pixel_scale_deg(scale: &ScaleConfig) -> Result<f64, AnalysisError> {
    match scale.pixel_scale_deg {
        Some(s) if s.is_finite() && s > 0.0 => Ok(s),
        Some(s) => Err(AnalysisError::invalid(format!("Invalid pixel scale {s} deg."))),
        None => Err(AnalysisError::invalid(
            "An angular frequency needs a pixel scale (pixel_scale_deg).",
        )),
    }
}

fn pixel_size_pc(scale: &ScaleConfig) -> Result<f64, AnalysisError> {
    let deg = pixel_scale_deg(scale)?;
    match scale.distance_pc {
        Some(d) if d.is_finite() && d > 0.0 => Ok(d * deg.to_radians()),
        Some(d) => Err(AnalysisError::invalid(format!("Invalid distance {d} pc."))),
        None => Err(AnalysisError::invalid(
            "A physical frequency needs a distance (distance_pc).",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_frequencies_pass_through() {
        let f = to_pixel_frequency(SpatialFrequency::PerPixel(0.2), &ScaleConfig::default()).unwrap();
        assert_eq!(f, 0.2);
    }

    #[test]
    fn angular_and_physical_conversions() {
        let scale = ScaleConfig {
            pixel_scale_deg: Some(0.01),
            distance_pc: Some(100.0),
        };
        // 10 cycles/deg with 0.01 deg/pixel -> 0.1 cycles/pixel.
        let f = to_pixel_frequency(SpatialFrequency::PerDegree(10.0), &scale).unwrap();
        assert!((f - 0.1).abs() < 1e-12);

        let pc_per_pix = 100.0 * 0.01f64.to_radians();
        let f = to_pixel_frequency(SpatialFrequency::PerParsec(2.0), &scale).unwrap();
        assert!((f - 2.0 * pc_per_pix).abs() < 1e-12);

        let back = from_pixel_frequency(f, SpatialFrequency::PerParsec(0.0), &scale).unwrap();
        assert_eq!(back, SpatialFrequency::PerParsec(f / pc_per_pix));
    }

    #[test]
    fn missing_scale_is_reported() {
        let err = to_pixel_frequency(SpatialFrequency::PerParsec(1.0), &ScaleConfig::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
