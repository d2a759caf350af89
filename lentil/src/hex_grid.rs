//! Pointy-top hexagonal tiling in axial coordinates.
//!
//! A hexagon of radius `R` (centre to corner) has width `√3 R`. Its
//! centre at axial `(q, r)` sits at
//! `x = R (√3 q + √3/2 r)`, `y = R (3/2 r)`.

/// Axial coordinate of one hexagon
pub type HexId = (i64, i64);

const SQRT3: f64 = 1.732_050_807_568_877_2;

/// Width and radius of a hexagon, always derived from each other
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexSize {
    pub width: f64,
    pub radius: f64,
}

impl HexSize {
    pub fn from_width(width: f64) -> Self {
        Self {
            width,
            radius: width / SQRT3,
        }
    }

    pub fn from_radius(radius: f64) -> Self {
        Self {
            width: radius * SQRT3,
            radius,
        }
    }

    /// Exactly one of `width` and `radius` must be given
    pub fn resolve(width: Option<f64>, radius: Option<f64>) -> anyhow::Result<Self> {
        let size = match (width, radius) {
            (Some(w), None) => Self::from_width(w),
            (None, Some(r)) => Self::from_radius(r),
            (Some(_), Some(_)) => anyhow::bail!("specify either hex width or hex radius, not both"),
            (None, None) => anyhow::bail!("need hex width or hex radius"),
        };

        if !(size.radius.is_finite() && size.radius > 0.) {
            anyhow::bail!("hexagon size should be positive: {:?}", size);
        }
        Ok(size)
    }
}

/// Round fractional axial coordinates to the nearest hexagon
fn axial_round(q: f64, r: f64) -> HexId {
    let s = -q - r;
    let (mut rq, mut rr, rs) = (q.round(), r.round(), s.round());

    let dq = (rq - q).abs();
    let dr = (rr - r).abs();
    let ds = (rs - s).abs();

    // the coordinate with the largest rounding error is recomputed
    // from the other two so that q + r + s = 0 holds
    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }

    (rq as i64, rr as i64)
}

/// Map one point to its hexagon.
///
/// * `offset_x`, `offset_y` - fractions of a cell shifting the tiling
///   along the two axial directions
pub fn point_to_hex(x: f64, y: f64, radius: f64, offset_x: f64, offset_y: f64) -> HexId {
    let q = (SQRT3 / 3. * x - y / 3.) / radius + offset_x;
    let r = (2. / 3. * y) / radius + offset_y;
    axial_round(q, r)
}

/// Map points to hexagons, one `(x_id, y_id)` pair per point.
///
/// * `points` - `(x, y)` coordinates
/// * `radius` - hexagon radius in the same unit as `points`
/// * `offset_x`, `offset_y` - sliding offsets, fractions in `[0, 1)`
pub fn pixel_to_hex(
    points: &[(f64, f64)],
    radius: f64,
    offset_x: f64,
    offset_y: f64,
) -> (Vec<i64>, Vec<i64>) {
    points
        .iter()
        .map(|&(x, y)| point_to_hex(x, y, radius, offset_x, offset_y))
        .unzip()
}

/// Centre of a hexagon in the point space
pub fn hex_to_pixel(hex: HexId, radius: f64, offset_x: f64, offset_y: f64) -> (f64, f64) {
    let q = hex.0 as f64 - offset_x;
    let r = hex.1 as f64 - offset_y;
    let x = radius * (SQRT3 * q + SQRT3 / 2. * r);
    let y = radius * (1.5 * r);
    (x, y)
}
