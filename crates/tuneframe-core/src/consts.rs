/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Hardware id of the side camera.
pub const CAMERA_SIDE_ID: i32 = 2;

/// Hardware id of the front camera.
pub const CAMERA_FRONT_ID: i32 = 3;

/// Filter indices of each supported tuning family, ordered by wavelength index.
///
/// The family is selected by how many distinct filters a sequence uses. A
/// filter maps to the same wavelength index in every family it appears in.
pub const TUNING_FAMILIES: [&[i32]; 4] = [
    &[14, 12, 10, 8, 6],
    &[15, 13, 11, 9, 7, 5],
    &[15, 13, 11, 9, 7, 5, 3, 17],
    &[15, 13, 11, 9, 7, 5, 3, 17, 1, 19],
];

/// Filter identifiers carry the filter index in this decimal field.
pub const FILTER_INDEX_MODULUS: i32 = 20;

/// Polarization tuning indices are grouped in decades of this width.
pub const POLARIZATION_DECADE: i32 = 10;

/// Default output step between target slots, in seconds.
pub const DEFAULT_STEP_SECONDS: f64 = 720.0;

/// Extra seconds added to the averaging span when sizing the interpolation window.
pub const INTERPOLATION_PAD_SECONDS: f64 = 90.0;

/// Averaging span multiplier used when sizing the interpolation window.
pub const INTERPOLATION_SPAN_FACTOR: f64 = 1.5;

/// Maximum tolerated deviation of a frame's limb centre from the slot consensus, in pixels.
pub const DEFAULT_LIMB_TOLERANCE: f64 = 0.8;

/// Solar radius deviations are tolerated up to this multiple of the centre tolerance.
pub const LIMB_RADIUS_TOLERANCE_FACTOR: f64 = 1.82;

/// Offset of the front camera limb centre relative to the side camera, in pixels.
pub const FRONT_SIDE_CENTRE_OFFSET: [f64; 2] = [6.141_24, -4.289_92];

/// Temperatures (front, side) handed to calibration when the source has none.
pub const DEFAULT_TEMPERATURES: [f64; 2] = [20.0, 20.0];

/// Channels of the same wavelength within this many framelist positions of the
/// reference frame share the reference frame's window.
pub const SAME_WAVELENGTH_GROUPING_SPAN: i64 = 3;
