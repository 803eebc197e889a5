//! Cell filename policies.
//!
//! Pure functions mapping a coordinate to the relative path of the cell that
//! covers it, and back. No I/O happens here.
//!
//! # SRTM
//!
//! `{N|S}{lat:02}{E|W}{lon:03}.hgt`, naming the **southwest corner** of the
//! 1° × 1° tile, e.g. `N27W081.hgt`.
//!
//! # DTED
//!
//! `{e|w}{lon:03}/{n|s}{lat:02}.dt{level}`: one directory per longitude
//! column, one file per latitude row, e.g. `w081/n27.dt1`.

use std::path::{Path, PathBuf};

/// Convert latitude and longitude to an SRTM `.hgt` filename.
///
/// # Examples
///
/// ```
/// use elevdb::filename::srtm_filename;
///
/// assert_eq!(srtm_filename(35.5, 138.7), "N35E138.hgt");
/// assert_eq!(srtm_filename(-12.3, -77.1), "S13W078.hgt");
/// assert_eq!(srtm_filename(0.5, -0.5), "N00W001.hgt");
/// ```
pub fn srtm_filename(lat: f64, lon: f64) -> String {
    srtm_filename_for_tile(lat.floor() as i32, lon.floor() as i32)
}

/// SRTM filename for the tile whose southwest corner is `(lat, lon)`.
pub fn srtm_filename_for_tile(lat: i32, lon: i32) -> String {
    let lat_prefix = if lat >= 0 { 'N' } else { 'S' };
    let lon_prefix = if lon >= 0 { 'E' } else { 'W' };

    format!(
        "{}{:02}{}{:03}.hgt",
        lat_prefix,
        lat.abs(),
        lon_prefix,
        lon.abs()
    )
}

/// Parse an SRTM filename to extract the base coordinates.
///
/// Accepts a bare name or a path, with or without the `.hgt` extension.
///
/// # Examples
///
/// ```
/// use elevdb::filename::srtm_filename_to_lat_lon;
///
/// assert_eq!(srtm_filename_to_lat_lon("N35E138.hgt"), Some((35, 138)));
/// assert_eq!(srtm_filename_to_lat_lon("S12W077.hgt"), Some((-12, -77)));
/// assert_eq!(srtm_filename_to_lat_lon("/path/to/N00E000.hgt"), Some((0, 0)));
/// assert_eq!(srtm_filename_to_lat_lon("invalid"), None);
/// ```
pub fn srtm_filename_to_lat_lon(filename: &str) -> Option<(i32, i32)> {
    let name = base_name(filename);
    let name = name
        .strip_suffix(".hgt")
        .or_else(|| name.strip_suffix(".HGT"))
        .unwrap_or(name);

    // Must be exactly 7 characters: N00E000
    if name.len() != 7 || !name.is_ascii() {
        return None;
    }

    let bytes = name.as_bytes();
    let lat_sign = hemisphere_sign(bytes[0], b'n', b's')?;
    let lat: i32 = parse_digits(&name[1..3])?;
    let lon_sign = hemisphere_sign(bytes[3], b'e', b'w')?;
    let lon: i32 = parse_digits(&name[4..7])?;

    Some((lat * lat_sign, lon * lon_sign))
}

/// Relative DTED path for the cell containing `(lat, lon)`.
///
/// `extension` may be given with or without the leading dot.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use elevdb::filename::dted_relative_path;
///
/// assert_eq!(dted_relative_path(27.5, -80.5, ".dt1"), PathBuf::from("w081/n27.dt1"));
/// assert_eq!(dted_relative_path(-0.5, 12.2, "dt2"), PathBuf::from("e012/s01.dt2"));
/// ```
pub fn dted_relative_path(lat: f64, lon: f64, extension: &str) -> PathBuf {
    dted_relative_path_for_tile(lat.floor() as i32, lon.floor() as i32, extension)
}

/// Relative DTED path for the tile whose southwest corner is `(lat, lon)`.
pub fn dted_relative_path_for_tile(lat: i32, lon: i32, extension: &str) -> PathBuf {
    let lon_prefix = if lon >= 0 { 'e' } else { 'w' };
    let lat_prefix = if lat >= 0 { 'n' } else { 's' };
    let extension = extension.trim_start_matches('.');

    let dir = format!("{}{:03}", lon_prefix, lon.abs());
    let file = format!("{}{:02}.{}", lat_prefix, lat.abs(), extension);
    Path::new(&dir).join(file)
}

/// Parse a DTED cell path (`.../w081/n27.dt1`) into its southwest corner.
///
/// Both the longitude directory and the latitude file name must be present.
pub fn dted_path_to_lat_lon(path: &Path) -> Option<(i32, i32)> {
    let stem = path.file_stem()?.to_str()?;
    let dir = path.parent()?.file_name()?.to_str()?;
    dted_extension_level(path.extension()?.to_str()?)?;

    if stem.len() != 3 || dir.len() != 4 || !stem.is_ascii() || !dir.is_ascii() {
        return None;
    }

    let lat_sign = hemisphere_sign(stem.as_bytes()[0], b'n', b's')?;
    let lat: i32 = parse_digits(&stem[1..3])?;
    let lon_sign = hemisphere_sign(dir.as_bytes()[0], b'e', b'w')?;
    let lon: i32 = parse_digits(&dir[1..4])?;

    Some((lat * lat_sign, lon * lon_sign))
}

/// DTED level for an extension such as `dt1` or `.DT2`.
pub fn dted_extension_level(extension: &str) -> Option<u8> {
    let extension = extension.trim_start_matches('.');
    if extension.len() != 3 || !extension[..2].eq_ignore_ascii_case("dt") {
        return None;
    }
    match extension.as_bytes()[2] {
        level @ b'0'..=b'2' => Some(level - b'0'),
        _ => None,
    }
}

fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

fn hemisphere_sign(byte: u8, positive: u8, negative: u8) -> Option<i32> {
    match byte.to_ascii_lowercase() {
        b if b == positive => Some(1),
        b if b == negative => Some(-1),
        _ => None,
    }
}

fn parse_digits(digits: &str) -> Option<i32> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
