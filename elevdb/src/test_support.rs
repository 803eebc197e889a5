//! Fixture writers shared by the unit tests.

#![allow(dead_code)]

use crate::cell::dted::{record_checksum, RECORD_SENTINEL};
use crate::post::encode_signed_magnitude;

mod fixtures;

pub use fixtures::{gradient, write_dted, write_srtm, DtedFixture, DTED_HEADER_LEN};

#[cfg(feature = "geotiff")]
pub use self::geotiff::{write_geotiff, GeoTiffFixture};

#[cfg(feature = "geotiff")]
mod geotiff {
    use std::fs::File;
    use std::path::{Path, PathBuf};

    use tiff::encoder::{colortype, TiffEncoder};
    use tiff::tags::Tag;

    /// A single-band `f32` GeoTIFF.
    pub struct GeoTiffFixture {
        west: f64,
        north: f64,
        scale: f64,
        width: usize,
        height: usize,
        pixel_is_point: bool,
        nodata: Option<f64>,
        values: Option<Vec<f32>>,
        georeferenced: bool,
    }

    impl GeoTiffFixture {
        /// Tiepoint at pixel (0, 0) = `(west, north)`, square pixels of `scale`.
        pub fn new(west: f64, north: f64, scale: f64, width: usize, height: usize) -> Self {
            Self {
                west,
                north,
                scale,
                width,
                height,
                pixel_is_point: false,
                nodata: None,
                values: None,
                georeferenced: true,
            }
        }

        pub fn pixel_is_point(mut self) -> Self {
            self.pixel_is_point = true;
            self
        }

        pub fn with_nodata(mut self, nodata: f64) -> Self {
            self.nodata = Some(nodata);
            self
        }

        /// Row-major values, north row first.
        pub fn with_values(mut self, values: Vec<f32>) -> Self {
            self.values = Some(values);
            self
        }

        pub fn without_georeferencing(mut self) -> Self {
            self.georeferenced = false;
            self
        }
    }

    pub fn write_geotiff(root: &Path, name: &str, fixture: &GeoTiffFixture) -> PathBuf {
        let path = root.join(name);
        let values = fixture.values.clone().unwrap_or_else(|| {
            (0..fixture.width * fixture.height)
                .map(|i| ((i / fixture.width) * 10 + i % fixture.width) as f32)
                .collect()
        });

        let file = File::create(&path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(fixture.width as u32, fixture.height as u32)
            .unwrap();

        if fixture.georeferenced {
            let tiepoint = [0.0, 0.0, 0.0, fixture.west, fixture.north, 0.0];
            let scale = [fixture.scale, fixture.scale, 0.0];
            let raster_type = if fixture.pixel_is_point { 2 } else { 1 };
            let keys: [u16; 8] = [1, 1, 0, 1, 1025, 0, 1, raster_type];

            let dir = image.encoder();
            dir.write_tag(Tag::Unknown(33922), &tiepoint[..]).unwrap();
            dir.write_tag(Tag::Unknown(33550), &scale[..]).unwrap();
            dir.write_tag(Tag::Unknown(34735), &keys[..]).unwrap();
        }
        if let Some(nodata) = fixture.nodata {
            image
                .encoder()
                .write_tag(Tag::Unknown(42113), nodata.to_string().as_str())
                .unwrap();
        }

        image.write_data(&values).unwrap();
        path
    }
}
