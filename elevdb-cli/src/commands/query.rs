use anyhow::{bail, Result};
use elevdb::GeoPoint;
use serde::Serialize;

use super::common::DatabaseArgs;

#[derive(Serialize)]
struct HeightResponse {
    lat: f64,
    lon: f64,
    height: Option<f64>,
    reference: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy: Option<AccuracyResponse>,
}

#[derive(Serialize)]
struct AccuracyResponse {
    ce90: f64,
    le90: f64,
    surface: String,
}

pub fn run(db_args: &DatabaseArgs, lat: f64, lon: f64, ellipsoid: bool, json: bool) -> Result<()> {
    let point = GeoPoint::new(lat, lon);
    if !point.is_valid() {
        bail!("Invalid coordinates: lat={}, lon={}", lat, lon);
    }

    let db = db_args.open()?;

    let height = if ellipsoid {
        db.height_above_ellipsoid(&point)
    } else {
        db.height_above_msl(&point)
    };
    let height = (!height.is_nan()).then_some(height);

    // Output result
    if json {
        let response = HeightResponse {
            lat,
            lon,
            height,
            reference: if ellipsoid { "ellipsoid" } else { "msl" },
            accuracy: db.accuracy_info(&point).map(|acc| AccuracyResponse {
                ce90: acc.ce90,
                le90: acc.le90,
                surface: acc.surface_name,
            }),
        };
        println!("{}", serde_json::to_string(&response)?);
    } else if let Some(height) = height {
        println!("{:.2}", height);
    } else {
        println!("void");
    }

    db.close();
    Ok(())
}
