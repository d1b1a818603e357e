const EARTH_RADIUS_M: f64 = 6_371_000.0;

const NYC_BOROUGHS: [&str; 6] = [
    "manhattan",
    "brooklyn",
    "queens",
    "bronx",
    "staten island",
    "new york city",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance in metres.
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Lowercased city name with NYC boroughs folded into "new york".
pub fn normalize_city(city: &str) -> String {
    let city = city.trim().to_lowercase();
    if NYC_BOROUGHS.contains(&city.as_str()) {
        "new york".to_string()
    } else {
        city
    }
}
