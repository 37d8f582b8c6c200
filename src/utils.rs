/// Geodesy and presentation helpers
use crate::domain::GeoPoint;

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate distance between two points using the Haversine formula
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let rlat1 = a.lat.to_radians();
    let rlat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + rlat1.cos() * rlat2.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push h just outside [0, 1] near coincident or antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Great-circle distance, or `None` when either point is missing
pub fn distance_km(a: Option<&GeoPoint>, b: Option<&GeoPoint>) -> Option<f64> {
    Some(haversine_km(a?, b?))
}

/// Reduce a longitude to (-180, 180]. Non-finite input is returned as is.
pub fn normalize_longitude(lng: f64) -> f64 {
    if !lng.is_finite() || (lng > -180.0 && lng <= 180.0) {
        return lng;
    }
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Human readable distance; switches to thousands of km at 1000 km
pub fn format_distance(km: Option<f64>) -> String {
    match km {
        Some(km) if km.is_finite() && km >= 1000.0 => format!("{:.1}k km", km / 1000.0),
        Some(km) if km.is_finite() => format!("{:.0} km", km.max(0.0)),
        _ => "--".to_string(),
    }
}

/// Human readable duration: seconds below 60 s, minutes below 120 min, then hours
pub fn format_eta(ms: Option<i64>) -> String {
    let Some(ms) = ms.filter(|ms| *ms >= 0) else {
        return "--".to_string();
    };
    let secs = ms / 1000;
    if secs < 60 {
        return format!("{} s", secs);
    }
    let minutes = secs / 60;
    if minutes < 120 {
        return format!("{} min", minutes);
    }
    format!("{} h {} min", minutes / 60, minutes % 60)
}

/// Format a point as "51.5074° N, 0.1278° W"
pub fn format_lat_lng(point: &GeoPoint) -> String {
    let ns = if point.lat >= 0.0 { 'N' } else { 'S' };
    let ew = if point.lng >= 0.0 { 'E' } else { 'W' };
    format!(
        "{:.4}° {}, {:.4}° {}",
        point.lat.abs(),
        ns,
        point.lng.abs(),
        ew
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    #[test]
    fn test_haversine_km_zero_distance() {
        let a = p(51.5074, -0.1278);
        assert_eq!(haversine_km(&a, &a), 0.0);
    }

    #[test]
    fn test_haversine_km_known_distance() {
        // London to Paris, roughly 344 km
        let distance = haversine_km(&p(51.5074, -0.1278), &p(48.8566, 2.3522));
        assert!((distance - 344.0).abs() < 10.0);
    }

    #[test]
    fn test_haversine_km_is_symmetric() {
        let pairs = [
            (p(0.0, 0.0), p(10.0, 20.0)),
            (p(-45.0, 170.0), p(30.0, -170.0)),
            (p(89.9, 0.0), p(-89.9, 180.0)),
        ];
        for (a, b) in pairs {
            assert_eq!(haversine_km(&a, &b), haversine_km(&b, &a));
        }
    }

    #[test]
    fn test_haversine_km_antipodal_is_half_circumference() {
        let distance = haversine_km(&p(0.0, 0.0), &p(0.0, 180.0));
        assert!(distance.is_finite());
        assert!((distance - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_distance_km_missing_point() {
        let a = p(1.0, 2.0);
        assert_eq!(distance_km(None, Some(&a)), None);
        assert_eq!(distance_km(Some(&a), None), None);
        assert_eq!(distance_km(Some(&a), Some(&a)), Some(0.0));
    }

    #[test]
    fn test_normalize_longitude_range() {
        assert_eq!(normalize_longitude(180.0), 180.0);
        assert_eq!(normalize_longitude(-180.0), 180.0);
        assert_eq!(normalize_longitude(540.0), 180.0);
        assert!((normalize_longitude(190.0) + 170.0).abs() < 1e-9);
        assert!((normalize_longitude(-190.0) - 170.0).abs() < 1e-9);
        assert!((normalize_longitude(725.5) - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_longitude_idempotent() {
        for x in [-1000.0, -540.0, -180.0, -179.999, 0.1, 179.5, 180.0, 359.9, 1e6] {
            let once = normalize_longitude(x);
            assert!(once > -180.0 && once <= 180.0, "{} -> {}", x, once);
            assert_eq!(normalize_longitude(once), once);
        }
    }

    #[test]
    fn test_normalize_longitude_non_finite_passthrough() {
        assert!(normalize_longitude(f64::NAN).is_nan());
        assert_eq!(normalize_longitude(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn test_format_distance_unit_switch() {
        assert_eq!(format_distance(Some(999.4)), "999 km");
        assert_eq!(format_distance(Some(1000.0)), "1.0k km");
        assert_eq!(format_distance(Some(12_345.0)), "12.3k km");
        assert_eq!(format_distance(None), "--");
    }

    #[test]
    fn test_format_eta_thresholds() {
        assert_eq!(format_eta(Some(59_999)), "59 s");
        assert_eq!(format_eta(Some(60_000)), "1 min");
        assert_eq!(format_eta(Some(119 * 60_000)), "119 min");
        assert_eq!(format_eta(Some(120 * 60_000)), "2 h 0 min");
        assert_eq!(format_eta(Some(185 * 60_000)), "3 h 5 min");
        assert_eq!(format_eta(Some(-5)), "--");
        assert_eq!(format_eta(None), "--");
    }

    #[test]
    fn test_format_lat_lng_hemispheres() {
        assert_eq!(
            format_lat_lng(&p(51.5074, -0.1278)),
            "51.5074° N, 0.1278° W"
        );
        assert_eq!(format_lat_lng(&p(-33.8688, 151.2093)), "33.8688° S, 151.2093° E");
    }
}
