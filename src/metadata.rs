use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

// MARK: - Google Takeout sidecar JSON structures

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct TakeoutJson {
    pub title: Option<String>,
    pub description: Option<String>,
    pub photo_taken_time: Option<TimestampField>,
    pub creation_time: Option<TimestampField>,
    pub geo_data_exif: Option<GeoData>,
    pub geo_data: Option<GeoData>,
    pub favorited: Option<bool>,
    pub trashed: Option<bool>,
    pub archived: Option<bool>,
    pub people: Option<Vec<Person>>,
    pub album_data: Option<AlbumData>,
    pub google_photos_origin: Option<GooglePhotosOrigin>,
}

#[derive(Debug, Deserialize)]
pub struct TimestampField {
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct GeoData {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct Person {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AlbumData {
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePhotosOrigin {
    #[serde(default)]
    pub from_partner_sharing: Option<serde_json::Value>,
}

/// Geo/time facts extracted from a sidecar, independent of the discovery
/// layer's FileEntity/MediaEntity shapes.
#[derive(Debug, Clone, Default)]
pub struct SidecarFacts {
    pub date_taken: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub partner_shared: bool,
    pub trashed: bool,
}

// MARK: - Parsing

pub fn parse_sidecar(json_bytes: &[u8]) -> Result<TakeoutJson> {
    let parsed: TakeoutJson = serde_json::from_slice(json_bytes)?;
    Ok(parsed)
}

impl TakeoutJson {
    pub fn to_facts(&self) -> SidecarFacts {
        SidecarFacts {
            date_taken: self.parse_timestamp(),
            latitude: self.best_latitude(),
            longitude: self.best_longitude(),
            altitude: self.best_altitude(),
            partner_shared: self
                .google_photos_origin
                .as_ref()
                .is_some_and(|o| o.from_partner_sharing.is_some()),
            trashed: self.is_trashed(),
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.trashed.unwrap_or(false)
    }

    fn parse_timestamp(&self) -> Option<DateTime<Utc>> {
        let ts_str = self.photo_taken_time.as_ref()?.timestamp.as_str();
        parse_unix_timestamp(ts_str)
    }

    fn best_geo(&self) -> Option<&GeoData> {
        self.geo_data_exif
            .as_ref()
            .filter(|g| !is_zero_gps(g))
            .or_else(|| self.geo_data.as_ref().filter(|g| !is_zero_gps(g)))
    }

    fn best_latitude(&self) -> Option<f64> {
        self.best_geo().map(|g| g.latitude)
    }

    fn best_longitude(&self) -> Option<f64> {
        self.best_geo().map(|g| g.longitude)
    }

    fn best_altitude(&self) -> Option<f64> {
        self.best_geo().map(|g| g.altitude)
    }
}

/// Parses a unix-seconds string, tolerating empty/"0" values as "no
/// timestamp" per the Takeout JSON convention. Negative values (pre-1970)
/// are honored.
pub fn parse_unix_timestamp(ts_str: &str) -> Option<DateTime<Utc>> {
    if ts_str.is_empty() || ts_str == "0" {
        return None;
    }
    let epoch: i64 = ts_str.parse().ok()?;
    if epoch == 0 {
        return None;
    }
    DateTime::from_timestamp(epoch, 0)
}

fn is_zero_gps(geo: &GeoData) -> bool {
    geo.latitude == 0.0 && geo.longitude == 0.0
}

// MARK: - Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_facts_extraction() {
        let json = r#"{
            "title": "sunset.jpg",
            "description": "A beautiful sunset",
            "photoTakenTime": { "timestamp": "1700000000" },
            "geoDataExif": { "latitude": 22.3193, "longitude": 114.1694, "altitude": 100.0 },
            "favorited": true
        }"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        let facts = takeout.to_facts();

        assert_eq!(
            facts.date_taken.unwrap().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "2023-11-14T22:13:20Z"
        );
        assert_eq!(facts.latitude, Some(22.3193));
        assert_eq!(facts.longitude, Some(114.1694));
        assert_eq!(facts.altitude, Some(100.0));
    }

    #[test]
    fn test_zero_timestamp() {
        let json = r#"{ "photoTakenTime": { "timestamp": "0" } }"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        assert!(takeout.to_facts().date_taken.is_none());
    }

    #[test]
    fn test_empty_timestamp() {
        let json = r#"{ "photoTakenTime": { "timestamp": "" } }"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        assert!(takeout.to_facts().date_taken.is_none());
    }

    #[test]
    fn test_negative_timestamp() {
        // 1960-01-01 00:00:00 UTC = -315619200
        let json = r#"{ "photoTakenTime": { "timestamp": "-315619200" } }"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        let facts = takeout.to_facts();
        assert_eq!(
            facts.date_taken.unwrap().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "1960-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_zero_gps_skipped() {
        let json = r#"{
            "geoDataExif": { "latitude": 0.0, "longitude": 0.0, "altitude": 0.0 },
            "geoData": { "latitude": 22.3, "longitude": 114.2, "altitude": 50.0 }
        }"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        let facts = takeout.to_facts();
        assert_eq!(facts.latitude, Some(22.3));
        assert_eq!(facts.longitude, Some(114.2));
    }

    #[test]
    fn test_both_gps_zero() {
        let json = r#"{
            "geoDataExif": { "latitude": 0.0, "longitude": 0.0, "altitude": 0.0 },
            "geoData": { "latitude": 0.0, "longitude": 0.0, "altitude": 0.0 }
        }"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        let facts = takeout.to_facts();
        assert_eq!(facts.latitude, None);
        assert_eq!(facts.longitude, None);
    }

    #[test]
    fn test_trashed() {
        let json = r#"{ "trashed": true }"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        assert!(takeout.is_trashed());
    }

    #[test]
    fn test_not_trashed_when_absent() {
        let json = r#"{}"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        assert!(!takeout.is_trashed());
    }

    #[test]
    fn test_geo_data_exif_preferred_over_geo_data() {
        let json = r#"{
            "geoDataExif": { "latitude": 1.0, "longitude": 2.0, "altitude": 3.0 },
            "geoData": { "latitude": 4.0, "longitude": 5.0, "altitude": 6.0 }
        }"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        let facts = takeout.to_facts();
        assert_eq!(facts.latitude, Some(1.0));
        assert_eq!(facts.longitude, Some(2.0));
    }

    #[test]
    fn test_partner_shared_detected() {
        let json = r#"{ "googlePhotosOrigin": { "fromPartnerSharing": {} } }"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        assert!(takeout.to_facts().partner_shared);
    }

    #[test]
    fn test_partner_shared_absent() {
        let json = r#"{}"#;
        let takeout: TakeoutJson = serde_json::from_str(json).unwrap();
        assert!(!takeout.to_facts().partner_shared);
    }
}
