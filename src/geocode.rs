//! Offline enrichment that gives every hospital a plausible European location.
//!
//! A hospital name always maps to the same city and the same jittered
//! coordinates, so re-running the enrichment over the same file is stable.

use crate::error::Result;
use crate::loader::load_records;
use crate::output::write_raw;
use crate::types::{columns, RawDataset};
use crate::util::parse_datetime_safe;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct City {
    pub name: &'static str,
    pub country: &'static str,
    pub lat: f64,
    pub lon: f64,
    pub weight: f64,
}

const fn city(name: &'static str, country: &'static str, lat: f64, lon: f64, weight: f64) -> City {
    City {
        name,
        country,
        lat,
        lon,
        weight,
    }
}

/// Weighted toward large cities; weights sum to 1.
pub const CITIES: [City; 33] = [
    city("London", "UK", 51.5074, -0.1278, 0.06),
    city("Paris", "France", 48.8566, 2.3522, 0.06),
    city("Berlin", "Germany", 52.5200, 13.4050, 0.05),
    city("Madrid", "Spain", 40.4168, -3.7038, 0.05),
    city("Rome", "Italy", 41.9028, 12.4964, 0.05),
    city("Barcelona", "Spain", 41.3851, 2.1734, 0.04),
    city("Vienna", "Austria", 48.2082, 16.3738, 0.04),
    city("Amsterdam", "Netherlands", 52.3676, 4.9041, 0.04),
    city("Milan", "Italy", 45.4642, 9.1900, 0.04),
    city("Munich", "Germany", 48.1351, 11.5820, 0.03),
    city("Hamburg", "Germany", 53.5511, 9.9937, 0.03),
    city("Prague", "Czech Republic", 50.0755, 14.4378, 0.03),
    city("Brussels", "Belgium", 50.8503, 4.3517, 0.03),
    city("Budapest", "Hungary", 47.4979, 19.0402, 0.03),
    city("Warsaw", "Poland", 52.2297, 21.0122, 0.03),
    city("Lisbon", "Portugal", 38.7223, -9.1393, 0.03),
    city("Stockholm", "Sweden", 59.3293, 18.0686, 0.03),
    city("Copenhagen", "Denmark", 55.6761, 12.5683, 0.03),
    city("Naples", "Italy", 40.8518, 14.2681, 0.02),
    city("Dublin", "Ireland", 53.3498, -6.2603, 0.02),
    city("Athens", "Greece", 37.9838, 23.7275, 0.02),
    city("Zurich", "Switzerland", 47.3769, 8.5417, 0.02),
    city("Valencia", "Spain", 39.4699, -0.3763, 0.02),
    city("Seville", "Spain", 37.3891, -5.9845, 0.02),
    city("Cologne", "Germany", 50.9375, 6.9603, 0.02),
    city("Turin", "Italy", 45.0703, 7.6869, 0.02),
    city("Frankfurt", "Germany", 50.1109, 8.6821, 0.02),
    city("Oslo", "Norway", 59.9139, 10.7522, 0.02),
    city("Helsinki", "Finland", 60.1699, 24.9384, 0.02),
    city("Krakow", "Poland", 50.0647, 19.9450, 0.02),
    city("Lyon", "France", 45.7640, 4.8357, 0.02),
    city("Marseille", "France", 43.2965, 5.3698, 0.02),
    city("Geneva", "Switzerland", 46.2044, 6.1432, 0.02),
];

const URBAN_SHARE: f64 = 0.8;
const URBAN_KM: f64 = 5.0;
const RURAL_KM: f64 = 20.0;
const KM_PER_DEGREE: f64 = 111.0;

/// 31-multiplier rolling hash over UTF-16 code units, wrapping at 32 bits.
pub fn hospital_hash(name: &str) -> i32 {
    name.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Hash bucket in `[0, 1)`.
pub fn bucket(hash: i32) -> f64 {
    f64::from((hash % 1000).abs()) / 1000.0
}

pub fn assign_city(name: &str) -> &'static City {
    let target = bucket(hospital_hash(name));
    let mut cumulative = 0.0;
    for c in CITIES.iter() {
        cumulative += c.weight;
        if cumulative >= target {
            return c;
        }
    }
    &CITIES[CITIES.len() - 1]
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

/// City centre plus a random offset inside a 5 km (urban) or 20 km (rural)
/// box. The RNG is seeded from the hospital hash.
pub fn jitter(city: &City, hash: i32) -> (f64, f64) {
    let mut rng = StdRng::seed_from_u64(u64::from(hash as u32));
    let km = if rng.gen_bool(URBAN_SHARE) {
        URBAN_KM
    } else {
        RURAL_KM
    };
    let lat_offset = (rng.gen::<f64>() - 0.5) * (km / KM_PER_DEGREE);
    let lon_offset =
        (rng.gen::<f64>() - 0.5) * (km / (KM_PER_DEGREE * city.lat.to_radians().cos()));
    (round6(city.lat + lat_offset), round6(city.lon + lon_offset))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub city: &'static str,
    pub country: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

pub fn locate(hospital: &str) -> Location {
    let hash = hospital_hash(hospital);
    let city = assign_city(hospital);
    let (latitude, longitude) = jitter(city, hash);
    Location {
        city: city.name,
        country: city.country,
        latitude,
        longitude,
    }
}

fn reformat_date(cell: &str) -> String {
    parse_datetime_safe(Some(cell))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnrichReport {
    pub rows: usize,
    pub hospitals: usize,
}

/// Add `City`, `Country`, `Latitude` and `Longitude` to every row and
/// normalize the admission and discharge dates to `YYYY-MM-DD`.
pub fn enrich_records(raw: &RawDataset) -> (RawDataset, EnrichReport) {
    let mut headers = raw.headers.clone();
    for col in [
        columns::CITY,
        columns::COUNTRY,
        columns::LATITUDE,
        columns::LONGITUDE,
    ] {
        if !headers.iter().any(|h| h == col) {
            headers.push(col.to_string());
        }
    }

    let mut locations: HashMap<String, Location> = HashMap::new();
    let records = raw
        .records
        .iter()
        .map(|row| {
            let mut row = row.clone();
            let hospital = row
                .get(columns::HOSPITAL)
                .map(|h| h.trim().to_string())
                .unwrap_or_default();
            let loc = locations
                .entry(hospital)
                .or_insert_with_key(|name| locate(name));
            row.insert(columns::CITY.to_string(), loc.city.to_string());
            row.insert(columns::COUNTRY.to_string(), loc.country.to_string());
            row.insert(columns::LATITUDE.to_string(), loc.latitude.to_string());
            row.insert(columns::LONGITUDE.to_string(), loc.longitude.to_string());
            for col in [columns::DATE_OF_ADMISSION, columns::DISCHARGE_DATE] {
                if let Some(cell) = row.get_mut(col) {
                    *cell = reformat_date(cell);
                }
            }
            row
        })
        .collect();

    debug!("Assigned locations to {} hospitals", locations.len());
    let report = EnrichReport {
        rows: raw.records.len(),
        hospitals: locations.len(),
    };
    (RawDataset { headers, records }, report)
}

pub fn enrich_csv(input: &Path, output: &Path) -> Result<EnrichReport> {
    let (raw, _) = load_records(input)?;
    let (enriched, report) = enrich_records(&raw);
    write_raw(output, &enriched)?;
    info!(
        "Enriched {} rows ({} hospitals) into {}",
        report.rows,
        report.hospitals,
        output.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawRecord;

    #[test]
    fn weights_sum_to_one() {
        let total: f64 = CITIES.iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hash_matches_rolling_formula() {
        assert_eq!(hospital_hash(""), 0);
        assert_eq!(hospital_hash("abc"), 96354);
        assert_eq!(bucket(96354), 0.354);
        assert_eq!(bucket(-1234), 0.234);
    }

    #[test]
    fn buckets_map_to_cumulative_weights() {
        assert_eq!(assign_city("").name, "London");
        assert_eq!(assign_city("abc").name, "Amsterdam");
    }

    #[test]
    fn long_names_wrap_instead_of_overflowing() {
        let name = "Saint Bartholomew's Regional Teaching Hospital and Clinics";
        let hash = hospital_hash(name);
        assert_eq!(hash, hospital_hash(name));
        assert!((0.0..1.0).contains(&bucket(hash)));
    }

    #[test]
    fn jitter_is_deterministic_and_bounded() {
        let name = "Johnson Group";
        let a = locate(name);
        assert_eq!(a, locate(name));
        let c = assign_city(name);
        let lat_bound = RURAL_KM / KM_PER_DEGREE / 2.0 + 1e-6;
        let lon_bound = RURAL_KM / (KM_PER_DEGREE * c.lat.to_radians().cos()) / 2.0 + 1e-6;
        assert!((a.latitude - c.lat).abs() <= lat_bound);
        assert!((a.longitude - c.lon).abs() <= lon_bound);
    }

    #[test]
    fn enrich_adds_location_columns_and_dates() {
        let row = |hospital: &str, admitted: &str| -> RawRecord {
            [
                (columns::HOSPITAL, hospital),
                (columns::DATE_OF_ADMISSION, admitted),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
        };
        let raw = RawDataset {
            headers: vec![
                columns::HOSPITAL.to_string(),
                columns::DATE_OF_ADMISSION.to_string(),
            ],
            records: vec![
                row("Smith Plc", "3/7/2024"),
                row("Smith Plc", "garbage"),
                row("Jones Ltd", "2024-01-02"),
            ],
        };
        let (out, report) = enrich_records(&raw);
        assert_eq!(report, EnrichReport { rows: 3, hospitals: 2 });
        assert_eq!(out.headers.len(), 6);
        assert_eq!(out.records[0][columns::DATE_OF_ADMISSION], "2024-03-07");
        assert_eq!(out.records[1][columns::DATE_OF_ADMISSION], "");
        assert_eq!(out.records[0][columns::LATITUDE], out.records[1][columns::LATITUDE]);
        assert_eq!(out.records[0][columns::CITY], assign_city("Smith Plc").name);
    }
}
