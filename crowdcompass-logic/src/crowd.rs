//! Fake crowd-density data for the dashboard. None of this is measured, it only has to look
//! plausible and be reproducible.

use std::{collections::VecDeque, fmt, time::Duration};

use chrono::TimeDelta;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{UtcDT, location::Coordinate};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Number of people around some location
pub struct CrowdPoint {
    /// `lat,lng` with 4 decimals
    pub location: String,
    pub density: u32,
}

/// 32-bit string hash over UTF-16 code units (`h * 31 + c`)
fn string_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |h, c| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(c as i32)
    })
}

/// Crowd points scattered around `base`, derived from the incident description so the same
/// incident always yields the same points. Gives 3 to 5 points, none for an empty description.
pub fn incident_crowd_points(incident: &str, base: Coordinate) -> Vec<CrowdPoint> {
    if incident.is_empty() {
        return vec![];
    }

    let hash = string_hash(incident) as i64;
    let count = hash.abs() % 3 + 3;

    (1..=count)
        .map(|n| {
            let lat_offset = ((hash * n) % 100) as f64 / 10000.0 - 0.005;
            let lng_offset = ((hash as f64 / n as f64) % 100.0) / 10000.0 - 0.005;
            let density = (hash * n * 37).abs() % 300 + 50;
            CrowdPoint {
                location: format!(
                    "{:.4},{:.4}",
                    base.lat() + lat_offset,
                    base.lng() + lng_offset
                ),
                density: density as u32,
            }
        })
        .collect()
}

/// How often the density panel takes a new sample
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(15);

const WINDOW: usize = 6;
const DEFAULT_DENSITY: u32 = 70;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DensitySample {
    pub time: UtcDT,
    pub density: u32,
}

impl DensitySample {
    /// `HH:MM` label for charts
    pub fn time_label(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DensityStatus {
    Low,
    Moderate,
    High,
}

impl DensityStatus {
    pub fn of(density: u32) -> Self {
        if density > 150 {
            Self::High
        } else if density > 75 {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for DensityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        };
        write!(f, "{s}")
    }
}

/// Sliding window of the last few "people nearby" samples, one minute apart to start with
pub struct DensitySeries {
    rng: ChaCha8Rng,
    samples: VecDeque<DensitySample>,
}

impl DensitySeries {
    pub fn new(seed: u64, now: UtcDT) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let samples = (0..WINDOW as i64)
            .rev()
            .map(|minutes_ago| DensitySample {
                time: now - TimeDelta::minutes(minutes_ago),
                density: rng.random_range(20..=120),
            })
            .collect();
        Self { rng, samples }
    }

    /// Drop the oldest sample and add one that drifts from the newest
    pub fn advance(&mut self, now: UtcDT) -> DensitySample {
        let prev = self.current().unwrap_or(DEFAULT_DENSITY) as i64;
        let change = self.rng.random_range(-20..=20i64);
        let sample = DensitySample {
            time: now,
            density: (prev + change).clamp(10, 250) as u32,
        };
        if self.samples.len() >= WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        sample
    }

    pub fn samples(&self) -> impl Iterator<Item = &DensitySample> {
        self.samples.iter()
    }

    pub fn current(&self) -> Option<u32> {
        self.samples.back().map(|s| s.density)
    }

    pub fn status(&self) -> DensityStatus {
        DensityStatus::of(self.current().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_hash_matches_java_style_hash() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 97 * 31 + 98);
        // Overflows wrap like a 32-bit int
        assert_eq!(string_hash("Fire outbreak in a nearby building"), {
            "Fire outbreak in a nearby building"
                .encode_utf16()
                .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
        });
    }

    #[test]
    fn test_incident_points() {
        assert!(incident_crowd_points("", Coordinate::FALLBACK).is_empty());

        let a = incident_crowd_points("Flooding on 5th street", Coordinate::FALLBACK);
        let b = incident_crowd_points("Flooding on 5th street", Coordinate::FALLBACK);
        assert_eq!(a, b);
        assert!((3..=5).contains(&a.len()));

        for point in a.iter() {
            assert!((50..350).contains(&point.density), "{point:?}");
            let c = point.location.parse::<Coordinate>().unwrap();
            assert!((c.lat() - 34.0522).abs() <= 0.0151, "{point:?}");
            assert!((c.lng() + 118.2437).abs() <= 0.0151, "{point:?}");
        }
    }

    #[test]
    fn test_known_hash_points() {
        // "a" hashes to 97: 97 % 3 + 3 = 4 points
        let points = incident_crowd_points("a", Coordinate::new(0.0, 0.0).unwrap());
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].density, 97 * 37 % 300 + 50);
        // 97 % 100 = 97 -> 0.0097 - 0.005
        assert_eq!(points[0].location, "0.0047,0.0047");
    }

    #[test]
    fn test_density_series() {
        let now = Utc::now();
        let mut series = DensitySeries::new(7, now);
        assert_eq!(series.samples().count(), WINDOW);
        assert!(series.samples().all(|s| (20..=120).contains(&s.density)));
        assert_eq!(series.samples().last().unwrap().time, now);

        let mut again = DensitySeries::new(7, now);
        for i in 1..50 {
            let prev = series.current().unwrap() as i64;
            let later = now + TimeDelta::seconds(15 * i);
            let sample = series.advance(later);
            assert_eq!(sample, again.advance(later), "Series not deterministic");
            assert!((10..=250).contains(&sample.density));
            assert!((sample.density as i64 - prev).abs() <= 20);
            assert_eq!(series.samples().count(), WINDOW);
        }
    }

    #[test]
    fn test_status() {
        assert_eq!(DensityStatus::of(0), DensityStatus::Low);
        assert_eq!(DensityStatus::of(75), DensityStatus::Low);
        assert_eq!(DensityStatus::of(76), DensityStatus::Moderate);
        assert_eq!(DensityStatus::of(150), DensityStatus::Moderate);
        assert_eq!(DensityStatus::of(151), DensityStatus::High);
    }
}
