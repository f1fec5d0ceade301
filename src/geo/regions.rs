use super::Position;

/// A named rectangular region with a fixed score offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: &'static str,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
    pub score_offset: i32,
}

impl Region {
    pub fn contains(&self, position: &Position) -> bool {
        position.latitude >= self.min_lat
            && position.latitude <= self.max_lat
            && position.longitude >= self.min_lng
            && position.longitude <= self.max_lng
    }
}

/// Maps a position to a score offset and a human-readable place name.
///
/// The bundled table is a coarse stand-in; a reverse-geocoding service can
/// implement this trait without touching the score engine.
pub trait RegionResolver: Send + Sync {
    fn score_offset(&self, position: &Position) -> i32;
    fn place_name(&self, position: &Position) -> String;
}

const KNOWN_REGIONS: [Region; 4] = [
    Region {
        name: "Mumbai, Maharashtra",
        min_lat: 19.0,
        max_lat: 19.2,
        min_lng: 72.8,
        max_lng: 73.0,
        score_offset: 5,
    },
    Region {
        name: "New Delhi",
        min_lat: 28.5,
        max_lat: 28.7,
        min_lng: 77.0,
        max_lng: 77.3,
        score_offset: 0,
    },
    Region {
        name: "Bangalore, Karnataka",
        min_lat: 12.9,
        max_lat: 13.1,
        min_lng: 77.5,
        max_lng: 77.7,
        score_offset: 10,
    },
    Region {
        name: "Shillong, Meghalaya",
        min_lat: 25.5,
        max_lat: 25.6,
        min_lng: 91.8,
        max_lng: 91.9,
        score_offset: 15,
    },
];

/// Offset applied when no known region matches.
pub const REMOTE_AREA_OFFSET: i32 = -10;

/// First-match lookup over a fixed list of bounding boxes.
#[derive(Debug, Clone)]
pub struct BoundingBoxRegions {
    regions: Vec<Region>,
    fallback_offset: i32,
}

impl Default for BoundingBoxRegions {
    fn default() -> Self {
        Self {
            regions: KNOWN_REGIONS.to_vec(),
            fallback_offset: REMOTE_AREA_OFFSET,
        }
    }
}

impl BoundingBoxRegions {
    pub fn new(regions: Vec<Region>, fallback_offset: i32) -> Self {
        Self {
            regions,
            fallback_offset,
        }
    }

    pub fn lookup(&self, position: &Position) -> Option<&Region> {
        self.regions.iter().find(|region| region.contains(position))
    }
}

impl RegionResolver for BoundingBoxRegions {
    fn score_offset(&self, position: &Position) -> i32 {
        self.lookup(position)
            .map(|region| region.score_offset)
            .unwrap_or(self.fallback_offset)
    }

    fn place_name(&self, position: &Position) -> String {
        match self.lookup(position) {
            Some(region) => region.name.to_string(),
            None => format!("{:.4}, {:.4}", position.latitude, position.longitude),
        }
    }
}
