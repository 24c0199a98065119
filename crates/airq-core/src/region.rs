//! Administrative region lookup for site coordinates.

/// Resolve a coordinate pair to a region name.
///
/// Geofence data lives outside this crate; plug a lookup in by
/// implementing this trait.
pub trait RegionResolver: Send + Sync {
    fn resolve_region(&self, latitude: f64, longitude: f64) -> Option<String>;
}

/// Resolver that never knows the region.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnresolvedRegion;

impl RegionResolver for UnresolvedRegion {
    fn resolve_region(&self, _latitude: f64, _longitude: f64) -> Option<String> {
        None
    }
}

/// Resolver that places every site in one region.
#[derive(Debug, Clone)]
pub struct FixedRegion(pub String);

impl RegionResolver for FixedRegion {
    fn resolve_region(&self, _latitude: f64, _longitude: f64) -> Option<String> {
        Some(self.0.clone())
    }
}

impl<F> RegionResolver for F
where
    F: Fn(f64, f64) -> Option<String> + Send + Sync,
{
    fn resolve_region(&self, latitude: f64, longitude: f64) -> Option<String> {
        self(latitude, longitude)
    }
}
