// This file is part of Cartograph.
//
// Cartograph is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Cartograph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Cartograph.  If not, see <http://www.gnu.org/licenses/>.
use crate::{Equirectangular, Projection, WebMercator};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProjectionProviderHandle(u64);

struct Provider {
    handle: ProjectionProviderHandle,
    priority: i32,
    projection: Arc<dyn Projection>,
}

/// Process-scoped registry of projection providers. Constructed at
/// service start and passed down explicitly; providers register and
/// unregister themselves, and lookups prefer the highest priority
/// provider for an SRID. There is no hidden global instance.
pub struct ProjectionRegistry {
    providers: Vec<Provider>,
    next_handle: u64,
}

impl Default for ProjectionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ProjectionRegistry {
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
            next_handle: 0,
        }
    }

    /// A registry pre-loaded with the stock projections at priority 0.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Equirectangular), 0);
        registry.register(Arc::new(WebMercator), 0);
        registry
    }

    pub fn register(
        &mut self,
        projection: Arc<dyn Projection>,
        priority: i32,
    ) -> ProjectionProviderHandle {
        let handle = ProjectionProviderHandle(self.next_handle);
        self.next_handle += 1;
        self.providers.push(Provider {
            handle,
            priority,
            projection,
        });
        // Keep sorted so lookup is a linear scan to first match.
        self.providers.sort_by_key(|p| std::cmp::Reverse(p.priority));
        handle
    }

    pub fn unregister(&mut self, handle: ProjectionProviderHandle) -> bool {
        let before = self.providers.len();
        self.providers.retain(|p| p.handle != handle);
        self.providers.len() != before
    }

    pub fn for_srid(&self, srid: u32) -> Option<Arc<dyn Projection>> {
        self.providers
            .iter()
            .find(|p| p.projection.srid() == srid)
            .map(|p| p.projection.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{GeoBounds, GeoPoint, WGS84_SRID};
    use nalgebra::Point3;

    #[derive(Debug)]
    struct UpsideDown;

    impl Projection for UpsideDown {
        fn srid(&self) -> u32 {
            WGS84_SRID
        }
        fn forward(&self, geo: &GeoPoint) -> Point3<f64> {
            Point3::new(geo.longitude, -geo.latitude, geo.hae)
        }
        fn inverse(&self, world: &Point3<f64>) -> GeoPoint {
            GeoPoint::with_hae(-world.y, world.x, world.z)
        }
        fn bounds(&self) -> GeoBounds {
            GeoBounds::whole_earth()
        }
    }

    #[test]
    fn test_lookup_by_srid() {
        let registry = ProjectionRegistry::with_builtins();
        assert!(registry.for_srid(WGS84_SRID).is_some());
        assert!(registry.for_srid(3857).is_some());
        assert!(registry.for_srid(99999).is_none());
    }

    #[test]
    fn test_priority_ordering_and_unregister() {
        let mut registry = ProjectionRegistry::with_builtins();
        let handle = registry.register(Arc::new(UpsideDown), 10);

        // The high priority provider shadows the builtin...
        let proj = registry.for_srid(WGS84_SRID).unwrap();
        assert_eq!(proj.forward(&GeoPoint::new(45., 0.)).y, -45.);

        // ...until it goes away.
        assert!(registry.unregister(handle));
        assert!(!registry.unregister(handle));
        let proj = registry.for_srid(WGS84_SRID).unwrap();
        assert_eq!(proj.forward(&GeoPoint::new(45., 0.)).y, 45.);
    }
}
