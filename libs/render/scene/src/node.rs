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
use crate::Mesh;
use geometry::{Aabb3, Sphere};
use nalgebra::Matrix4;
use parking_lot::Mutex;
use std::sync::Arc;

/// One node of a hierarchical scene graph: bounds, an optional local
/// transform, ordered children, and a mesh payload per level of
/// detail, loaded lazily off-thread.
///
/// LOD 0 is the most detailed tier; each subsequent tier roughly
/// halves the detail.
#[derive(Debug)]
pub struct SceneNode {
    id: u64,
    aabb: Aabb3,
    local_transform: Option<Matrix4<f64>>,
    children: Vec<Arc<SceneNode>>,
    lod_count: usize,

    /// Ground sample distance at which LOD 0 is fully resolved.
    nominal_gsd: f64,

    meshes: Mutex<Vec<Option<Arc<dyn Mesh>>>>,
}

impl SceneNode {
    pub fn new(id: u64, aabb: Aabb3, lod_count: usize, nominal_gsd: f64) -> Self {
        debug_assert!(lod_count > 0);
        debug_assert!(nominal_gsd > 0.);
        Self {
            id,
            aabb,
            local_transform: None,
            children: Vec::new(),
            lod_count,
            nominal_gsd,
            meshes: Mutex::new(vec![None; lod_count]),
        }
    }

    pub fn with_transform(mut self, transform: Matrix4<f64>) -> Self {
        self.local_transform = Some(transform);
        self
    }

    pub fn with_children(mut self, children: Vec<Arc<SceneNode>>) -> Self {
        self.children = children;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn aabb(&self) -> &Aabb3 {
        &self.aabb
    }

    pub fn bounding_sphere(&self) -> Sphere {
        Sphere::around(&self.aabb)
    }

    pub fn local_transform(&self) -> Option<&Matrix4<f64>> {
        self.local_transform.as_ref()
    }

    /// Children in stable declaration order.
    pub fn children(&self) -> &[Arc<SceneNode>] {
        &self.children
    }

    pub fn level_of_detail_count(&self) -> usize {
        self.lod_count
    }

    pub fn nominal_gsd(&self) -> f64 {
        self.nominal_gsd
    }

    /// The coarsest LOD that still resolves `gsd`: tier n covers
    /// `nominal_gsd * 2^n`.
    pub fn lod_for_gsd(&self, gsd: f64) -> usize {
        if gsd <= self.nominal_gsd {
            return 0;
        }
        let tier = (gsd / self.nominal_gsd).log2().floor() as usize;
        tier.min(self.lod_count - 1)
    }

    pub fn mesh(&self, lod: usize) -> Option<Arc<dyn Mesh>> {
        self.meshes.lock().get(lod).and_then(|m| m.clone())
    }

    pub fn has_mesh(&self, lod: usize) -> bool {
        self.meshes.lock().get(lod).map_or(false, |m| m.is_some())
    }

    pub fn set_mesh(&self, lod: usize, mesh: Arc<dyn Mesh>) {
        if let Some(slot) = self.meshes.lock().get_mut(lod) {
            *slot = Some(mesh);
        }
    }

    /// Drop every loaded payload, e.g. when the node scrolls out of
    /// view or the scene unloads.
    pub fn release_meshes(&self) {
        for slot in self.meshes.lock().iter_mut() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemoryMesh;
    use nalgebra::Point3;

    fn node(lods: usize) -> SceneNode {
        SceneNode::new(
            1,
            Aabb3::from_bounds(Point3::new(-1., -1., 0.), Point3::new(1., 1., 2.)),
            lods,
            0.5,
        )
    }

    #[test]
    fn test_lod_selection_halves_per_tier() {
        let n = node(4);
        assert_eq!(n.lod_for_gsd(0.1), 0);
        assert_eq!(n.lod_for_gsd(0.5), 0);
        assert_eq!(n.lod_for_gsd(1.1), 1);
        assert_eq!(n.lod_for_gsd(2.1), 2);
        // Coarser than the coarsest tier clamps.
        assert_eq!(n.lod_for_gsd(1000.), 3);
    }

    #[test]
    fn test_mesh_lifecycle() {
        let n = node(2);
        assert!(!n.has_mesh(0));
        n.set_mesh(0, Arc::new(MemoryMesh::quad()));
        assert!(n.has_mesh(0));
        assert!(!n.has_mesh(1));
        assert_eq!(n.mesh(0).unwrap().vertex_count(), 4);
        n.release_meshes();
        assert!(!n.has_mesh(0));
    }

    #[test]
    fn test_children_iteration_is_stable() {
        let kids: Vec<Arc<SceneNode>> = (10..14).map(|i| {
            Arc::new(SceneNode::new(
                i,
                Aabb3::from_bounds(Point3::origin(), Point3::new(1., 1., 1.)),
                1,
                1.,
            ))
        })
        .collect();
        let parent = node(1).with_children(kids);
        let ids: Vec<u64> = parent.children().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![10, 11, 12, 13]);
    }
}
