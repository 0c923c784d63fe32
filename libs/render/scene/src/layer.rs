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

// The scene layer resolves which placed 3D scenes are on screen and
// feeds the node loader, as one concrete instance of the async
// renderable engine: the worker runs `query` against a view snapshot,
// and the committed renderable list is whatever nodes survived the
// last completed pass.
use crate::{LoadContext, NodeLoader, SceneNode};
use anyhow::Result;
use camera::ViewState;
use fxhash::FxHashSet;
use geodesy::{GeoBounds, GeoPoint};
use parking_lot::RwLock;
use render::{AsyncQuery, AsyncRenderable};
use std::sync::Arc;
use sync::CancelFlag;

/// A scene graph instanced at a geographic location.
pub struct ScenePlacement {
    pub id: u64,
    pub root: Arc<SceneNode>,
    pub location: GeoPoint,
    pub footprint: GeoBounds,
}

/// One committed drawable: a node of a placed scene at the level of
/// detail the last query selected for it.
#[derive(Clone)]
pub struct SceneRenderable {
    pub placement_id: u64,
    pub node: Arc<SceneNode>,
    pub lod: usize,
}

#[derive(Default)]
pub struct SceneQueryContext {
    visible: Vec<SceneRenderable>,
    emitted: FxHashSet<(u64, u64)>,
}

impl SceneQueryContext {
    pub fn visible(&self) -> &[SceneRenderable] {
        &self.visible
    }
}

pub struct SceneLayer {
    placements: RwLock<Vec<ScenePlacement>>,
    loader: Arc<NodeLoader>,

    /// Degrees beyond the view bounds inside which off-screen scenes
    /// are prefetched.
    prefetch_margin: f64,
}

/// A scene layer driven by the async engine.
pub type GlSceneLayer = AsyncRenderable<SceneLayer>;

impl SceneLayer {
    pub fn new(loader: Arc<NodeLoader>) -> Self {
        Self::with_prefetch_margin(loader, 0.5)
    }

    pub fn with_prefetch_margin(loader: Arc<NodeLoader>, prefetch_margin: f64) -> Self {
        Self {
            placements: RwLock::new(Vec::new()),
            loader,
            prefetch_margin,
        }
    }

    pub fn loader(&self) -> &Arc<NodeLoader> {
        &self.loader
    }

    /// Callers must `invalidate` the owning renderable afterwards so
    /// the next frame re-queries.
    pub fn add_placement(&self, placement: ScenePlacement) {
        self.placements.write().push(placement);
    }

    pub fn remove_placement(&self, id: u64) -> bool {
        let mut placements = self.placements.write();
        let before = placements.len();
        placements.retain(|p| {
            if p.id != id {
                return true;
            }
            cancel_tree(&self.loader, &p.root);
            false
        });
        placements.len() != before
    }

    /// Placements under the given point, most recently added first.
    pub fn hit_test(&self, point: &GeoPoint) -> Vec<u64> {
        self.placements
            .read()
            .iter()
            .rev()
            .filter(|p| p.footprint.contains(point))
            .map(|p| p.id)
            .collect()
    }

    /// View-dependent load cost: scenes near the view center load
    /// before scenes at the edge.
    fn placement_gsd(state: &ViewState, placement: &ScenePlacement) -> f64 {
        let dlat = placement.location.latitude - state.center.latitude;
        let dlon = placement.location.longitude - state.center.longitude;
        let distance_deg = (dlat * dlat + dlon * dlon).sqrt();
        state.resolution * (1. + distance_deg)
    }

    fn resolve_node(
        &self,
        context: &mut SceneQueryContext,
        placement_id: u64,
        node: &Arc<SceneNode>,
        gsd: f64,
        on_screen: bool,
    ) {
        // Descend while the view demands more detail than this node's
        // own tiers provide.
        if !node.children().is_empty() && gsd <= node.nominal_gsd() {
            for child in node.children() {
                self.resolve_node(context, placement_id, child, gsd, on_screen);
            }
            return;
        }

        let lod = node.lod_for_gsd(gsd);
        let load_context = LoadContext {
            centroid: node.aabb().center(),
            radius: node.bounding_sphere().radius(),
            gsd,
        };
        if on_screen {
            if !context.emitted.insert((placement_id, node.id())) {
                return;
            }
            if !node.has_mesh(lod) {
                self.loader.enqueue(node.clone(), load_context, false);
            }
            context.visible.push(SceneRenderable {
                placement_id,
                node: node.clone(),
                lod,
            });
        } else if !node.has_mesh(lod) {
            self.loader.enqueue(node.clone(), load_context, true);
        }
    }

    fn query_part(
        &self,
        context: &mut SceneQueryContext,
        state: &ViewState,
        cancel: &CancelFlag,
    ) -> Result<()> {
        let reach = expanded(&state.bounds, self.prefetch_margin);
        let placements = self.placements.read();
        for placement in placements.iter() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let on_screen = placement.footprint.intersects(&state.bounds);
            if !on_screen && !placement.footprint.intersects(&reach) {
                continue;
            }
            let gsd = Self::placement_gsd(state, placement);
            self.resolve_node(context, placement.id, &placement.root, gsd, on_screen);
        }
        Ok(())
    }
}

impl AsyncQuery for SceneLayer {
    type Context = SceneQueryContext;
    type Renderable = SceneRenderable;

    fn create_context(&self) -> Self::Context {
        SceneQueryContext::default()
    }

    fn reset_context(&self, context: &mut Self::Context) {
        context.visible.clear();
        context.emitted.clear();
    }

    fn query(
        &self,
        context: &mut Self::Context,
        state: &ViewState,
        cancel: &CancelFlag,
    ) -> Result<()> {
        // Antimeridian-crossing views run as two clipped queries whose
        // results union in the shared context.
        for part in state.bounds.split_at_antimeridian() {
            let sub = state.with_bounds(part);
            self.query_part(context, &sub, cancel)?;
            if cancel.is_cancelled() {
                return Ok(());
            }
        }
        Ok(())
    }

    fn update_renderable_lists(
        &self,
        context: &mut Self::Context,
        current: &mut Vec<SceneRenderable>,
        retired: &mut Vec<SceneRenderable>,
    ) {
        let fresh_keys: FxHashSet<(u64, u64)> = context
            .visible
            .iter()
            .map(|r| (r.placement_id, r.node.id()))
            .collect();

        let fresh = std::mem::take(&mut context.visible);
        let previous = std::mem::replace(current, fresh);
        for renderable in previous {
            if !fresh_keys.contains(&(renderable.placement_id, renderable.node.id())) {
                // Falling out of view: stop any in-flight load and let
                // the engine release resources on the render thread.
                self.loader.cancel(&renderable.node);
                retired.push(renderable);
            }
        }
    }

    fn release_renderable(&self, renderable: &mut SceneRenderable) {
        renderable.node.release_meshes();
    }
}

fn cancel_tree(loader: &NodeLoader, node: &Arc<SceneNode>) {
    loader.cancel(node);
    for child in node.children() {
        cancel_tree(loader, child);
    }
}

/// Grow bounds by `margin` degrees on every side, clamping latitude
/// and wrapping longitude.
fn expanded(bounds: &GeoBounds, margin: f64) -> GeoBounds {
    let south = (bounds.south - margin).max(-90.);
    let north = (bounds.north + margin).min(90.);
    if bounds.longitude_span() + 2. * margin >= 360. {
        GeoBounds::new(-180., south, 180., north)
    } else {
        GeoBounds::new(
            GeoPoint::wrap_longitude(bounds.west - margin),
            south,
            GeoPoint::wrap_longitude(bounds.east + margin),
            north,
        )
    }
}
