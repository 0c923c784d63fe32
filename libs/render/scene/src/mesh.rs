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
use crate::SceneNode;
use anyhow::Result;
use std::{fmt::Debug, sync::Arc};
use sync::CancelFlag;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VertexAttribute {
    Position,
    Normal,
    TexCoord,
    Color,
}

/// One interleaved f32 attribute in the vertex stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttributeLayout {
    pub attribute: VertexAttribute,
    pub components: u8,
    pub offset: usize,
}

/// Read-only mesh payload, as handed to the draw capability. The core
/// never interprets the buffers beyond their counts and layout.
pub trait Mesh: Debug + Send + Sync + 'static {
    fn vertex_count(&self) -> usize;
    fn index_count(&self) -> usize;
    fn layout(&self) -> &[AttributeLayout];
    fn vertex_data(&self) -> &[f32];
    fn indices(&self) -> &[u32];
}

/// The persistence collaborator behind the node loader: produce the
/// mesh payload for one node at one level of detail. Runs on loader
/// pool threads; implementations poll `cancel` during long decodes.
///
/// `Ok(None)` means the source has no payload for that LOD, which is
/// not an error.
pub trait MeshSource: Send + Sync + 'static {
    fn load_mesh(
        &self,
        node: &SceneNode,
        lod: usize,
        cancel: &CancelFlag,
    ) -> Result<Option<Arc<dyn Mesh>>>;
}

/// An in-memory mesh, for tests and procedurally built geometry.
#[derive(Debug)]
pub struct MemoryMesh {
    layout: Vec<AttributeLayout>,
    stride: usize,
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl MemoryMesh {
    pub fn new(layout: Vec<AttributeLayout>, vertices: Vec<f32>, indices: Vec<u32>) -> Self {
        let stride: usize = layout.iter().map(|a| a.components as usize).sum();
        debug_assert!(stride > 0 && vertices.len() % stride == 0);
        Self {
            layout,
            stride,
            vertices,
            indices,
        }
    }

    /// A unit quad in the x/y plane; positions only.
    pub fn quad() -> Self {
        Self::new(
            vec![AttributeLayout {
                attribute: VertexAttribute::Position,
                components: 3,
                offset: 0,
            }],
            vec![
                0., 0., 0., //
                1., 0., 0., //
                1., 1., 0., //
                0., 1., 0., //
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }
}

impl Mesh for MemoryMesh {
    fn vertex_count(&self) -> usize {
        self.vertices.len() / self.stride
    }

    fn index_count(&self) -> usize {
        self.indices.len()
    }

    fn layout(&self) -> &[AttributeLayout] {
        &self.layout
    }

    fn vertex_data(&self) -> &[f32] {
        &self.vertices
    }

    fn indices(&self) -> &[u32] {
        &self.indices
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_quad_counts() {
        let quad = MemoryMesh::quad();
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.index_count(), 6);
        assert_eq!(quad.layout().len(), 1);
        assert_eq!(quad.layout()[0].components, 3);
    }
}
