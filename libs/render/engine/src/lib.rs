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
mod context;
mod detail;
mod engine;
mod pass;

pub use crate::{
    context::{QueuedRenderContext, RenderContext},
    detail::{CpuDetailLevel, EngineDetail},
    engine::{AsyncQuery, AsyncRenderable},
    pass::RenderPass,
};
