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

/// Which phase of the frame a draw call belongs to. Renderables that
/// participate in several passes are drawn once per matching pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RenderPass(u32);

impl RenderPass {
    pub const SURFACE: RenderPass = RenderPass(1);
    pub const SPRITES: RenderPass = RenderPass(1 << 1);
    pub const SCENES: RenderPass = RenderPass(1 << 2);
    pub const USER_INTERFACE: RenderPass = RenderPass(1 << 3);
    pub const ALL: RenderPass = RenderPass(u32::MAX);

    pub fn intersects(&self, other: RenderPass) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(&self, other: RenderPass) -> RenderPass {
        RenderPass(self.0 | other.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pass_membership() {
        let mask = RenderPass::SURFACE.union(RenderPass::SCENES);
        assert!(mask.intersects(RenderPass::SURFACE));
        assert!(mask.intersects(RenderPass::SCENES));
        assert!(!mask.intersects(RenderPass::SPRITES));
        assert!(RenderPass::ALL.intersects(RenderPass::USER_INTERFACE));
    }
}
