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
use anyhow::{bail, Error, Result};
use std::str::FromStr;

/// Baseline cost/quality tradeoffs for CPU-side pipeline work. Fine
/// grained adjustment is possible through the parameter structs; this
/// just sets defaults.
#[derive(Clone, Copy, Debug)]
pub enum CpuDetailLevel {
    Low,
    Medium,
    High,
    Ultra,
}

impl CpuDetailLevel {
    pub fn detect() -> Self {
        if cfg!(debug_assertions) {
            Self::Low
        } else {
            Self::High
        }
    }

    pub fn parameters(&self) -> EngineDetail {
        match self {
            // Coarser levels coalesce harder: more camera motion gets
            // absorbed before a re-query dispatches.
            Self::Low => EngineDetail {
                resolution_epsilon: 1e-2,
            },
            Self::Medium => EngineDetail {
                resolution_epsilon: 5e-3,
            },
            Self::High => EngineDetail {
                resolution_epsilon: 1e-3,
            },
            Self::Ultra => EngineDetail {
                resolution_epsilon: 0.,
            },
        }
    }
}

impl FromStr for CpuDetailLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "low" | "lo" | "0" => Self::Low,
            "medium" | "med" | "1" => Self::Medium,
            "high" | "hi" | "2" => Self::High,
            "ultra" | "max" | "3" => Self::Ultra,
            _ => bail!("unrecognized detail level; expected low, medium, high, or ultra"),
        })
    }
}

/// Tunables for the asynchronous renderable engine. The coalescing
/// threshold is a heuristic, not a contract; tests assert the
/// one-query-in-flight property rather than any particular value.
#[derive(Clone, Copy, Debug)]
pub struct EngineDetail {
    /// Relative resolution change below which a camera-only zoom does
    /// not force a re-query.
    pub resolution_epsilon: f64,
}

impl Default for EngineDetail {
    fn default() -> Self {
        CpuDetailLevel::detect().parameters()
    }
}
