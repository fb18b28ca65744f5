// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! pipeline configuration

use shader_compiler_ir::TargetProperties;
use thiserror::Error;

/// which passes a `Pipeline` runs, and the target they run for
///
/// [`Pipeline`]: crate::pass::Pipeline
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PipelineOptions {
    /// run `AtomicReductionFusion`
    pub atomic_reduction_fusion: bool,
    /// run `ResourceLoopGrouping`
    pub resource_loop_grouping: bool,
    /// run `AddressScalarization`
    pub address_scalarization: bool,
    /// the target machine
    pub target_properties: TargetProperties,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            atomic_reduction_fusion: true,
            resource_loop_grouping: true,
            address_scalarization: true,
            target_properties: TargetProperties::default(),
        }
    }
}

/// error building a `Pipeline` from a textual pass list
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum PipelineConfigError {
    /// the name doesn't match any pass
    #[error("unknown pass name: {0:?}")]
    UnknownPass(String),
}
