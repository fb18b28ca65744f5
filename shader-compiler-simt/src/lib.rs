// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information
#![deny(missing_docs)]

//! SIMT divergence analysis and the passes using it

pub mod address_scalarization;
pub mod atomic_reduction_fusion;
pub mod cfg;
pub mod config;
pub mod interpret;
pub mod lattice;
pub mod pass;
pub mod resource_loop_grouping;
pub mod uniformity;

pub use crate::address_scalarization::AddressScalarization;
pub use crate::atomic_reduction_fusion::AtomicReductionFusion;
pub use crate::cfg::CFG;
pub use crate::config::PipelineConfigError;
pub use crate::config::PipelineOptions;
pub use crate::interpret::interpret;
pub use crate::interpret::Execution;
pub use crate::interpret::InterpretError;
pub use crate::interpret::Interpreter;
pub use crate::interpret::Memory;
pub use crate::pass::FunctionAnalyses;
pub use crate::pass::FunctionPass;
pub use crate::pass::Pipeline;
pub use crate::resource_loop_grouping::resource_loop_marker;
pub use crate::resource_loop_grouping::resource_loop_runs;
pub use crate::resource_loop_grouping::ResourceLoopGrouping;
pub use crate::uniformity::DivergenceClass;
pub use crate::uniformity::Uniformity;
