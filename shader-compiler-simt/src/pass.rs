// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! function passes and the pipeline running them

use crate::address_scalarization::AddressScalarization;
use crate::atomic_reduction_fusion::AtomicReductionFusion;
use crate::cfg::CFG;
use crate::config::PipelineConfigError;
use crate::config::PipelineOptions;
use crate::resource_loop_grouping::ResourceLoopGrouping;
use crate::uniformity::Uniformity;
use log::debug;
use once_cell::unsync::OnceCell;
use shader_compiler_ir::Function;
use shader_compiler_ir::TargetProperties;

/// analyses of one function state, computed on first use
///
/// must be invalidated whenever the function changes
#[derive(Default)]
pub struct FunctionAnalyses {
    cfg: OnceCell<CFG>,
    uniformity: OnceCell<Uniformity>,
}

impl FunctionAnalyses {
    /// create an empty cache
    pub fn new() -> Self {
        Self::default()
    }
    /// the control flow graph of `function`
    pub fn cfg(&self, function: &Function) -> &CFG {
        self.cfg.get_or_init(|| CFG::new(function))
    }
    /// the uniformity analysis of `function`
    pub fn uniformity(&self, function: &Function) -> &Uniformity {
        self.uniformity
            .get_or_init(|| Uniformity::new(function, self.cfg(function)))
    }
    /// drop every cached analysis
    pub fn invalidate(&mut self) {
        self.cfg = OnceCell::new();
        self.uniformity = OnceCell::new();
    }
}

/// a transformation of a single function
///
/// pass objects hold only configuration, so one pass can run on many
/// functions
pub trait FunctionPass {
    /// the name used in textual pass lists
    fn name(&self) -> &'static str;
    /// run the pass using analyses computed for the current state of `function`,
    /// returning `true` if `function` changed
    fn run_with_analyses(&self, function: &mut Function, analyses: &FunctionAnalyses) -> bool;
    /// run the pass, returning `true` if `function` changed
    fn run(&self, function: &mut Function) -> bool {
        self.run_with_analyses(function, &FunctionAnalyses::new())
    }
}

/// the textual name of `AtomicReductionFusion`
pub const ATOMIC_REDUCTION_FUSION: &str = "atomic-reduction-fusion";
/// the textual name of `ResourceLoopGrouping`
pub const RESOURCE_LOOP_GROUPING: &str = "resource-loop-grouping";
/// the textual name of `AddressScalarization`
pub const ADDRESS_SCALARIZATION: &str = "address-scalarization";

/// an ordered list of passes
#[derive(Default)]
pub struct Pipeline {
    passes: Vec<Box<dyn FunctionPass>>,
}

impl Pipeline {
    /// create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }
    /// append `pass` to the pipeline
    pub fn add_pass(&mut self, pass: Box<dyn FunctionPass>) {
        self.passes.push(pass);
    }
    /// build the enabled passes in their standard order
    pub fn from_options(options: &PipelineOptions) -> Self {
        let mut pipeline = Pipeline::new();
        if options.atomic_reduction_fusion {
            pipeline.add_pass(Box::new(AtomicReductionFusion::new(
                options.target_properties,
            )));
        }
        if options.resource_loop_grouping {
            pipeline.add_pass(Box::new(ResourceLoopGrouping));
        }
        if options.address_scalarization {
            pipeline.add_pass(Box::new(AddressScalarization));
        }
        pipeline
    }
    /// build a pipeline from a comma separated list of pass names, in list order
    pub fn from_pass_names(
        pass_names: &str,
        target_properties: TargetProperties,
    ) -> Result<Self, PipelineConfigError> {
        let mut pipeline = Pipeline::new();
        for pass_name in pass_names.split(',').map(str::trim) {
            let pass: Box<dyn FunctionPass> = match pass_name {
                "" => continue,
                ATOMIC_REDUCTION_FUSION => Box::new(AtomicReductionFusion::new(target_properties)),
                RESOURCE_LOOP_GROUPING => Box::new(ResourceLoopGrouping),
                ADDRESS_SCALARIZATION => Box::new(AddressScalarization),
                _ => return Err(PipelineConfigError::UnknownPass(pass_name.into())),
            };
            pipeline.add_pass(pass);
        }
        Ok(pipeline)
    }
    /// the names of the passes, in run order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }
    /// run every pass once, in order, returning `true` if `function` changed
    pub fn run(&self, function: &mut Function) -> bool {
        let mut analyses = FunctionAnalyses::new();
        let mut changed = false;
        for pass in &self.passes {
            if pass.run_with_analyses(function, &analyses) {
                debug!("{} changed {}", pass.name(), function.name);
                analyses.invalidate();
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_options() {
        let pipeline = Pipeline::from_options(&PipelineOptions::default());
        assert_eq!(
            pipeline.pass_names(),
            vec![
                ATOMIC_REDUCTION_FUSION,
                RESOURCE_LOOP_GROUPING,
                ADDRESS_SCALARIZATION
            ]
        );
        let pipeline = Pipeline::from_options(&PipelineOptions {
            atomic_reduction_fusion: false,
            ..PipelineOptions::default()
        });
        assert_eq!(
            pipeline.pass_names(),
            vec![RESOURCE_LOOP_GROUPING, ADDRESS_SCALARIZATION]
        );
    }

    #[test]
    fn test_from_pass_names() {
        let pipeline = Pipeline::from_pass_names(
            "address-scalarization, resource-loop-grouping,",
            TargetProperties::default(),
        )
        .unwrap();
        assert_eq!(
            pipeline.pass_names(),
            vec![ADDRESS_SCALARIZATION, RESOURCE_LOOP_GROUPING]
        );
        match Pipeline::from_pass_names("dead-code-elimination", TargetProperties::default()) {
            Err(PipelineConfigError::UnknownPass(name)) => {
                assert_eq!(name, "dead-code-elimination")
            }
            _ => panic!("expected an unknown pass error"),
        }
    }
}
