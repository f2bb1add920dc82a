//! IR passes and the pass manager.
//!
//! Each pipeline stage builds its own [`PassManager`]; passes are never
//! carried over from one stage to the next.
//!
//! ```ignore
//! let mut pm = PassManager::new();
//! pm.add_pass(create_dialect_lowering_pass());
//! pm.add_pass(create_canonicalizer_pass());
//! pm.run(&mut module)?;
//! ```

pub mod canonicalize;
pub mod lower_affine;
pub mod lower_dialect;
pub mod verify;

pub use canonicalize::Canonicalize;
pub use lower_affine::LowerAffineLoops;
pub use lower_dialect::LowerTensorDialect;

use crate::core::PassError;
use crate::ir::{Function, Module};

/// A function-level IR rewrite.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run_on_function(&mut self, function: &mut Function) -> Result<(), PassError>;
}

/// Ordered list of passes run over every function of a module.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    passes_run: usize,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass in order, stopping at the first failure.
    pub fn run(&mut self, module: &mut Module) -> Result<(), PassError> {
        for pass in &mut self.passes {
            log::trace!("running pass '{}'", pass.name());
            for function in module.functions_mut() {
                pass.run_on_function(function)?;
            }
            self.passes_run += 1;
        }
        Ok(())
    }

    /// Number of passes that completed across all runs.
    pub fn passes_run(&self) -> usize {
        self.passes_run
    }
}

pub fn create_dialect_lowering_pass() -> LowerTensorDialect {
    LowerTensorDialect
}

pub fn create_canonicalizer_pass() -> Canonicalize {
    Canonicalize
}

pub fn create_lower_affine_pass() -> LowerAffineLoops {
    LowerAffineLoops
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rename(&'static str);

    impl Pass for Rename {
        fn name(&self) -> &'static str {
            "rename"
        }

        fn run_on_function(&mut self, function: &mut Function) -> Result<(), PassError> {
            function.name = self.0.to_string();
            Ok(())
        }
    }

    struct Fail;

    impl Pass for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn run_on_function(&mut self, _function: &mut Function) -> Result<(), PassError> {
            Err(PassError::failed("fail", "always"))
        }
    }

    #[test]
    fn test_passes_run_in_order() {
        let mut module = Module::new();
        module.push_function(Function::new("a", vec![], vec![]));

        let mut pm = PassManager::new();
        pm.add_pass(Rename("first"));
        pm.add_pass(Rename("second"));
        pm.run(&mut module).unwrap();

        assert_eq!(module.functions()[0].name, "second");
        assert_eq!(pm.passes_run(), 2);
    }

    #[test]
    fn test_failure_stops_pipeline() {
        let mut module = Module::new();
        module.push_function(Function::new("a", vec![], vec![]));

        let mut pm = PassManager::new();
        pm.add_pass(Fail);
        pm.add_pass(Rename("never"));
        assert!(pm.run(&mut module).is_err());
        assert_eq!(module.functions()[0].name, "a");
        assert_eq!(pm.passes_run(), 0);
    }
}
