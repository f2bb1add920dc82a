//! Process-wide configuration read from the environment.
//!
//! | Variable                     | Effect                                         |
//! |------------------------------|------------------------------------------------|
//! | `SUBGRAPH_JIT_DUMP_ALL`      | dump the module after build and after lowering |
//! | `SUBGRAPH_JIT_LLVM_OPTIONS`  | options forwarded once to LLVM's option parser |

use std::env;
use std::sync::OnceLock;

pub const DUMP_ALL_VAR: &str = "SUBGRAPH_JIT_DUMP_ALL";
pub const LLVM_OPTIONS_VAR: &str = "SUBGRAPH_JIT_LLVM_OPTIONS";

static GLOBAL: OnceLock<JitConfig> = OnceLock::new();

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitConfig {
    /// Print the module after IR construction and after dialect lowering.
    pub dump_ir: bool,
    /// Extra LLVM command-line options, e.g. `-debug-pass=Structure`.
    ///
    /// LLVM parses these once per process, when the first compiler executes.
    /// A compiler configured with different options later still runs, with
    /// the options from that first initialisation and a logged warning.
    pub llvm_options: Vec<String>,
}

impl JitConfig {
    /// Read the configuration from the current environment.
    pub fn from_env() -> Self {
        Self {
            dump_ir: env::var_os(DUMP_ALL_VAR).is_some(),
            llvm_options: env::var(LLVM_OPTIONS_VAR)
                .map(|value| parse_options(&value))
                .unwrap_or_default(),
        }
    }

    /// Configuration read once on first use and shared by every compiler.
    pub fn global() -> &'static JitConfig {
        GLOBAL.get_or_init(JitConfig::from_env)
    }

    pub fn with_dump_ir(mut self, dump_ir: bool) -> Self {
        self.dump_ir = dump_ir;
        self
    }
}

fn parse_options(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        assert_eq!(
            parse_options("  -x86-asm-syntax=intel   -stats "),
            vec!["-x86-asm-syntax=intel".to_string(), "-stats".to_string()]
        );
        assert!(parse_options("   ").is_empty());
    }

    #[test]
    fn test_default_is_quiet() {
        let config = JitConfig::default();
        assert!(!config.dump_ir);
        assert!(config.with_dump_ir(true).dump_ir);
    }
}
