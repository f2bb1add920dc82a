//! Command-line driver.
//!
//! Builds a one-node graph from the given values, compiles and runs it, and
//! prints the output buffer.

use clap::{Parser, Subcommand};
use std::ffi::c_void;
use std::process;
use subgraph_jit::{ElementType, Graph, JitCompiler, JitConfig};

/// Compile and run a single tensor operation
#[derive(Parser, Debug)]
#[command(name = "subgraph-jit", version, about)]
struct Cli {
    /// Print the IR after building and after dialect lowering
    #[arg(long, global = true)]
    dump: bool,

    /// Print compile statistics
    #[arg(long, global = true)]
    stats: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Elementwise f32 addition of two equally long vectors
    Add {
        #[arg(long, value_delimiter = ',', required = true)]
        lhs: Vec<f32>,
        #[arg(long, value_delimiter = ',', required = true)]
        rhs: Vec<f32>,
    },
    /// f32 matrix product of a [M, K] and a [K, N] matrix, both row-major
    Matmul {
        #[arg(long, num_args = 2, required = true, value_names = ["M", "K"])]
        lhs_shape: Vec<usize>,
        #[arg(long, value_delimiter = ',', required = true)]
        lhs: Vec<f32>,
        #[arg(long, num_args = 2, required = true, value_names = ["K", "N"])]
        rhs_shape: Vec<usize>,
        #[arg(long, value_delimiter = ',', required = true)]
        rhs: Vec<f32>,
    },
}

fn fail(message: String) -> ! {
    eprintln!("error: {message}");
    process::exit(1);
}

fn check_len(name: &str, values: &[f32], shape: &[usize]) {
    let expected: usize = shape.iter().product();
    if values.len() != expected {
        fail(format!(
            "{name} has {} values but shape {:?} needs {expected}",
            values.len(),
            shape
        ));
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut graph = Graph::new();
    let (node, mut lhs, mut rhs, out_len) = match cli.command {
        Command::Add { lhs, rhs } => {
            if lhs.len() != rhs.len() {
                fail(format!("operand lengths differ: {} vs {}", lhs.len(), rhs.len()));
            }
            let a = graph.parameter(ElementType::F32, vec![lhs.len()]);
            let b = graph.parameter(ElementType::F32, vec![rhs.len()]);
            let len = lhs.len();
            (graph.add(a, b), lhs, rhs, len)
        }
        Command::Matmul {
            lhs_shape,
            lhs,
            rhs_shape,
            rhs,
        } => {
            check_len("lhs", &lhs, &lhs_shape);
            check_len("rhs", &rhs, &rhs_shape);
            if lhs_shape[1] != rhs_shape[0] {
                fail(format!(
                    "inner dimensions differ: {:?} x {:?}",
                    lhs_shape, rhs_shape
                ));
            }
            let a = graph.parameter(ElementType::F32, lhs_shape.clone());
            let b = graph.parameter(ElementType::F32, rhs_shape.clone());
            (graph.matmul_bias(a, b, None), lhs, rhs, lhs_shape[0] * rhs_shape[1])
        }
    };
    let result = graph.output(node);
    graph.add_result(result);

    let mut out = vec![0f32; out_len];
    let buffers: [*mut c_void; 3] = [
        lhs.as_mut_ptr().cast(),
        rhs.as_mut_ptr().cast(),
        out.as_mut_ptr().cast(),
    ];

    let config = JitConfig::global().clone();
    let dump = cli.dump || config.dump_ir;
    let mut compiler = JitCompiler::new(&graph, &[node], &buffers).with_config(config.with_dump_ir(dump));
    if let Err(err) = unsafe { compiler.compile_and_run() } {
        fail(err.to_string());
    }

    let rendered: Vec<String> = out.iter().map(|v| v.to_string()).collect();
    println!("{}", rendered.join(","));
    if cli.stats {
        print!("{}", compiler.stats());
    }
}
