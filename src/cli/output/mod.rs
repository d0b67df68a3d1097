//! CLI output formatting: a `CommandOutput` trait mirroring the
//! teacher's `cli::output`, plus table/tree renderers for phase status.

pub mod table;
pub mod tree;

pub use table::render_phase_table;
pub use tree::render_dependency_tree;

use serde::Serialize;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}
