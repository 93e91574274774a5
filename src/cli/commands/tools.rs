//! Tools command - list the tools advertised to the model.

use crate::capabilities::default_declarations;
use crate::cli::Output;
use anyhow::Result;

/// Print every built-in tool declaration.
pub fn run_tools() -> Result<()> {
    let declarations = default_declarations();
    Output::header(&format!("{} tool(s) available", declarations.len()));
    for declaration in &declarations {
        Output::tool(declaration);
    }
    println!();
    Ok(())
}
