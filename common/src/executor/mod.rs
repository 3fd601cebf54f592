// Script execution against remote hosts

pub mod script;

pub use script::{ExecOutput, ScriptRunner};
