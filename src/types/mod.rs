// ABOUTME: Validated domain types shared by config and CLI.
// ABOUTME: Parsing happens at construction so invalid values never circulate.

mod machine_name;

pub use machine_name::{MachineName, MachineNameError};
