//! Repair approved refunds and recompute the affected totals in one
//! transaction.

use std::process::ExitCode;

fn main() -> ExitCode {
    charityhub_reconcile::cli::main_with(charityhub_reconcile::cli::fix_command)
}
