use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::Cli;

/// Write the completion script for `shell` to stdout.
pub fn run(shell: Shell) {
    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}
