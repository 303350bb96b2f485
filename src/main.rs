//! `aerogate` binary
//!
//! Offline tooling over a schema snapshot file. Everything lives in
//! [`aerogate::cli`]; failures are printed with their CLI code and the
//! process exits with status 1.

use aerogate::cli;

fn main() {
    if let Err(err) = cli::run() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
