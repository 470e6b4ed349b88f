//! Binary entrypoint for the relay server.

use std::process::ExitCode;

use neural_relay::start_neural_relay;

fn main() -> ExitCode {
    start_neural_relay::run()
}
