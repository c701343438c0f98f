use std::process::ExitCode;

use xcc::app::Controller;
use xcc::output::Output;

fn main() -> ExitCode {
    run()
}

#[tokio::main]
async fn run() -> ExitCode {
    let controller = Controller::new(Output::stdout());
    match controller.run(std::env::args_os()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
