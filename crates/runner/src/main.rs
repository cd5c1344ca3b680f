use std::process::ExitCode;

mod app;

fn main() -> ExitCode {
    match app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("runner failed: {error}");
            ExitCode::from(1)
        }
    }
}
