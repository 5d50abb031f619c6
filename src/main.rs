use std::process::ExitCode;

fn main() -> ExitCode {
    match khps2_locus::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
