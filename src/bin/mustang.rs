//! mustang - download NetEase Cloud Music songs, albums and playlists.

use std::env;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    match mustang_dl::cli::run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", console::style(format!("Error: {e}")).red());
            ExitCode::FAILURE
        }
    }
}
