use std::env;

use market_dl::cli::{CliArgs, print_usage, run};

#[tokio::main]
async fn main() {
    let args = match CliArgs::parse(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            print_usage();
            std::process::exit(2);
        }
    };
    if args.help {
        print_usage();
        std::process::exit(0);
    }

    let level = match args.verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(args).await {
        if let Some(body) = e.http_body() {
            log::debug!("Server response: {body}");
        }
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
