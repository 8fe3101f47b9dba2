use clap::{App, Arg};
use distsort::config::{Config, DEFAULT_PORT};
use distsort::Middleware;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port = parse_args();
    let middleware = Middleware::new(Config::new(port));
    if let Err(e) = middleware.run().await {
        // most likely the port is already taken
        error!("failed to start middleware on port {}: {:?}", port, e);
        std::process::exit(1);
    }
}

fn parse_args() -> u16 {
    let matches = App::new("distsort")
        .version("0.1")
        .about("Middleware that sorts integer sequences across a fleet of workers.")
        .arg(
            Arg::with_name("port")
                .long("port")
                .value_name("PORT")
                .help("port to listen on for clients and worker registrations")
                .takes_value(true),
        )
        .get_matches();

    match matches.value_of("port") {
        Some(port) => port.parse().expect("port should be a number in [1, 65535]"),
        None => DEFAULT_PORT,
    }
}
