mod action;
mod cache;
mod cli;
mod datatype;
mod decode;
mod engine;
mod error;
mod export;
mod frame;
mod i2c_link;
mod schema;
mod slave;

use clap::Parser;

fn main() {
    let args = cli::Args::parse();
    cli::init_logging(&args);

    if let Err(e) = cli::run(args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
