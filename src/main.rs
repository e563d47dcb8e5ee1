extern crate log;
pub mod address;
pub mod config;
pub mod crs;
pub mod edit;
pub mod error;
pub mod geofile;
pub mod interaction;
pub mod persist;
use crate::address::lookup::AddressLookup;
use crate::config::Config;
use crate::interaction::console::{parse_console_line, ConsoleCommand, ConsoleSurface, USAGE};
use crate::interaction::controller::{Controller, ControllerSettings};
use crate::persist::conversion::ConversionGateway;
use crate::persist::pipeline::PersistencePipeline;
use anyhow::anyhow;
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Inspect and edit the polygons of a shapefile, then write the edits back.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the shapefile to edit.
    shapefile_path: Option<PathBuf>,

    /// Path to an optional YAML config file.
    #[arg(short, long)]
    config_filepath: Option<PathBuf>,
}

async fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    let config = Config::load(args.config_filepath.as_deref())?;
    let shapefile_path = args
        .shapefile_path
        .ok_or_else(|| anyhow!("shapefile path not provided."))?;
    log::debug!("{:?}", config);

    let (event_sender, mut event_receiver) = mpsc::unbounded_channel();
    let (completion_sender, mut completion_receiver) = mpsc::unbounded_channel();

    let lookup = if config.address_lookup.enabled {
        Some(AddressLookup::new(&config.address_lookup.endpoint)?)
    } else {
        None
    };
    let pipeline = PersistencePipeline::new(ConversionGateway::from(&config.conversion));
    let mut controller = Controller::new(
        ControllerSettings::from(&config),
        ConsoleSurface::new(event_sender.clone()),
        pipeline,
        lookup,
        completion_sender,
    );
    controller.open(shapefile_path);

    // Console reads block, so they get their own thread instead of a runtime task.
    let stdin_sender = event_sender;
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    log::error!("Reading console input failed: {}", err);
                    break;
                }
            };
            match parse_console_line(&line) {
                Ok(Some(command)) => {
                    let quit = command == ConsoleCommand::Quit;
                    if stdin_sender.send(command).is_err() || quit {
                        return;
                    }
                }
                Ok(None) => {}
                Err(message) => eprintln!("{}", message),
            }
        }
        let _ = stdin_sender.send(ConsoleCommand::Quit);
    });

    let mut quitting = false;
    while !(quitting && !controller.is_saving()) {
        tokio::select! {
            Some(command) = event_receiver.recv() => match command {
                ConsoleCommand::Event(event) => controller.handle(event),
                ConsoleCommand::Help => println!("{}", USAGE),
                ConsoleCommand::Quit => {
                    if controller.is_saving() {
                        println!("waiting for the running save to finish");
                    }
                    quitting = true;
                }
            },
            Some(completion) = completion_receiver.recv() => controller.complete(completion),
            else => break,
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    env_logger::init();
    if let Err(e) = try_main().await {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}
