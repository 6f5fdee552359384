use clap::Parser;
use log::{error, info};
use std::io::{self, BufRead, Write};
use voxlink::client::commands::print_menu;
use voxlink::client::{ClientContext, Command};
use voxlink::configuration::{ClientArgs, ClientPaths};

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = ClientArgs::parse();
    let paths = ClientPaths::resolve(&args);
    info!(
        "Servers file: {}, cache: {}, users: {}",
        paths.servers_file.display(),
        paths.cache_file.display(),
        paths.users_dir.display()
    );

    let mut context = ClientContext::new(&paths, args.server.as_deref());
    context.show_server();
    print_menu();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                error!("Unable to read input: {}", e);
                break;
            }
            None => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(command) => {
                if !context.execute(command) {
                    break;
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    context.shutdown();
    println!("Bye.");
}
