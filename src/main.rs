use karakuri::cli::{self, Command};
use karakuri::{Pipeline, logging};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("karakuri error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init(args.log_level);

    let pipeline = Pipeline::new(args.root.as_str())?;

    match args.command.unwrap_or(Command::Dev { port: 8080 }) {
        Command::Build => pipeline.build()?,
        Command::Clean => pipeline.clean()?,
        Command::Deploy => pipeline.deploy()?,
        Command::Dev { port } => pipeline.dev(port)?,
    }

    Ok(())
}
