use std::process::ExitCode;

use anyhow::Error;
use clap::Parser;

use pbs_mpirun::{
    Cli, config::Topology, env::AmbientEnv, error::LaunchError, exec, launch::Launch, logging,
};

async fn run(cli: Cli) -> Result<u8, Error> {
    let ambient = AmbientEnv::from_process();
    let topology = Topology::detect();
    let request = cli.request()?;

    let launch = Launch::prepare(&request, cli.nodefile.clone(), &ambient, &topology)?;
    if cli.dry_run {
        print!("{launch}");
        return Ok(0);
    }
    let code = exec::execute(&launch.invocation).await?;
    Ok(code)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("pbs-mpirun: error: {e:#}");
            let code = e.downcast_ref::<LaunchError>().map_or(1, LaunchError::exit_code);
            ExitCode::from(code)
        }
    }
}
