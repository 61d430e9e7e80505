use taggy::*;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = std::env::args().collect::<Vec<_>>();
    if args.len() != 3 {
        eprintln!("Usage: {} <config.yaml> <reads.fastq[.gz]>", args[0]);
        std::process::exit(1);
    }

    let run = || -> Result<Stats> {
        let config = DemuxConfig::from_file(&args[1])?;
        Demultiplexer::from_config(config)?.run_file(&args[2])
    };

    match run() {
        Ok(stats) => println!("{}", stats),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
