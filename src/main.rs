use clap::Parser;
use sdtpatch::cli::Args;
use sdtpatch::driver::{self, Outcome};

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            eprint!("{err}");
            std::process::exit(1);
        }
    };

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_module_path(false)
        .init();

    for path in &args.objects {
        match driver::process_object(path) {
            Ok(Outcome::NotRelocatable) | Ok(Outcome::Processed { .. }) => {}
            Err(err) => {
                eprintln!("sdtpatch: {}: {}", path.display(), err);
                std::process::exit(1);
            }
        }
    }
}
