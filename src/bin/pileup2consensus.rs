use mimalloc::MiMalloc;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    pileup_consensus::init_tracing();
    match pileup_consensus::cli::parse_from_env().and_then(pileup_consensus::run_from_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("pileup2consensus: {error}");
            ExitCode::from(1)
        }
    }
}
