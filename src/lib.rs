pub mod calls;
pub mod cli;
pub mod consensus;
pub mod deletion;
pub mod errors;
pub mod iupac;
pub mod pileup;
pub mod pipeline;
pub mod position;
pub mod selector;
pub mod sequence;
pub mod writer;

pub use consensus::{ConsensusBuilder, ConsensusParams, build_consensus};
pub use errors::{AppError, Result};
pub use pileup::{PileupReader, PileupRecord, open_pileup, parse_pileup_line};
pub use position::ConsensusPosition;
pub use selector::{build_sequences, select_sequences};
pub use sequence::ConsensusSequence;

use cli::ConsensusArgs;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}

pub fn run_from_args(args: ConsensusArgs) -> Result<()> {
    pipeline::run(&args)
}
