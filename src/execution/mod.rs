mod executor;

pub use executor::{ExecutorConfig, SwapExecutor, SwapOrder, SwapOutcome, SOL_MINT};
